#![no_std]

const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: tagalloc::Allocator<HEAP_SIZE> = tagalloc::Allocator::new();

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

#[test]
fn vec() {
    let mut v = alloc::vec![1, 2, 3];
    v.push(4);

    assert_eq!((1..=4).collect::<Vec<_>>(), v);
}

#[test]
fn map_and_formatting() {
    let mut map = alloc::collections::BTreeMap::new();
    map.insert(10, "Hello");
    map.insert(11, "world");
    map.insert(20, "Hallo");
    map.insert(21, "Welt");
    map.insert(-1, "english");
    map.insert(-2, "german");

    let english = alloc::format!("[{}]: {}, {}!", map[&-1], map[&10], map[&11]);
    let german = alloc::format!("[{}]: {}, {}!", map[&-2], map[&20], map[&21]);
    assert_eq!(english, "[english]: Hello, world!");
    assert_eq!(german, "[german]: Hallo, Welt!");
}

#[test]
fn growing_vectors_are_reallocated() {
    let mut v = Vec::new();
    for i in 0..10_000u32 {
        v.push(i);
    }
    assert!(v.iter().copied().eq(0..10_000));

    let mut s = String::new();
    for word in ["boundary", "tags", "free", "list"].iter().cycle().take(500) {
        s.push_str(word);
        s.push(' ');
    }
    assert!(s.starts_with("boundary tags free list boundary"));
}

#[test]
fn over_aligned_boxes() {
    #[repr(align(64))]
    struct CacheLine([u8; 64]);

    let lines: Vec<Box<CacheLine>> = (0..32).map(|i| Box::new(CacheLine([i; 64]))).collect();
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(&**line as *const CacheLine as usize % 64, 0);
        assert!(line.0.iter().all(|&b| b == i as u8));
    }
}

#[test]
fn heap_is_consistent_after_use() {
    let v: Vec<Box<u64>> = (0..100).map(Box::new).collect();
    drop(v);
    // other tests might run concurrently, so only the structure is verified
    ALLOCATOR.heap().check().unwrap();
}
