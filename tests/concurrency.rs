use std::thread;

use tagalloc::{Buffer, Heap};

static HEAP: Heap<Buffer<{ 1024 * 1024 }>> = Heap::with_chunk_size(Buffer::new(), 16 * 1024);

#[test]
fn threads_share_one_heap() {
    HEAP.init(64 * 1024).unwrap();

    thread::scope(|scope| {
        for id in 0..8u8 {
            scope.spawn(move || {
                let mut pointers = Vec::new();
                for round in 0..500usize {
                    let len = 1 + (round * 37 + usize::from(id) * 11) % 300;
                    let ptr = HEAP.allocate(len).unwrap();
                    unsafe { ptr.as_ptr().write_bytes(id, len) };
                    pointers.push((ptr, len));

                    if round % 3 == 0 {
                        let (ptr, len) = pointers.swap_remove(round % pointers.len());
                        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
                        assert!(bytes.iter().all(|&b| b == id), "payload shared between threads");
                        unsafe { HEAP.try_release(ptr).unwrap() };
                    }
                }
                for (ptr, len) in pointers {
                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
                    assert!(bytes.iter().all(|&b| b == id), "payload shared between threads");
                    unsafe { HEAP.try_release(ptr).unwrap() };
                }
            });
        }
    });

    let stats = HEAP.check().unwrap();
    assert_eq!(stats.used_blocks, 0);
    assert_eq!(stats.blocks, 1);
}
