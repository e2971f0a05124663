use tagalloc::{Allocator, Buffer, Heap, RawAllocator, ALIGNMENT, MIN_HEAP_SIZE};

#[test]
fn is_usable_in_const_contexts() {
    const _ALLOCATOR1: Allocator<64> = Allocator::new();
    static _ALLOCATOR2: Allocator<64> = Allocator::new();
    static _HEAP: Heap<Buffer<1024>> = Heap::with_chunk_size(Buffer::new(), 256);
    const _RAW: RawAllocator<Buffer<128>> = RawAllocator::new(Buffer::new());
}

#[test]
fn supports_global_alloc() {
    fn assert<T: core::alloc::GlobalAlloc>(_: T) {}
    assert(Allocator::<64>::new())
}

#[test]
fn heaps_can_be_shared() {
    fn assert<T: Send + Sync>() {}
    assert::<Allocator<64>>();
    assert::<Heap<Buffer<64>>>();
}

#[test]
fn minimal_heap() {
    let _allocator = Allocator::<MIN_HEAP_SIZE>::new();
}

#[test]
#[should_panic(expected = "too small heap memory")]
fn min_heap_size() {
    let _allocator = Allocator::<ALIGNMENT>::new(); // panic here
}

#[test]
#[should_panic(expected = "divisible by the alignment")]
fn heap_size_must_be_a_multiple_of_the_alignment() {
    let _allocator = Allocator::<100>::new(); // panic here
}

#[test]
#[should_panic(expected = "chunk size has to be divisible by the alignment")]
fn chunk_size_must_be_a_multiple_of_the_alignment() {
    let _heap = Heap::with_chunk_size(Buffer::<1024>::new(), 100); // panic here
}
