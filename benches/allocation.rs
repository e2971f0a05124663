#![feature(test)]
extern crate test;
use test::Bencher;

use std::alloc::{GlobalAlloc as _, Layout};

mod repeated_allocation_deallocation {
    use super::*;

    /// Run a benchmark, which repeatedly allocates and deallocates the same
    /// block. The benchmark will allocate the given amount of blocks beforehand
    /// (before running the actual benchmark) in order to fill up the heap with
    /// unrelated allocations.
    ///
    /// Since the used blocks are not part of the free list, the pre-allocations
    /// only shrink the single free block and do not slow down the search.
    ///
    /// # Panics
    /// This will panic, if the requested pre-allocations will fill up the whole
    /// heap (so the actual benchmark cannot allocate blocks anymore).
    fn benchmark_with_preallocation(b: &mut Bencher, pre_allocations: usize) {
        let allocator = tagalloc::Allocator::<{ 64 * 1024 }>::new();
        for _ in 0..pre_allocations {
            unsafe { allocator.alloc(Layout::new::<u8>()) };
        }

        let layout = Layout::new::<u8>();

        // make sure, that there is enough room for the next allocation
        let ptr = unsafe { allocator.alloc(layout) };
        assert_ne!(ptr, std::ptr::null_mut::<u8>());
        unsafe { allocator.dealloc(ptr, layout) };

        b.iter(|| {
            let ptr = unsafe { allocator.alloc(layout) };
            let ptr = test::black_box(ptr);
            unsafe { allocator.dealloc(ptr, layout) };
        });
    }

    #[bench]
    fn no_memory_usage(b: &mut Bencher) {
        benchmark_with_preallocation(b, 0);
    }

    #[bench]
    fn low_memory_usage(b: &mut Bencher) {
        benchmark_with_preallocation(b, 8);
    }

    #[bench]
    fn medium_memory_usage(b: &mut Bencher) {
        benchmark_with_preallocation(b, 500);
    }

    #[bench]
    fn high_memory_usage(b: &mut Bencher) {
        benchmark_with_preallocation(b, 1500);
    }
}

mod fragmented_free_list {
    use super::*;

    /// Run a benchmark against a heap, whose free list contains `holes` small
    /// free blocks, which are all too small for the benchmarked allocation.
    /// This shows the cost of the linear first-fit search.
    fn benchmark_with_holes(b: &mut Bencher, holes: usize) {
        let allocator = tagalloc::Allocator::<{ 256 * 1024 }>::new();
        let small = Layout::from_size_align(16, 16).unwrap();
        let pointers: Vec<_> = (0..2 * holes)
            .map(|_| unsafe { allocator.alloc(small) })
            .collect();
        // free every second block, so that the holes cannot be merged
        for ptr in pointers.iter().step_by(2) {
            unsafe { allocator.dealloc(*ptr, small) };
        }

        let layout = Layout::from_size_align(256, 16).unwrap();
        b.iter(|| {
            let ptr = unsafe { allocator.alloc(layout) };
            let ptr = test::black_box(ptr);
            unsafe { allocator.dealloc(ptr, layout) };
        });
    }

    #[bench]
    fn few_holes(b: &mut Bencher) {
        benchmark_with_holes(b, 10);
    }

    #[bench]
    fn many_holes(b: &mut Bencher) {
        benchmark_with_holes(b, 1000);
    }
}
