//! Explicit free-list allocator with boundary tags
//!
//! This crate provides a classic `malloc`/`free`/`realloc` style allocator,
//! which manages a single contiguous memory arena. It comes in three layers:
//! - [`RawAllocator`]: the single-threaded core working on any [`Arena`],
//! - [`Heap`]: the same behind a spin lock, usable from multiple threads,
//! - [`Allocator`]: a [`core::alloc::GlobalAlloc`] over a static buffer, which
//!   is what you want on `#![no_std]`-targets.
//!
//! # Usage
//! Copy and paste the following code snippet into your binary crate and
//! adjust the number of bytes of the heap (here 4K):
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: tagalloc::Allocator<4096> = tagalloc::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! Afterwards `alloc::vec::Vec`, `alloc::collections::BTreeMap` and friends
//! just work.
//!
//! If the memory should come from somewhere else, implement [`Arena`] for it
//! and use a [`Heap`] directly. With the `sbrk` feature an arena growing the
//! program break is provided on unix.
//!
//! The heap logs through the [`log`] facade, allocations and frees on the
//! `trace` level. When using [`Allocator`] as the global allocator, the
//! installed logger must not allocate itself.
//!
//! # Implementation
//! The arena is divided into blocks. Every block starts with a header and ends
//! with a footer, both containing the block size and whether the block is
//! used (the "boundary tags"). The arena itself is framed by two sentinel tags,
//! which look like used blocks of size zero. The payload of a free block holds
//! two links to other free blocks, forming the doubly linked free list.
//!
//! 1.  The heap starts with a single free block spanning the whole arena.
//!     ```text
//!     |S| F 240 ............................................. F 240 |S|
//!     ```
//!     (`S` is a sentinel, `F n` a free tag, `U n` a used tag with size `n`)
//! 2.  A block of 32 bytes is requested. The only free block is found by the
//!     first-fit search. It is large enough to be split: the free block
//!     shrinks and the upper end becomes the used block.
//!     ```text
//!     |S| F 192 ............................ F 192 | U 48 ... U 48 |S|
//!     ```
//!     A block needs 16 bytes for its tags in addition to the payload, so the
//!     32 byte request occupies 48 bytes.
//! 3.  Another 32 and 64 bytes are requested. The same happens again.
//!     ```text
//!     |S| F 64 ... F 64 | U 80 ... U 80 | U 48 ... U 48 | U 48 ... U 48 |S|
//!     ```
//! 4.  A request for 56 bytes comes in. The free block has 64 bytes, but a
//!     block for 56 bytes needs 80. There is no fit, so the arena is grown by
//!     a chunk. The new memory becomes a free block, which is merged with the
//!     free block before it, if there is one. Then the search is repeated. If
//!     the arena cannot grow, the allocation fails.
//! 5.  If the remainder of a split were too small to host the tags and links
//!     of a free block, the whole block is handed out instead.
//! 6.  The second allocation (32 bytes) is freed. Its tags are flipped to
//!     free and it is pushed to the front of the free list.
//!     ```text
//!     |S| F 64 ... F 64 | U 80 ... U 80 | F 48 ... F 48 | U 48 ... U 48 |S|
//!     ```
//! 7.  The third allocation (64 bytes) is freed. The block after it is free,
//!     so they are merged. Then the block before it is looked at through its
//!     footer, which sits right before the header. It is free as well, so it
//!     absorbs the merged block. Finally there is a single free block in front
//!     of the remaining allocation, and no two free blocks are ever adjacent.
//!     ```text
//!     |S| F 192 ............................ F 192 | U 48 ... U 48 |S|
//!     ```
//!
//! The free list is not sorted: freed blocks are pushed to the front, which
//! makes freeing O(1). Allocation scans the list front to back and takes the
//! first block, which is large enough.
#![no_std]

mod alignment;
mod heap;
pub mod raw_allocator;

pub use heap::Heap;
pub use raw_allocator::arena::{Arena, GrowError};
pub use raw_allocator::block::{ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD};
pub use raw_allocator::buffer::Buffer;
pub use raw_allocator::check::{Corruption, Stats};
#[cfg(all(feature = "sbrk", unix))]
pub use raw_allocator::sbrk::Sbrk;
pub use raw_allocator::{
    AllocError, FreeError, InitError, RawAllocator, ReallocError, DEFAULT_CHUNK_SIZE,
};

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use raw_allocator::block::SENTINEL_OVERHEAD;

/// The smallest heap an [`Allocator`] can manage.
pub const MIN_HEAP_SIZE: usize = SENTINEL_OVERHEAD + MIN_BLOCK_SIZE;

/// The memory allocator for `#![no_std]`-targets.
///
/// This is an allocator with a predefined heap size. Therefore the heap memory
/// usage is statically limited to an upper value. The buffer is placed inside
/// of the allocator itself and formatted on first use, so the allocator can be
/// created in a `const` context.
///
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: tagalloc::Allocator<4096> = tagalloc::Allocator::new();
/// ```
///
/// Layouts with an alignment above [`ALIGNMENT`] are supported by allocating
/// some extra bytes. An exhausted heap returns null pointers, which makes the
/// `alloc`-crate call [`handle_alloc_error`](https://doc.rust-lang.org/alloc/alloc/fn.handle_alloc_error.html).
pub struct Allocator<const N: usize> {
    heap: Heap<Buffer<N>>,
}
impl<const N: usize> Allocator<N> {
    /// Create a new [`Allocator`].
    ///
    /// This function is a `const fn`, therefore you can call it directly when
    /// creating the allocator.
    ///
    /// # Panics
    /// This function will panic, if the supplied buffer size, i.e. `N` is less
    /// than [`MIN_HEAP_SIZE`] or not divisible by [`ALIGNMENT`].
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        assert!(N >= MIN_HEAP_SIZE, "too small heap memory");
        assert!(
            N % ALIGNMENT == 0,
            "memory size has to be divisible by the alignment"
        );
        Self {
            heap: Heap::new(Buffer::new()),
        }
    }

    /// The heap managed by this allocator.
    ///
    /// The heap is only initialized by the first allocation.
    pub const fn heap(&self) -> &Heap<Buffer<N>> {
        &self.heap
    }

    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.heap.with_raw(|raw| {
            if !raw.is_initialized() {
                if let Err(error) = raw.init(N) {
                    log::error!("failed to initialize heap of {N} bytes: {error}");
                    return None;
                }
            }
            if !alignment::is_over_aligned(layout) {
                return raw.alloc(layout.size()).ok();
            }
            let payload = raw.alloc(alignment::padded_size(layout)?).ok()?;
            // SAFETY: the payload is aligned to `ALIGNMENT` and has room for
            // `size + align` bytes, the alignment is a larger power of two.
            Some(unsafe { alignment::with_back_pointer(payload, layout.align()) })
        })
    }
}
impl<const N: usize> Default for Allocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const N: usize> GlobalAlloc for Allocator<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout).map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let ptr = if alignment::is_over_aligned(layout) {
            // SAFETY: over-aligned pointers are created by `with_back_pointer()`
            unsafe { alignment::back_pointer(ptr) }
        } else {
            ptr
        };
        // SAFETY: the caller passes a pointer allocated by `alloc()`
        unsafe { self.heap.release(ptr) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if !alignment::is_over_aligned(layout) {
            // SAFETY: the caller passes a pointer allocated by `alloc()`
            return unsafe { self.heap.reallocate(ptr, new_size) }
                .map_or(ptr::null_mut(), NonNull::as_ptr);
        }

        // SAFETY: the caller guarantees a valid layout for the new size
        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        let Some(new) = self.allocate(new_layout) else {
            return ptr::null_mut();
        };
        // SAFETY: both allocations are live and distinct
        unsafe {
            ptr::copy_nonoverlapping(ptr, new.as_ptr(), layout.size().min(new_size));
            self.dealloc(ptr, layout);
        }
        new.as_ptr()
    }
}
