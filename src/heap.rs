//! A thread-safe heap over an arbitrary [`Arena`].
use crate::raw_allocator::arena::Arena;
use crate::raw_allocator::check::{Corruption, Stats};
use crate::raw_allocator::{
    AllocError, FreeError, InitError, RawAllocator, ReallocError, DEFAULT_CHUNK_SIZE,
};

use core::ptr::NonNull;

/// A heap, which can be shared between threads.
///
/// All operations lock a single spin lock for their whole duration, so the
/// heap is one shared resource without any reader/writer distinction. This
/// includes the growth of the arena, which happens while holding the lock.
///
/// ```
/// use tagalloc::{Buffer, Heap};
///
/// let heap = Heap::new(Buffer::<4096>::new());
/// heap.init(4096).unwrap();
///
/// let p = heap.allocate(100).unwrap();
/// let q = heap.allocate(100).unwrap();
/// assert_ne!(p, q);
/// unsafe {
///     heap.release(p.as_ptr());
///     heap.release(q.as_ptr());
/// }
/// assert_eq!(heap.check().unwrap().blocks, 1);
/// ```
pub struct Heap<A> {
    raw: spin::Mutex<RawAllocator<A>>,
}
impl<A: Arena> Heap<A> {
    /// Create a new heap over the given arena.
    ///
    /// The heap has to be [initialized](Self::init) before use.
    pub const fn new(arena: A) -> Self {
        Self::with_chunk_size(arena, DEFAULT_CHUNK_SIZE)
    }

    /// Create a new heap, which grows its arena by at least `chunk_size` bytes
    /// at once.
    ///
    /// # Panics
    /// See [`RawAllocator::with_chunk_size()`].
    pub const fn with_chunk_size(arena: A, chunk_size: usize) -> Self {
        Self {
            raw: spin::Mutex::new(RawAllocator::with_chunk_size(arena, chunk_size)),
        }
    }

    /// Run `f` with exclusive access to the underlying [`RawAllocator`].
    pub fn with_raw<R>(&self, f: impl FnOnce(&mut RawAllocator<A>) -> R) -> R {
        let mut raw = self.raw.lock();
        f(&mut raw)
    }

    /// Format the first `initial` bytes of the arena. See
    /// [`RawAllocator::init()`].
    pub fn init(&self, initial: usize) -> Result<(), InitError> {
        self.raw.lock().init(initial)
    }

    /// Whether [`init()`](Self::init) was called successfully.
    pub fn is_initialized(&self) -> bool {
        self.raw.lock().is_initialized()
    }

    /// Allocate at least `n` bytes.
    ///
    /// Returns `None` if the request cannot be served; use
    /// [`try_allocate()`](Self::try_allocate) to learn why.
    pub fn allocate(&self, n: usize) -> Option<NonNull<u8>> {
        self.try_allocate(n).ok()
    }

    /// Allocate at least `n` bytes. See [`RawAllocator::alloc()`].
    pub fn try_allocate(&self, n: usize) -> Result<NonNull<u8>, AllocError> {
        self.raw.lock().alloc(n)
    }

    /// Release an allocation. Null pointers are ignored.
    ///
    /// Pointers detected to be invalid are logged and otherwise ignored.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer returned by this heap, which was not
    /// released since.
    pub unsafe fn release(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        // SAFETY: forwarded to the caller
        if let Err(error) = unsafe { self.try_release(ptr) } {
            log::warn!("ignoring release of {ptr:p}: {error}");
        }
    }

    /// Release an allocation. See [`RawAllocator::free()`].
    ///
    /// # Safety
    /// See [`RawAllocator::free()`].
    pub unsafe fn try_release(&self, ptr: NonNull<u8>) -> Result<(), FreeError> {
        // SAFETY: forwarded to the caller
        unsafe { self.raw.lock().free(ptr) }
    }

    /// Move an allocation into a block of `n` bytes.
    ///
    /// A null `ptr` allocates, `n == 0` releases. Returns `None` on failure
    /// (the old allocation stays valid then) and after releasing.
    ///
    /// # Safety
    /// Same as [`release()`](Self::release).
    pub unsafe fn reallocate(&self, ptr: *mut u8, n: usize) -> Option<NonNull<u8>> {
        // SAFETY: forwarded to the caller
        match unsafe { self.try_reallocate(NonNull::new(ptr), n) } {
            Ok(ptr) => ptr,
            Err(error) => {
                log::warn!("reallocation of {ptr:p} to {n} bytes failed: {error}");
                None
            }
        }
    }

    /// Move an allocation into a block of `n` bytes. See
    /// [`RawAllocator::realloc()`].
    ///
    /// # Safety
    /// See [`RawAllocator::realloc()`].
    pub unsafe fn try_reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        n: usize,
    ) -> Result<Option<NonNull<u8>>, ReallocError> {
        // SAFETY: forwarded to the caller
        unsafe { self.raw.lock().realloc(ptr, n) }
    }

    /// The number of bytes usable through a live allocation.
    pub fn usable_size(&self, ptr: NonNull<u8>) -> Result<usize, FreeError> {
        self.raw.lock().usable_size(ptr)
    }

    /// The current [`Stats`] of the heap.
    pub fn stats(&self) -> Stats {
        self.raw.lock().stats()
    }

    /// Verify all heap invariants. See [`RawAllocator::check()`].
    pub fn check(&self) -> Result<Stats, Corruption> {
        self.raw.lock().check()
    }
}

#[cfg(test)]
mod tests {
    use super::Heap;
    use crate::raw_allocator::buffer::Buffer;
    use crate::raw_allocator::{AllocError, FreeError};

    #[test]
    fn null_release_is_ignored() {
        let heap = Heap::new(Buffer::<256>::new());
        heap.init(256).unwrap();
        unsafe { heap.release(core::ptr::null_mut()) };
        assert_eq!(heap.check().unwrap().free_blocks, 1);
    }

    #[test]
    fn invalid_release_is_reported_or_ignored() {
        let heap = Heap::new(Buffer::<256>::new());
        heap.init(256).unwrap();
        let ptr = heap.allocate(8).unwrap();
        unsafe {
            heap.release(ptr.as_ptr());
            heap.release(ptr.as_ptr());
            assert_eq!(heap.try_release(ptr), Err(FreeError::DoubleFreeDetected));
        }
        heap.check().unwrap();
    }

    #[test]
    fn allocation_before_init_fails() {
        let heap = Heap::new(Buffer::<256>::new());
        assert!(!heap.is_initialized());
        assert_eq!(heap.try_allocate(8), Err(AllocError::Uninitialized));
        assert!(heap.allocate(8).is_none());
    }

    #[test]
    fn reallocate_failure_keeps_the_block() {
        let heap = Heap::new(Buffer::<256>::new());
        heap.init(256).unwrap();
        let ptr = heap.allocate(8).unwrap();
        unsafe {
            assert!(heap.reallocate(ptr.as_ptr(), 1024).is_none());
            assert!(heap.usable_size(ptr).is_ok());
            heap.release(ptr.as_ptr());
        }
        assert_eq!(heap.stats().blocks, 1);
    }
}
