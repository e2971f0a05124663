//! Support for alignments above [`ALIGNMENT`].
//!
//! Every payload of the heap is aligned to [`ALIGNMENT`], which covers all the
//! primitive types. Larger alignments (e.g. cache-line aligned structures) are
//! served by allocating `size + align` bytes and moving the pointer handed to
//! the user forward to the next multiple of `align`. The original payload
//! pointer is stored right in front of the user pointer, so that it can be
//! found again when deallocating:
//!
//! ```text
//! payload                              user pointer (aligned to `align`)
//! v                                    v
//! +------------------------+-----------+-----------------------------+
//! | padding                | back ptr  | `size` bytes for the user   |
//! +------------------------+-----------+-----------------------------+
//!                          ^ user - WORD
//! ```
//! Since the payload is aligned to [`ALIGNMENT`] and `align` is a larger power
//! of two, there are always at least [`ALIGNMENT`] bytes of padding, which is
//! enough room for the back pointer.
use crate::raw_allocator::block::ALIGNMENT;

use core::alloc::Layout;
use core::ptr::NonNull;

/// Whether a layout needs the back pointer treatment.
pub(crate) fn is_over_aligned(layout: Layout) -> bool {
    layout.align() > ALIGNMENT
}

/// The number of payload bytes needed for an over-aligned layout.
pub(crate) fn padded_size(layout: Layout) -> Option<usize> {
    layout.size().checked_add(layout.align())
}

/// Move `payload` forward to the next multiple of `align` and remember the
/// original pointer.
///
/// # Safety
/// `payload` must point to at least `padded_size()` writable bytes and must be
/// aligned to [`ALIGNMENT`]. `align` must be a power of two larger than
/// [`ALIGNMENT`].
pub(crate) unsafe fn with_back_pointer(payload: NonNull<u8>, align: usize) -> NonNull<u8> {
    let address = payload.as_ptr() as usize;
    let padding = align - address % align;
    debug_assert!(padding >= ALIGNMENT && padding <= align);

    // SAFETY: `padding <= align`, so the user pointer and the `size` bytes
    // after it are inside the payload. The back pointer is at least
    // `ALIGNMENT` bytes after the payload start and aligned to a word, since
    // the user pointer is aligned to `align`.
    unsafe {
        let user = payload.as_ptr().add(padding);
        user.cast::<*mut u8>().sub(1).write(payload.as_ptr());
        NonNull::new_unchecked(user)
    }
}

/// Recover the payload pointer stored by [`with_back_pointer()`].
///
/// # Safety
/// `user` must have been returned by [`with_back_pointer()`].
pub(crate) unsafe fn back_pointer(user: *mut u8) -> *mut u8 {
    // SAFETY: forwarded to the caller
    unsafe { user.cast::<*mut u8>().sub(1).read() }
}

#[cfg(test)]
mod tests {
    use super::{back_pointer, is_over_aligned, padded_size, with_back_pointer, ALIGNMENT};

    use core::alloc::Layout;
    use core::ptr::NonNull;

    #[repr(align(256))]
    struct Payload([u8; 512]);

    #[test]
    fn only_large_alignments_are_special() {
        assert!(!is_over_aligned(Layout::new::<u8>()));
        assert!(!is_over_aligned(Layout::from_size_align(8, ALIGNMENT).unwrap()));
        assert!(is_over_aligned(Layout::from_size_align(8, 2 * ALIGNMENT).unwrap()));
        assert_eq!(
            padded_size(Layout::from_size_align(10, 64).unwrap()),
            Some(74)
        );
    }

    #[test]
    fn back_pointer_round_trip() {
        let mut memory = Payload([0; 512]);
        for start in [0, ALIGNMENT, 3 * ALIGNMENT] {
            let payload = NonNull::new(memory.0[start..].as_mut_ptr()).unwrap();
            let user = unsafe { with_back_pointer(payload, 128) };
            assert_eq!(user.as_ptr() as usize % 128, 0);
            assert!(user.as_ptr() > payload.as_ptr());
            assert_eq!(unsafe { back_pointer(user.as_ptr()) }, payload.as_ptr());
        }
    }
}
