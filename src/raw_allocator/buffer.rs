use super::arena::{Arena, GrowError};
use super::block::ALIGNMENT;

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

/// The buffer memory backing a heap of fixed maximum size.
///
/// The buffer behaves like a program break over a static region: it starts
/// out empty and [`grow()`](Arena::grow) hands out more and more of the `N`
/// bytes until they are exhausted.
///
/// The memory is never initialized by the buffer itself, so that a buffer in
/// a `static` ends up in `.bss` instead of `.data`.
#[repr(C, align(16))]
pub struct Buffer<const N: usize> {
    memory: UnsafeCell<[MaybeUninit<u8>; N]>,
    brk: usize,
}
impl<const N: usize> Buffer<N> {
    /// Create a new, empty buffer.
    ///
    /// # Panics
    /// This function panics if `N` is not a multiple of the heap alignment.
    pub const fn new() -> Self {
        assert!(N % ALIGNMENT == 0, "memory size has to be divisible by the alignment");
        Self {
            memory: UnsafeCell::new([MaybeUninit::uninit(); N]),
            brk: 0,
        }
    }
}
impl<const N: usize> Default for Buffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the memory is handed out through a pointer derived from the
// `UnsafeCell`, so writing through it from `&self` is fine. The buffer is
// `#[repr(align(16))]` and the memory is its first field, which satisfies the
// alignment requirement of `ALIGNMENT` (at most 16). Moving the buffer moves
// the base, which the heap tolerates since it only stores offsets. Keeping the
// buffer in place while payload pointers are live is up to the caller (e.g. by
// putting it into a `static`). Growing only ever moves `brk` forward.
unsafe impl<const N: usize> Arena for Buffer<N> {
    fn base(&self) -> *mut u8 {
        self.memory.get().cast()
    }

    fn extent(&self) -> usize {
        self.brk
    }

    fn capacity(&self) -> Option<usize> {
        Some(N)
    }

    fn grow(&mut self, bytes: usize) -> Result<usize, GrowError> {
        let available = N - self.brk;
        if bytes > available {
            return Err(GrowError::Exhausted {
                requested: bytes,
                available,
            });
        }
        let offset = self.brk;
        self.brk += bytes;
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::{Arena, Buffer, GrowError, ALIGNMENT};

    #[test]
    fn empty_buffer() {
        let buffer = Buffer::<64>::new();
        assert_eq!(buffer.extent(), 0);
        assert_eq!(buffer.capacity(), Some(64));
        assert_eq!(buffer.base() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn grow_hands_out_consecutive_regions() {
        let mut buffer = Buffer::<64>::new();
        assert_eq!(buffer.grow(16), Ok(0));
        assert_eq!(buffer.grow(32), Ok(16));
        assert_eq!(buffer.extent(), 48);
    }

    #[test]
    fn exhausted_buffer_does_not_change() {
        let mut buffer = Buffer::<64>::new();
        assert_eq!(buffer.grow(48), Ok(0));
        assert_eq!(
            buffer.grow(32),
            Err(GrowError::Exhausted {
                requested: 32,
                available: 16
            })
        );
        assert_eq!(buffer.extent(), 48);
        assert_eq!(buffer.grow(16), Ok(48));
    }

    #[test]
    #[should_panic(expected = "divisible by the alignment")]
    fn size_must_be_a_multiple_of_the_alignment() {
        let _buffer = Buffer::<33>::new();
    }
}
