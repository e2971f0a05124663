//! An arena on top of the program break.
use super::arena::{Arena, GrowError};
use super::block::ALIGNMENT;

use core::ptr;
use libc::{c_void, intptr_t, sbrk};

/// An [`Arena`] growing the data segment of the process with `sbrk(2)`.
///
/// The first growth aligns the program break to [`ALIGNMENT`] (in the same
/// `sbrk` call as the requested memory) and remembers the resulting address as
/// the base. Every later growth must continue
/// exactly at the end of the arena: if something else (e.g. the system
/// `malloc`) moved the break in between, the growth is refused with
/// [`GrowError::NotContiguous`].
pub struct Sbrk {
    base: *mut u8,
    extent: usize,
}
impl Sbrk {
    /// Create an arena, which did not yet touch the program break.
    pub const fn new() -> Self {
        Self {
            base: ptr::null_mut(),
            extent: 0,
        }
    }

    fn current_break() -> Result<usize, GrowError> {
        // SAFETY: an increment of zero only queries the break
        let brk = unsafe { sbrk(0) };
        if brk == usize::MAX as *mut c_void {
            return Err(GrowError::Refused);
        }
        Ok(brk as usize)
    }

    /// Move the break by `bytes` and return the previous break.
    fn move_break(bytes: usize) -> Result<usize, GrowError> {
        let increment = intptr_t::try_from(bytes).map_err(|_| GrowError::Overflow)?;
        // SAFETY: the new memory is only handed out through the arena
        let previous = unsafe { sbrk(increment) };
        if previous == usize::MAX as *mut c_void {
            return Err(GrowError::Refused);
        }
        Ok(previous as usize)
    }
}
impl Default for Sbrk {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the pointer refers to process-global memory owned by this arena.
unsafe impl Send for Sbrk {}

// SAFETY: the base is aligned on the first growth and never changes after.
// The memory between the base and the end of the arena is obtained from the
// kernel and only used through the arena. Each growth verifies, that the
// previous break equals the end of the arena before reporting success.
unsafe impl Arena for Sbrk {
    fn base(&self) -> *mut u8 {
        self.base
    }

    fn extent(&self) -> usize {
        self.extent
    }

    fn grow(&mut self, bytes: usize) -> Result<usize, GrowError> {
        let current = Self::current_break()?;
        // the alignment padding is requested together with the memory, so a
        // refused growth leaves the break untouched
        let padding = if self.base.is_null() {
            current.wrapping_neg() % ALIGNMENT
        } else if current == self.base as usize + self.extent {
            0
        } else {
            return Err(GrowError::NotContiguous);
        };
        let increment = bytes.checked_add(padding).ok_or(GrowError::Overflow)?;

        let previous = Self::move_break(increment)?;
        if previous != current {
            log::warn!("program break moved by someone else: {previous:#x} != {current:#x}");
            return Err(GrowError::NotContiguous);
        }
        if self.base.is_null() {
            self.base = (current + padding) as *mut u8;
        }

        let offset = self.extent;
        self.extent += bytes;
        Ok(offset)
    }
}
