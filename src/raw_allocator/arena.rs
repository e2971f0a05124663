//! The memory source backing a heap.

/// The reason why an [`Arena`] refused to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GrowError {
    /// The arena has a fixed capacity and the request does not fit into the
    /// remaining space.
    #[error("arena exhausted: requested {requested} bytes, {available} available")]
    Exhausted {
        /// Number of bytes asked for.
        requested: usize,
        /// Number of bytes still available.
        available: usize,
    },
    /// The request cannot be represented by the underlying primitive.
    #[error("arena growth request overflows")]
    Overflow,
    /// The new memory does not directly follow the previous end of the arena.
    #[error("new arena memory is not contiguous with the previous extent")]
    NotContiguous,
    /// The underlying primitive refused the request.
    #[error("arena growth refused by the system")]
    Refused,
}

/// A contiguous region of memory, which can be extended at its end.
///
/// This is the only thing a heap needs from its environment: a place to put
/// blocks and a way to get more of it, much like `sbrk(2)`.
///
/// # Safety
/// The heap stores all of its metadata as offsets relative to
/// [`base()`](Self::base), so an arena may be moved around (e.g. a
/// [`Buffer`](super::buffer::Buffer) by value) as long as no payload pointer
/// is outstanding. Implementors must guarantee, that
/// - [`base()`](Self::base) is aligned to [`ALIGNMENT`](crate::ALIGNMENT),
/// - the base stays the same while pointers into the arena are handed out,
/// - the bytes `base()..base() + extent()` are valid for reads and writes and
///   not used by anything else than the owner of the arena,
/// - [`grow()`](Self::grow) either extends the region by exactly the requested
///   number of bytes directly after the previous end, or fails without any
///   observable change.
pub unsafe trait Arena {
    /// The start address of the arena.
    fn base(&self) -> *mut u8;

    /// The number of bytes currently owned by the arena.
    fn extent(&self) -> usize;

    /// The maximum extent the arena can ever reach, if known.
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Extend the arena by `bytes`.
    ///
    /// On success the offset of the first new byte (i.e. the previous extent)
    /// is returned.
    fn grow(&mut self, bytes: usize) -> Result<usize, GrowError>;
}
