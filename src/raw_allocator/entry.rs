//! The boundary tag stored at both ends of every block.

/// Whether a block is handed out to a user or part of the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The block is linked into the free list.
    Free,
    /// The block is owned by a user (or is one of the two sentinels).
    Used,
}

/// A decoded boundary tag: the size of a block together with its state.
///
/// In memory an entry is a single `usize`. Since block sizes are always a
/// multiple of [`ALIGNMENT`](super::block::ALIGNMENT), the lowest bit of the
/// size is always zero and is used to store the state:
/// ```text
/// MSB                                      LSB
/// +----------------------------------------+-+
/// |            size (in bytes)             |u|
/// +----------------------------------------+-+
/// ```
/// `u` is set for used blocks. The packing is an encoding detail, the rest of
/// the crate only ever deals with the separate [`size()`](Self::size) and
/// [`state()`](Self::state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    size: usize,
    state: State,
}
impl Entry {
    const USED_BIT: usize = 1;

    /// Create a tag for a free block of the given (total) size.
    pub const fn free(size: usize) -> Self {
        Self {
            size,
            state: State::Free,
        }
    }

    /// Create a tag for a used block of the given (total) size.
    pub const fn used(size: usize) -> Self {
        Self {
            size,
            state: State::Used,
        }
    }

    /// The sentinel placed at both ends of the arena.
    ///
    /// A sentinel looks like a used, zero-sized block, so the coalescer never
    /// tries to merge across the ends of the arena.
    pub const fn sentinel() -> Self {
        Self::used(0)
    }

    /// The total size of the block (header, payload and footer).
    pub const fn size(self) -> usize {
        self.size
    }

    /// The state of the block.
    pub const fn state(self) -> State {
        self.state
    }

    /// Shorthand for `state() == State::Free`.
    pub const fn is_free(self) -> bool {
        matches!(self.state, State::Free)
    }

    /// The same size with a different state.
    pub const fn with_state(self, state: State) -> Self {
        Self { state, ..self }
    }

    /// Encode the tag into a single word.
    ///
    /// # Panics
    /// Panics if the size has the lowest bit set, i.e. if it could not be
    /// distinguished from the state bit.
    pub const fn as_raw(self) -> usize {
        assert!(self.size & Self::USED_BIT == 0, "odd block size");
        match self.state {
            State::Free => self.size,
            State::Used => self.size | Self::USED_BIT,
        }
    }

    /// Decode a tag previously written with [`as_raw()`](Self::as_raw).
    pub const fn from_raw(raw: usize) -> Self {
        let size = raw & !Self::USED_BIT;
        if raw & Self::USED_BIT == 0 {
            Self::free(size)
        } else {
            Self::used(size)
        }
    }
}
