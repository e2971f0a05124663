//! Address arithmetic on blocks inside the arena.
//!
//! Every block is identified by the arena offset of its header. Nothing in
//! here keeps state: a [`Memory`] is just a view onto the arena, which reads
//! and writes boundary tags and free list links at fixed offsets.
//!
//! ```text
//!        header   payload                          footer
//! used: | size|1 | ................................ | size|1 |
//! free: | size   | prev free | next free | ........ | size   |
//!       ^ block  ^ block + WORD                     ^ block + size - WORD
//! ```
use super::entry::{Entry, State};

use core::mem;

/// The size of a boundary tag and of a free list link.
pub const WORD: usize = mem::size_of::<usize>();

/// The alignment of every payload handed out by the heap.
pub const ALIGNMENT: usize = 2 * WORD;

/// Bytes of every block, which are not usable by the owner (header and footer).
pub const OVERHEAD: usize = 2 * WORD;

/// The smallest block, which can still host the two free list links.
pub const MIN_BLOCK_SIZE: usize = OVERHEAD + 2 * WORD;

/// Bytes occupied by the sentinels at both ends of the arena.
pub const SENTINEL_OVERHEAD: usize = 2 * WORD;

/// Round `n` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` on overflow.
pub const fn align_up(n: usize) -> Option<usize> {
    match n.checked_add(ALIGNMENT - 1) {
        Some(n) => Some(n & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// The block size needed to serve a request of `n` payload bytes.
///
/// Returns `None` if the size is not representable.
pub const fn block_size_for(n: usize) -> Option<usize> {
    let size = match n.checked_add(OVERHEAD) {
        Some(size) => size,
        None => return None,
    };
    match align_up(size) {
        Some(size) if size < MIN_BLOCK_SIZE => Some(MIN_BLOCK_SIZE),
        size => size,
    }
}

/// The offset of a block header inside of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);
impl Block {
    /// The block with its header at `offset`.
    pub const fn at(offset: usize) -> Self {
        Self(offset)
    }

    /// The block owning the payload at `offset`.
    pub const fn from_payload(offset: usize) -> Self {
        Self(offset - WORD)
    }

    /// The arena offset of the header.
    pub const fn offset(self) -> usize {
        self.0
    }

    /// The arena offset of the first payload byte.
    pub const fn payload(self) -> usize {
        self.0 + WORD
    }

    const fn prev_link(self) -> usize {
        self.0 + WORD
    }

    const fn next_link(self) -> usize {
        self.0 + 2 * WORD
    }
}

/// A word-granular view of the arena memory.
///
/// The view is `Copy` and only carries the base address and the extent. It
/// has to be recreated after the arena grows.
#[derive(Debug, Clone, Copy)]
pub struct Memory {
    base: *mut u8,
    extent: usize,
}
impl Memory {
    /// Create a view of `extent` bytes starting at `base`.
    ///
    /// # Safety
    /// `base` must be aligned to [`ALIGNMENT`] and the `extent` bytes after it
    /// must be valid for reads and writes for as long as the view is used.
    /// Every tag and link read through the view must have been written before.
    pub const unsafe fn new(base: *mut u8, extent: usize) -> Self {
        Self { base, extent }
    }

    /// The base address of the arena.
    pub const fn base(&self) -> *mut u8 {
        self.base
    }

    /// The number of bytes covered by the view.
    pub const fn extent(&self) -> usize {
        self.extent
    }

    /// The offset of the sentinel closing the arena at the high end.
    pub const fn end(&self) -> usize {
        self.extent - WORD
    }

    fn word(&self, offset: usize) -> usize {
        assert!(offset % WORD == 0);
        assert!(offset + WORD <= self.extent);

        // SAFETY: the offset is word-aligned and the base is aligned, so the
        // read is aligned. It is in bounds as asserted above. The contents were
        // written by the heap (safety contract of `new()`).
        unsafe { self.base.add(offset).cast::<usize>().read() }
    }

    fn set_word(&mut self, offset: usize, value: usize) {
        assert!(offset % WORD == 0);
        assert!(offset + WORD <= self.extent);

        // SAFETY: same as `word()`
        unsafe { self.base.add(offset).cast::<usize>().write(value) }
    }

    /// Read the header of a block.
    pub fn entry(&self, block: Block) -> Entry {
        Entry::from_raw(self.word(block.offset()))
    }

    /// The offset of the footer of a block.
    pub fn footer_of(&self, block: Block) -> usize {
        block.offset() + self.entry(block).size() - WORD
    }

    /// Read the footer of a block.
    pub fn footer(&self, block: Block) -> Entry {
        Entry::from_raw(self.word(self.footer_of(block)))
    }

    /// Write header and footer of a block.
    pub fn write(&mut self, block: Block, entry: Entry) {
        let raw = entry.as_raw();
        self.set_word(block.offset(), raw);
        self.set_word(block.offset() + entry.size() - WORD, raw);
    }

    /// Write a sentinel tag at `offset`.
    pub fn write_sentinel(&mut self, offset: usize) {
        self.set_word(offset, Entry::sentinel().as_raw());
    }

    /// Mark a block as free without changing its size.
    pub fn mark_free(&mut self, block: Block) {
        let entry = self.entry(block);
        self.write(block, entry.with_state(State::Free));
    }

    /// Mark a block as used without changing its size.
    pub fn mark_used(&mut self, block: Block) {
        let entry = self.entry(block);
        self.write(block, entry.with_state(State::Used));
    }

    /// The block physically following `block`.
    ///
    /// For the last block this is the sentinel at [`end()`](Self::end).
    pub fn next_physical(&self, block: Block) -> Block {
        Block(block.offset() + self.entry(block).size())
    }

    /// The footer of the block physically preceding `block`.
    ///
    /// For the first block this is the sentinel at offset `0`.
    pub fn prev_entry(&self, block: Block) -> Entry {
        Entry::from_raw(self.word(block.offset() - WORD))
    }

    /// The block physically preceding `block`.
    ///
    /// Only meaningful if [`prev_entry()`](Self::prev_entry) is not the
    /// sentinel, which has a size of zero.
    pub fn prev_physical(&self, block: Block) -> Block {
        Block(block.offset() - self.prev_entry(block).size())
    }

    /// The predecessor of a free block in the free list.
    pub fn prev_free(&self, block: Block) -> Option<Block> {
        decode_link(self.word(block.prev_link()))
    }

    /// The successor of a free block in the free list.
    pub fn next_free(&self, block: Block) -> Option<Block> {
        decode_link(self.word(block.next_link()))
    }

    /// Set the predecessor of a free block in the free list.
    pub fn set_prev_free(&mut self, block: Block, link: Option<Block>) {
        self.set_word(block.prev_link(), encode_link(link));
    }

    /// Set the successor of a free block in the free list.
    pub fn set_next_free(&mut self, block: Block, link: Option<Block>) {
        self.set_word(block.next_link(), encode_link(link));
    }

    /// Whether `offset` could be the header of a block.
    ///
    /// This only checks the position, not the contents.
    pub const fn is_block_offset(&self, offset: usize) -> bool {
        offset % ALIGNMENT == WORD && offset >= WORD && offset < self.end()
    }
}

// offset 0 is the low sentinel, which is never linked
fn encode_link(link: Option<Block>) -> usize {
    link.map_or(0, Block::offset)
}

fn decode_link(raw: usize) -> Option<Block> {
    (raw != 0).then_some(Block(raw))
}
