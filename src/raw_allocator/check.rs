//! Heap consistency checking.
//!
//! The checker walks all blocks in address order and the free list in link
//! order and verifies, that both agree with each other. It is slow (quadratic
//! in the number of free blocks) and meant for tests and debugging.
use super::block::{Block, Memory, ALIGNMENT, MIN_BLOCK_SIZE, WORD};
use super::entry::Entry;
use super::free_list::FreeList;

/// Counters describing the current state of a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Number of bytes currently owned by the arena.
    pub extent: usize,
    /// Number of blocks (free and used, without the sentinels).
    pub blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Total size of all free blocks, including their tags.
    pub free_bytes: usize,
    /// Size of the largest free block, including its tags.
    pub largest_free: usize,
    /// Number of used blocks.
    pub used_blocks: usize,
    /// Total size of all used blocks, including their tags.
    pub used_bytes: usize,
}
impl Stats {
    fn count(&mut self, entry: Entry) {
        self.blocks += 1;
        if entry.is_free() {
            self.free_blocks += 1;
            self.free_bytes += entry.size();
            self.largest_free = self.largest_free.max(entry.size());
        } else {
            self.used_blocks += 1;
            self.used_bytes += entry.size();
        }
    }
}

/// An inconsistency found by the heap checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Corruption {
    /// One of the two arena sentinels was overwritten.
    #[error("sentinel at offset {offset} is missing")]
    MissingSentinel {
        /// Where the sentinel should be.
        offset: usize,
    },
    /// A block has a size, which is too small, unaligned or leaves the arena.
    #[error("block at offset {offset} has a malformed size of {size} bytes")]
    MalformedSize {
        /// The header offset of the block.
        offset: usize,
        /// The size stored in the header.
        size: usize,
    },
    /// Header and footer of a block differ.
    #[error("header and footer of block at offset {offset} disagree")]
    TagMismatch {
        /// The header offset of the block.
        offset: usize,
    },
    /// Two free blocks are physically adjacent.
    #[error("free blocks at offsets {left} and {right} were not coalesced")]
    Uncoalesced {
        /// The header offset of the lower block.
        left: usize,
        /// The header offset of the higher block.
        right: usize,
    },
    /// A free block cannot be reached through the free list.
    #[error("free block at offset {offset} is missing from the free list")]
    Unlisted {
        /// The header offset of the block.
        offset: usize,
    },
    /// The free list contains something, which is not a free block.
    #[error("free list contains a non-free block at offset {offset}")]
    ListedUsed {
        /// The offset stored in the link.
        offset: usize,
    },
    /// The back link of a block in the free list does not point to the block
    /// before it.
    #[error("free list back link of block at offset {offset} is broken")]
    BrokenLink {
        /// The header offset of the block.
        offset: usize,
    },
    /// The free list is longer than the number of free blocks, i.e. it cycles
    /// or contains duplicates.
    #[error("free list does not terminate")]
    Cycle,
    /// The free list length disagrees with the number of free blocks.
    #[error("free list has {listed} entries, but there are {free} free blocks")]
    LengthMismatch {
        /// Number of blocks reachable through the list.
        listed: usize,
        /// Number of free blocks in the arena.
        free: usize,
    },
}

/// Walk all blocks in address order and compute the [`Stats`].
///
/// The walk stops early at the first block with an obviously bogus size.
pub fn stats(memory: Memory) -> Stats {
    let mut stats = Stats {
        extent: memory.extent(),
        ..Stats::default()
    };
    let mut block = Block::at(WORD);
    while block.offset() < memory.end() {
        let entry = memory.entry(block);
        if entry.size() == 0 || entry.size() > memory.end() - block.offset() {
            break;
        }
        stats.count(entry);
        block = memory.next_physical(block);
    }
    stats
}

/// Verify every structural invariant of the heap.
pub fn check(memory: Memory, free_list: &FreeList) -> Result<Stats, Corruption> {
    let mut stats = Stats {
        extent: memory.extent(),
        ..Stats::default()
    };
    if memory.entry(Block::at(0)) != Entry::sentinel() {
        return Err(Corruption::MissingSentinel { offset: 0 });
    }
    if memory.entry(Block::at(memory.end())) != Entry::sentinel() {
        return Err(Corruption::MissingSentinel {
            offset: memory.end(),
        });
    }

    let mut block = Block::at(WORD);
    let mut previous_was_free = None;
    while block.offset() < memory.end() {
        let entry = memory.entry(block);
        let size = entry.size();
        if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 || size > memory.end() - block.offset()
        {
            return Err(Corruption::MalformedSize {
                offset: block.offset(),
                size,
            });
        }
        if memory.footer(block) != entry {
            return Err(Corruption::TagMismatch {
                offset: block.offset(),
            });
        }
        if entry.is_free() {
            if let Some(left) = previous_was_free {
                return Err(Corruption::Uncoalesced {
                    left,
                    right: block.offset(),
                });
            }
            if !free_list.contains(memory, block) {
                return Err(Corruption::Unlisted {
                    offset: block.offset(),
                });
            }
            previous_was_free = Some(block.offset());
        } else {
            previous_was_free = None;
        }
        stats.count(entry);
        block = memory.next_physical(block);
    }

    let mut listed = 0;
    let mut previous = None;
    let mut cursor = free_list.head();
    while let Some(block) = cursor {
        listed += 1;
        if listed > stats.free_blocks {
            return Err(Corruption::Cycle);
        }
        if !memory.is_block_offset(block.offset()) || !memory.entry(block).is_free() {
            return Err(Corruption::ListedUsed {
                offset: block.offset(),
            });
        }
        if memory.prev_free(block) != previous {
            return Err(Corruption::BrokenLink {
                offset: block.offset(),
            });
        }
        previous = Some(block);
        cursor = memory.next_free(block);
    }
    if listed != stats.free_blocks || free_list.len() != listed {
        return Err(Corruption::LengthMismatch {
            listed,
            free: stats.free_blocks,
        });
    }

    Ok(stats)
}
