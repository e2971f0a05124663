//! The explicit free list.
//!
//! The list is doubly linked through the first two payload words of every
//! free block. New blocks are always pushed to the front (LIFO), the list is
//! neither sorted by address nor by size. The list does not own the blocks, it
//! only stores the offset of the first one: the links themselves live in the
//! arena.
use super::block::{Block, Memory};

/// The head of the free list and the number of blocks linked into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FreeList {
    head: Option<Block>,
    len: usize,
}
impl FreeList {
    /// Create an empty list.
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// The most recently inserted block.
    pub const fn head(&self) -> Option<Block> {
        self.head
    }

    /// The number of linked blocks.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no free blocks at all.
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Push a block to the front of the list.
    ///
    /// The block must be free and must not be linked already.
    pub fn insert(&mut self, memory: &mut Memory, block: Block) {
        memory.set_prev_free(block, None);
        memory.set_next_free(block, self.head);
        if let Some(head) = self.head {
            memory.set_prev_free(head, Some(block));
        }
        self.head = Some(block);
        self.len += 1;
    }

    /// Unlink a block from the list.
    ///
    /// The links of the removed block are cleared afterwards.
    pub fn remove(&mut self, memory: &mut Memory, block: Block) {
        let prev = memory.prev_free(block);
        let next = memory.next_free(block);
        match (prev, next) {
            (None, None) => self.head = None,
            (None, Some(next)) => {
                memory.set_prev_free(next, None);
                self.head = Some(next);
            }
            (Some(prev), Some(next)) => {
                memory.set_next_free(prev, Some(next));
                memory.set_prev_free(next, Some(prev));
            }
            (Some(prev), None) => memory.set_next_free(prev, None),
        }
        memory.set_prev_free(block, None);
        memory.set_next_free(block, None);
        self.len -= 1;
    }

    /// Iterate the list from the head to the tail.
    pub fn iter(&self, memory: Memory) -> Iter {
        Iter {
            memory,
            next: self.head,
        }
    }

    /// Find the first block in list order, which has at least `size` bytes.
    pub fn first_fit(&self, memory: Memory, size: usize) -> Option<Block> {
        self.iter(memory)
            .take(self.len)
            .find(|&block| memory.entry(block).size() >= size)
    }

    /// Whether `block` is linked into the list.
    pub fn contains(&self, memory: Memory, block: Block) -> bool {
        self.iter(memory).take(self.len).any(|linked| linked == block)
    }
}

/// Iterator over the blocks of a [`FreeList`].
pub struct Iter {
    memory: Memory,
    next: Option<Block>,
}
impl Iterator for Iter {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next?;
        self.next = self.memory.next_free(block);
        Some(block)
    }
}
