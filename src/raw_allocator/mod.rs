//! This module provides the raw allocator and its support types.
//!
//! A "raw allocator" is one, that simply gets requests for a specific memory
//! size and hands out blocks aligned to [`ALIGNMENT`]. It is not thread-safe
//! on its own: every operation requires `&mut self`, see [`Heap`](crate::Heap)
//! for the locked version.
pub mod arena;
pub mod block;
pub mod buffer;
pub mod check;
pub mod entry;
pub mod free_list;
#[cfg(all(feature = "sbrk", unix))]
pub mod sbrk;

use arena::{Arena, GrowError};
use block::{Block, Memory, ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, SENTINEL_OVERHEAD, WORD};
use check::{Corruption, Stats};
use entry::Entry;
use free_list::FreeList;

use core::num::NonZeroUsize;
use core::ptr::{self, NonNull};

/// The default minimum number of bytes requested from the arena at once.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// An error occurred when calling `alloc()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// An allocation of zero bytes was requested. The heap never hands out
    /// empty allocations.
    #[error("zero-sized allocation")]
    ZeroSized,
    /// There is no free block large enough and the arena could not grow.
    #[error("out of memory: no block for {requested} bytes")]
    OutOfMemory {
        /// The requested payload size.
        requested: usize,
    },
    /// The request cannot be served even by an empty heap of maximum size.
    #[error("allocation of {requested} bytes exceeds the arena capacity")]
    TooLarge {
        /// The requested payload size.
        requested: usize,
    },
    /// The heap was not initialized yet.
    #[error("heap is not initialized")]
    Uninitialized,
}

/// An error occurred when calling `free()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
    /// There is a double-free detected. An already freed-up-block is freed up
    /// again.
    #[error("double free detected")]
    DoubleFreeDetected,
    /// An invalid pointer was freed up (either a pointer outside of the heap
    /// memory or a pointer, which was never handed out).
    #[error("pointer was not allocated by this heap")]
    AllocationNotFound,
}

/// An error occurred when calling `init()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// `init()` was called twice.
    #[error("heap is already initialized")]
    AlreadyInitialized,
    /// The initial size cannot even host the sentinels and a single block.
    #[error("initial heap of {requested} bytes is too small, at least {minimum} bytes are needed")]
    ArenaTooSmall {
        /// The requested initial size.
        requested: usize,
        /// The minimal initial size.
        minimum: usize,
    },
    /// The arena already contained memory not formatted by this heap or its
    /// base address is not aligned.
    #[error("arena is not empty or not aligned")]
    ArenaInUse,
    /// The arena refused to provide the initial memory.
    #[error("arena could not provide the initial memory: {0}")]
    Grow(#[from] GrowError),
}

/// An error occurred when calling `realloc()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReallocError {
    /// The new block could not be allocated. The old one is untouched.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// The old pointer is not a live allocation.
    #[error(transparent)]
    Free(#[from] FreeError),
}

/// A memory allocator with an explicit free list over an [`Arena`].
///
/// Blocks carry boundary tags (a header and a footer with the block size and
/// state), so that both physical neighbors of a block can be found in
/// constant time. Free blocks are additionally linked into a doubly linked
/// [`FreeList`], which is searched first-fit.
///
/// The memory layout of the arena looks like this:
/// ```text
/// 0        WORD                                         extent - WORD
/// +--------+--------+---------+--------+-----+----------+--------+
/// | 0|used | header | payload | footer | ... | (blocks) | 0|used |
/// +--------+--------+---------+--------+-----+----------+--------+
/// sentinel ^ first block                               sentinel
/// ```
pub struct RawAllocator<A> {
    arena: A,
    free_list: FreeList,
    /// `None` stands for [`DEFAULT_CHUNK_SIZE`], which keeps a freshly created
    /// allocator all-zero (and a `static` one in `.bss`).
    chunk_size: Option<NonZeroUsize>,
    initialized: bool,
}
impl<A: Arena> RawAllocator<A> {
    /// Create a new [`RawAllocator`] over the given arena.
    ///
    /// The allocator has to be [initialized](Self::init) before use.
    pub const fn new(arena: A) -> Self {
        Self {
            arena,
            free_list: FreeList::new(),
            chunk_size: None,
            initialized: false,
        }
    }

    /// Create a new [`RawAllocator`] with a custom minimum growth increment.
    ///
    /// # Panics
    /// This function panics if the chunk size is not a multiple of
    /// [`ALIGNMENT`] or smaller than a single block.
    pub const fn with_chunk_size(arena: A, chunk_size: usize) -> Self {
        assert!(
            chunk_size % ALIGNMENT == 0,
            "chunk size has to be divisible by the alignment"
        );
        assert!(chunk_size >= MIN_BLOCK_SIZE, "chunk size too small");

        Self {
            arena,
            free_list: FreeList::new(),
            chunk_size: NonZeroUsize::new(chunk_size),
            initialized: false,
        }
    }

    /// Indicates whether the allocator has been initialized.
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The arena backing this allocator.
    pub const fn arena(&self) -> &A {
        &self.arena
    }

    /// The minimum growth increment.
    pub const fn chunk_size(&self) -> usize {
        match self.chunk_size {
            Some(chunk_size) => chunk_size.get(),
            None => DEFAULT_CHUNK_SIZE,
        }
    }

    fn memory(&self) -> Memory {
        // SAFETY: the arena guarantees a valid, aligned and exclusive region of
        // `extent()` bytes (safety contract of `Arena`).
        unsafe { Memory::new(self.arena.base(), self.arena.extent()) }
    }

    /// Format the first `initial` bytes of the arena as one large free block.
    ///
    /// The size is rounded up to the [`ALIGNMENT`]. This must be called
    /// exactly once before any allocation.
    pub fn init(&mut self, initial: usize) -> Result<(), InitError> {
        if self.initialized {
            return Err(InitError::AlreadyInitialized);
        }
        let minimum = SENTINEL_OVERHEAD + MIN_BLOCK_SIZE;
        let size = block::align_up(initial).ok_or(GrowError::Overflow)?;
        if size < minimum {
            return Err(InitError::ArenaTooSmall {
                requested: initial,
                minimum,
            });
        }
        if self.arena.extent() != 0 || self.arena.base() as usize % ALIGNMENT != 0 {
            return Err(InitError::ArenaInUse);
        }
        if self.arena.grow(size)? != 0 {
            return Err(InitError::ArenaInUse);
        }

        let mut memory = self.memory();
        memory.write_sentinel(0);
        memory.write_sentinel(memory.end());
        let block = Block::at(WORD);
        memory.write(block, Entry::free(size - SENTINEL_OVERHEAD));
        self.free_list.insert(&mut memory, block);
        self.initialized = true;

        log::debug!("heap initialized with {size} bytes at {:p}", memory.base());
        Ok(())
    }

    /// Allocate a new memory block with at least `n` bytes of payload.
    ///
    /// The free list is searched first-fit. If no block is large enough, the
    /// arena is grown by at least the chunk size and the search is repeated.
    /// The returned pointer is aligned to [`ALIGNMENT`].
    pub fn alloc(&mut self, n: usize) -> Result<NonNull<u8>, AllocError> {
        if !self.initialized {
            return Err(AllocError::Uninitialized);
        }
        if n == 0 {
            return Err(AllocError::ZeroSized);
        }
        let too_large = AllocError::TooLarge { requested: n };
        let size = block::block_size_for(n).ok_or(too_large)?;
        if let Some(capacity) = self.arena.capacity() {
            if size > capacity.saturating_sub(SENTINEL_OVERHEAD) {
                return Err(too_large);
            }
        }

        let block = match self.free_list.first_fit(self.memory(), size) {
            Some(block) => block,
            None => {
                self.grow(size)
                    .map_err(|_| AllocError::OutOfMemory { requested: n })?;
                self.free_list
                    .first_fit(self.memory(), size)
                    .ok_or(AllocError::OutOfMemory { requested: n })?
            }
        };
        let block = self.place(block, size);

        log::trace!("alloc({n}) -> block at {} ({size} bytes)", block.offset());
        Ok(self.payload_of(block))
    }

    /// Free a pointer previously returned by [`alloc()`](Self::alloc).
    ///
    /// The block is marked as free, pushed to the front of the free list and
    /// merged with its physical neighbors if they are free as well. Obviously
    /// bogus pointers are detected and reported instead of corrupting the heap:
    /// pointers outside of the arena, misaligned ones and pointers whose block
    /// is not marked as used.
    ///
    /// # Safety
    /// The detection above is best-effort: `ptr` must be a pointer returned by
    /// this allocator, which was not freed since.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) -> Result<(), FreeError> {
        let block = self.block_of(ptr)?;
        let mut memory = self.memory();
        memory.mark_free(block);
        self.free_list.insert(&mut memory, block);
        let merged = self.coalesce(block);

        log::trace!("free(block at {}) -> merged into {}", block.offset(), merged.offset());
        Ok(())
    }

    /// Resize an allocation by moving it into a fresh block.
    ///
    /// - `ptr == None` behaves like [`alloc()`](Self::alloc),
    /// - `n == 0` behaves like [`free()`](Self::free) and returns `None`,
    /// - otherwise a new block is allocated, the common prefix is copied and
    ///   the old block is freed. If the allocation fails, the old block is
    ///   left untouched.
    ///
    /// # Safety
    /// Same as [`free()`](Self::free).
    pub unsafe fn realloc(
        &mut self,
        ptr: Option<NonNull<u8>>,
        n: usize,
    ) -> Result<Option<NonNull<u8>>, ReallocError> {
        let Some(old) = ptr else {
            return match n {
                0 => Ok(None),
                n => Ok(Some(self.alloc(n)?)),
            };
        };
        if n == 0 {
            // SAFETY: forwarded to the caller
            unsafe { self.free(old)? };
            return Ok(None);
        }

        let old_size = self.usable_size(old)?;
        let new = self.alloc(n)?;
        // SAFETY: both pointers are payloads of distinct live blocks, which are
        // at least `min(old_size, n)` bytes large.
        unsafe {
            ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_size.min(n));
            self.free(old)?;
        }
        Ok(Some(new))
    }

    /// The number of payload bytes usable through `ptr`.
    ///
    /// This is at least the size requested when allocating, but might be more
    /// due to rounding or a block being handed out as a whole.
    pub fn usable_size(&self, ptr: NonNull<u8>) -> Result<usize, FreeError> {
        let block = self.block_of(ptr)?;
        Ok(self.memory().entry(block).size() - OVERHEAD)
    }

    /// Compute the [`Stats`] of the heap.
    pub fn stats(&self) -> Stats {
        if self.initialized {
            check::stats(self.memory())
        } else {
            Stats::default()
        }
    }

    /// Verify the heap invariants and compute the [`Stats`] on the way.
    pub fn check(&self) -> Result<Stats, Corruption> {
        if self.initialized {
            check::check(self.memory(), &self.free_list)
        } else {
            Ok(Stats::default())
        }
    }

    /// Split `block` (which must be in the free list) to serve `size` bytes.
    ///
    /// If the remainder would be too small to form a block on its own, the
    /// whole block is handed out. Otherwise the lower part stays free and the
    /// upper `size` bytes become the new used block.
    fn place(&mut self, block: Block, size: usize) -> Block {
        let mut memory = self.memory();
        let available = memory.entry(block).size();
        self.free_list.remove(&mut memory, block);

        if available - size < MIN_BLOCK_SIZE {
            memory.mark_used(block);
            return block;
        }

        memory.write(block, Entry::free(available - size));
        self.free_list.insert(&mut memory, block);
        let used = Block::at(block.offset() + available - size);
        memory.write(used, Entry::used(size));
        used
    }

    /// Merge a freshly freed block with its free physical neighbors.
    ///
    /// The right neighbor is merged first, then the left one. The resulting
    /// block is at the front of the free list.
    fn coalesce(&mut self, block: Block) -> Block {
        let mut memory = self.memory();
        let mut block = block;
        let mut size = memory.entry(block).size();

        let next = memory.next_physical(block);
        let next_entry = memory.entry(next);
        if next_entry.is_free() {
            self.free_list.remove(&mut memory, next);
            size += next_entry.size();
            memory.write(block, Entry::free(size));
        }

        if memory.prev_entry(block).is_free() {
            let prev = memory.prev_physical(block);
            self.free_list.remove(&mut memory, prev);
            self.free_list.remove(&mut memory, block);
            size += memory.entry(prev).size();
            memory.write(prev, Entry::free(size));
            self.free_list.insert(&mut memory, prev);
            block = prev;
        }

        block
    }

    /// Extend the arena so that it can host a block of `size` bytes.
    ///
    /// The new memory becomes a free block, which starts where the old high
    /// sentinel was. It is merged with the last block, if that one is free.
    fn grow(&mut self, size: usize) -> Result<Block, GrowError> {
        let chunk = size.max(self.chunk_size());
        let (offset, bytes) = match self.arena.grow(chunk) {
            Ok(offset) => (offset, chunk),
            Err(error) if chunk == size => return Err(error),
            Err(_) => (self.arena.grow(size)?, size),
        };
        debug_assert_eq!(offset + bytes, self.arena.extent());

        let mut memory = self.memory();
        let block = Block::at(offset - WORD);
        memory.write(block, Entry::free(bytes));
        memory.write_sentinel(memory.end());
        self.free_list.insert(&mut memory, block);
        let merged = self.coalesce(block);

        log::debug!(
            "heap grown by {bytes} bytes to {} bytes",
            self.arena.extent()
        );
        Ok(merged)
    }

    /// The pointer to the payload of a block.
    fn payload_of(&self, block: Block) -> NonNull<u8> {
        // SAFETY: the payload offset is inside the arena and the arena base is
        // not null once it has a non-zero extent.
        unsafe { NonNull::new_unchecked(self.arena.base().add(block.payload())) }
    }

    /// Find and validate the used block owning the payload at `ptr`.
    fn block_of(&self, ptr: NonNull<u8>) -> Result<Block, FreeError> {
        if !self.initialized {
            return Err(FreeError::AllocationNotFound);
        }
        let memory = self.memory();
        let offset = (ptr.as_ptr() as usize)
            .checked_sub(memory.base() as usize)
            .ok_or(FreeError::AllocationNotFound)?;
        if offset < WORD || !memory.is_block_offset(offset - WORD) {
            return Err(FreeError::AllocationNotFound);
        }

        let block = Block::from_payload(offset);
        let entry = memory.entry(block);
        if entry.is_free() {
            return Err(FreeError::DoubleFreeDetected);
        }
        let size = entry.size();
        if size < MIN_BLOCK_SIZE
            || size % ALIGNMENT != 0
            || size > memory.end() - block.offset()
            || memory.footer(block) != entry
        {
            return Err(FreeError::AllocationNotFound);
        }
        Ok(block)
    }
}
