//! This test ensures, that the allocator heap is not placed in `.data`.
//!
//! Global variables with a non-zero initial value live in `.data`, whose
//! initial image is stored in the binary (and in flash on most
//! micro-controllers). If only a single field of the allocator was non-zero,
//! the whole (mostly uninitialized) heap buffer would be copied into that
//! image. A freshly created allocator therefore has to be all-zero, so that it
//! ends up in `.bss`.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr;

static ALLOCATOR: tagalloc::Allocator<{ 128 * 1024 * 1024 }> = tagalloc::Allocator::new();

#[cfg(all(target_arch = "x86_64", target_os = "linux"))] // this is only tested on Linux
#[test]
fn allocator_memory_is_not_initialized() {
    // Use the allocator, so that it actually remains in the binary.
    // SAFETY: we just use the allocator as intended.
    unsafe {
        let layout = Layout::new::<u64>();
        let ptr = ALLOCATOR.alloc(layout);
        assert!(!ptr.is_null());
        ALLOCATOR.dealloc(ptr, layout);
    }

    let memory_map = MemoryMap::new();
    assert_eq!(
        memory_map.bss_start, memory_map.data_end,
        "test assumes bss directly after data"
    );

    let addr_allocator = ptr::addr_of!(ALLOCATOR) as usize;
    assert!(
        addr_allocator >= memory_map.bss_start,
        "allocator is placed in .data"
    );
}

/// The (at runtime) reconstructed memory map containing addresses of sections.
struct MemoryMap {
    /// The end of the `.data`-section.
    data_end: usize,
    /// The start address of the `.bss`-section.
    bss_start: usize,
}
impl MemoryMap {
    fn new() -> Self {
        // The symbols defined in the (default) linker script
        extern "C" {
            static __bss_start: usize;
            static _edata: usize;
        }

        Self {
            data_end: unsafe { ptr::addr_of!(_edata) } as usize,
            bss_start: unsafe { ptr::addr_of!(__bss_start) } as usize,
        }
    }
}
