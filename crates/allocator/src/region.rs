//! The kernel's memory region, split between a bump allocator and a heap.
//!
//! ```text
//! region
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ BumpAllocator                │ FreeListHeap                 │
//! └──────────────────────────────┴──────────────────────────────┘
//!                                ^ bump_size (half by default)
//! ```

use core::ops::Range;

use crate::{
    AllocError,
    bump::BumpAllocator,
    free_list::{FreeListHeap, HeapBlock, HeapStats},
};

/// Owner of the whole memory region handed over by the boot code.
#[derive(Debug, Default)]
pub struct RegionAllocator<'r> {
    bump: BumpAllocator<'r>,
    heap: FreeListHeap<'r>,
}

impl<'r> RegionAllocator<'r> {
    /// Splits `region` evenly between the bump allocator and the heap.
    #[must_use]
    pub fn new(region: &'r mut [u8]) -> Self {
        let bump_size = region.len() / 2;
        Self::with_bump_size(region, bump_size)
    }

    /// Gives the first `bump_size` bytes of `region` to the bump allocator and
    /// the rest to the heap.
    ///
    /// An empty region is accepted; every allocation from it fails.
    #[must_use]
    pub fn with_bump_size(region: &'r mut [u8], bump_size: usize) -> Self {
        if region.is_empty() {
            log::warn!("memory region is empty, all allocations will fail");
        }
        let bump_size = bump_size.min(region.len());
        let (bump, heap) = region.split_at_mut(bump_size);
        let allocator = Self {
            bump: BumpAllocator::new(bump),
            heap: FreeListHeap::new(heap),
        };
        log::info!(
            "memory: {} bytes bump, {} bytes heap",
            allocator.bump.capacity(),
            allocator.heap.stats().total_bytes,
        );
        allocator
    }

    /// Allocates a zero-filled boot-time buffer that is never freed.
    pub fn bump_alloc(&mut self, size: usize) -> Result<&'r mut [u8], AllocError> {
        self.bump.allocate(size)
    }

    /// Allocates a zero-filled block from the heap.
    pub fn heap_alloc(&mut self, size: usize) -> Result<HeapBlock, AllocError> {
        self.heap.allocate(size)
    }

    /// Returns a block to the heap.
    pub fn heap_free(&mut self, block: HeapBlock) -> Result<(), AllocError> {
        self.heap.free(block)
    }

    /// See [`FreeListHeap::payload_addr_range`].
    pub fn heap_addr_range(&mut self, block: HeapBlock) -> Range<*mut u8> {
        self.heap.payload_addr_range(block)
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    #[must_use]
    pub fn bump(&self) -> &BumpAllocator<'r> {
        &self.bump
    }

    #[must_use]
    pub fn heap(&self) -> &FreeListHeap<'r> {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut FreeListHeap<'r> {
        &mut self.heap
    }
}
