//! First-fit free-list heap.
//!
//! The heap keeps an address-ordered chain of blocks that covers its whole
//! region without gaps. Every block starts with a [`BlockHeader`] stored
//! inside the region itself; blocks are addressed by their byte offset from
//! the start of the region rather than by pointer.
//!
//! # Algorithm
//!
//! - **Allocation**: walks the chain from the head and takes the first free
//!   block that is large enough. If the surplus after the request and a new
//!   header exceeds [`SPLIT_THRESHOLD`], a new free block is carved out of the
//!   tail.
//! - **Deallocation**: marks the block free, then merges every pair of
//!   adjacent free blocks in a single pass over the chain.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────┬─────────────┬──────────────┬─────────────┐
//! │ BlockHeader (12 bytes)     │ payload     │ BlockHeader  │ payload ... │
//! │ ┌──────┬─────────┬───────┐ │             │              │             │
//! │ │ size │ is_free │ next  │ │             │              │             │
//! │ └──────┴─────────┴───────┘ │             │              │             │
//! └────────────────────────────┴─────────────┴──────────────┴─────────────┘
//! ```
//!
//! Headers are never released individually. Only their `is_free` flag and
//! boundaries change over the lifetime of the heap.

use core::{iter::FusedIterator, ops::Range};

use dataview::{DataView, Pod};

use crate::{
    AllocError, align_region, align_up,
    error::{DoubleFreeSnafu, InvalidBlockSnafu, OutOfMemorySnafu},
};

/// Minimum surplus, beyond a new header, needed to split a block.
pub const SPLIT_THRESHOLD: usize = 16;

/// Size of the header preceding every block payload.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

const NIL: u32 = u32::MAX;

/// Largest region the heap can address with its 32-bit offsets.
const MAX_REGION_SIZE: usize = (NIL as usize / crate::ALIGN) * crate::ALIGN;

#[derive(Debug, Clone, Copy, Pod)]
#[repr(C)]
struct BlockHeader {
    /// Payload size in bytes, excluding the header.
    size: u32,
    is_free: u32,
    /// Offset of the next header, or `NIL` for the last block.
    next: u32,
}
const _: () = assert!(HEADER_SIZE.is_multiple_of(crate::ALIGN));

impl BlockHeader {
    fn is_free(&self) -> bool {
        self.is_free != 0
    }

    fn set_free(&mut self, free: bool) {
        self.is_free = u32::from(free);
    }

    fn next(&self) -> Option<usize> {
        (self.next != NIL).then_some(self.next as usize)
    }
}

/// Handle to an allocated heap block.
///
/// A handle is only meaningful for the heap that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapBlock {
    offset: usize,
    len: usize,
}

impl HeapBlock {
    /// Byte offset of the payload from the start of the heap region.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// A block in the chain, as seen by [`FreeListHeap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Byte offset of the payload from the start of the heap region.
    pub offset: usize,
    pub size: usize,
    pub is_free: bool,
}

/// Heap usage counters.
///
/// `used_bytes + free_bytes == total_bytes` always holds. Header overhead of
/// split blocks is not counted as used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub allocations: usize,
    pub deallocations: usize,
}

impl HeapStats {
    fn record_alloc(&mut self, size: usize) {
        self.used_bytes += size;
        self.free_bytes -= size;
        self.allocations += 1;
    }

    fn record_free(&mut self, size: usize) {
        self.used_bytes -= size;
        self.free_bytes += size;
        self.deallocations += 1;
    }
}

/// A first-fit heap with in-place block headers.
#[derive(Debug, Default)]
pub struct FreeListHeap<'r> {
    region: &'r mut [u8],
    /// `None` when the region was too small to hold a single block.
    head: Option<usize>,
    stats: HeapStats,
}

impl<'r> FreeListHeap<'r> {
    /// Creates a heap spanning `region` as one free block.
    ///
    /// A region too small to hold a header and a minimal payload yields a heap
    /// on which every allocation fails.
    #[must_use]
    pub fn new(region: &'r mut [u8]) -> Self {
        let region = align_region(region);
        let len = region.len().min(MAX_REGION_SIZE);
        let region = &mut region[..len];

        if len <= HEADER_SIZE {
            log::warn!("heap region of {len} bytes is too small, heap disabled");
            return Self {
                region,
                head: None,
                stats: HeapStats::default(),
            };
        }

        let size = len - HEADER_SIZE;
        let mut heap = Self {
            region,
            head: Some(0),
            stats: HeapStats {
                total_bytes: size,
                free_bytes: size,
                ..HeapStats::default()
            },
        };
        heap.write_header(
            0,
            &BlockHeader {
                size: to_u32(size),
                is_free: 1,
                next: NIL,
            },
        );
        heap
    }

    /// Returns `true` if the heap can serve allocations at all.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.head.is_some()
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Allocates a zero-filled block of at least `size` bytes.
    ///
    /// `size` is rounded up to [`ALIGN`](crate::ALIGN). Fails with
    /// [`AllocError::OutOfMemory`] for zero-sized requests, on an
    /// uninitialized heap, or when no free block is large enough.
    pub fn allocate(&mut self, size: usize) -> Result<HeapBlock, AllocError> {
        let requested = size;
        let (Some(head), Some(size)) = (self.head, align_up(size).filter(|s| *s > 0)) else {
            return OutOfMemorySnafu { requested }.fail();
        };

        let mut cursor = Some(head);
        while let Some(offset) = cursor {
            let mut header = self.read_header(offset);
            let block_size = header.size as usize;
            if !header.is_free() || block_size < size {
                cursor = header.next();
                continue;
            }

            if block_size - size > HEADER_SIZE + SPLIT_THRESHOLD {
                let rest = offset + HEADER_SIZE + size;
                self.write_header(
                    rest,
                    &BlockHeader {
                        size: to_u32(block_size - size - HEADER_SIZE),
                        is_free: 1,
                        next: header.next,
                    },
                );
                header.size = to_u32(size);
                header.next = to_u32(rest);
            }
            header.set_free(false);
            self.write_header(offset, &header);

            let block = HeapBlock {
                offset: offset + HEADER_SIZE,
                len: header.size as usize,
            };
            self.region[block.range()].fill(0);
            self.stats.record_alloc(block.len);
            return Ok(block);
        }

        OutOfMemorySnafu { requested }.fail()
    }

    /// Returns `block` to the heap and coalesces adjacent free blocks.
    ///
    /// Freeing a block twice is reported as [`AllocError::DoubleFree`] and
    /// leaves the heap untouched.
    pub fn free(&mut self, block: HeapBlock) -> Result<(), AllocError> {
        let offset = block.offset;
        let Some(header_offset) = offset
            .checked_sub(HEADER_SIZE)
            .filter(|header_offset| self.header_offsets().any(|o| o == *header_offset))
        else {
            return InvalidBlockSnafu { offset }.fail();
        };

        let mut header = self.read_header(header_offset);
        if header.is_free() {
            log::warn!("double free of heap block at offset {offset:#x} ignored");
            return DoubleFreeSnafu { offset }.fail();
        }

        header.set_free(true);
        self.write_header(header_offset, &header);
        self.stats.record_free(header.size as usize);
        self.coalesce();
        Ok(())
    }

    /// Returns the payload of an allocated block.
    ///
    /// # Panics
    ///
    /// Panics if `block` lies outside this heap's region.
    #[must_use]
    pub fn payload(&self, block: HeapBlock) -> &[u8] {
        &self.region[block.range()]
    }

    /// Returns the payload of an allocated block.
    ///
    /// # Panics
    ///
    /// Panics if `block` lies outside this heap's region.
    pub fn payload_mut(&mut self, block: HeapBlock) -> &mut [u8] {
        &mut self.region[block.range()]
    }

    /// Returns the address range of the payload of `block`.
    ///
    /// Used to hand raw memory, such as process stacks, to code that runs
    /// outside of Rust's borrow tracking.
    ///
    /// # Panics
    ///
    /// Panics if `block` lies outside this heap's region.
    #[must_use]
    pub fn payload_addr_range(&mut self, block: HeapBlock) -> Range<*mut u8> {
        self.payload_mut(block).as_mut_ptr_range()
    }

    /// Iterates over every block of the chain in address order.
    pub fn blocks(&self) -> Blocks<'_, 'r> {
        Blocks {
            heap: self,
            cursor: self.head,
        }
    }

    fn header_offsets(&self) -> impl Iterator<Item = usize> {
        self.blocks().map(|block| block.offset - HEADER_SIZE)
    }

    /// Merges adjacent free blocks until no two neighbours are both free.
    fn coalesce(&mut self) {
        let Some(mut offset) = self.head else {
            return;
        };
        loop {
            let mut header = self.read_header(offset);
            let Some(next_offset) = header.next() else {
                break;
            };
            let next = self.read_header(next_offset);
            if header.is_free() && next.is_free() {
                // stay on this block: the merged block may border another free one
                header.size = to_u32(header.size as usize + HEADER_SIZE + next.size as usize);
                header.next = next.next;
                self.write_header(offset, &header);
            } else {
                offset = next_offset;
            }
        }
    }

    fn read_header(&self, offset: usize) -> BlockHeader {
        DataView::from(&*self.region).read(offset)
    }

    fn write_header(&mut self, offset: usize, header: &BlockHeader) {
        DataView::from_mut(&mut *self.region).write(offset, header);
    }
}

/// Iterator over the blocks of a [`FreeListHeap`].
#[derive(Debug)]
pub struct Blocks<'a, 'r> {
    heap: &'a FreeListHeap<'r>,
    cursor: Option<usize>,
}

impl Iterator for Blocks<'_, '_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.cursor?;
        let header = self.heap.read_header(offset);
        self.cursor = header.next();
        Some(BlockInfo {
            offset: offset + HEADER_SIZE,
            size: header.size as usize,
            is_free: header.is_free(),
        })
    }
}

impl FusedIterator for Blocks<'_, '_> {}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("heap offset {value:#x} exceeds 32 bits"))
}
