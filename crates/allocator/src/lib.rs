//! Region-based memory allocator for the cooperative kernel core.
//!
//! The boot code hands the kernel one contiguous memory region. This crate
//! partitions that region into two sub-allocators:
//!
//! - [`BumpAllocator`](bump::BumpAllocator): a monotonic allocator for
//!   long-lived buffers created during boot. Allocations are never returned.
//! - [`FreeListHeap`](free_list::FreeListHeap): a first-fit heap whose block
//!   headers live inside the managed region. Used for process stacks and
//!   general-purpose allocations.
//!
//! [`RegionAllocator`](region::RegionAllocator) owns both halves.
//!
//! # Usage Example
//!
//! ```rust
//! use allocator::region::RegionAllocator;
//!
//! let mut memory = vec![0u8; 4096];
//! let mut allocator = RegionAllocator::new(&mut memory);
//!
//! // boot-time buffer, never freed
//! let table = allocator.bump_alloc(64).unwrap();
//! assert_eq!(table.len(), 64);
//!
//! // heap block, returned with `heap_free`
//! let block = allocator.heap_alloc(100).unwrap();
//! assert_eq!(block.len(), 100);
//! allocator.heap_free(block).unwrap();
//! assert_eq!(allocator.heap_stats().used_bytes, 0);
//! ```
//!
//! # Alignment
//!
//! Every size handed to either sub-allocator is rounded up to [`ALIGN`]
//! bytes, and both sub-regions start on an [`ALIGN`] boundary.
//!
//! # Thread Safety
//!
//! The allocators borrow their region mutably and perform no internal
//! synchronization. The kernel serializes access to them.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::error::AllocError;

pub mod bump;
mod error;
pub mod free_list;
pub mod region;

/// Granularity of every allocation, in bytes.
pub const ALIGN: usize = 4;

/// Rounds `size` up to the next multiple of [`ALIGN`].
///
/// Returns `None` on overflow.
#[must_use]
pub const fn align_up(size: usize) -> Option<usize> {
    size.checked_next_multiple_of(ALIGN)
}

/// Drops leading bytes so the returned slice starts on an [`ALIGN`] boundary,
/// and trailing bytes so its length is a multiple of [`ALIGN`].
fn align_region(region: &mut [u8]) -> &mut [u8] {
    let offset = region.as_ptr().align_offset(ALIGN).min(region.len());
    let region = &mut region[offset..];
    let len = region.len() / ALIGN * ALIGN;
    &mut region[..len]
}
