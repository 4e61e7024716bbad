//! Monotonic (bump) allocator.
//!
//! Hands out consecutive, zero-filled slices of its region by advancing a
//! cursor. Memory is never returned; the allocator is meant for buffers that
//! live as long as the kernel.
//!
//! ```text
//! ┌───────────────────────────┬──────────────────────────────┐
//! │ handed out (used)         │ remaining                    │
//! └───────────────────────────┴──────────────────────────────┘
//!                             ^ cursor
//! ```

use core::mem;

use crate::{AllocError, align_region, align_up, error::OutOfMemorySnafu};

/// A bump allocator over a borrowed memory region.
#[derive(Debug, Default)]
pub struct BumpAllocator<'r> {
    remaining: &'r mut [u8],
    capacity: usize,
}

impl<'r> BumpAllocator<'r> {
    /// Creates a bump allocator owning `region`.
    ///
    /// The region is trimmed so that it starts and ends on an
    /// [`ALIGN`](crate::ALIGN) boundary.
    #[must_use]
    pub fn new(region: &'r mut [u8]) -> Self {
        let remaining = align_region(region);
        let capacity = remaining.len();
        Self {
            remaining,
            capacity,
        }
    }

    /// Allocates `size` bytes rounded up to [`ALIGN`](crate::ALIGN).
    ///
    /// The returned slice is zero-filled and has the rounded length.
    pub fn allocate(&mut self, size: usize) -> Result<&'r mut [u8], AllocError> {
        let Some(size) = align_up(size).filter(|size| *size <= self.remaining.len()) else {
            return OutOfMemorySnafu { requested: size }.fail();
        };

        let (allocated, rest) = mem::take(&mut self.remaining).split_at_mut(size);
        self.remaining = rest;
        allocated.fill(0);
        Ok(allocated)
    }

    /// Total number of bytes managed by this allocator.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes already handed out.
    #[must_use]
    pub fn used(&self) -> usize {
        self.capacity - self.remaining.len()
    }

    /// Number of bytes still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
