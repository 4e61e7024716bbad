//! Cooperative single-CPU kernel core.
//!
//! The crate ties together three parts:
//!
//! - memory: a [`RegionAllocator`](allocator::region::RegionAllocator) over
//!   the region handed over by the boot code. Process stacks come from its
//!   heap.
//! - the [`ProcessTable`](task::ProcessTable): fixed-capacity process
//!   control blocks indexed by [`Pid`](task::Pid). Slot 0 holds the idle
//!   process.
//! - the [`Scheduler`](task::scheduler::Scheduler): picks the next process
//!   under an aging or a class round-robin policy and tracks sleep, wait and
//!   quantum state.
//!
//! [`Kernel`] owns all three and decides; [`System`] locks the kernel and
//! performs the context switches it asks for.
//!
//! # Usage Example
//!
//! ```rust
//! use allocator::region::RegionAllocator;
//! use kernel::{
//!     Kernel, KernelConfig,
//!     task::{
//!         Priority, ProcessState, Spawn,
//!         context::{Entry, ProcessHooks},
//!     },
//! };
//!
//! extern "C" fn idle(_: usize) {}
//! extern "C" fn worker(_: usize) {}
//! extern "C" fn on_start() {}
//! extern "C" fn on_return() -> ! {
//!     unreachable!()
//! }
//!
//! let hooks = ProcessHooks { on_start, on_return };
//!
//! let mut region = vec![0u8; 64 * 1024];
//! let memory = RegionAllocator::new(&mut region);
//! let mut kernel: Kernel<'_> =
//!     Kernel::new(memory, Entry::new(idle, 0), hooks, KernelConfig::default()).unwrap();
//!
//! let pid = kernel
//!     .spawn(&Spawn::new(Entry::new(worker, 1)).name("worker").priority(Priority::HIGH))
//!     .unwrap();
//! assert_eq!(kernel.get(pid).unwrap().state, ProcessState::Ready);
//!
//! // the first dispatch goes to the worker
//! let request = kernel.start().unwrap();
//! assert_eq!(request.to(), pid);
//! ```

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    config::KernelConfig,
    kernel::{BlockError, Kernel, KernelInitError, StartError, TerminateError, Tick},
    system::System,
};

pub mod arch;
pub mod config;
pub mod error;
mod kernel;
pub mod logger;
pub mod system;
pub mod task;
#[cfg(test)]
mod testing;
