//! Build-time limits and boot-time settings.

use core::num::NonZeroU32;

use crate::task::scheduler::Policy;

/// Default capacity of the process table, idle slot included.
pub const MAX_PROCS: usize = 16;

/// Smallest stack a process is given, in bytes.
pub const MIN_STACK_SIZE: usize = 1024;

/// Stack size used when a caller does not ask for one, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Settings chosen by the boot code when the kernel is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub policy: Policy,
    /// Ticks a process may run before an implicit yield. `None` disables
    /// quantum preemption.
    pub quantum: Option<NonZeroU32>,
    pub min_stack_size: usize,
    pub idle_stack_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Aging,
            quantum: None,
            min_stack_size: MIN_STACK_SIZE,
            idle_stack_size: MIN_STACK_SIZE,
        }
    }
}
