//! Architecture boundary for the context switch.
//!
//! Everything above this module works with [`SavedContext`] values. The
//! per-architecture register set and the switch routine live in `imp`.

use dataview::PodMethods as _;

use crate::task::context::{ContextSwitch, SavedContext, SwitchRequest};

pub use self::imp::Context;

mod imp;

/// Switches through the architecture's register-level routine.
#[derive(Debug)]
pub struct NativeSwitch {
    _private: (),
}

impl NativeSwitch {
    /// Creates the native switcher.
    ///
    /// # Safety
    ///
    /// The [`System`](crate::system::System) using this switcher must stay at
    /// a fixed address (typically a `static`) for the rest of the kernel's
    /// life, because saved contexts are addressed by raw pointer while the
    /// outgoing process is suspended.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

unsafe impl ContextSwitch for NativeSwitch {
    unsafe fn switch(&self, request: SwitchRequest) {
        let (save, load) = request.into_raw_parts();
        unsafe { switch(save, load) }
    }
}

/// Saves the running registers into `save` and resumes `load`.
///
/// # Safety
///
/// Both pointers must be valid for the duration of the outgoing process's
/// suspension and must not alias each other.
unsafe fn switch(save: *mut SavedContext, load: *const SavedContext) {
    let next = match unsafe { load.read() } {
        SavedContext::FirstRun {
            entry,
            stack_top,
            hooks,
        } => Context::first_run(entry, stack_top, hooks),
        SavedContext::Resumed(context) => context,
        SavedContext::Empty => panic!("dispatching a vacant slot"),
    };
    unsafe {
        save.write(SavedContext::Resumed(Context::zeroed()));
        let SavedContext::Resumed(current) = &mut *save else {
            unreachable!()
        };
        imp::switch(current, &next);
    }
}
