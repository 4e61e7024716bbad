//! Saved execution state and the switch handoff.

use core::fmt;

use super::Pid;
use crate::arch;

/// Routine run on a fresh stack before a process's entry function.
pub type StartHook = extern "C" fn();

/// Routine called when a process's entry function returns normally.
pub type ExitHook = extern "C" fn() -> !;

/// Boot-provided routines that bracket every process's entry function.
///
/// `on_start` is expected to call
/// [`System::finish_switch`](crate::system::System::finish_switch) and
/// `on_return` to call [`System::exit`](crate::system::System::exit).
#[derive(Debug, Clone, Copy)]
pub struct ProcessHooks {
    pub on_start: StartHook,
    pub on_return: ExitHook,
}

/// Entry point of a process: a function and the word it is called with.
#[derive(Clone, Copy)]
pub struct Entry {
    func: extern "C" fn(usize),
    arg: usize,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("func", &(self.func as *const ()))
            .field("arg", &self.arg)
            .finish()
    }
}

impl Entry {
    #[must_use]
    pub const fn new(func: extern "C" fn(usize), arg: usize) -> Self {
        Self { func, arg }
    }

    #[must_use]
    pub fn func(&self) -> extern "C" fn(usize) {
        self.func
    }

    #[must_use]
    pub fn arg(&self) -> usize {
        self.arg
    }
}

/// Execution state of a process that is not running.
///
/// A freshly created process holds [`FirstRun`](Self::FirstRun); once it has
/// been switched away from it holds [`Resumed`](Self::Resumed).
#[derive(Debug, Clone, Copy, Default)]
pub enum SavedContext {
    #[default]
    Empty,
    FirstRun {
        entry: Entry,
        stack_top: usize,
        hooks: ProcessHooks,
    },
    Resumed(arch::Context),
}

impl SavedContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn is_first_run(&self) -> bool {
        matches!(self, Self::FirstRun { .. })
    }
}

/// A context switch decided by the kernel but not yet performed.
///
/// The kernel never switches while it is borrowed; it hands this value to the
/// caller, which performs the switch after releasing the kernel.
#[derive(Debug)]
#[must_use]
pub struct SwitchRequest {
    from: Option<Pid>,
    to: Pid,
    save: *mut SavedContext,
    load: *const SavedContext,
}

impl SwitchRequest {
    pub(crate) fn new(
        from: Option<Pid>,
        to: Pid,
        save: *mut SavedContext,
        load: *const SavedContext,
    ) -> Self {
        Self {
            from,
            to,
            save,
            load,
        }
    }

    /// Outgoing process, or `None` when the outgoing state is discarded.
    #[must_use]
    pub fn from(&self) -> Option<Pid> {
        self.from
    }

    /// Incoming process.
    #[must_use]
    pub fn to(&self) -> Pid {
        self.to
    }

    /// Where the outgoing registers go and where the incoming ones come from.
    #[must_use]
    pub fn into_raw_parts(self) -> (*mut SavedContext, *const SavedContext) {
        (self.save, self.load)
    }
}

/// Performs the register-level switch described by a [`SwitchRequest`].
///
/// # Safety
///
/// Implementors must either perform the switch exactly as requested or not
/// touch the pointed-to contexts at all.
pub unsafe trait ContextSwitch {
    /// # Safety
    ///
    /// `request` must come from the kernel this switcher serves, and that
    /// kernel must not have been moved or mutated since the request was made.
    unsafe fn switch(&self, request: SwitchRequest);
}
