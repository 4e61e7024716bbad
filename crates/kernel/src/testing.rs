//! Helpers shared by the unit tests.

extern crate alloc;

use alloc::vec::Vec;

use spin::Mutex;

use crate::task::{
    Pid,
    context::{ContextSwitch, ProcessHooks, SwitchRequest},
};

pub(crate) extern "C" fn noop_entry(_arg: usize) {}

extern "C" fn test_start_hook() {}

extern "C" fn test_exit_hook() -> ! {
    panic!("test processes are never started on real hardware")
}

pub(crate) const TEST_HOOKS: ProcessHooks = ProcessHooks {
    on_start: test_start_hook,
    on_return: test_exit_hook,
};

/// Records requested switches instead of performing them.
#[derive(Debug, Default)]
pub(crate) struct RecordingSwitch {
    switches: Mutex<Vec<(Option<Pid>, Pid)>>,
}

impl RecordingSwitch {
    pub(crate) fn switches(&self) -> Vec<(Option<Pid>, Pid)> {
        self.switches.lock().clone()
    }

    /// Incoming pids, in order.
    pub(crate) fn targets(&self) -> Vec<usize> {
        self.switches.lock().iter().map(|(_, to)| to.index()).collect()
    }
}

unsafe impl ContextSwitch for RecordingSwitch {
    unsafe fn switch(&self, request: SwitchRequest) {
        self.switches.lock().push((request.from(), request.to()));
    }
}
