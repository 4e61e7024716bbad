use allocator::free_list::HeapBlock;

use super::{
    EventKey, Pid, Priority, ProcessInfo, ProcessName, ProcessState, context::SavedContext,
};

/// Process control block.
#[derive(Debug)]
pub(crate) struct Pcb {
    pub(crate) pid: Pid,
    pub(crate) name: ProcessName,
    pub(crate) state: ProcessState,
    pub(crate) stack: Option<HeapBlock>,
    pub(crate) context: SavedContext,
    pub(crate) base_priority: Priority,
    pub(crate) dynamic_priority: Priority,
    pub(crate) sleep_ticks: u32,
    pub(crate) wait_key: Option<EventKey>,
}

impl Pcb {
    pub(crate) fn vacant(pid: Pid) -> Self {
        Self {
            pid,
            name: ProcessName::new(),
            state: ProcessState::Terminated,
            stack: None,
            context: SavedContext::Empty,
            base_priority: Priority::IDLE,
            dynamic_priority: Priority::IDLE,
            sleep_ticks: 0,
            wait_key: None,
        }
    }

    pub(crate) fn is_vacant(&self) -> bool {
        self.state == ProcessState::Terminated
    }

    pub(crate) fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            name: self.name,
            state: self.state,
            base_priority: self.base_priority,
            dynamic_priority: self.dynamic_priority,
            stack_size: self.stack.map_or(0, |stack| stack.len()),
            sleep_ticks: self.sleep_ticks,
            wait_key: self.wait_key,
        }
    }
}
