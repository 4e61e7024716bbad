//! Fixed-capacity process table.

use core::array;

use allocator::{AllocError, region::RegionAllocator};
use snafu::{Location, ResultExt as _, Snafu};

use super::{
    Pid, ProcessInfo, ProcessState, Spawn,
    context::{ProcessHooks, SavedContext},
    pcb::Pcb,
    process_name,
};
use crate::config::MAX_PROCS;

/// Stack pointers handed to a new process are aligned to this many bytes.
const STACK_ALIGN: usize = 16;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CreateError {
    #[snafu(display("process table is full ({capacity} slots)"))]
    TableFull {
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to allocate a {size}-byte stack"))]
    Stack {
        size: usize,
        source: AllocError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl CreateError {
    #[must_use]
    pub fn is_table_full(&self) -> bool {
        matches!(self, Self::TableFull { .. })
    }

    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::Stack { source, .. } if source.is_out_of_memory())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LookupError {
    #[snafu(display("no process with pid {pid}"))]
    NotFound {
        pid: Pid,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReleaseError {
    #[snafu(display("no process with pid {pid}"))]
    Vacant {
        pid: Pid,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to release the stack of process {pid}"))]
    ReleaseStack {
        pid: Pid,
        source: AllocError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Every process control block, indexed by [`Pid`].
///
/// Slot 0 is reserved for the idle process; [`create`](Self::create) never
/// hands it out.
#[derive(Debug)]
pub struct ProcessTable<const N: usize = MAX_PROCS> {
    slots: [Pcb; N],
    min_stack_size: usize,
}

impl<const N: usize> ProcessTable<N> {
    /// Creates a table with every slot vacant.
    ///
    /// Requested stack sizes below `min_stack_size` are raised to it.
    #[must_use]
    pub fn new(min_stack_size: usize) -> Self {
        Self {
            slots: array::from_fn(|index| Pcb::vacant(Pid::from_raw(index))),
            min_stack_size,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Creates a process in the lowest vacant non-idle slot.
    ///
    /// The new process is [`Ready`](ProcessState::Ready). Its first dispatch
    /// runs `hooks.on_start` and then `spawn.entry`; when the entry function
    /// returns, `hooks.on_return` runs on the process's stack.
    pub fn create(
        &mut self,
        memory: &mut RegionAllocator<'_>,
        spawn: &Spawn<'_>,
        hooks: ProcessHooks,
    ) -> Result<Pid, CreateError> {
        let Some(pid) = self
            .slots
            .iter()
            .skip(1)
            .find(|pcb| pcb.is_vacant())
            .map(|pcb| pcb.pid)
        else {
            return TableFullSnafu { capacity: N }.fail();
        };
        self.install(pid, memory, spawn, hooks)?;
        Ok(pid)
    }

    /// Fills the vacant slot `pid`.
    pub(crate) fn install(
        &mut self,
        pid: Pid,
        memory: &mut RegionAllocator<'_>,
        spawn: &Spawn<'_>,
        hooks: ProcessHooks,
    ) -> Result<(), CreateError> {
        debug_assert!(self.slots[pid.index()].is_vacant());

        let size = spawn.stack_size.max(self.min_stack_size);
        let stack = memory.heap_alloc(size).context(StackSnafu { size })?;
        let stack_top = memory.heap_addr_range(stack).end.addr() & !(STACK_ALIGN - 1);

        let pcb = &mut self.slots[pid.index()];
        pcb.name = process_name(spawn.name);
        pcb.state = ProcessState::Ready;
        pcb.stack = Some(stack);
        pcb.context = SavedContext::FirstRun {
            entry: spawn.entry,
            stack_top,
            hooks,
        };
        pcb.base_priority = spawn.priority;
        pcb.dynamic_priority = spawn.priority;
        pcb.sleep_ticks = 0;
        pcb.wait_key = None;
        Ok(())
    }

    /// Vacates `pid` and returns its stack to `memory`.
    ///
    /// The slot is vacated even if the stack cannot be released.
    pub(crate) fn release(
        &mut self,
        memory: &mut RegionAllocator<'_>,
        pid: Pid,
    ) -> Result<(), ReleaseError> {
        let Some(pcb) = self.pcb_mut(pid) else {
            return VacantSnafu { pid }.fail();
        };
        let stack = pcb.stack.take();
        *pcb = Pcb::vacant(pid);
        if let Some(stack) = stack {
            memory
                .heap_free(stack)
                .context(ReleaseStackSnafu { pid })?;
        }
        Ok(())
    }

    pub fn get(&self, pid: Pid) -> Result<ProcessInfo, LookupError> {
        match self.pcb(pid) {
            Some(pcb) => Ok(pcb.info()),
            None => NotFoundSnafu { pid }.fail(),
        }
    }

    /// Number of slots in `state`. Vacant slots count as
    /// [`Terminated`](ProcessState::Terminated).
    #[must_use]
    pub fn count_by_state(&self, state: ProcessState) -> usize {
        self.slots.iter().filter(|pcb| pcb.state == state).count()
    }

    /// Number of occupied slots, idle included.
    #[must_use]
    pub fn active(&self) -> usize {
        N - self.count_by_state(ProcessState::Terminated)
    }

    /// Snapshots of every occupied slot in pid order.
    pub fn iter(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.slots
            .iter()
            .filter(|pcb| !pcb.is_vacant())
            .map(Pcb::info)
    }

    pub(crate) fn pcb(&self, pid: Pid) -> Option<&Pcb> {
        self.slots.get(pid.index()).filter(|pcb| !pcb.is_vacant())
    }

    pub(crate) fn pcb_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.slots
            .get_mut(pid.index())
            .filter(|pcb| !pcb.is_vacant())
    }

    pub(crate) fn pcbs_mut(&mut self) -> impl Iterator<Item = &mut Pcb> {
        self.slots.iter_mut().filter(|pcb| !pcb.is_vacant())
    }

    /// Address of the saved context of slot `pid`.
    pub(crate) fn context_ptr(&mut self, pid: Pid) -> *mut SavedContext {
        &raw mut self.slots[pid.index()].context
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec;

    use super::*;
    use crate::{
        config::MIN_STACK_SIZE,
        task::{Priority, context::Entry},
        testing::{TEST_HOOKS, noop_entry},
    };

    fn with_test_table<const N: usize, F>(test_fn: F)
    where
        F: FnOnce(&mut ProcessTable<N>, &mut RegionAllocator<'_>),
    {
        let mut storage = vec![0u32; 16 * 1024];
        let mut memory = RegionAllocator::new(dataview::bytes_mut(storage.as_mut_slice()));
        let mut table = ProcessTable::<N>::new(MIN_STACK_SIZE);
        test_fn(&mut table, &mut memory);
    }

    fn spawn(name: &str) -> Spawn<'_> {
        Spawn::new(Entry::new(noop_entry, 0)).name(name)
    }

    #[test]
    fn test_create_skips_idle_slot() {
        with_test_table::<4, _>(|table, memory| {
            let pid = table.create(memory, &spawn("a"), TEST_HOOKS).unwrap();
            assert_eq!(pid, Pid::from_raw(1));
            let info = table.get(pid).unwrap();
            assert_eq!(info.state, ProcessState::Ready);
            assert_eq!(info.name.as_str(), "a");
            assert_eq!(info.base_priority, Priority::NORMAL);
            assert_eq!(info.dynamic_priority, Priority::NORMAL);
            assert!(table.get(Pid::IDLE).is_err());
        });
    }

    #[test]
    fn test_first_run_context() {
        with_test_table::<4, _>(|table, memory| {
            let pid = table
                .create(memory, &spawn("a").stack_size(2048), TEST_HOOKS)
                .unwrap();
            let pcb = table.pcb(pid).unwrap();
            assert!(pcb.context.is_first_run());
            let stack = memory.heap_addr_range(pcb.stack.unwrap());
            let SavedContext::FirstRun {
                entry, stack_top, ..
            } = pcb.context
            else {
                panic!("unexpected context {:?}", pcb.context);
            };
            assert_eq!(entry.arg(), 0);
            assert_eq!(stack_top % STACK_ALIGN, 0);
            assert!(stack_top <= stack.end.addr());
            assert!(stack_top > stack.start.addr());
        });
    }

    #[test]
    fn test_stack_size_floor() {
        with_test_table::<4, _>(|table, memory| {
            let pid = table
                .create(memory, &spawn("tiny").stack_size(16), TEST_HOOKS)
                .unwrap();
            assert_eq!(table.get(pid).unwrap().stack_size, MIN_STACK_SIZE);
            assert_eq!(memory.heap_stats().used_bytes, MIN_STACK_SIZE);
        });
    }

    #[test]
    fn test_table_full() {
        with_test_table::<3, _>(|table, memory| {
            table.create(memory, &spawn("a"), TEST_HOOKS).unwrap();
            table.create(memory, &spawn("b"), TEST_HOOKS).unwrap();
            let used = memory.heap_stats().used_bytes;
            let err = table
                .create(memory, &spawn("c"), TEST_HOOKS)
                .unwrap_err();
            assert!(err.is_table_full());
            assert_eq!(memory.heap_stats().used_bytes, used);
        });
    }

    #[test]
    fn test_stack_exhaustion_leaves_slot_vacant() {
        with_test_table::<4, _>(|table, memory| {
            let err = table
                .create(memory, &spawn("huge").stack_size(1 << 20), TEST_HOOKS)
                .unwrap_err();
            assert!(err.is_out_of_memory());
            assert_eq!(table.active(), 0);
            assert_eq!(table.count_by_state(ProcessState::Terminated), 4);
        });
    }

    #[test]
    fn test_release_reuses_slot_and_memory() {
        with_test_table::<4, _>(|table, memory| {
            let free_before = memory.heap_stats().free_bytes;
            let a = table.create(memory, &spawn("a"), TEST_HOOKS).unwrap();
            let b = table.create(memory, &spawn("b"), TEST_HOOKS).unwrap();
            table.release(memory, a).unwrap();
            assert!(table.get(a).is_err());
            assert!(table.pcb(a).is_none());
            assert!(table.slots[a.index()].context.is_empty());
            assert!(table.slots[a.index()].stack.is_none());

            let c = table.create(memory, &spawn("c"), TEST_HOOKS).unwrap();
            assert_eq!(c, a);
            table.release(memory, b).unwrap();
            table.release(memory, c).unwrap();
            assert_eq!(memory.heap_stats().free_bytes, free_before);
            assert_eq!(table.active(), 0);
        });
    }

    #[test]
    fn test_release_vacant() {
        with_test_table::<4, _>(|table, memory| {
            assert!(table.release(memory, Pid::from_raw(2)).is_err());
            assert!(table.release(memory, Pid::from_raw(99)).is_err());
        });
    }

    #[test]
    fn test_lookup_out_of_range() {
        with_test_table::<4, _>(|table, _memory| {
            let err = table.get(Pid::from_raw(4)).unwrap_err();
            assert!(matches!(err, LookupError::NotFound { pid, .. } if pid.index() == 4));
        });
    }

    #[test]
    fn test_counts_and_snapshots() {
        with_test_table::<4, _>(|table, memory| {
            let a = table.create(memory, &spawn("a"), TEST_HOOKS).unwrap();
            let b = table.create(memory, &spawn("b"), TEST_HOOKS).unwrap();
            table.pcb_mut(b).unwrap().state = ProcessState::Sleep;

            assert_eq!(table.count_by_state(ProcessState::Ready), 1);
            assert_eq!(table.count_by_state(ProcessState::Sleep), 1);
            assert_eq!(table.count_by_state(ProcessState::Terminated), 2);
            assert_eq!(table.active(), 2);

            let mut infos = table.iter();
            assert_eq!(infos.next().map(|info| info.pid), Some(a));
            assert_eq!(infos.next().map(|info| info.pid), Some(b));
            assert!(infos.next().is_none());
        });
    }
}
