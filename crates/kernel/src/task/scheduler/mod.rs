//! Process selection.
//!
//! The scheduler only decides. It updates process states in the
//! [`ProcessTable`] and reports the decision as a [`Dispatch`]; the kernel
//! turns a [`Dispatch::Switch`] into a context switch.
//!
//! Two policies are available:
//!
//! - [`Policy::Aging`]: every reschedule raises the dynamic priority of each
//!   READY process by one and dispatches the highest, lowest pid first. The
//!   dispatched process's dynamic priority drops back to its base.
//! - [`Policy::PriorityRoundRobin`]: one FIFO per [`PriorityClass`];
//!   higher classes are always served first.
//!
//! The idle process (slot 0) is never aged or queued. It runs only when no
//! other process is READY.

use core::num::NonZeroU32;

use self::queue::ReadyQueue;
use super::{Pid, PriorityClass, ProcessState, ProcessTable};
use crate::config::MAX_PROCS;

mod queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    #[default]
    Aging,
    PriorityRoundRobin,
}

/// Counters kept by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub reschedules: u64,
    pub context_switches: u64,
    pub idle_dispatches: u64,
    pub ticks: u64,
    pub processes_created: u64,
    pub processes_terminated: u64,
}

/// Outcome of a reschedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The current process keeps running.
    Stay,
    /// Control moves to `to`. `from` is `None` when nothing was running.
    Switch { from: Option<Pid>, to: Pid },
}

#[derive(Debug)]
pub struct Scheduler<const N: usize = MAX_PROCS> {
    policy: Policy,
    quantum: Option<NonZeroU32>,
    remaining_quantum: u32,
    current: Option<Pid>,
    queues: [ReadyQueue<N>; PriorityClass::COUNT],
    stats: SchedulerStats,
}

impl<const N: usize> Scheduler<N> {
    #[must_use]
    pub const fn new(policy: Policy, quantum: Option<NonZeroU32>) -> Self {
        Self {
            policy,
            quantum,
            remaining_quantum: 0,
            current: None,
            queues: [const { ReadyQueue::new() }; PriorityClass::COUNT],
            stats: SchedulerStats {
                reschedules: 0,
                context_switches: 0,
                idle_dispatches: 0,
                ticks: 0,
                processes_created: 0,
                processes_terminated: 0,
            },
        }
    }

    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    #[must_use]
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SchedulerStats {
        &mut self.stats
    }

    /// Number of pids queued in `class`. Always 0 under [`Policy::Aging`].
    #[must_use]
    pub fn queued(&self, class: PriorityClass) -> usize {
        self.queues[class.index()].len()
    }

    /// Marks `pid` READY and, under the round-robin policy, queues it at the
    /// back of its class.
    pub(crate) fn make_ready(&mut self, table: &mut ProcessTable<N>, pid: Pid) {
        let Some(pcb) = table.pcb_mut(pid) else {
            return;
        };
        pcb.state = ProcessState::Ready;
        if self.policy == Policy::PriorityRoundRobin && !pid.is_idle() {
            let queue = &mut self.queues[pcb.base_priority.class().index()];
            debug_assert!(!queue.contains(pid));
            let queued = queue.push_back(pid);
            debug_assert!(queued);
        }
    }

    /// Drops every reference to `pid`, which is about to leave the table.
    pub(crate) fn forget(&mut self, pid: Pid) {
        for queue in &mut self.queues {
            queue.remove(pid);
        }
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    /// Chooses the next process to run.
    ///
    /// The outgoing process must already be in its new state (READY after a
    /// yield, SLEEP or WAIT when blocking) unless it is still running, in
    /// which case it is demoted to READY only if another process wins.
    ///
    /// # Panics
    ///
    /// Panics if the idle slot is vacant and nothing else is READY.
    pub(crate) fn reschedule(&mut self, table: &mut ProcessTable<N>) -> Dispatch {
        self.stats.reschedules += 1;

        let next = match self.policy {
            Policy::Aging => Self::pick_aged(table),
            Policy::PriorityRoundRobin => self.pick_queued(table),
        }
        .unwrap_or(Pid::IDLE);

        let previous = self.current;
        let Some(pcb) = table.pcb_mut(next) else {
            panic!("no runnable process and the idle slot is vacant");
        };
        if pcb.state == ProcessState::Current {
            return Dispatch::Stay;
        }
        pcb.dynamic_priority = pcb.base_priority;
        pcb.state = ProcessState::Current;

        if let Some(previous) = previous
            && previous != next
            && table
                .pcb(previous)
                .is_some_and(|pcb| pcb.state == ProcessState::Current)
        {
            self.make_ready(table, previous);
        }

        self.current = Some(next);
        self.remaining_quantum = self.quantum.map_or(0, NonZeroU32::get);

        if previous == Some(next) {
            return Dispatch::Stay;
        }
        if next.is_idle() {
            self.stats.idle_dispatches += 1;
        }
        self.stats.context_switches += 1;
        log::trace!("dispatch {previous:?} -> {next}");
        Dispatch::Switch {
            from: previous,
            to: next,
        }
    }

    fn pick_aged(table: &mut ProcessTable<N>) -> Option<Pid> {
        let mut best: Option<(Pid, _)> = None;
        for pcb in table.pcbs_mut() {
            if pcb.pid.is_idle() || pcb.state != ProcessState::Ready {
                continue;
            }
            pcb.dynamic_priority = pcb.dynamic_priority.aged();
            if best.is_none_or(|(_, priority)| pcb.dynamic_priority > priority) {
                best = Some((pcb.pid, pcb.dynamic_priority));
            }
        }
        best.map(|(pid, _)| pid)
    }

    fn pick_queued(&mut self, table: &ProcessTable<N>) -> Option<Pid> {
        for class in PriorityClass::BY_PRECEDENCE {
            let queue = &mut self.queues[class.index()];
            while let Some(pid) = queue.pop_front() {
                if table
                    .pcb(pid)
                    .is_some_and(|pcb| pcb.state == ProcessState::Ready)
                {
                    return Some(pid);
                }
            }
        }
        None
    }

    /// Counts one tick against the running process's quantum.
    ///
    /// Returns `true` when the quantum has just run out.
    pub(crate) fn consume_quantum(&mut self) -> bool {
        if self.quantum.is_none() || self.current.is_none() || self.remaining_quantum == 0 {
            return false;
        }
        self.remaining_quantum -= 1;
        self.remaining_quantum == 0
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;

    use allocator::region::RegionAllocator;

    use super::*;
    use crate::{
        config::MIN_STACK_SIZE,
        task::{Priority, Spawn, context::Entry},
        testing::{TEST_HOOKS, noop_entry},
    };

    struct Fixture<'r> {
        memory: RegionAllocator<'r>,
        table: ProcessTable<8>,
        scheduler: Scheduler<8>,
    }

    impl Fixture<'_> {
        fn spawn(&mut self, priority: Priority) -> Pid {
            let spawn = Spawn::new(Entry::new(noop_entry, 0)).priority(priority);
            let pid = self
                .table
                .create(&mut self.memory, &spawn, TEST_HOOKS)
                .unwrap();
            self.scheduler.make_ready(&mut self.table, pid);
            pid
        }

        fn reschedule(&mut self) -> Dispatch {
            self.scheduler.reschedule(&mut self.table)
        }

        fn yield_current(&mut self) -> Dispatch {
            let current = self.scheduler.current().unwrap();
            self.scheduler.make_ready(&mut self.table, current);
            self.reschedule()
        }

        fn state(&self, pid: Pid) -> ProcessState {
            self.table.get(pid).unwrap().state
        }
    }

    fn with_test_scheduler<F>(policy: Policy, quantum: Option<u32>, test_fn: F)
    where
        F: FnOnce(&mut Fixture<'_>),
    {
        let mut storage = alloc::vec![0u32; 16 * 1024];
        let memory = RegionAllocator::new(dataview::bytes_mut(storage.as_mut_slice()));
        let mut fixture = Fixture {
            memory,
            table: ProcessTable::new(MIN_STACK_SIZE),
            scheduler: Scheduler::new(policy, quantum.and_then(NonZeroU32::new)),
        };
        let idle = Spawn::new(Entry::new(noop_entry, 0))
            .name("idle")
            .priority(Priority::IDLE);
        fixture
            .table
            .install(Pid::IDLE, &mut fixture.memory, &idle, TEST_HOOKS)
            .unwrap();
        test_fn(&mut fixture);
    }

    fn switched_to(dispatch: Dispatch) -> usize {
        match dispatch {
            Dispatch::Switch { to, .. } => to.index(),
            Dispatch::Stay => panic!("expected a switch"),
        }
    }

    #[test]
    fn test_idle_when_nothing_ready() {
        with_test_scheduler(Policy::Aging, None, |f| {
            assert_eq!(
                f.reschedule(),
                Dispatch::Switch {
                    from: None,
                    to: Pid::IDLE
                }
            );
            assert_eq!(f.state(Pid::IDLE), ProcessState::Current);
            assert_eq!(f.scheduler.stats().idle_dispatches, 1);
            assert_eq!(f.reschedule(), Dispatch::Stay);
            assert_eq!(f.reschedule(), Dispatch::Stay);
            assert_eq!(f.scheduler.stats().idle_dispatches, 1);
        });
    }

    #[test]
    fn test_ready_process_preempts_idle() {
        with_test_scheduler(Policy::Aging, None, |f| {
            f.reschedule();
            let a = f.spawn(Priority::LOW);
            assert_eq!(
                f.reschedule(),
                Dispatch::Switch {
                    from: Some(Pid::IDLE),
                    to: a
                }
            );
            assert_eq!(f.state(Pid::IDLE), ProcessState::Ready);
            assert_eq!(f.state(a), ProcessState::Current);
        });
    }

    #[test]
    fn test_equal_priority_rotation() {
        with_test_scheduler(Policy::Aging, None, |f| {
            let pids: Vec<_> = (0..3).map(|_| f.spawn(Priority::NORMAL)).collect();
            let mut order = Vec::new();
            order.push(switched_to(f.reschedule()));
            for _ in 0..5 {
                order.push(switched_to(f.yield_current()));
            }
            let (a, b, c) = (pids[0].index(), pids[1].index(), pids[2].index());
            assert_eq!(order, [a, b, c, a, b, c]);
        });
    }

    #[test]
    fn test_aging_lets_low_priority_run() {
        with_test_scheduler(Policy::Aging, None, |f| {
            let low = f.spawn(Priority::LOW);
            let high = f.spawn(Priority::HIGH);
            let mut low_runs = 0;
            assert_eq!(switched_to(f.reschedule()), high.index());
            for _ in 0..10 {
                if let Dispatch::Switch { to, .. } = f.yield_current()
                    && to == low
                {
                    low_runs += 1;
                }
            }
            assert!(low_runs > 0);
        });
    }

    #[test]
    fn test_passed_over_priority_increases() {
        with_test_scheduler(Policy::Aging, None, |f| {
            let high = f.spawn(Priority::HIGH);
            let low = f.spawn(Priority::LOW);
            let mut last = f.table.get(low).unwrap().dynamic_priority;
            assert_eq!(switched_to(f.reschedule()), high.index());
            for _ in 0..2 {
                let now = f.table.get(low).unwrap().dynamic_priority;
                assert!(now > last);
                last = now;
                assert_eq!(f.yield_current(), Dispatch::Stay);
            }
            assert_eq!(switched_to(f.yield_current()), low.index());
        });
    }

    #[test]
    fn test_dispatch_resets_dynamic_priority() {
        with_test_scheduler(Policy::Aging, None, |f| {
            let a = f.spawn(Priority::LOW);
            let b = f.spawn(Priority::LOW);
            f.reschedule();
            let info = f.table.get(a).unwrap();
            assert_eq!(info.dynamic_priority, Priority::LOW);
            // aged but not chosen
            let info = f.table.get(b).unwrap();
            assert_eq!(info.dynamic_priority, Priority::NORMAL);
        });
    }

    #[test]
    fn test_yield_alone_stays() {
        with_test_scheduler(Policy::Aging, None, |f| {
            let a = f.spawn(Priority::NORMAL);
            f.reschedule();
            assert_eq!(f.yield_current(), Dispatch::Stay);
            assert_eq!(f.state(a), ProcessState::Current);
            assert_eq!(f.scheduler.stats().context_switches, 1);
        });
    }

    #[test]
    fn test_round_robin_classes() {
        with_test_scheduler(Policy::PriorityRoundRobin, None, |f| {
            let low = f.spawn(Priority::LOW);
            let n1 = f.spawn(Priority::NORMAL);
            let n2 = f.spawn(Priority::NORMAL);
            assert_eq!(f.scheduler.queued(PriorityClass::Normal), 2);
            assert_eq!(f.scheduler.queued(PriorityClass::Low), 1);

            let mut order = Vec::new();
            order.push(switched_to(f.reschedule()));
            for _ in 0..3 {
                order.push(switched_to(f.yield_current()));
            }
            assert_eq!(
                order,
                [n1.index(), n2.index(), n1.index(), n2.index()]
            );
            assert_eq!(f.state(low), ProcessState::Ready);
        });
    }

    #[test]
    fn test_round_robin_falls_through_classes() {
        with_test_scheduler(Policy::PriorityRoundRobin, None, |f| {
            let low = f.spawn(Priority::LOW);
            let high = f.spawn(Priority::HIGH);
            assert_eq!(switched_to(f.reschedule()), high.index());
            f.table.pcb_mut(high).unwrap().state = ProcessState::Sleep;
            assert_eq!(switched_to(f.reschedule()), low.index());
        });
    }

    #[test]
    fn test_forget_clears_queue_and_current() {
        with_test_scheduler(Policy::PriorityRoundRobin, None, |f| {
            let a = f.spawn(Priority::NORMAL);
            let b = f.spawn(Priority::NORMAL);
            f.scheduler.forget(b);
            assert_eq!(f.scheduler.queued(PriorityClass::Normal), 1);
            assert_eq!(switched_to(f.reschedule()), a.index());
            f.scheduler.forget(a);
            assert_eq!(f.scheduler.current(), None);
        });
    }

    #[test]
    fn test_quantum() {
        with_test_scheduler(Policy::Aging, Some(2), |f| {
            assert!(!f.scheduler.consume_quantum());
            f.spawn(Priority::NORMAL);
            f.reschedule();
            assert!(!f.scheduler.consume_quantum());
            assert!(f.scheduler.consume_quantum());
            assert!(!f.scheduler.consume_quantum());
        });
    }

    #[test]
    fn test_no_quantum() {
        with_test_scheduler(Policy::Aging, None, |f| {
            f.spawn(Priority::NORMAL);
            f.reschedule();
            for _ in 0..100 {
                assert!(!f.scheduler.consume_quantum());
            }
        });
    }
}
