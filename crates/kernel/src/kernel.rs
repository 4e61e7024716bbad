//! The kernel object: memory, process table and scheduler behind one owner.
//!
//! Operations that may give up the CPU return an `Option<SwitchRequest>`
//! instead of switching. The caller releases its borrow of the kernel and
//! then performs the switch; see [`System`](crate::system::System).

use allocator::{free_list::HeapStats, region::RegionAllocator};
use arrayvec::ArrayVec;
use snafu::{Location, ResultExt as _, Snafu};

use crate::{
    config::{KernelConfig, MAX_PROCS},
    error,
    task::{
        CreateError, EventKey, LookupError, Pid, Priority, ProcessInfo, ProcessState,
        ProcessTable, Spawn,
        context::{Entry, ProcessHooks, SavedContext, SwitchRequest},
        pcb::Pcb,
        scheduler::{Dispatch, Scheduler, SchedulerStats},
    },
};

#[derive(Debug, Snafu)]
pub enum KernelInitError {
    #[snafu(display("failed to create the idle process"))]
    IdleStack {
        source: CreateError,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Snafu)]
pub enum TerminateError {
    #[snafu(display("no process with pid {pid}"))]
    NotFound {
        pid: Pid,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("the idle process cannot be terminated"))]
    Idle {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no process is running"))]
    NotRunning {
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Snafu)]
pub enum BlockError {
    #[snafu(display("no process is running"))]
    NoCurrent {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("the idle process cannot block"))]
    IdleCannotBlock {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("sleep requires a positive tick count"))]
    ZeroTicks {
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Snafu)]
pub enum StartError {
    #[snafu(display("the scheduler has already been started"))]
    AlreadyStarted {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no runnable process"))]
    NoRunnable {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick {
    /// Sleepers whose countdown ran out.
    pub woken: usize,
    /// The running process used up its quantum and should yield.
    pub quantum_expired: bool,
}

#[derive(Debug)]
pub struct Kernel<'r, const N: usize = MAX_PROCS> {
    memory: RegionAllocator<'r>,
    table: ProcessTable<N>,
    scheduler: Scheduler<N>,
    config: KernelConfig,
    hooks: ProcessHooks,
    started: bool,
    /// Receives the registers of an outgoing context that will never resume.
    discard: SavedContext,
}

impl<'r, const N: usize> Kernel<'r, N> {
    /// Builds the kernel and installs the idle process in slot 0.
    ///
    /// `idle` must never return or block. `hooks` bracket the entry function
    /// of every process, idle included.
    pub fn new(
        mut memory: RegionAllocator<'r>,
        idle: Entry,
        hooks: ProcessHooks,
        config: KernelConfig,
    ) -> Result<Self, KernelInitError> {
        const { assert!(N > 0, "the process table needs room for the idle process") };

        let mut table = ProcessTable::new(config.min_stack_size);
        let spawn = Spawn::new(idle)
            .name("idle")
            .priority(Priority::IDLE)
            .stack_size(config.idle_stack_size);
        table
            .install(Pid::IDLE, &mut memory, &spawn, hooks)
            .context(IdleStackSnafu)?;

        log::info!(
            "kernel: {} process slots, {:?} policy, quantum {:?}",
            N,
            config.policy,
            config.quantum,
        );
        Ok(Self {
            memory,
            table,
            scheduler: Scheduler::new(config.policy, config.quantum),
            config,
            hooks,
            started: false,
            discard: SavedContext::Empty,
        })
    }

    /// Creates a READY process.
    pub fn spawn(&mut self, spawn: &Spawn<'_>) -> Result<Pid, CreateError> {
        let pid = self
            .table
            .create(&mut self.memory, spawn, self.hooks)
            .inspect_err(|err| log::warn!("process creation failed: {err}"))?;
        self.scheduler.make_ready(&mut self.table, pid);
        self.scheduler.stats_mut().processes_created += 1;
        log::debug!(
            "created process {pid} {:?} with priority {}",
            spawn.name,
            spawn.priority
        );
        Ok(pid)
    }

    /// Creates an unnamed READY process.
    pub fn create(
        &mut self,
        entry: Entry,
        priority: Priority,
        stack_size: usize,
    ) -> Result<Pid, CreateError> {
        self.spawn(&Spawn::new(entry).priority(priority).stack_size(stack_size))
    }

    /// Terminates `pid` and returns its stack to the heap.
    ///
    /// When `pid` is the running process the returned request switches away
    /// from it for good.
    pub fn terminate(&mut self, pid: Pid) -> Result<Option<SwitchRequest>, TerminateError> {
        if pid.is_idle() {
            return IdleSnafu.fail();
        }
        if self.table.pcb(pid).is_none() {
            return NotFoundSnafu { pid }.fail();
        }

        let was_current = self.scheduler.current() == Some(pid);
        self.scheduler.forget(pid);
        if let Err(err) = self.table.release(&mut self.memory, pid) {
            error::report(err);
        }
        self.scheduler.stats_mut().processes_terminated += 1;
        log::debug!("terminated process {pid}");

        Ok(if was_current { self.dispatch() } else { None })
    }

    /// Terminates the running process.
    pub fn exit_current(&mut self) -> Result<Option<SwitchRequest>, TerminateError> {
        let Some(current) = self.scheduler.current() else {
            return NotRunningSnafu.fail();
        };
        self.terminate(current)
    }

    /// Moves the running process to the back of the line.
    ///
    /// Returns `None` if nothing is running or the running process is chosen
    /// again.
    pub fn yield_current(&mut self) -> Option<SwitchRequest> {
        let current = self.scheduler.current()?;
        self.scheduler.make_ready(&mut self.table, current);
        self.dispatch()
    }

    /// Puts the running process to sleep for `ticks` timer ticks.
    pub fn sleep_current(&mut self, ticks: u32) -> Result<Option<SwitchRequest>, BlockError> {
        if ticks == 0 {
            return ZeroTicksSnafu.fail();
        }
        self.block_current(ProcessState::Sleep, |pcb| pcb.sleep_ticks = ticks)
    }

    /// Blocks the running process until [`wakeup`](Self::wakeup) is called
    /// with `key`.
    pub fn wait_current(&mut self, key: EventKey) -> Result<Option<SwitchRequest>, BlockError> {
        self.block_current(ProcessState::Wait, |pcb| pcb.wait_key = Some(key))
    }

    fn block_current<F>(
        &mut self,
        state: ProcessState,
        f: F,
    ) -> Result<Option<SwitchRequest>, BlockError>
    where
        F: FnOnce(&mut Pcb),
    {
        let Some(current) = self.scheduler.current() else {
            return NoCurrentSnafu.fail();
        };
        if current.is_idle() {
            return IdleCannotBlockSnafu.fail();
        }
        let Some(pcb) = self.table.pcb_mut(current) else {
            return NoCurrentSnafu.fail();
        };
        pcb.state = state;
        f(pcb);
        Ok(self.dispatch())
    }

    /// Makes every process waiting on `key` READY. Returns how many woke.
    ///
    /// Does not reschedule; woken processes run at the next reschedule.
    pub fn wakeup(&mut self, key: EventKey) -> usize {
        let mut woken = ArrayVec::<Pid, N>::new();
        for pcb in self.table.pcbs_mut() {
            if pcb.state == ProcessState::Wait && pcb.wait_key == Some(key) {
                pcb.wait_key = None;
                woken.push(pcb.pid);
            }
        }
        for &pid in &woken {
            self.scheduler.make_ready(&mut self.table, pid);
        }
        woken.len()
    }

    /// Advances sleep countdowns and the running process's quantum by one
    /// tick.
    pub fn timer_tick(&mut self) -> Tick {
        self.scheduler.stats_mut().ticks += 1;

        let mut expired = ArrayVec::<Pid, N>::new();
        for pcb in self.table.pcbs_mut() {
            if pcb.state != ProcessState::Sleep {
                continue;
            }
            pcb.sleep_ticks = pcb.sleep_ticks.saturating_sub(1);
            if pcb.sleep_ticks == 0 {
                expired.push(pcb.pid);
            }
        }
        for &pid in &expired {
            self.scheduler.make_ready(&mut self.table, pid);
        }

        Tick {
            woken: expired.len(),
            quantum_expired: self.scheduler.consume_quantum(),
        }
    }

    /// Dispatches the first process. Can only be done once.
    pub fn start(&mut self) -> Result<SwitchRequest, StartError> {
        if self.started {
            return AlreadyStartedSnafu.fail();
        }
        if self.table.pcb(Pid::IDLE).is_none() {
            return NoRunnableSnafu.fail();
        }
        self.started = true;
        log::info!(
            "starting scheduler with {} processes",
            self.table.active()
        );
        match self.dispatch() {
            Some(request) => Ok(request),
            None => NoRunnableSnafu.fail(),
        }
    }

    fn dispatch(&mut self) -> Option<SwitchRequest> {
        match self.scheduler.reschedule(&mut self.table) {
            Dispatch::Stay => None,
            Dispatch::Switch { from, to } => {
                let save = match from {
                    Some(pid) => self.table.context_ptr(pid),
                    None => &raw mut self.discard,
                };
                let load = self.table.context_ptr(to).cast_const();
                Some(SwitchRequest::new(from, to, save, load))
            }
        }
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn current(&self) -> Option<Pid> {
        self.scheduler.current()
    }

    pub fn get(&self, pid: Pid) -> Result<ProcessInfo, LookupError> {
        self.table.get(pid)
    }

    #[must_use]
    pub fn count_by_state(&self, state: ProcessState) -> usize {
        self.table.count_by_state(state)
    }

    /// Snapshots of every live process in pid order.
    pub fn processes(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.table.iter()
    }

    #[must_use]
    pub fn table(&self) -> &ProcessTable<N> {
        &self.table
    }

    #[must_use]
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.memory.heap_stats()
    }

    #[must_use]
    pub fn memory(&self) -> &RegionAllocator<'r> {
        &self.memory
    }

    /// General-purpose allocations share the heap with process stacks.
    pub fn memory_mut(&mut self) -> &mut RegionAllocator<'r> {
        &mut self.memory
    }

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}
