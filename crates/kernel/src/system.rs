//! Lock-protected kernel with a context switcher.
//!
//! [`System`] is what processes and the boot code call into. Every operation
//! locks the kernel, applies the change, drops the lock and only then
//! performs the context switch the kernel asked for. The switch therefore
//! never happens while the kernel is borrowed.
//!
//! From the moment the kernel decides on a switch until the incoming process
//! runs, the system counts as switching. The timer interrupt handler calls
//! [`System::timer_tick`]; a tick that finds the kernel locked or a switch in
//! flight is counted and applied as soon as the current operation or switch
//! completes. A resumed process completes its switch on return from the
//! switcher; a new process completes it through its
//! [`on_start`](crate::task::context::ProcessHooks) hook, which must call
//! [`System::finish_switch`].

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use allocator::free_list::HeapStats;
use arrayvec::ArrayVec;
use spin::{Mutex, MutexGuard};

use crate::{
    config::MAX_PROCS,
    error,
    kernel::{BlockError, Kernel, StartError, TerminateError},
    task::{
        CreateError, EventKey, LookupError, Pid, ProcessInfo, Spawn,
        context::{ContextSwitch, SwitchRequest},
        scheduler::SchedulerStats,
    },
};

#[derive(Debug)]
pub struct System<'r, S, const N: usize = MAX_PROCS> {
    kernel: Mutex<Kernel<'r, N>>,
    switcher: S,
    switching: AtomicBool,
    pending_ticks: AtomicU32,
}

impl<'r, S, const N: usize> System<'r, S, N>
where
    S: ContextSwitch,
{
    pub fn new(kernel: Kernel<'r, N>, switcher: S) -> Self {
        Self {
            kernel: Mutex::new(kernel),
            switcher,
            switching: AtomicBool::new(false),
            pending_ticks: AtomicU32::new(0),
        }
    }

    /// Dispatches the first process.
    ///
    /// With a native switcher this does not return: the boot context is
    /// discarded.
    ///
    /// # Panics
    ///
    /// Panics if there is nothing to run.
    pub fn start(&self) -> Result<(), StartError> {
        let mut kernel = self.kernel.lock();
        let request = match kernel.start() {
            Ok(request) => request,
            Err(err @ StartError::AlreadyStarted { .. }) => {
                self.unlock_and_switch(kernel, None);
                return Err(err);
            }
            Err(err) => error::report(err),
        };
        self.unlock_and_switch(kernel, Some(request));
        Ok(())
    }

    pub fn spawn(&self, spawn: &Spawn<'_>) -> Result<Pid, CreateError> {
        self.with_kernel(|kernel| kernel.spawn(spawn))
    }

    /// Terminates `pid`. Terminating the caller does not return.
    pub fn terminate(&self, pid: Pid) -> Result<(), TerminateError> {
        self.schedule(|kernel| kernel.terminate(pid))
    }

    /// Terminates the caller. Does not return when a process calls it.
    pub fn exit(&self) -> Result<(), TerminateError> {
        self.schedule(|kernel| kernel.exit_current())
    }

    pub fn yield_now(&self) {
        let mut kernel = self.kernel.lock();
        let request = kernel.yield_current();
        self.unlock_and_switch(kernel, request);
    }

    /// Sleeps for `ticks` timer ticks. Zero ticks does nothing.
    pub fn sleep(&self, ticks: u32) -> Result<(), BlockError> {
        if ticks == 0 {
            return Ok(());
        }
        self.schedule(|kernel| kernel.sleep_current(ticks))
    }

    /// Blocks until another process calls [`wakeup`](Self::wakeup) with
    /// `key`.
    pub fn wait(&self, key: EventKey) -> Result<(), BlockError> {
        self.schedule(|kernel| kernel.wait_current(key))
    }

    /// Wakes every process waiting on `key` without giving up the CPU.
    pub fn wakeup(&self, key: EventKey) -> usize {
        self.with_kernel(|kernel| kernel.wakeup(key))
    }

    /// Timer interrupt entry.
    pub fn timer_tick(&self) {
        self.pending_ticks.fetch_add(1, Ordering::AcqRel);
        self.apply_pending_ticks();
    }

    /// Marks the switch that brought the caller onto the CPU as complete and
    /// applies the ticks that arrived meanwhile.
    ///
    /// [`System`] calls this itself when a switch returns. A process that
    /// starts fresh must call it from its
    /// [`on_start`](crate::task::context::ProcessHooks) hook.
    pub fn finish_switch(&self) {
        self.switching.store(false, Ordering::Release);
        self.apply_pending_ticks();
    }

    /// Runs `f` with the kernel locked. `f` must not call back into `self`
    /// except for [`timer_tick`](Self::timer_tick).
    pub fn with_kernel<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Kernel<'r, N>) -> T,
    {
        let value = f(&mut self.kernel.lock());
        self.apply_pending_ticks();
        value
    }

    #[must_use]
    pub fn current(&self) -> Option<Pid> {
        self.with_kernel(|kernel| kernel.current())
    }

    pub fn get(&self, pid: Pid) -> Result<ProcessInfo, LookupError> {
        self.with_kernel(|kernel| kernel.get(pid))
    }

    #[must_use]
    pub fn processes(&self) -> ArrayVec<ProcessInfo, N> {
        self.with_kernel(|kernel| kernel.processes().collect())
    }

    #[must_use]
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.with_kernel(|kernel| kernel.scheduler_stats())
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.with_kernel(|kernel| kernel.heap_stats())
    }

    #[must_use]
    pub fn switcher(&self) -> &S {
        &self.switcher
    }

    fn schedule<F, E>(&self, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Kernel<'r, N>) -> Result<Option<SwitchRequest>, E>,
    {
        let mut kernel = self.kernel.lock();
        let (request, result) = match f(&mut kernel) {
            Ok(request) => (request, Ok(())),
            Err(err) => (None, Err(err)),
        };
        self.unlock_and_switch(kernel, request);
        result
    }

    /// Releases the kernel and performs `request`.
    ///
    /// The switching flag is raised before the lock is released, so no tick
    /// can act on the kernel until the switch has completed.
    fn unlock_and_switch(
        &self,
        kernel: MutexGuard<'_, Kernel<'r, N>>,
        request: Option<SwitchRequest>,
    ) {
        let Some(request) = request else {
            drop(kernel);
            self.apply_pending_ticks();
            return;
        };
        self.switching.store(true, Ordering::Release);
        drop(kernel);
        unsafe { self.switcher.switch(request) };
        self.finish_switch();
    }

    fn apply_pending_ticks(&self) {
        if self.pending_ticks.load(Ordering::Acquire) == 0 {
            return;
        }
        let Some(mut kernel) = self.kernel.try_lock() else {
            return;
        };
        // only raised while the lock is held, so this check cannot race
        if self.switching.load(Ordering::Acquire) {
            return;
        }
        let ticks = self.pending_ticks.swap(0, Ordering::AcqRel);
        let mut quantum_expired = false;
        for _ in 0..ticks {
            quantum_expired |= kernel.timer_tick().quantum_expired;
        }
        let request = if quantum_expired {
            kernel.yield_current()
        } else {
            None
        };
        self.unlock_and_switch(kernel, request);
    }
}
