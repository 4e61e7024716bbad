//! Ring buffer of ready pids for the round-robin policy.

use crate::task::Pid;

/// FIFO of at most `N` pids.
#[derive(Debug, Clone)]
pub(crate) struct ReadyQueue<const N: usize> {
    slots: [Option<Pid>; N],
    head: usize,
    len: usize,
}

impl<const N: usize> ReadyQueue<N> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [None; N],
            head: 0,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Appends `pid`; returns `false` if the queue is full.
    pub(crate) fn push_back(&mut self, pid: Pid) -> bool {
        if self.len == N {
            return false;
        }
        self.slots[(self.head + self.len) % N] = Some(pid);
        self.len += 1;
        true
    }

    pub(crate) fn pop_front(&mut self) -> Option<Pid> {
        if self.len == 0 {
            return None;
        }
        let pid = self.slots[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        pid
    }

    pub(crate) fn contains(&self, pid: Pid) -> bool {
        self.iter().any(|queued| queued == pid)
    }

    /// Removes every occurrence of `pid`, keeping the order of the rest.
    pub(crate) fn remove(&mut self, pid: Pid) {
        for _ in 0..self.len {
            if let Some(queued) = self.pop_front()
                && queued != pid
            {
                self.push_back(queued);
            }
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        (0..self.len).filter_map(|i| self.slots[(self.head + i) % N])
    }
}
