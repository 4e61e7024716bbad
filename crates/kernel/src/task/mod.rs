//! Processes: identifiers, states, priorities and the process table.

use core::fmt;

use arrayvec::ArrayString;

pub use self::table::{CreateError, LookupError, ProcessTable, ReleaseError};
use crate::config::DEFAULT_STACK_SIZE;

pub mod context;
pub(crate) mod pcb;
pub mod scheduler;
mod table;

/// Process identifier: the index of the process's slot in the table.
///
/// Slots are reused, so a pid is only unique among live processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(usize);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Pid {
    /// The idle process always occupies slot 0.
    pub const IDLE: Self = Self(0);

    #[must_use]
    pub const fn from_raw(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Vacant slot.
    Terminated,
    Current,
    Ready,
    Sleep,
    Wait,
}

impl ProcessState {
    pub const ALL: [Self; 5] = [
        Self::Terminated,
        Self::Current,
        Self::Ready,
        Self::Sleep,
        Self::Wait,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terminated => "TERMINATED",
            Self::Current => "CURRENT",
            Self::Ready => "READY",
            Self::Sleep => "SLEEP",
            Self::Wait => "WAIT",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Scheduling priority. Larger values are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(u32);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Priority {
    /// Reserved for the idle process.
    pub const IDLE: Self = Self(0);
    pub const LOW: Self = Self(1);
    pub const NORMAL: Self = Self(2);
    pub const HIGH: Self = Self(3);

    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// One aging step.
    #[must_use]
    pub const fn aged(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    #[must_use]
    pub const fn class(self) -> PriorityClass {
        match self.0 {
            0 | 1 => PriorityClass::Low,
            2 => PriorityClass::Normal,
            _ => PriorityClass::High,
        }
    }
}

/// Ready-queue class used by the round-robin policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    Low,
    Normal,
    High,
}

impl PriorityClass {
    pub const COUNT: usize = 3;

    /// Classes in dispatch order.
    pub const BY_PRECEDENCE: [Self; Self::COUNT] = [Self::High, Self::Normal, Self::Low];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Maximum length of a process name, in bytes.
pub const NAME_CAPACITY: usize = 15;

pub type ProcessName = ArrayString<NAME_CAPACITY>;

/// Builds a process name, truncating on a character boundary.
#[must_use]
pub fn process_name(name: &str) -> ProcessName {
    let mut end = name.len().min(NAME_CAPACITY);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut buf = ProcessName::new();
    buf.push_str(&name[..end]);
    buf
}

/// Parameters of a new process.
#[derive(Debug, Clone, Copy)]
pub struct Spawn<'a> {
    pub name: &'a str,
    pub entry: context::Entry,
    pub priority: Priority,
    pub stack_size: usize,
}

impl<'a> Spawn<'a> {
    /// An unnamed process with [`Priority::NORMAL`] and the default stack
    /// size.
    #[must_use]
    pub const fn new(entry: context::Entry) -> Self {
        Self {
            name: "",
            entry,
            priority: Priority::NORMAL,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    #[must_use]
    pub const fn name(mut self, name: &'a str) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

/// Read-only snapshot of one occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: ProcessName,
    pub state: ProcessState,
    pub base_priority: Priority,
    pub dynamic_priority: Priority,
    pub stack_size: usize,
    /// Remaining ticks, meaningful in [`ProcessState::Sleep`].
    pub sleep_ticks: u32,
    /// Meaningful in [`ProcessState::Wait`].
    pub wait_key: Option<EventKey>,
}

/// Application-defined key that `wait` and `wakeup` rendezvous on.
pub type EventKey = u32;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_classes() {
        assert_eq!(Priority::IDLE.class(), PriorityClass::Low);
        assert_eq!(Priority::LOW.class(), PriorityClass::Low);
        assert_eq!(Priority::NORMAL.class(), PriorityClass::Normal);
        assert_eq!(Priority::HIGH.class(), PriorityClass::High);
        assert_eq!(Priority::new(40).class(), PriorityClass::High);
    }

    #[test]
    fn test_aging_saturates() {
        assert_eq!(Priority::LOW.aged(), Priority::NORMAL);
        assert_eq!(Priority::new(u32::MAX).aged(), Priority::new(u32::MAX));
    }

    #[test]
    fn test_process_name_truncation() {
        assert_eq!(process_name("shell").as_str(), "shell");
        assert_eq!(
            process_name("a-very-long-process-name").as_str(),
            "a-very-long-pro"
        );
        // 'é' is two bytes and would straddle the limit
        let name = process_name("abcdefghijklmné");
        assert_eq!(name.as_str(), "abcdefghijklmn");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format_padded(ProcessState::Sleep).as_str(), "SLEEP   ");
    }

    fn format_padded(state: ProcessState) -> ArrayString<16> {
        use core::fmt::Write as _;
        let mut buf = ArrayString::new();
        write!(buf, "{state:8}").unwrap();
        buf
    }
}
