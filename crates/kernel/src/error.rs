use core::{error::Error, fmt};

/// Logs `err` with its source chain and halts.
#[track_caller]
pub fn report<E>(err: E) -> !
where
    E: Error,
{
    let report = Report::new(err);
    log::error!("critical error occurred\n{report}");
    panic!("critical error occurred\n\n{report}");
}

/// Formats an error followed by its chain of sources.
pub struct Report<E> {
    error: E,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.error)?;
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {s}")?;
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::string::ToString as _;

    use allocator::region::RegionAllocator;

    use super::*;
    use crate::{
        task::{ProcessTable, Spawn, context::Entry},
        testing::{TEST_HOOKS, noop_entry},
    };

    #[test]
    fn test_report_includes_sources() {
        let mut memory = RegionAllocator::new(&mut []);
        let mut table = ProcessTable::<4>::new(1024);
        let spawn = Spawn::new(Entry::new(noop_entry, 0));
        let err = table
            .create(&mut memory, &spawn, TEST_HOOKS)
            .unwrap_err();
        let text = Report::new(err).to_string();
        assert!(text.starts_with("Error: failed to allocate a 4096-byte stack\n"));
        assert!(text.contains("Caused by:\n   0: out of memory: cannot allocate 4096 bytes\n"));
    }

    #[test]
    #[should_panic(expected = "critical error occurred")]
    fn test_report_panics() {
        let mut memory = RegionAllocator::new(&mut []);
        let mut table = ProcessTable::<4>::new(1024);
        let spawn = Spawn::new(Entry::new(noop_entry, 0));
        let err = table
            .create(&mut memory, &spawn, TEST_HOOKS)
            .unwrap_err();
        report(err);
    }
}
