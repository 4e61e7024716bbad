use dataview::Pod;

use crate::task::context::{Entry, ProcessHooks};

#[derive(Debug, Clone, Copy, Pod)]
#[repr(C)]
pub struct Context {
    sp: usize,
}

impl Context {
    pub(crate) fn first_run(_entry: Entry, stack_top: usize, _hooks: ProcessHooks) -> Self {
        Self { sp: stack_top }
    }

    #[must_use]
    pub fn stack_pointer(&self) -> usize {
        self.sp
    }
}

pub(crate) unsafe fn switch(_old: *mut Context, _new: *const Context) {
    unimplemented!("unsupported architecture");
}
