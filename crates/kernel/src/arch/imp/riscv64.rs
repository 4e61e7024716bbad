use core::{arch::naked_asm, mem::offset_of};

use dataview::{Pod, PodMethods as _};

use crate::task::context::{Entry, ProcessHooks};

/// Registers preserved across a call, plus the resume address.
///
/// Before the first dispatch of a process, `ra` holds the trampoline and
/// `s1`..`s4` carry its arguments.
#[derive(Debug, Clone, Copy, Pod)]
#[repr(C)]
pub struct Context {
    ra: usize,
    sp: usize,
    s0: usize,
    s1: usize,
    s2: usize,
    s3: usize,
    s4: usize,
    s5: usize,
    s6: usize,
    s7: usize,
    s8: usize,
    s9: usize,
    s10: usize,
    s11: usize,
}

impl Context {
    /// Register set whose first `ret` lands in the process trampoline with
    /// `sp` at `stack_top`.
    pub(crate) fn first_run(entry: Entry, stack_top: usize, hooks: ProcessHooks) -> Self {
        Self {
            ra: process_trampoline as usize,
            sp: stack_top,
            s1: entry.func() as usize,
            s2: entry.arg(),
            s3: hooks.on_start as usize,
            s4: hooks.on_return as usize,
            ..Self::zeroed()
        }
    }

    #[must_use]
    pub fn stack_pointer(&self) -> usize {
        self.sp
    }
}

/// Stores the running process's registers in `old` and returns into the
/// process described by `new`.
///
/// Returns to the caller only when some later switch loads `old` again.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(old: *mut Context, new: *const Context) {
    naked_asm!(
        "sd ra, {c_ra}(a0)",
        "sd sp, {c_sp}(a0)",
        "sd s0, {c_s0}(a0)",
        "sd s1, {c_s1}(a0)",
        "sd s2, {c_s2}(a0)",
        "sd s3, {c_s3}(a0)",
        "sd s4, {c_s4}(a0)",
        "sd s5, {c_s5}(a0)",
        "sd s6, {c_s6}(a0)",
        "sd s7, {c_s7}(a0)",
        "sd s8, {c_s8}(a0)",
        "sd s9, {c_s9}(a0)",
        "sd s10, {c_s10}(a0)",
        "sd s11, {c_s11}(a0)",
        "ld ra, {c_ra}(a1)",
        "ld sp, {c_sp}(a1)",
        "ld s0, {c_s0}(a1)",
        "ld s1, {c_s1}(a1)",
        "ld s2, {c_s2}(a1)",
        "ld s3, {c_s3}(a1)",
        "ld s4, {c_s4}(a1)",
        "ld s5, {c_s5}(a1)",
        "ld s6, {c_s6}(a1)",
        "ld s7, {c_s7}(a1)",
        "ld s8, {c_s8}(a1)",
        "ld s9, {c_s9}(a1)",
        "ld s10, {c_s10}(a1)",
        "ld s11, {c_s11}(a1)",
        "ret",
        c_ra = const offset_of!(Context, ra),
        c_sp = const offset_of!(Context, sp),
        c_s0 = const offset_of!(Context, s0),
        c_s1 = const offset_of!(Context, s1),
        c_s2 = const offset_of!(Context, s2),
        c_s3 = const offset_of!(Context, s3),
        c_s4 = const offset_of!(Context, s4),
        c_s5 = const offset_of!(Context, s5),
        c_s6 = const offset_of!(Context, s6),
        c_s7 = const offset_of!(Context, s7),
        c_s8 = const offset_of!(Context, s8),
        c_s9 = const offset_of!(Context, s9),
        c_s10 = const offset_of!(Context, s10),
        c_s11 = const offset_of!(Context, s11),
    )
}

/// First code a process runs. Moves the values primed by
/// [`Context::first_run`] into argument registers.
#[unsafe(naked)]
unsafe extern "C" fn process_trampoline() -> ! {
    naked_asm!(
        "mv a0, s1",
        "mv a1, s2",
        "mv a2, s3",
        "mv a3, s4",
        "j {run_process}",
        run_process = sym run_process,
    );
}

extern "C" fn run_process(
    func: extern "C" fn(usize),
    arg: usize,
    on_start: extern "C" fn(),
    on_return: extern "C" fn() -> !,
) -> ! {
    on_start();
    func(arg);
    on_return()
}
