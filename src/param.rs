//! Kernel-wide tunables, collected in one place the way a classic
//! `kern/conf/param.h` does.

/// Size in bytes of one page / physical frame / coremap slot.
pub const PAGE_SIZE: u64 = 4096;

/// Number of pages backing the user stack window.
pub const VM_STACKPAGES: u64 = 128;

/// Top of user address space; the stack grows down from here.
pub const USERSTACK: u64 = 0x8000_0000;

/// Lowest valid process id. PID 0 is never assigned; PID 1 is the kernel proc.
pub const PID_MIN: i32 = 1;
/// Highest valid process id the table can hold.
pub const PID_MAX: i32 = 128;
/// Total process table slots, PID_MIN..=PID_MAX inclusive.
pub const NPROC: usize = (PID_MAX - PID_MIN + 1) as usize;

/// Maximum open file descriptors per process.
pub const OPEN_MAX: usize = 64;
/// Maximum path length, including the terminating nul.
pub const PATH_MAX: usize = 128;
/// Maximum total bytes of argv strings accepted by execv.
pub const ARG_MAX: usize = 4096;
/// Maximum number of argv entries arrayvec-backed staging can hold.
pub const ARG_COUNT_MAX: usize = 64;

/// Number of hardware TLB slots, mirrored from the MIPS-style platform.
pub const NUM_TLB: usize = 64;
