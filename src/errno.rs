//! The MIPS-style syscall error taxonomy, shared by every subsystem.
//!
//! Subsystems return their own narrower error enums; [`Errno`] is what
//! survives to the syscall boundary, the same funnel a real `Syscall::call`
//! performs by collapsing subsystem results to a `u64`.

use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Errno {
    /// Bad address.
    Efault,
    /// Invalid argument.
    Einval,
    /// Bad file descriptor.
    Ebadf,
    /// Too many open files.
    Emfile,
    /// Out of memory.
    Enomem,
    /// Too many processes.
    Enproc,
    /// No such process.
    Esrch,
    /// No child processes.
    Echild,
    /// Argument list too long.
    E2big,
    /// Illegal seek.
    Espipe,
    /// Function not implemented / unknown syscall.
    Enosys,
}

impl Errno {
    /// The positive error code returned in v0 on syscall failure.
    pub fn code(self) -> i32 {
        match self {
            Errno::Efault => 14,
            Errno::Einval => 22,
            Errno::Ebadf => 9,
            Errno::Emfile => 24,
            Errno::Enomem => 12,
            Errno::Enproc => 82,
            Errno::Esrch => 3,
            Errno::Echild => 10,
            Errno::E2big => 7,
            Errno::Espipe => 29,
            Errno::Enosys => 89,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Errno::Efault => "EFAULT",
            Errno::Einval => "EINVAL",
            Errno::Ebadf => "EBADF",
            Errno::Emfile => "EMFILE",
            Errno::Enomem => "ENOMEM",
            Errno::Enproc => "ENPROC",
            Errno::Esrch => "ESRCH",
            Errno::Echild => "ECHILD",
            Errno::E2big => "E2BIG",
            Errno::Espipe => "ESPIPE",
            Errno::Enosys => "ENOSYS",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for Errno {}

pub type KResult<T> = Result<T, Errno>;
