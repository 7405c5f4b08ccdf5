//! File-descriptor syscalls: open, read, write, close, lseek, dup2,
//! chdir, getcwd. Each is a thin per-process wrapper around [`FileTable`]
//! and [`InMemoryVfs`] — the syscall-level job is locating the calling
//! process and converting ESRCH for an unknown caller, the rest is already
//! enforced by the descriptor layer itself.

use crate::errno::Errno;
use crate::fs::OpenFlags;
use crate::syscall::kernel::Kernel;

pub fn open(kernel: &Kernel, pid: i32, path: &str, flags: OpenFlags) -> Result<i32, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    let vnode = kernel.vfs.open(path)?;
    process.files.open(vnode, flags)
}

pub fn read(kernel: &Kernel, pid: i32, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    process.files.get(fd)?.read(buf)
}

pub fn write(kernel: &Kernel, pid: i32, fd: i32, buf: &[u8]) -> Result<usize, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    process.files.get(fd)?.write(buf)
}

pub fn close(kernel: &Kernel, pid: i32, fd: i32) -> Result<(), Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    process.files.close(fd)
}

pub fn lseek(kernel: &Kernel, pid: i32, fd: i32, offset: i64, whence: i32) -> Result<u64, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    process.files.get(fd)?.seek(offset, whence)
}

pub fn dup2(kernel: &Kernel, pid: i32, oldfd: i32, newfd: i32) -> Result<i32, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    process.files.dup2(oldfd, newfd)
}

/// `chdir` updates both the calling process's own working directory and
/// the shared VFS cursor, mirroring a classic `vfs_chdir` (there is
/// no per-process current-directory vnode in this stand-in, so the string
/// recorded on [`crate::proc::Process`] is authoritative for `getcwd`).
pub fn chdir(kernel: &Kernel, pid: i32, path: &str) -> Result<(), Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    process.set_cwd(path);
    kernel.vfs.chdir(path);
    Ok(())
}

pub fn getcwd(kernel: &Kernel, pid: i32) -> Result<String, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    Ok(process.cwd())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Process;
    use crate::fs::FileTable;
    use crate::param::PID_MIN;
    use crate::vm::AddressSpace;
    use std::sync::Arc;

    fn kernel_with_process() -> (Kernel, i32) {
        let kernel = Kernel::bootstrap(16, 0, None);
        let (pid, process) = kernel
            .procs
            .add_child(PID_MIN, |pid| Process::new(pid, "p", Some(PID_MIN), FileTable::with_console()))
            .unwrap();
        process.set_addrspace(Arc::new(AddressSpace::new(pid as u64)));
        (kernel, pid)
    }

    #[test]
    fn open_write_seek_read_round_trips_through_the_vfs() {
        let (kernel, pid) = kernel_with_process();
        let fd = open(&kernel, pid, "/tmp/a", OpenFlags::RDWR).unwrap();
        assert_eq!(fd, 3);
        assert_eq!(write(&kernel, pid, fd, b"hello").unwrap(), 5);
        lseek(&kernel, pid, fd, 0, 0).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(read(&kernel, pid, fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn close_then_use_is_ebadf() {
        let (kernel, pid) = kernel_with_process();
        let fd = open(&kernel, pid, "/tmp/b", OpenFlags::RDWR).unwrap();
        close(&kernel, pid, fd).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(read(&kernel, pid, fd, &mut buf), Err(Errno::Ebadf));
    }

    #[test]
    fn chdir_updates_both_process_and_vfs_cwd() {
        let (kernel, pid) = kernel_with_process();
        chdir(&kernel, pid, "/usr/bin").unwrap();
        assert_eq!(getcwd(&kernel, pid).unwrap(), "/usr/bin");
        assert_eq!(kernel.vfs.getcwd(), "/usr/bin");
    }

    #[test]
    fn unknown_pid_is_esrch() {
        let kernel = Kernel::bootstrap(16, 0, None);
        assert_eq!(getcwd(&kernel, 99), Err(Errno::Esrch));
    }
}
