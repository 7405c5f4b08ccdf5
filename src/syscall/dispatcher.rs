//! Trapframe-to-syscall fan-out. Decodes arguments with [`ArgDecoder`],
//! copies user buffers in/out through the VM layer (the real kernel's
//! `copyin`/`copyout` are external collaborators, built here on the same
//! fault-driven path `execv`'s argument layout uses), and encodes the
//! MIPS-style success/error convention back onto the trapframe.

use crate::errno::Errno;
use crate::fs::OpenFlags;
use crate::param::PAGE_SIZE;
use crate::syscall::elf::ElfLoader;
use crate::syscall::kernel::Kernel;
use crate::syscall::trapframe::{ArgDecoder, Trapframe};
use crate::syscall::{sysfile, sysproc};
use crate::vm::pte::PteState;
use crate::vm::{vm_fault, FaultType};

/// Mirrors the ordering `SPEC_FULL.md`'s syscall ABI section lists; these
/// are this crate's own numbering, not a real MIPS/xv6 ABI.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyscallNumber {
    Reboot,
    Time,
    Open,
    Read,
    Write,
    Close,
    Lseek,
    Dup2,
    Getcwd,
    Chdir,
    Fork,
    Getpid,
    Execv,
    Waitpid,
    Exit,
    Sbrk,
}

impl SyscallNumber {
    fn from_u32(n: u32) -> Option<SyscallNumber> {
        use SyscallNumber::*;
        Some(match n {
            0 => Reboot,
            1 => Time,
            2 => Open,
            3 => Read,
            4 => Write,
            5 => Close,
            6 => Lseek,
            7 => Dup2,
            8 => Getcwd,
            9 => Chdir,
            10 => Fork,
            11 => Getpid,
            12 => Execv,
            13 => Waitpid,
            14 => Exit,
            15 => Sbrk,
            _ => return None,
        })
    }
}

fn copyin(kernel: &Kernel, asp: &crate::vm::AddressSpace, vaddr: u64, len: usize) -> Result<Vec<u8>, Errno> {
    let mut out = vec![0u8; len];
    let mut read = 0usize;
    while read < len {
        let addr = vaddr + read as u64;
        let page_base = addr & !(PAGE_SIZE - 1);
        let offset = (addr - page_base) as usize;
        vm_fault(FaultType::Read, addr, asp, &kernel.coremap, &kernel.swap, &kernel.tlb)?;
        let pte = asp.find_pte(page_base).expect("vm_fault just installed this PTE");
        let frame = match pte.inner.lock().state {
            PteState::Mapped { frame } => frame,
            other => panic!("copyin: expected Mapped after vm_fault, got {other:?}"),
        };
        let n = (PAGE_SIZE as usize - offset).min(len - read);
        kernel.coremap.read_at(frame, offset, &mut out[read..read + n]);
        read += n;
    }
    Ok(out)
}

fn copyout(kernel: &Kernel, asp: &crate::vm::AddressSpace, vaddr: u64, data: &[u8]) -> Result<(), Errno> {
    let mut written = 0usize;
    while written < data.len() {
        let addr = vaddr + written as u64;
        let page_base = addr & !(PAGE_SIZE - 1);
        let offset = (addr - page_base) as usize;
        vm_fault(FaultType::Write, addr, asp, &kernel.coremap, &kernel.swap, &kernel.tlb)?;
        let pte = asp.find_pte(page_base).expect("vm_fault just installed this PTE");
        let frame = match pte.inner.lock().state {
            PteState::Mapped { frame } => frame,
            other => panic!("copyout: expected Mapped after vm_fault, got {other:?}"),
        };
        let n = (PAGE_SIZE as usize - offset).min(data.len() - written);
        kernel.coremap.write_at(frame, offset, &data[written..written + n]);
        written += n;
    }
    Ok(())
}

/// Runs one syscall end to end: decode args, dispatch, encode the return
/// convention, advance the saved PC. `loader` is only consulted for
/// `execv`.
pub fn dispatch(kernel: &Kernel, pid: i32, frame: &mut Trapframe, loader: &dyn ElfLoader) {
    let result = run(kernel, pid, frame, loader);
    match result {
        Ok(Outcome::Value32(v)) => frame.set_success(v),
        Ok(Outcome::Value64(v)) => frame.set_success64(v),
        Ok(Outcome::NoReturn) => {}
        Err(e) => frame.set_error(e.code()),
    }
    frame.pc_advanced = true;
}

enum Outcome {
    Value32(u32),
    Value64(u64),
    /// `_exit`: the trapframe is never resumed.
    NoReturn,
}

fn run(kernel: &Kernel, pid: i32, frame: &Trapframe, loader: &dyn ElfLoader) -> Result<Outcome, Errno> {
    let Some(number) = SyscallNumber::from_u32(frame.syscall_num) else {
        return Err(Errno::Enosys);
    };
    let mut args = ArgDecoder::new(frame);

    match number {
        SyscallNumber::Reboot | SyscallNumber::Time => Err(Errno::Enosys),

        SyscallNumber::Open => {
            let path_vaddr = args.arg32() as u64;
            let flags = OpenFlags::from_bits_truncate(args.arg32());
            let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
            let asp = process.addrspace().ok_or(Errno::Efault)?;
            let path = read_cstring(kernel, &asp, path_vaddr)?;
            let fd = sysfile::open(kernel, pid, &path, flags)?;
            Ok(Outcome::Value32(fd as u32))
        }

        SyscallNumber::Read => {
            let fd = args.arg_i32();
            let buf_vaddr = args.arg32() as u64;
            let len = args.arg32() as usize;
            let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
            let asp = process.addrspace().ok_or(Errno::Efault)?;
            let mut buf = vec![0u8; len];
            let n = sysfile::read(kernel, pid, fd, &mut buf)?;
            copyout(kernel, &asp, buf_vaddr, &buf[..n])?;
            Ok(Outcome::Value32(n as u32))
        }

        SyscallNumber::Write => {
            let fd = args.arg_i32();
            let buf_vaddr = args.arg32() as u64;
            let len = args.arg32() as usize;
            let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
            let asp = process.addrspace().ok_or(Errno::Efault)?;
            let buf = copyin(kernel, &asp, buf_vaddr, len)?;
            let n = sysfile::write(kernel, pid, fd, &buf)?;
            Ok(Outcome::Value32(n as u32))
        }

        SyscallNumber::Close => {
            let fd = args.arg_i32();
            sysfile::close(kernel, pid, fd)?;
            Ok(Outcome::Value32(0))
        }

        SyscallNumber::Lseek => {
            let fd = args.arg_i32();
            let offset = args.arg64() as i64;
            let whence = args.arg_i32();
            let result = sysfile::lseek(kernel, pid, fd, offset, whence)?;
            Ok(Outcome::Value64(result))
        }

        SyscallNumber::Dup2 => {
            let oldfd = args.arg_i32();
            let newfd = args.arg_i32();
            let result = sysfile::dup2(kernel, pid, oldfd, newfd)?;
            Ok(Outcome::Value32(result as u32))
        }

        SyscallNumber::Getcwd => {
            let buf_vaddr = args.arg32() as u64;
            let len = args.arg32() as usize;
            let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
            let asp = process.addrspace().ok_or(Errno::Efault)?;
            let cwd = sysfile::getcwd(kernel, pid)?;
            let mut bytes = cwd.into_bytes();
            bytes.push(0);
            if bytes.len() > len {
                return Err(Errno::Einval);
            }
            copyout(kernel, &asp, buf_vaddr, &bytes)?;
            Ok(Outcome::Value32(bytes.len() as u32 - 1))
        }

        SyscallNumber::Chdir => {
            let path_vaddr = args.arg32() as u64;
            let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
            let asp = process.addrspace().ok_or(Errno::Efault)?;
            let path = read_cstring(kernel, &asp, path_vaddr)?;
            sysfile::chdir(kernel, pid, &path)?;
            Ok(Outcome::Value32(0))
        }

        SyscallNumber::Fork => {
            let child_pid = sysproc::fork(kernel, pid)?;
            Ok(Outcome::Value32(child_pid as u32))
        }

        SyscallNumber::Getpid => Ok(Outcome::Value32(sysproc::getpid(pid) as u32)),

        SyscallNumber::Execv => {
            let path_vaddr = args.arg32() as u64;
            let argv_vaddr = args.arg32() as u64;
            let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
            let asp = process.addrspace().ok_or(Errno::Efault)?;
            let path = read_cstring(kernel, &asp, path_vaddr)?;
            let argv = read_argv(kernel, &asp, argv_vaddr)?;
            let result = sysproc::exec(kernel, pid, &path, &argv, loader)?;
            Ok(Outcome::Value32(result.entry as u32))
        }

        SyscallNumber::Waitpid => {
            let target = args.arg_i32();
            let options = args.arg_i32();
            let status = sysproc::waitpid(kernel, pid, target, options)?;
            Ok(Outcome::Value32(status as u32))
        }

        SyscallNumber::Exit => {
            let code = args.arg_i32();
            sysproc::exit(kernel, pid, code);
            Ok(Outcome::NoReturn)
        }

        SyscallNumber::Sbrk => {
            let delta = args.arg_i32() as i64;
            let old_break = sysproc::sbrk(kernel, pid, delta)?;
            Ok(Outcome::Value32(old_break as u32))
        }
    }
}

fn read_cstring(kernel: &Kernel, asp: &crate::vm::AddressSpace, vaddr: u64) -> Result<String, Errno> {
    let mut bytes = Vec::new();
    for offset in 0..crate::param::PATH_MAX as u64 {
        let chunk = copyin(kernel, asp, vaddr + offset, 1)?;
        if chunk[0] == 0 {
            return String::from_utf8(bytes).map_err(|_| Errno::Einval);
        }
        bytes.push(chunk[0]);
    }
    Err(Errno::Einval)
}

/// `argv` as a user-space null-terminated array of pointers, each pointing
/// at a null-terminated string (the layout `execv`'s argument stager
/// produces).
fn read_argv(kernel: &Kernel, asp: &crate::vm::AddressSpace, argv_vaddr: u64) -> Result<Vec<String>, Errno> {
    let mut result = Vec::new();
    for i in 0..crate::param::ARG_COUNT_MAX as u64 {
        let ptr_bytes = copyin(kernel, asp, argv_vaddr + i * 8, 8)?;
        let str_addr = u64::from_le_bytes(ptr_bytes.try_into().unwrap());
        if str_addr == 0 {
            return Ok(result);
        }
        result.push(read_cstring(kernel, asp, str_addr)?);
    }
    Err(Errno::E2big)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileTable;
    use crate::param::PID_MIN;
    use crate::proc::Process;
    use crate::syscall::elf::FixedEntryLoader;
    use crate::vm::AddressSpace;
    use std::sync::Arc;

    fn kernel_with_process() -> (Kernel, i32) {
        let kernel = Kernel::bootstrap(64, 0, None);
        let (pid, process) = kernel
            .procs
            .add_child(PID_MIN, |pid| Process::new(pid, "p", Some(PID_MIN), FileTable::with_console()))
            .unwrap();
        process.set_addrspace(Arc::new(AddressSpace::new(pid as u64)));
        process.addrspace().unwrap().prepare_load();
        (kernel, pid)
    }

    #[test]
    fn unknown_syscall_number_is_enosys() {
        let (kernel, pid) = kernel_with_process();
        let loader = FixedEntryLoader::default();
        let mut frame = Trapframe::new(999, [0; 4], vec![]);
        dispatch(&kernel, pid, &mut frame, &loader);
        assert_eq!(frame.a3, 1);
        assert_eq!(frame.v0, Errno::Enosys.code() as u32);
        assert!(frame.pc_advanced);
    }

    #[test]
    fn getpid_round_trips_through_the_dispatcher() {
        let (kernel, pid) = kernel_with_process();
        let loader = FixedEntryLoader::default();
        let mut frame = Trapframe::new(11, [0; 4], vec![]);
        dispatch(&kernel, pid, &mut frame, &loader);
        assert_eq!(frame.a3, 0);
        assert_eq!(frame.v0 as i32, pid);
    }

    #[test]
    fn getcwd_copies_the_default_path_out_to_user_memory() {
        let (kernel, pid) = kernel_with_process();
        let loader = FixedEntryLoader::default();
        let buf_vaddr = 0x7fff_0000u64;
        let mut frame = Trapframe::new(8, [buf_vaddr as u32, 16, 0, 0], vec![]);
        dispatch(&kernel, pid, &mut frame, &loader);
        assert_eq!(frame.a3, 0);

        let process = kernel.procs.get(pid).unwrap();
        let asp = process.addrspace().unwrap();
        let got = copyin(&kernel, &asp, buf_vaddr, 2).unwrap();
        assert_eq!(&got, b"/\0");
    }

    #[test]
    fn write_then_read_round_trips_user_buffer_through_console() {
        let (kernel, pid) = kernel_with_process();
        let loader = FixedEntryLoader::default();
        let buf_vaddr = 0x7fff_1000u64;
        let process = kernel.procs.get(pid).unwrap();
        let asp = process.addrspace().unwrap();
        copyout(&kernel, &asp, buf_vaddr, b"hi").unwrap();

        let mut frame = Trapframe::new(4, [1, buf_vaddr as u32, 2, 0], vec![]);
        dispatch(&kernel, pid, &mut frame, &loader);
        assert_eq!(frame.a3, 0);
        assert_eq!(frame.v0, 2);
    }

    #[test]
    fn exit_produces_no_return_value() {
        let (kernel, pid) = kernel_with_process();
        let loader = FixedEntryLoader::default();
        let mut frame = Trapframe::new(14, [7, 0, 0, 0], vec![]);
        dispatch(&kernel, pid, &mut frame, &loader);
        assert!(frame.pc_advanced);
        assert_eq!(kernel.procs.status(pid), Some(crate::proc::ProcStatus::Zombie));
    }
}
