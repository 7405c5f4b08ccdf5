//! Process-lifetime syscalls: fork, execv, waitpid, _exit, getpid, sbrk.
//! There is no real thread layer to launch here (it is an external
//! collaborator this crate doesn't model), so `fork` here is
//! purely the data-structure half: address-space and file-table
//! duplication, PID reservation, and the parent/child return values a
//! caller would hand to that thread layer.

use crate::errno::Errno;
use crate::param::{ARG_COUNT_MAX, ARG_MAX, PAGE_SIZE, PATH_MAX};
use crate::proc::Process;
use crate::syscall::elf::ElfLoader;
use crate::syscall::kernel::Kernel;
use crate::vm::pte::PteState;
use crate::vm::{vm_fault, AddressSpace, FaultType};
use std::sync::Arc;

pub fn getpid(pid: i32) -> i32 {
    pid
}

/// Returns the child's PID to the parent. A real dispatcher would also
/// arrange for the child's own return value to be 0 by duplicating the
/// trapframe and setting its v0 to 0; that trapframe bookkeeping lives in
/// the dispatcher, not here.
pub fn fork(kernel: &Kernel, parent_pid: i32) -> Result<i32, Errno> {
    let parent = kernel.procs.get(parent_pid).ok_or(Errno::Esrch)?;
    let parent_as = parent.addrspace().ok_or(Errno::Efault)?;
    let child_as = parent_as.copy(&kernel.coremap, &kernel.swap, &kernel.tlb)?;
    let files = parent.files.fork_copy();
    let cwd = parent.cwd();
    let parent_name = parent.name();

    match kernel.procs.add_child(parent_pid, |pid| {
        let p = Process::new(pid, parent_name, Some(parent_pid), files);
        p.set_cwd(cwd);
        p
    }) {
        Ok((pid, child)) => {
            child.set_addrspace(Arc::new(child_as));
            Ok(pid)
        }
        Err(e) => {
            child_as.destroy(&kernel.coremap, &kernel.swap);
            Err(e)
        }
    }
}

pub fn waitpid(kernel: &Kernel, caller_pid: i32, target_pid: i32, options: i32) -> Result<i32, Errno> {
    kernel.procs.waitpid(caller_pid, target_pid, options)
}

/// `_exit` never returns to its caller in the real kernel; this crate
/// models that by simply not producing a continuation value.
pub fn exit(kernel: &Kernel, pid: i32, waitcode: i32) {
    if let Some(process) = kernel.procs.get(pid) {
        if let Some(asp) = process.addrspace() {
            asp.destroy(&kernel.coremap, &kernel.swap);
        }
    }
    kernel.procs.exit(pid, waitcode);
}

pub fn sbrk(kernel: &Kernel, pid: i32, delta: i64) -> Result<u64, Errno> {
    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    let asp = process.addrspace().ok_or(Errno::Efault)?;
    asp.sbrk(delta, &kernel.coremap, &kernel.swap, &kernel.tlb)
}

pub struct ExecResult {
    pub entry: u64,
    pub argc: i32,
    pub argv_base: u64,
    pub stack_pointer: u64,
}

/// `execv`. Builds the new address space before touching the process's
/// current one, so a failure (bad path, argument overflow, ENOMEM during
/// loading) leaves the caller's existing program intact.
pub fn exec(
    kernel: &Kernel,
    pid: i32,
    path: &str,
    argv: &[String],
    loader: &dyn ElfLoader,
) -> Result<ExecResult, Errno> {
    if path.len() > PATH_MAX {
        return Err(Errno::Einval);
    }
    if argv.len() > ARG_COUNT_MAX {
        return Err(Errno::E2big);
    }
    let total_bytes: usize = argv.iter().map(|s| s.len() + 1).sum();
    if total_bytes > ARG_MAX {
        return Err(Errno::E2big);
    }

    let process = kernel.procs.get(pid).ok_or(Errno::Esrch)?;
    let vnode = kernel.vfs.open(path)?;

    let new_as = AddressSpace::new(pid as u64);
    let entry = loader.load(vnode.as_ref(), &new_as)?;
    new_as.prepare_load();
    let stack_top = new_as.define_stack();

    let (argv_base, stack_pointer) =
        layout_argv(&new_as, kernel, stack_top, argv).map_err(|e| {
            new_as.destroy(&kernel.coremap, &kernel.swap);
            e
        })?;

    if let Some(old_as) = process.addrspace() {
        old_as.destroy(&kernel.coremap, &kernel.swap);
    }
    let new_as = Arc::new(new_as);
    process.set_addrspace(new_as.clone());
    new_as.activate(&kernel.tlb);

    Ok(ExecResult {
        entry,
        argc: argv.len() as i32,
        argv_base,
        stack_pointer,
    })
}

/// Packs `argv`'s strings downward from `stack_top`, then the argv pointer
/// array (pointer-aligned, null-terminated) below them. Returns
/// `(argv_base, final_stack_pointer)`.
fn layout_argv(
    asp: &AddressSpace,
    kernel: &Kernel,
    stack_top: u64,
    argv: &[String],
) -> Result<(u64, u64), Errno> {
    let mut cursor = stack_top;
    let mut string_addrs = Vec::with_capacity(argv.len());
    for s in argv {
        let len = s.len() as u64 + 1;
        cursor -= len;
        write_user_bytes(asp, kernel, cursor, s.as_bytes())?;
        write_user_bytes(asp, kernel, cursor + s.len() as u64, &[0u8])?;
        string_addrs.push(cursor);
    }

    cursor &= !7u64;
    let ptr_count = argv.len() as u64 + 1;
    let ptr_array_base = (cursor - ptr_count * 8) & !7u64;

    for (i, addr) in string_addrs.iter().enumerate() {
        write_user_bytes(asp, kernel, ptr_array_base + i as u64 * 8, &addr.to_le_bytes())?;
    }
    write_user_bytes(
        asp,
        kernel,
        ptr_array_base + argv.len() as u64 * 8,
        &0u64.to_le_bytes(),
    )?;

    Ok((ptr_array_base, ptr_array_base))
}

fn write_user_bytes(asp: &AddressSpace, kernel: &Kernel, vaddr: u64, data: &[u8]) -> Result<(), Errno> {
    let mut written = 0usize;
    while written < data.len() {
        let addr = vaddr + written as u64;
        let page_base = addr & !(PAGE_SIZE - 1);
        let offset_in_page = (addr - page_base) as usize;
        vm_fault(FaultType::Write, addr, asp, &kernel.coremap, &kernel.swap, &kernel.tlb)?;
        let pte = asp.find_pte(page_base).expect("vm_fault just installed this PTE");
        let frame = match pte.inner.lock().state {
            PteState::Mapped { frame } => frame,
            other => panic!("write_user_bytes: expected Mapped after vm_fault, got {other:?}"),
        };
        let n = (PAGE_SIZE as usize - offset_in_page).min(data.len() - written);
        kernel.coremap.write_at(frame, offset_in_page, &data[written..written + n]);
        written += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileTable;
    use crate::param::{PID_MIN, USERSTACK};
    use crate::syscall::elf::FixedEntryLoader;
    use crate::vm::swap::InMemoryBlockDevice;

    fn kernel_with_root_process() -> (Kernel, i32) {
        let kernel = Kernel::bootstrap(64, 0, Some(Box::new(InMemoryBlockDevice::new(32))));
        let (pid, process) = kernel
            .procs
            .add_child(PID_MIN, |pid| Process::new(pid, "init", Some(PID_MIN), FileTable::with_console()))
            .unwrap();
        process.set_addrspace(Arc::new(AddressSpace::new(pid as u64)));
        (kernel, pid)
    }

    #[test]
    fn fork_then_exit_then_wait_observes_exit_status() {
        let (kernel, pid) = kernel_with_root_process();
        let child_pid = fork(&kernel, pid).unwrap();
        assert_ne!(child_pid, pid);
        exit(&kernel, child_pid, 42);
        let status = waitpid(&kernel, pid, child_pid, 0).unwrap();
        assert_eq!(status, 42);
    }

    #[test]
    fn exec_lays_out_argv_strings_and_pointer_array() {
        let (kernel, pid) = kernel_with_root_process();
        let argv = vec!["/bin/true".to_string(), "-x".to_string(), "arg2".to_string()];
        let loader = FixedEntryLoader::default();
        let result = exec(&kernel, pid, "/bin/true", &argv, &loader).unwrap();

        assert_eq!(result.argc, 3);
        assert!(result.argv_base < USERSTACK);
        assert_eq!(result.argv_base % 8, 0);

        let process = kernel.procs.get(pid).unwrap();
        let asp = process.addrspace().unwrap();
        for (i, expected) in argv.iter().enumerate() {
            let mut ptr_bytes = [0u8; 8];
            read_user_bytes(&asp, &kernel, result.argv_base + i as u64 * 8, &mut ptr_bytes);
            let str_addr = u64::from_le_bytes(ptr_bytes);
            let mut buf = vec![0u8; expected.len()];
            read_user_bytes(&asp, &kernel, str_addr, &mut buf);
            assert_eq!(String::from_utf8(buf).unwrap(), *expected);
        }
        let mut null_bytes = [0u8; 8];
        read_user_bytes(&asp, &kernel, result.argv_base + 3 * 8, &mut null_bytes);
        assert_eq!(u64::from_le_bytes(null_bytes), 0);
    }

    fn read_user_bytes(asp: &AddressSpace, kernel: &Kernel, vaddr: u64, out: &mut [u8]) {
        let page_base = vaddr & !(PAGE_SIZE - 1);
        let offset = (vaddr - page_base) as usize;
        let pte = asp.find_pte(page_base).unwrap();
        let frame = match pte.inner.lock().state {
            PteState::Mapped { frame } => frame,
            other => panic!("expected Mapped, got {other:?}"),
        };
        kernel.coremap.read_at(frame, offset, out);
    }

    #[test]
    fn exec_rejects_argument_lists_over_arg_max() {
        let (kernel, pid) = kernel_with_root_process();
        let argv = vec!["x".repeat(ARG_MAX)];
        let loader = FixedEntryLoader::default();
        assert_eq!(exec(&kernel, pid, "/bin/big", &argv, &loader), Err(Errno::E2big));
    }

    #[test]
    fn sbrk_round_trips_through_the_syscall_wrapper() {
        let (kernel, pid) = kernel_with_root_process();
        let process = kernel.procs.get(pid).unwrap();
        process.addrspace().unwrap().prepare_load();
        let before = sbrk(&kernel, pid, 0).unwrap();
        let grown = sbrk(&kernel, pid, PAGE_SIZE as i64).unwrap();
        assert_eq!(grown, before);
        assert_eq!(sbrk(&kernel, pid, 0).unwrap(), before + PAGE_SIZE);
    }
}
