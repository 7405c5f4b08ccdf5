//! Per-process descriptor table: `OPEN_MAX` slots, linear allocation
//! scanning from index 3 (0/1/2 are seeded as console handles for a freshly
//! run program).

use crate::errno::Errno;
use crate::fs::file::{FileHandle, OpenFlags};
use crate::fs::vnode::{ConsoleVnode, Vnode};
use crate::param::OPEN_MAX;
use crate::sync::Mutex;
use std::sync::Arc;

pub struct FileTable {
    slots: Mutex<[Option<Arc<FileHandle>>; OPEN_MAX]>,
}

impl FileTable {
    /// Slots 0 (stdin, read-only), 1 and 2 (stdout/stderr, write-only) are
    /// console handles; the rest start empty.
    pub fn with_console() -> FileTable {
        const NONE: Option<Arc<FileHandle>> = None;
        let mut slots = [NONE; OPEN_MAX];
        slots[0] = Some(FileHandle::open(Arc::new(ConsoleVnode), OpenFlags::empty()));
        slots[1] = Some(FileHandle::open(Arc::new(ConsoleVnode), OpenFlags::WRONLY));
        slots[2] = Some(FileHandle::open(Arc::new(ConsoleVnode), OpenFlags::WRONLY));
        FileTable {
            slots: Mutex::new(slots),
        }
    }

    pub fn empty() -> FileTable {
        const NONE: Option<Arc<FileHandle>> = None;
        FileTable {
            slots: Mutex::new([NONE; OPEN_MAX]),
        }
    }

    /// Installs an already-open handle starting from descriptor 3.
    pub fn install(&self, handle: Arc<FileHandle>) -> Result<i32, Errno> {
        let mut slots = self.slots.lock();
        for (fd, slot) in slots.iter_mut().enumerate().skip(3) {
            if slot.is_none() {
                *slot = Some(handle);
                return Ok(fd as i32);
            }
        }
        Err(Errno::Emfile)
    }

    pub fn open(&self, vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Result<i32, Errno> {
        self.install(FileHandle::open(vnode, flags))
    }

    pub fn get(&self, fd: i32) -> Result<Arc<FileHandle>, Errno> {
        if fd < 0 || fd as usize >= OPEN_MAX {
            return Err(Errno::Ebadf);
        }
        self.slots.lock()[fd as usize].clone().ok_or(Errno::Ebadf)
    }

    /// `close`: decrements the handle's refcount; the handle (and its
    /// vnode) is only actually torn down once the last descriptor
    /// referencing it is closed, which here falls out of `Arc` drop once
    /// `d_count` reaches 0 and the table drops its slot.
    pub fn close(&self, fd: i32) -> Result<(), Errno> {
        if fd < 0 || fd as usize >= OPEN_MAX {
            return Err(Errno::Ebadf);
        }
        let mut slots = self.slots.lock();
        let handle = slots[fd as usize].take().ok_or(Errno::Ebadf)?;
        handle.release();
        Ok(())
    }

    /// `dup2`: EBADF on an invalid `oldfd`; same-fd is a no-op; an open
    /// `newfd` is closed first per the ordinary close rules.
    pub fn dup2(&self, oldfd: i32, newfd: i32) -> Result<i32, Errno> {
        if oldfd < 0 || oldfd as usize >= OPEN_MAX || newfd < 0 || newfd as usize >= OPEN_MAX {
            return Err(Errno::Ebadf);
        }
        if oldfd == newfd {
            return Ok(newfd);
        }
        let mut slots = self.slots.lock();
        let handle = slots[oldfd as usize].clone().ok_or(Errno::Ebadf)?;
        if let Some(old) = slots[newfd as usize].take() {
            old.release();
        }
        handle.retain();
        slots[newfd as usize] = Some(handle);
        Ok(newfd)
    }

    /// `fork`: every non-null slot is shared with the child, refcount
    /// bumped once per slot.
    pub fn fork_copy(&self) -> FileTable {
        const NONE: Option<Arc<FileHandle>> = None;
        let mut copy = [NONE; OPEN_MAX];
        let slots = self.slots.lock();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(handle) = slot {
                handle.retain();
                copy[i] = Some(handle.clone());
            }
        }
        FileTable {
            slots: Mutex::new(copy),
        }
    }
}

impl Drop for FileTable {
    fn drop(&mut self) {
        for slot in self.slots.lock().iter() {
            if let Some(handle) = slot {
                handle.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::vnode::MemFile;

    #[test]
    fn console_slots_are_preseeded_and_allocation_starts_at_three() {
        let table = FileTable::with_console();
        assert!(table.get(0).is_ok());
        assert!(table.get(1).is_ok());
        assert!(table.get(2).is_ok());
        let fd = table.open(Arc::new(MemFile::new()), OpenFlags::RDWR).unwrap();
        assert_eq!(fd, 3);
    }

    #[test]
    fn dup2_shares_the_same_handle_and_closing_old_does_not_affect_new() {
        let table = FileTable::with_console();
        let fd1 = table.open(Arc::new(MemFile::new()), OpenFlags::RDWR).unwrap();
        table.get(fd1).unwrap().write(b"hi").unwrap();
        let fd2 = table.dup2(fd1, 10).unwrap();
        table.close(fd1).unwrap();
        let mut buf = [0u8; 2];
        table.get(fd2).unwrap().seek(0, 0).unwrap();
        assert_eq!(table.get(fd2).unwrap().read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn fork_copy_shares_handles_and_bumps_refcount() {
        let table = FileTable::with_console();
        let handle = table.get(0).unwrap();
        assert_eq!(handle.d_count(), 1);
        let child = table.fork_copy();
        assert_eq!(handle.d_count(), 2);
        drop(child);
        assert_eq!(handle.d_count(), 1);
    }
}
