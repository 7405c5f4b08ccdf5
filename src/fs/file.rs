//! FileHandle: the kernel object a descriptor points at, shared across
//! every descriptor (in possibly many processes, after `fork`/`dup2`) that
//! refers to the same open instance.

use crate::errno::Errno;
use crate::sync::Mutex;
use bitflags::bitflags;
use std::sync::Arc;

use super::vnode::Vnode;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0b0001;
        const RDWR   = 0b0010;
        const APPEND = 0b0100;
        const CREAT  = 0b1000;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    fn from_flags(flags: OpenFlags) -> AccessMode {
        if flags.contains(OpenFlags::RDWR) {
            AccessMode::ReadWrite
        } else if flags.contains(OpenFlags::WRONLY) {
            AccessMode::WriteOnly
        } else {
            AccessMode::ReadOnly
        }
    }

    fn readable(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    fn writable(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

struct HandleState {
    offset: u64,
    /// Descriptor slots across every process currently pointing at this
    /// handle. The handle is torn down when this hits 0.
    d_count: u32,
}

pub struct FileHandle {
    vnode: Arc<dyn Vnode>,
    mode: AccessMode,
    state: Mutex<HandleState>,
}

impl FileHandle {
    pub fn open(vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Arc<FileHandle> {
        let mode = AccessMode::from_flags(flags);
        let offset = if flags.contains(OpenFlags::APPEND) {
            vnode.len()
        } else {
            0
        };
        Arc::new(FileHandle {
            vnode,
            mode,
            state: Mutex::new(HandleState { offset, d_count: 1 }),
        })
    }

    pub fn d_count(&self) -> u32 {
        self.state.lock().d_count
    }

    pub fn retain(&self) {
        self.state.lock().d_count += 1;
    }

    /// Returns the post-decrement count; 0 means the last descriptor
    /// pointing at this handle has gone away and the caller should close
    /// the underlying vnode.
    pub fn release(&self) -> u32 {
        let mut state = self.state.lock();
        state.d_count -= 1;
        state.d_count
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if !self.mode.readable() {
            return Err(Errno::Ebadf);
        }
        let mut state = self.state.lock();
        let n = self.vnode.read(state.offset, buf)?;
        state.offset += n as u64;
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        if !self.mode.writable() {
            return Err(Errno::Ebadf);
        }
        let mut state = self.state.lock();
        let n = self.vnode.write(state.offset, buf)?;
        state.offset += n as u64;
        Ok(n)
    }

    pub fn offset(&self) -> u64 {
        self.state.lock().offset
    }

    pub fn is_seekable(&self) -> bool {
        self.vnode.is_seekable()
    }

    pub fn len(&self) -> u64 {
        self.vnode.len()
    }

    /// `lseek`: SEEK_SET=0, SEEK_CUR=1, SEEK_END=2.
    pub fn seek(&self, offset: i64, whence: i32) -> Result<u64, Errno> {
        if !self.is_seekable() {
            return Err(Errno::Espipe);
        }
        let mut state = self.state.lock();
        let base = match whence {
            0 => 0,
            1 => state.offset as i64,
            2 => self.vnode.len() as i64,
            _ => return Err(Errno::Einval),
        };
        let new_offset = base + offset;
        if new_offset < 0 {
            return Err(Errno::Einval);
        }
        state.offset = new_offset as u64;
        Ok(state.offset)
    }
}
