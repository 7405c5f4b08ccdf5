//! The VFS/vnode layer is an external collaborator: `vfs_open`,
//! `VOP_READ/WRITE/STAT/ISSEEKABLE`. This module is the shape that
//! collaborator presents to the file-descriptor layer, plus a console
//! vnode and an in-memory filesystem stand-in good enough to exercise the
//! syscalls end to end.

use crate::errno::Errno;
use crate::sync::Spinlock;
use std::collections::HashMap;
use std::sync::Arc;

pub trait Vnode: Send + Sync {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno>;
    fn write(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno>;
    /// `VOP_STAT`'s size field.
    fn len(&self) -> u64;
    /// `VOP_ISSEEKABLE`.
    fn is_seekable(&self) -> bool;
}

/// Backs `con:` — always non-seekable, reads/writes never fail.
pub struct ConsoleVnode;

impl Vnode for ConsoleVnode {
    fn read(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize, Errno> {
        Ok(0)
    }
    fn write(&self, _offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        Ok(buf.len())
    }
    fn len(&self) -> u64 {
        0
    }
    fn is_seekable(&self) -> bool {
        false
    }
}

/// A plain in-memory regular file, seekable, growable on write-past-end.
pub struct MemFile {
    bytes: Spinlock<Vec<u8>>,
}

impl MemFile {
    pub fn new() -> MemFile {
        MemFile {
            bytes: Spinlock::new(Vec::new()),
        }
    }
}

impl Default for MemFile {
    fn default() -> MemFile {
        MemFile::new()
    }
}

impl Vnode for MemFile {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
        let bytes = self.bytes.lock();
        let offset = offset as usize;
        if offset >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - offset);
        buf[..n].copy_from_slice(&bytes[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        let mut bytes = self.bytes.lock();
        let offset = offset as usize;
        if bytes.len() < offset + buf.len() {
            bytes.resize(offset + buf.len(), 0);
        }
        bytes[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn len(&self) -> u64 {
        self.bytes.lock().len() as u64
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Stand-in for the VFS namespace: a flat map from path to vnode, plus a
/// current-working-directory string (chdir/getcwd don't need a real
/// directory vnode to exercise the syscall contract).
pub struct InMemoryVfs {
    files: Spinlock<HashMap<String, Arc<MemFile>>>,
    cwd: Spinlock<String>,
}

impl InMemoryVfs {
    pub fn new() -> InMemoryVfs {
        InMemoryVfs {
            files: Spinlock::new(HashMap::new()),
            cwd: Spinlock::new("/".to_string()),
        }
    }

    /// `vfs_open`. `con:` always resolves to the console; anything else is
    /// created on first open (O_CREAT semantics are the only ones this
    /// stand-in implements — there is no ENOENT path).
    pub fn open(&self, path: &str) -> Result<Arc<dyn Vnode>, Errno> {
        if path == "con:" {
            return Ok(Arc::new(ConsoleVnode));
        }
        let mut files = self.files.lock();
        let file = files
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(MemFile::new()))
            .clone();
        Ok(file as Arc<dyn Vnode>)
    }

    pub fn chdir(&self, path: &str) {
        *self.cwd.lock() = path.to_string();
    }

    pub fn getcwd(&self) -> String {
        self.cwd.lock().clone()
    }
}

impl Default for InMemoryVfs {
    fn default() -> InMemoryVfs {
        InMemoryVfs::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_file_read_past_eof_is_short_not_an_error() {
        let f = MemFile::new();
        f.write(0, b"hi").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(f.read(0, &mut buf).unwrap(), 2);
        assert_eq!(f.read(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn vfs_open_is_idempotent_per_path() {
        let vfs = InMemoryVfs::new();
        let a = vfs.open("/x").unwrap();
        a.write(0, b"hello").unwrap();
        let b = vfs.open("/x").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(b.read(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }
}
