//! `load_elf` is an external collaborator: it maps a program image's
//! segments into a freshly created address space and reports the entry
//! point. This trait is the shape that collaborator presents to `execv`;
//! [`FixedEntryLoader`] is a minimal stand-in good enough to drive the
//! argument-layout path end to end without a real ELF parser.

use crate::errno::Errno;
use crate::fs::Vnode;
use crate::param::PAGE_SIZE;
use crate::vm::{AddressSpace, Permissions};

pub trait ElfLoader: Send + Sync {
    /// Defines whatever regions the image needs in `asp` and returns the
    /// entry point virtual address.
    fn load(&self, vnode: &dyn Vnode, asp: &AddressSpace) -> Result<u64, Errno>;
}

/// Defines a single read/exec text region sized from the vnode's length
/// (rounded up to a page) starting at a fixed load address, and reports a
/// fixed entry point at that same address.
pub struct FixedEntryLoader {
    pub load_address: u64,
}

impl Default for FixedEntryLoader {
    fn default() -> FixedEntryLoader {
        FixedEntryLoader { load_address: 0x0040_0000 }
    }
}

impl ElfLoader for FixedEntryLoader {
    fn load(&self, vnode: &dyn Vnode, asp: &AddressSpace) -> Result<u64, Errno> {
        let size = vnode.len().max(PAGE_SIZE);
        asp.define_region(
            self.load_address,
            size,
            Permissions::READ | Permissions::EXEC,
        )?;
        Ok(self.load_address)
    }
}
