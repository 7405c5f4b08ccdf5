//! The page-table entry. Kept as a flat, individually mutex-guarded node
//! rather than indexed by virtual page number, matching a classic teaching
//! kernel's linked list and its pedagogical-transparency rationale;
//! [`super::addrspace::AddressSpace`] still stores the owning collection as
//! a `Vec`, but each entry is independently lockable exactly as a linked
//! list node would be.

use crate::sync::Mutex;
use bitflags::bitflags;

bitflags! {
    /// Permissions requested for a region or PTE. Recorded but never
    /// enforced at fault time (see the open-question note in `DESIGN.md`).
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Permissions: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXEC = 0b001;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PteState {
    Unmapped,
    Mapped { frame: usize },
    Swapped { slot: usize },
}

#[derive(Debug)]
pub struct PageTableEntry {
    /// Virtual page number: `vaddr / PAGE_SIZE`.
    pub vpn: u64,
    pub perms: Permissions,
    pub state: PteState,
}

impl PageTableEntry {
    pub fn new(vpn: u64, perms: Permissions) -> PageTableEntry {
        PageTableEntry {
            vpn,
            perms,
            state: PteState::Unmapped,
        }
    }
}

/// A PTE plus the mutex guarding its state transitions. Shared between
/// [`super::addrspace::AddressSpace`] (structural owner) and
/// a [`super::coremap::PhysicalFrame`] while the frame is `Used`, so the
/// Evictor can lock just this node without taking the whole address space.
pub struct PteSlot {
    pub inner: Mutex<PageTableEntry>,
}

impl PteSlot {
    pub fn new(vpn: u64, perms: Permissions) -> PteSlot {
        PteSlot {
            inner: Mutex::new(PageTableEntry::new(vpn, perms)),
        }
    }
}
