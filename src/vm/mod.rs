//! Virtual memory subsystem: coremap, swap, TLB model, per-
//! process address spaces, and the fault/eviction paths that tie them
//! together.

pub mod addrspace;
pub mod coremap;
pub mod evict;
pub mod fault;
pub mod pte;
pub mod ram;
pub mod region;
pub mod swap;
pub mod tlb;

pub use addrspace::AddressSpace;
pub use coremap::Coremap;
pub use fault::{vm_fault, FaultType};
pub use pte::{PageTableEntry, Permissions, PteSlot, PteState};
pub use region::Region;
pub use swap::SwapStore;
pub use tlb::Tlb;
