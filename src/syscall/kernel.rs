//! Global kernel singletons: constructed once by bootstrap, valid for the
//! lifetime of the kernel, never destroyed. Synchronization is implicit in
//! each field's own locks, so the remaining construction order is coremap
//! -> swap -> procs.

use crate::fs::InMemoryVfs;
use crate::proc::ProcTable;
use crate::vm::{Coremap, SwapStore, Tlb};
use crate::vm::swap::BlockDevice;

pub struct Kernel {
    pub coremap: Coremap,
    pub swap: SwapStore,
    pub tlb: Tlb,
    pub procs: ProcTable,
    pub vfs: InMemoryVfs,
}

impl Kernel {
    pub fn bootstrap(num_frames: usize, reserved_frames: usize, swap_device: Option<Box<dyn BlockDevice>>) -> Kernel {
        Kernel {
            coremap: Coremap::bootstrap(num_frames, reserved_frames),
            swap: SwapStore::bootstrap(swap_device),
            tlb: Tlb::new(),
            procs: ProcTable::bootstrap(),
            vfs: InMemoryVfs::new(),
        }
    }
}
