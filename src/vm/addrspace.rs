//! Per-process address space: a region list, a PTE list, and the heap
//! window. The PTE list is `Mutex<Vec<Arc<PteSlot>>>` rather than a true
//! linked list — the outer mutex only serializes structural changes (push
//! on fault, remove on sbrk-shrink/destroy); each entry's own mutex (inside
//! `PteSlot`) guards its state transitions and is what the Evictor takes
//! after releasing the coremap spinlock.

use crate::errno::Errno;
use crate::param::{PAGE_SIZE, USERSTACK, VM_STACKPAGES};
use crate::sync::{Mutex, Spinlock};
use crate::vm::coremap::{Coremap, FrameOwner};
use crate::vm::pte::{Permissions, PteSlot, PteState};
use crate::vm::region::Region;
use crate::vm::swap::SwapStore;
use crate::vm::tlb::Tlb;
use std::sync::Arc;

pub struct AddressSpace {
    id: u64,
    regions: Mutex<Vec<Region>>,
    ptes: Mutex<Vec<Arc<PteSlot>>>,
    heap: Spinlock<(u64, u64)>,
}

impl AddressSpace {
    pub fn new(id: u64) -> AddressSpace {
        AddressSpace {
            id,
            regions: Mutex::new(Vec::new()),
            ptes: Mutex::new(Vec::new()),
            heap: Spinlock::new((0, 0)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// `as_define_region`: rejects overlap with any existing region, since
    /// silently accepting one would make fault-time region lookup ambiguous
    /// without a "first match wins" tiebreak this crate would rather not
    /// rely on.
    pub fn define_region(&self, vaddr: u64, size: u64, perms: Permissions) -> Result<(), Errno> {
        let region = Region::new(vaddr, size, perms);
        let mut regions = self.regions.lock();
        if regions.iter().any(|r| {
            region.base < r.end() && r.base < region.end()
        }) {
            return Err(Errno::Einval);
        }
        regions.push(region);
        Ok(())
    }

    /// `as_prepare_load`: heap_start is the page-aligned end of the
    /// highest-ending region.
    pub fn prepare_load(&self) {
        let top = self
            .regions
            .lock()
            .iter()
            .map(|r| r.end())
            .max()
            .unwrap_or(0);
        let mut heap = self.heap.lock();
        *heap = (top, top);
    }

    /// `as_define_stack`: the stack is a fault-time window, not a region.
    pub fn define_stack(&self) -> u64 {
        USERSTACK
    }

    pub fn heap_end(&self) -> u64 {
        self.heap.lock().1
    }

    fn in_stack_window(vaddr: u64) -> bool {
        vaddr < USERSTACK && vaddr >= USERSTACK - VM_STACKPAGES * PAGE_SIZE
    }

    fn find_region(&self, vaddr: u64) -> Option<Region> {
        self.regions.lock().iter().find(|r| r.contains(vaddr)).copied()
    }

    fn in_heap(&self, vaddr: u64) -> bool {
        let (start, end) = *self.heap.lock();
        vaddr >= start && vaddr < end
    }

    /// Validates that `vaddr` is inside a region, the heap window, or the
    /// stack window, returning the permissions to record on a freshly
    /// created PTE (regions carry real permissions; heap and stack default
    /// to read/write).
    pub fn validate_fault_address(&self, vaddr: u64) -> Result<Permissions, Errno> {
        if let Some(region) = self.find_region(vaddr) {
            return Ok(region.perms);
        }
        if self.in_heap(vaddr) || Self::in_stack_window(vaddr) {
            return Ok(Permissions::READ | Permissions::WRITE);
        }
        Err(Errno::Efault)
    }

    fn vpn(vaddr: u64) -> u64 {
        vaddr / PAGE_SIZE
    }

    pub fn find_pte(&self, vaddr: u64) -> Option<Arc<PteSlot>> {
        let vpn = Self::vpn(vaddr);
        self.ptes.lock().iter().find(|p| p.inner.lock().vpn == vpn).cloned()
    }

    /// Appends a new `Unmapped` PTE for `vaddr` and returns it (the fault
    /// handler will immediately drive it to `Mapped`).
    pub fn insert_unmapped_pte(&self, vaddr: u64, perms: Permissions) -> Arc<PteSlot> {
        let slot = Arc::new(PteSlot::new(Self::vpn(vaddr), perms));
        self.ptes.lock().push(slot.clone());
        slot
    }

    fn frame_owner(self_arc_id: u64, pte: Arc<PteSlot>) -> FrameOwner {
        let vpage = pte.inner.lock().vpn;
        FrameOwner {
            pte,
            as_id: self_arc_id,
            vpage,
        }
    }

    /// `as_copy` (fork): duplicates every region and PTE; Mapped pages are
    /// byte-copied into freshly allocated frames, Swapped pages are read
    /// straight from swap into a new frame without disturbing the
    /// original's slot.
    pub fn copy(&self, coremap: &Coremap, swap: &SwapStore, tlb: &Tlb) -> Result<AddressSpace, Errno> {
        let new_as = AddressSpace::new(self.id);
        *new_as.regions.lock() = self.regions.lock().clone();
        *new_as.heap.lock() = *self.heap.lock();

        for old_slot in self.ptes.lock().iter() {
            let (vpn, perms, state) = {
                let old = old_slot.inner.lock();
                (old.vpn, old.perms, old.state)
            };
            let new_slot = Arc::new(PteSlot::new(vpn, perms));

            match state {
                PteState::Unmapped => {}
                PteState::Mapped { frame: old_frame } => {
                    let owner = Self::frame_owner(new_as.id, new_slot.clone());
                    let new_frame = match coremap.allocate_user_page(owner, true, swap, |vpn| {
                        tlb.invalidate(vpn * PAGE_SIZE)
                    }) {
                        Ok(f) => f,
                        Err(e) => {
                            new_as.destroy(coremap, swap);
                            return Err(e);
                        }
                    };
                    let mut buf = vec![0u8; PAGE_SIZE as usize];
                    coremap.read_frame(old_frame, &mut buf);
                    coremap.write_frame(new_frame, &buf);
                    new_slot.inner.lock().state = PteState::Mapped { frame: new_frame };
                }
                PteState::Swapped { slot: old_slot_idx } => {
                    let owner = Self::frame_owner(new_as.id, new_slot.clone());
                    let new_frame = match coremap.allocate_user_page(owner, true, swap, |vpn| {
                        tlb.invalidate(vpn * PAGE_SIZE)
                    }) {
                        Ok(f) => f,
                        Err(e) => {
                            new_as.destroy(coremap, swap);
                            return Err(e);
                        }
                    };
                    let mut page = [0u8; PAGE_SIZE as usize];
                    if let Err(e) = swap.read_page(old_slot_idx, false, &mut page) {
                        new_as.destroy(coremap, swap);
                        return Err(e);
                    }
                    coremap.write_frame(new_frame, &page);
                    new_slot.inner.lock().state = PteState::Mapped { frame: new_frame };
                }
            }
            new_as.ptes.lock().push(new_slot);
        }

        Ok(new_as)
    }

    /// `as_destroy`: releases every mapped frame and swap slot, then drops
    /// the PTE and region lists.
    pub fn destroy(&self, coremap: &Coremap, swap: &SwapStore) {
        for pte_slot in self.ptes.lock().drain(..) {
            let state = pte_slot.inner.lock().state;
            match state {
                PteState::Swapped { slot } => swap.unmark(slot),
                PteState::Mapped { frame } => {
                    let _ = coremap.release_user_page(frame);
                }
                PteState::Unmapped => {}
            }
        }
        self.regions.lock().clear();
    }

    /// `as_activate`: flush the whole TLB since entries carry no
    /// address-space tag.
    pub fn activate(&self, tlb: &Tlb) {
        tlb.flush_all();
    }

    /// `sys_sbrk`. Returns the **old** heap_end on success.
    pub fn sbrk(&self, delta: i64, coremap: &Coremap, swap: &SwapStore, tlb: &Tlb) -> Result<u64, Errno> {
        if delta % PAGE_SIZE as i64 != 0 {
            return Err(Errno::Einval);
        }
        let (start, old_end) = *self.heap.lock();
        if delta == 0 {
            return Ok(old_end);
        }
        if delta > 0 {
            let new_end = old_end
                .checked_add(delta as u64)
                .ok_or(Errno::Enomem)?;
            if new_end > USERSTACK - VM_STACKPAGES * PAGE_SIZE {
                return Err(Errno::Enomem);
            }
            self.heap.lock().1 = new_end;
            return Ok(old_end);
        }

        let shrink = (-delta) as u64;
        let new_end = old_end.checked_sub(shrink).ok_or(Errno::Einval)?;
        if new_end < start {
            return Err(Errno::Einval);
        }
        let mut ptes = self.ptes.lock();
        ptes.retain(|pte_slot| {
            let vaddr = pte_slot.inner.lock().vpn * PAGE_SIZE;
            if vaddr < new_end || vaddr >= old_end {
                return true;
            }
            let state = pte_slot.inner.lock().state;
            match state {
                PteState::Swapped { slot } => swap.unmark(slot),
                PteState::Mapped { frame } => {
                    let _ = coremap.release_user_page(frame);
                    tlb.invalidate(vaddr);
                }
                PteState::Unmapped => {}
            }
            false
        });
        drop(ptes);
        self.heap.lock().1 = new_end;
        Ok(old_end)
    }
}
