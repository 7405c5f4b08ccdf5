//! `vm_fault`: the TLB-miss entry point. Validates the faulting
//! address against the address space, resolves or creates the backing PTE,
//! makes sure it is `Mapped` (swapping in or allocating fresh as needed),
//! and installs the translation into the TLB.

use crate::errno::Errno;
use crate::param::PAGE_SIZE;
use crate::vm::addrspace::AddressSpace;
use crate::vm::coremap::{Coremap, FrameOwner};
use crate::vm::pte::{Permissions, PteSlot, PteState};
use crate::vm::swap::SwapStore;
use crate::vm::tlb::Tlb;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultType {
    Read,
    Write,
    ReadOnly,
}

fn frame_owner(as_id: u64, pte: Arc<PteSlot>) -> FrameOwner {
    let vpage = pte.inner.lock().vpn;
    FrameOwner {
        pte,
        as_id,
        vpage,
    }
}

/// Resolves a TLB miss at `vaddr`. Fault type is recorded but not enforced
/// against the PTE's permissions (left unenforced; see `DESIGN.md`).
pub fn vm_fault(
    _fault_type: FaultType,
    vaddr: u64,
    asp: &AddressSpace,
    coremap: &Coremap,
    swap: &SwapStore,
    tlb: &Tlb,
) -> Result<(), Errno> {
    let page_base = vaddr & !(PAGE_SIZE - 1);
    let perms = asp.validate_fault_address(page_base)?;

    let pte_slot = match asp.find_pte(page_base) {
        Some(slot) => slot,
        None => asp.insert_unmapped_pte(page_base, perms),
    };

    let frame = {
        let state = pte_slot.inner.lock().state;
        match state {
            PteState::Mapped { frame } => frame,
            PteState::Swapped { slot } => {
                let owner = frame_owner(asp.id(), pte_slot.clone());
                let frame = coremap.allocate_user_page(owner, true, swap, |vpn| {
                    tlb.invalidate(vpn * PAGE_SIZE)
                })?;
                let mut page = [0u8; PAGE_SIZE as usize];
                swap.read_page(slot, true, &mut page)?;
                coremap.write_frame(frame, &page);
                pte_slot.inner.lock().state = PteState::Mapped { frame };
                frame
            }
            PteState::Unmapped => {
                let owner = frame_owner(asp.id(), pte_slot.clone());
                let frame = coremap.allocate_user_page(owner, false, swap, |vpn| {
                    tlb.invalidate(vpn * PAGE_SIZE)
                })?;
                pte_slot.inner.lock().state = PteState::Mapped { frame };
                frame
            }
        }
    };

    coremap.mark_referenced(frame);
    let writable = perms.contains(Permissions::WRITE);
    tlb.insert(page_base / PAGE_SIZE, frame, writable);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::swap::InMemoryBlockDevice;

    fn harness() -> (AddressSpace, Coremap, SwapStore, Tlb) {
        (
            AddressSpace::new(1),
            Coremap::bootstrap(8, 0),
            SwapStore::bootstrap(Some(Box::new(InMemoryBlockDevice::new(8)))),
            Tlb::new(),
        )
    }

    #[test]
    fn first_touch_allocates_and_installs_tlb_entry() {
        let (asp, coremap, swap, tlb) = harness();
        asp.define_region(0x1000, PAGE_SIZE, Permissions::READ | Permissions::WRITE)
            .unwrap();
        asp.prepare_load();

        vm_fault(FaultType::Write, 0x1000, &asp, &coremap, &swap, &tlb).unwrap();
        assert!(tlb.probe(0x1000).is_some());
        assert!(matches!(
            asp.find_pte(0x1000).unwrap().inner.lock().state,
            PteState::Mapped { .. }
        ));
    }

    #[test]
    fn fault_outside_any_region_heap_or_stack_is_efault() {
        let (asp, coremap, swap, tlb) = harness();
        asp.prepare_load();
        let err = vm_fault(FaultType::Read, 0x9999_0000, &asp, &coremap, &swap, &tlb);
        assert_eq!(err, Err(Errno::Efault));
    }

    #[test]
    fn swapped_page_round_trips_byte_identical_through_fault() {
        let (asp, coremap, swap, tlb) = harness();
        asp.define_region(0x1000, PAGE_SIZE, Permissions::READ | Permissions::WRITE)
            .unwrap();
        asp.prepare_load();

        vm_fault(FaultType::Write, 0x1000, &asp, &coremap, &swap, &tlb).unwrap();
        let pte = asp.find_pte(0x1000).unwrap();
        let frame = match pte.inner.lock().state {
            PteState::Mapped { frame } => frame,
            _ => unreachable!(),
        };
        coremap.write_frame(frame, &[0x7Au8; PAGE_SIZE as usize]);

        // Force the page out to swap by hand, simulating what the Evictor
        // would have done under memory pressure.
        let mut bytes = [0u8; PAGE_SIZE as usize];
        coremap.read_frame(frame, &mut bytes);
        let slot = swap.write_page(&bytes).unwrap();
        pte.inner.lock().state = PteState::Swapped { slot };
        coremap.release_user_page(frame).unwrap();
        tlb.invalidate(0x1000);

        vm_fault(FaultType::Read, 0x1000, &asp, &coremap, &swap, &tlb).unwrap();
        let new_frame = match asp.find_pte(0x1000).unwrap().inner.lock().state {
            PteState::Mapped { frame } => frame,
            other => panic!("expected Mapped after swap-in, got {other:?}"),
        };
        let mut out = [0u8; PAGE_SIZE as usize];
        coremap.read_frame(new_frame, &mut out);
        assert_eq!(out, [0x7Au8; PAGE_SIZE as usize]);
    }
}
