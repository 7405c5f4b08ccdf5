//! Software model of a fixed-size TLB. Real hardware TLB
//! maintenance (`tlb_write`/`tlb_probe`) is per-core and privileged; this
//! crate models it so fault-handler tests can assert what a fault actually
//! installs without needing real hardware.

use crate::param::{NUM_TLB, PAGE_SIZE};
use crate::sync::Spinlock;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TlbEntry {
    pub vpn: u64,
    pub frame: usize,
    pub writable: bool,
}

struct Inner {
    entries: [Option<TlbEntry>; NUM_TLB],
    /// Position the next unconditional insert will evict from, once every
    /// slot is full (round-robin, matching `tlb_random`'s simplest cousin
    /// without relying on hardware randomness).
    clock: usize,
}

pub struct Tlb {
    inner: Spinlock<Inner>,
}

impl Tlb {
    pub fn new() -> Tlb {
        Tlb {
            inner: Spinlock::new(Inner {
                entries: [None; NUM_TLB],
                clock: 0,
            }),
        }
    }

    fn vaddr_to_vpn(vaddr: u64) -> u64 {
        vaddr / PAGE_SIZE
    }

    pub fn probe(&self, vaddr: u64) -> Option<TlbEntry> {
        let vpn = Self::vaddr_to_vpn(vaddr);
        self.inner
            .lock()
            .entries
            .iter()
            .flatten()
            .find(|e| e.vpn == vpn)
            .copied()
    }

    /// Installs an entry, first into any invalid slot, falling back to
    /// round-robin replacement once the TLB is full.
    pub fn insert(&self, vpn: u64, frame: usize, writable: bool) {
        let mut inner = self.inner.lock();
        let entry = TlbEntry {
            vpn,
            frame,
            writable,
        };
        if let Some(slot) = inner.entries.iter_mut().find(|e| e.is_none()) {
            *slot = Some(entry);
            return;
        }
        let clock = inner.clock;
        inner.entries[clock] = Some(entry);
        inner.clock = (clock + 1) % NUM_TLB;
    }

    /// Invalidates the mapping for `vaddr`, if present. Called by the
    /// Evictor before a frame's contents are swapped out from under it.
    pub fn invalidate(&self, vaddr: u64) {
        let vpn = Self::vaddr_to_vpn(vaddr);
        let mut inner = self.inner.lock();
        for slot in inner.entries.iter_mut() {
            if slot.is_some_and(|e| e.vpn == vpn) {
                *slot = None;
            }
        }
    }

    /// `as_deactivate`/address-space switch: the whole TLB is flushed since
    /// entries carry no address-space tag.
    pub fn flush_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries = [None; NUM_TLB];
        inner.clock = 0;
    }
}

impl Default for Tlb {
    fn default() -> Tlb {
        Tlb::new()
    }
}
