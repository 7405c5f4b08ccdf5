//! Physical frame allocator. A single spinlock serializes every
//! coremap mutation, matching a classic `coremap_spinlock`; kernel
//! allocations (`alloc_kpages`) are "Fixed" and never evicted, while user
//! allocations ("Used") are subject to the clock Evictor when the frame
//! table is exhausted.

use crate::errno::Errno;
use crate::param::PAGE_SIZE;
use crate::sync::Spinlock;
use crate::vm::evict::ClockSweep;
use crate::vm::pte::{PteSlot, PteState};
use crate::vm::ram::PhysicalMemory;
use crate::vm::swap::SwapStore;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameState {
    Free,
    /// Allocated by `alloc_kpages`/kmalloc; never a candidate for eviction.
    Fixed,
    /// Backing a user page; evictable.
    Used,
    /// Selected by the Evictor; disk I/O for it is in flight and the frame
    /// is not yet available for reuse.
    InEviction,
}

/// Identifies the PTE and address space a `Used` frame currently backs, so
/// the Evictor can re-lock the right PTE after releasing the coremap lock.
pub struct FrameOwner {
    pub pte: Arc<PteSlot>,
    pub as_id: u64,
    pub vpage: u64,
}

struct PhysicalFrame {
    state: FrameState,
    /// Number of contiguous frames in this allocation, recorded on the head
    /// frame only; used by `free_kpages` to know how many frames to free.
    chunk_size: u32,
    owner: Option<FrameOwner>,
    /// Clock-algorithm reference bit; set on allocation and on every access
    /// reported through [`Coremap::mark_referenced`], cleared by a sweep
    /// that passes over the frame without choosing it.
    ref_bit: bool,
}

impl PhysicalFrame {
    fn free() -> PhysicalFrame {
        PhysicalFrame {
            state: FrameState::Free,
            chunk_size: 0,
            owner: None,
            ref_bit: false,
        }
    }
}

struct Inner {
    frames: Vec<PhysicalFrame>,
    ram: PhysicalMemory,
    sweep: ClockSweep,
}

pub struct Coremap {
    inner: Spinlock<Inner>,
}

impl Coremap {
    /// Mirrors `coremap_bootstrap`: the first `reserved` frames (kernel
    /// image plus the coremap's own bookkeeping) start `Fixed`; the rest
    /// start `Free`.
    pub fn bootstrap(num_frames: usize, reserved: usize) -> Coremap {
        let mut frames: Vec<PhysicalFrame> = (0..num_frames).map(|_| PhysicalFrame::free()).collect();
        for frame in frames.iter_mut().take(reserved) {
            frame.state = FrameState::Fixed;
            frame.chunk_size = 1;
        }
        Coremap {
            inner: Spinlock::new(Inner {
                frames,
                ram: PhysicalMemory::new(num_frames),
                sweep: ClockSweep::new(reserved),
            }),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// `alloc_kpages`: find `n` contiguous free frames, mark them `Fixed`
    /// under one chunk, zero them, and return the head frame index.
    pub fn alloc_kpages(&self, n: usize) -> Option<usize> {
        assert!(n > 0);
        let mut inner = self.inner.lock();
        let total = inner.frames.len();
        let mut start = 0;
        while start + n <= total {
            if inner.frames[start..start + n]
                .iter()
                .all(|f| f.state == FrameState::Free)
            {
                for frame in &mut inner.frames[start..start + n] {
                    frame.state = FrameState::Fixed;
                }
                inner.frames[start].chunk_size = n as u32;
                for i in start..start + n {
                    inner.ram.zero_frame(i);
                }
                return Some(start);
            }
            start += 1;
        }
        None
    }

    /// `free_kpages`: release the chunk headed at `frame`.
    pub fn free_kpages(&self, frame: usize) {
        let mut inner = self.inner.lock();
        let n = inner.frames[frame].chunk_size as usize;
        assert!(n > 0, "free_kpages: frame is not a chunk head");
        for f in &mut inner.frames[frame..frame + n] {
            *f = PhysicalFrame::free();
        }
    }

    /// `allocate_user_page`: find or reclaim a frame for `owner`'s `vpage`,
    /// zero it unless `copy_call` (the caller is about to overwrite every
    /// byte, e.g. a swap-in), and return its index.
    pub fn allocate_user_page(
        &self,
        owner: FrameOwner,
        copy_call: bool,
        swap: &SwapStore,
        invalidate_tlb: impl FnOnce(u64),
    ) -> Result<usize, Errno> {
        let found = {
            let mut inner = self.inner.lock();
            inner
                .frames
                .iter()
                .position(|f| f.state == FrameState::Free)
        };
        let frame = match found {
            Some(f) => f,
            None => {
                log::trace!("coremap exhausted, invoking evictor");
                self.evict_one(swap, invalidate_tlb)?
            }
        };
        let mut inner = self.inner.lock();
        if !copy_call {
            inner.ram.zero_frame(frame);
        }
        inner.frames[frame].state = FrameState::Used;
        inner.frames[frame].ref_bit = true;
        inner.frames[frame].owner = Some(owner);
        Ok(frame)
    }

    /// `release_user_page`: return a `Used` frame to `Free`. Returns
    /// `Err(Errno::Einval)` if the frame is mid-eviction; the caller should
    /// not normally hit this since eviction only targets frames chosen
    /// internally, but address-space teardown racing an in-flight eviction
    /// of one of its own frames must be rejected rather than corrupt state.
    pub fn release_user_page(&self, frame: usize) -> Result<(), Errno> {
        let mut inner = self.inner.lock();
        if inner.frames[frame].state == FrameState::InEviction {
            return Err(Errno::Einval);
        }
        inner.frames[frame] = PhysicalFrame::free();
        Ok(())
    }

    pub fn mark_referenced(&self, frame: usize) {
        self.inner.lock().frames[frame].ref_bit = true;
    }

    pub fn read_frame(&self, frame: usize, out: &mut [u8]) {
        out.copy_from_slice(self.inner.lock().ram.read_frame(frame));
    }

    pub fn write_frame(&self, frame: usize, data: &[u8]) {
        self.inner.lock().ram.write_frame(frame, data);
    }

    pub fn write_at(&self, frame: usize, offset: usize, data: &[u8]) {
        self.inner.lock().ram.write_at(frame, offset, data);
    }

    pub fn read_at(&self, frame: usize, offset: usize, out: &mut [u8]) {
        self.inner.lock().ram.read_at(frame, offset, out);
    }

    /// Clock-algorithm reclamation. Sweeps `Used` frames, clearing
    /// reference bits until it finds one already clear, then swaps that
    /// frame's contents out and returns it ready for reuse.
    fn evict_one(&self, swap: &SwapStore, invalidate_tlb: impl FnOnce(u64)) -> Result<usize, Errno> {
        let (frame, owner, page_bytes) = {
            let mut inner = self.inner.lock();
            let total = inner.frames.len();
            let mut tries = 0;
            let chosen = loop {
                if tries > 2 * total {
                    break None;
                }
                tries += 1;
                let idx = inner.sweep.advance(total);
                if inner.frames[idx].state != FrameState::Used {
                    continue;
                }
                if inner.frames[idx].ref_bit {
                    inner.frames[idx].ref_bit = false;
                    continue;
                }
                break Some(idx);
            };
            let chosen = chosen.ok_or(Errno::Enomem)?;
            inner.frames[chosen].state = FrameState::InEviction;
            let owner = inner.frames[chosen]
                .owner
                .take()
                .expect("evict_one: Used frame missing owner");
            let bytes = inner.ram.read_frame(chosen).to_vec();
            (chosen, owner, bytes)
        };

        invalidate_tlb(owner.vpage);

        {
            let mut pte = owner.pte.inner.lock();
            match pte.state {
                PteState::Mapped { frame: f } if f == frame => {}
                _ => panic!("evict_one: owner PTE not Mapped to the frame under eviction"),
            }
            let mut page = [0u8; PAGE_SIZE as usize];
            page.copy_from_slice(&page_bytes);
            let slot = swap.write_page(&page)?;
            pte.state = PteState::Swapped { slot };
        }
        log::debug!("evicted frame {frame} (vpage {}) to swap", owner.vpage);

        let mut inner = self.inner.lock();
        inner.frames[frame] = PhysicalFrame::free();
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::pte::Permissions;

    #[test]
    fn kpage_alloc_marks_fixed_and_free_returns_to_free() {
        let cm = Coremap::bootstrap(8, 0);
        let frame = cm.alloc_kpages(2).unwrap();
        assert_eq!(cm.alloc_kpages(8), None, "only 6 frames remain free");
        cm.free_kpages(frame);
        assert!(cm.alloc_kpages(8).is_some());
    }

    #[test]
    fn user_allocation_fails_closed_when_no_swap_and_no_free_frames() {
        let cm = Coremap::bootstrap(1, 0);
        let swap = SwapStore::bootstrap(None);
        let pte = Arc::new(PteSlot::new(0, Permissions::READ));
        let owner = FrameOwner {
            pte: pte.clone(),
            as_id: 1,
            vpage: 0,
        };
        let first = cm
            .allocate_user_page(owner, false, &swap, |_| {})
            .unwrap();
        pte.inner.lock().state = PteState::Mapped { frame: first };

        let owner2 = FrameOwner {
            pte: pte.clone(),
            as_id: 1,
            vpage: 1,
        };
        let err = cm.allocate_user_page(owner2, false, &swap, |_| {});
        assert_eq!(err, Err(Errno::Enomem));
    }

    #[test]
    fn eviction_reclaims_a_frame_and_transitions_pte_to_swapped() {
        use crate::vm::swap::InMemoryBlockDevice;
        let _ = env_logger::try_init();

        let cm = Coremap::bootstrap(1, 0);
        let swap = SwapStore::bootstrap(Some(Box::new(InMemoryBlockDevice::new(4))));
        let pte = Arc::new(PteSlot::new(0, Permissions::READ | Permissions::WRITE));

        let owner = FrameOwner {
            pte: pte.clone(),
            as_id: 1,
            vpage: 0,
        };
        let frame = cm
            .allocate_user_page(owner, false, &swap, |_| {})
            .unwrap();
        cm.write_frame(frame, &[0xCDu8; PAGE_SIZE as usize]);
        pte.inner.lock().state = PteState::Mapped { frame };
        cm.mark_referenced(frame);

        let pte2 = Arc::new(PteSlot::new(1, Permissions::READ));
        let owner2 = FrameOwner {
            pte: pte2.clone(),
            as_id: 1,
            vpage: 1,
        };
        let mut invalidated = None;
        let frame2 = cm
            .allocate_user_page(owner2, false, &swap, |vpage| invalidated = Some(vpage))
            .unwrap();

        assert_eq!(frame2, frame, "single-frame coremap must reuse the evicted frame");
        assert_eq!(invalidated, Some(0));
        match pte.inner.lock().state {
            PteState::Swapped { .. } => {}
            other => panic!("expected evicted PTE to be Swapped, got {other:?}"),
        }
    }
}
