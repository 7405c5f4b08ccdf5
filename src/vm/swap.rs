//! Bitmap-backed paged swap over a raw block device. The real device
//! lives at `lhd0raw:` and is an external collaborator; this crate
//! targets an in-memory [`BlockDevice`] implementation so the Evictor and
//! fault-handler paths are host-testable end to end.

use crate::errno::Errno;
use crate::param::PAGE_SIZE;
use crate::sync::Spinlock;

/// A raw, page-addressable block device. The real kernel talks to
/// `lhd0raw:` through the VFS/VOP interface; this trait is the shape
/// that collaborator would have to present to this crate.
pub trait BlockDevice: Send + Sync {
    /// Total device length in bytes. Must be a multiple of `PAGE_SIZE`.
    fn len_bytes(&self) -> u64;
    fn read_page(&self, slot: usize, buf: &mut [u8; PAGE_SIZE as usize]);
    fn write_page(&self, slot: usize, buf: &[u8; PAGE_SIZE as usize]);
}

/// Host-side stand-in for the swap disk, used by tests and by any consumer
/// of this crate that hasn't wired up a real block device.
pub struct InMemoryBlockDevice {
    pages: Spinlock<Vec<[u8; PAGE_SIZE as usize]>>,
}

impl InMemoryBlockDevice {
    pub fn new(num_pages: usize) -> InMemoryBlockDevice {
        InMemoryBlockDevice {
            pages: Spinlock::new(vec![[0u8; PAGE_SIZE as usize]; num_pages]),
        }
    }
}

impl BlockDevice for InMemoryBlockDevice {
    fn len_bytes(&self) -> u64 {
        self.pages.lock().len() as u64 * PAGE_SIZE
    }

    fn read_page(&self, slot: usize, buf: &mut [u8; PAGE_SIZE as usize]) {
        buf.copy_from_slice(&self.pages.lock()[slot]);
    }

    fn write_page(&self, slot: usize, buf: &[u8; PAGE_SIZE as usize]) {
        self.pages.lock()[slot].copy_from_slice(buf);
    }
}

/// A fixed-size bitmap, one bit per swap slot. Bit i set <=> slot i holds a
/// valid swapped page.
struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    fn new(len: usize) -> Bitmap {
        Bitmap {
            words: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    fn get(&self, i: usize) -> bool {
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    /// Clears the bit; returns whether it had been set.
    fn clear(&mut self, i: usize) -> bool {
        let was_set = self.get(i);
        self.words[i / 64] &= !(1 << (i % 64));
        was_set
    }

    fn alloc(&mut self) -> Option<usize> {
        for i in 0..self.len {
            if !self.get(i) {
                self.set(i);
                return Some(i);
            }
        }
        None
    }
}

pub struct SwapStore {
    device: Option<Box<dyn BlockDevice>>,
    bitmap: Spinlock<Option<Bitmap>>,
}

impl SwapStore {
    /// Mirrors `vm_bootstrap`: opens the device, validates its length is a
    /// page multiple, and reports absence rather than failing if there is
    /// no swap device at all.
    pub fn bootstrap(device: Option<Box<dyn BlockDevice>>) -> SwapStore {
        match device {
            Some(dev) if dev.len_bytes() % PAGE_SIZE == 0 => {
                let slots = (dev.len_bytes() / PAGE_SIZE) as usize;
                SwapStore {
                    device: Some(dev),
                    bitmap: Spinlock::new(Some(Bitmap::new(slots))),
                }
            }
            _ => {
                log::warn!("no usable swap device at bootstrap; running without swap");
                SwapStore {
                    device: None,
                    bitmap: Spinlock::new(None),
                }
            }
        }
    }

    pub fn is_present(&self) -> bool {
        self.device.is_some()
    }

    /// `write_swap_disk`: allocate a free slot, write the page, return the
    /// slot index.
    pub fn write_page(&self, page: &[u8; PAGE_SIZE as usize]) -> Result<usize, Errno> {
        let device = self.device.as_ref().ok_or(Errno::Enomem)?;
        let slot = {
            let mut bitmap = self.bitmap.lock();
            bitmap.as_mut().unwrap().alloc().ok_or(Errno::Enomem)?
        };
        device.write_page(slot, page);
        Ok(slot)
    }

    /// `read_swap_disk`: read the page at `slot`; if `unmark`, atomically
    /// clear the bitmap bit (the "read-with-unmark" path used when a
    /// swapped PTE transitions back to Mapped).
    pub fn read_page(
        &self,
        slot: usize,
        unmark: bool,
        out: &mut [u8; PAGE_SIZE as usize],
    ) -> Result<(), Errno> {
        let device = self.device.as_ref().ok_or(Errno::Enomem)?;
        {
            let mut bitmap = self.bitmap.lock();
            let bitmap = bitmap.as_mut().unwrap();
            assert!(bitmap.get(slot), "read_swap_disk: slot not marked valid");
            if unmark {
                bitmap.clear(slot);
            }
        }
        device.read_page(slot, out);
        Ok(())
    }

    /// `unmark_swap_bitmap`: idempotent clear, used when an address space is
    /// destroyed or sbrk shrinks past a swapped PTE.
    pub fn unmark(&self, slot: usize) {
        if let Some(bitmap) = self.bitmap.lock().as_mut() {
            bitmap.clear(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_device_reports_not_present_and_fails_writes() {
        let swap = SwapStore::bootstrap(None);
        assert!(!swap.is_present());
        let page = [0u8; PAGE_SIZE as usize];
        assert_eq!(swap.write_page(&page), Err(Errno::Enomem));
    }

    #[test]
    fn round_trips_a_page_and_unmarks_on_read() {
        let dev = InMemoryBlockDevice::new(4);
        let swap = SwapStore::bootstrap(Some(Box::new(dev)));
        let mut page = [0u8; PAGE_SIZE as usize];
        page[0] = 0xAB;
        let slot = swap.write_page(&page).unwrap();

        let mut out = [0u8; PAGE_SIZE as usize];
        swap.read_page(slot, true, &mut out).unwrap();
        assert_eq!(out[0], 0xAB);

        // Unmarked now; a fresh write should be able to reuse the slot.
        let slot2 = swap.write_page(&page).unwrap();
        assert_eq!(slot2, slot);
    }

    #[test]
    fn rejects_device_whose_length_is_not_a_page_multiple() {
        struct Odd;
        impl BlockDevice for Odd {
            fn len_bytes(&self) -> u64 {
                PAGE_SIZE + 1
            }
            fn read_page(&self, _: usize, _: &mut [u8; PAGE_SIZE as usize]) {}
            fn write_page(&self, _: usize, _: &[u8; PAGE_SIZE as usize]) {}
        }
        let swap = SwapStore::bootstrap(Some(Box::new(Odd)));
        assert!(!swap.is_present());
    }
}
