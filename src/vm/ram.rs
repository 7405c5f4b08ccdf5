//! Stand-in for the external `ram_getsize`/`ram_getfirstfree` + `kmalloc`
//! target memory. A real kernel owns physical RAM directly; this crate
//! is host-testable, so [`PhysicalMemory`] is a page-granular byte arena the
//! [`super::coremap::Coremap`] allocates frames out of.

use crate::param::PAGE_SIZE;

pub struct PhysicalMemory {
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    /// `num_frames` pages of backing storage, all zeroed.
    pub fn new(num_frames: usize) -> PhysicalMemory {
        PhysicalMemory {
            bytes: vec![0u8; num_frames * PAGE_SIZE as usize],
        }
    }

    pub fn num_frames(&self) -> usize {
        self.bytes.len() / PAGE_SIZE as usize
    }

    pub fn zero_frame(&mut self, frame: usize) {
        let (start, end) = self.frame_bounds(frame);
        self.bytes[start..end].fill(0);
    }

    pub fn read_frame(&self, frame: usize) -> &[u8] {
        let (start, end) = self.frame_bounds(frame);
        &self.bytes[start..end]
    }

    pub fn write_frame(&mut self, frame: usize, data: &[u8]) {
        let (start, end) = self.frame_bounds(frame);
        assert_eq!(data.len(), end - start, "write_frame: not page-sized");
        self.bytes[start..end].copy_from_slice(data);
    }

    /// Writes `data` at `offset` within `frame`; used by the stack-layout
    /// code in `execv`, which writes arbitrarily-sized strings and pointer
    /// arrays rather than whole pages at a time.
    pub fn write_at(&mut self, frame: usize, offset: usize, data: &[u8]) {
        let (start, end) = self.frame_bounds(frame);
        assert!(offset + data.len() <= end - start, "write_at: out of frame bounds");
        self.bytes[start + offset..start + offset + data.len()].copy_from_slice(data);
    }

    pub fn read_at(&self, frame: usize, offset: usize, out: &mut [u8]) {
        let (start, end) = self.frame_bounds(frame);
        assert!(offset + out.len() <= end - start, "read_at: out of frame bounds");
        out.copy_from_slice(&self.bytes[start + offset..start + offset + out.len()]);
    }

    pub fn copy_frame(&mut self, dst: usize, src: usize) {
        let (src_start, src_end) = self.frame_bounds(src);
        let mut tmp = [0u8; PAGE_SIZE as usize];
        tmp.copy_from_slice(&self.bytes[src_start..src_end]);
        let (dst_start, dst_end) = self.frame_bounds(dst);
        self.bytes[dst_start..dst_end].copy_from_slice(&tmp);
    }

    fn frame_bounds(&self, frame: usize) -> (usize, usize) {
        let start = frame * PAGE_SIZE as usize;
        let end = start + PAGE_SIZE as usize;
        assert!(end <= self.bytes.len(), "frame index out of range");
        (start, end)
    }
}
