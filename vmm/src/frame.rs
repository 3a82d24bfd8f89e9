use crate::error::MmuError;

/// Physical frame bookkeeping.
///
/// For every frame this tracks how many page-table entries, across all
/// processes, point at it. A frame with refcount zero is free. There is no
/// separate free list: allocation rescans in ascending order, which doubles
/// as the deterministic smallest-pfn-first policy.
pub struct FrameAllocator<const FRAMES: usize> {
    refcounts: [u32; FRAMES],
}

impl<const FRAMES: usize> FrameAllocator<FRAMES> {
    pub fn new() -> Self {
        FrameAllocator {
            refcounts: [0; FRAMES],
        }
    }

    /// Claims the smallest-numbered free frame, leaving it with refcount 1.
    pub fn allocate(&mut self) -> Result<usize, MmuError> {
        let pfn = (0..FRAMES)
            .find(|&pfn| self.refcounts[pfn] == 0)
            .ok_or(MmuError::OutOfFrames)?;
        self.refcounts[pfn] = 1;
        Ok(pfn)
    }

    /// Adds one more mapping to an already-allocated frame.
    pub fn retain(&mut self, pfn: usize) {
        assert!(self.refcounts[pfn] > 0, "retain on free frame {pfn}");
        self.refcounts[pfn] += 1;
    }

    /// Drops one mapping; returns `true` when the frame became free.
    pub fn release(&mut self, pfn: usize) -> bool {
        assert!(self.refcounts[pfn] > 0, "refcount underflow on frame {pfn}");
        self.refcounts[pfn] -= 1;
        self.refcounts[pfn] == 0
    }

    pub fn refcount(&self, pfn: usize) -> u32 {
        self.refcounts[pfn]
    }

    pub fn free_frames(&self) -> usize {
        self.refcounts.iter().filter(|&&rc| rc == 0).count()
    }
}
