use std::ops::Range;

/// Physical-memory services the translation core needs from its host.
///
/// The core never addresses individual bytes; it only asks for whole-frame
/// operations: duplication when a copy-on-write fault resolves, and
/// zero-fill before a frame is handed out for first touch.
pub trait PhysicalMemory {
    /// Copies the full content of frame `src` over frame `dst`.
    fn copy_frame(&mut self, src: usize, dst: usize);

    /// Zero-fills `pfn`.
    fn clear_frame(&mut self, pfn: usize);
}

/// Flat in-memory frame store, the backend the demo driver and the tests
/// run against.
pub struct FrameBuffer {
    frame_size: usize,
    bytes: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(frames: usize, frame_size: usize) -> Self {
        FrameBuffer {
            frame_size,
            bytes: vec![0; frames * frame_size],
        }
    }

    fn range(&self, pfn: usize) -> Range<usize> {
        let start = pfn * self.frame_size;
        start..start + self.frame_size
    }

    pub fn frame(&self, pfn: usize) -> &[u8] {
        &self.bytes[self.range(pfn)]
    }

    pub fn byte(&self, pfn: usize, offset: usize) -> u8 {
        assert!(offset < self.frame_size, "offset {offset} beyond frame");
        self.bytes[pfn * self.frame_size + offset]
    }

    pub fn set_byte(&mut self, pfn: usize, offset: usize, value: u8) {
        assert!(offset < self.frame_size, "offset {offset} beyond frame");
        self.bytes[pfn * self.frame_size + offset] = value;
    }
}

impl PhysicalMemory for FrameBuffer {
    fn copy_frame(&mut self, src: usize, dst: usize) {
        let src_range = self.range(src);
        self.bytes.copy_within(src_range, dst * self.frame_size);
    }

    fn clear_frame(&mut self, pfn: usize) {
        let range = self.range(pfn);
        self.bytes[range].fill(0);
    }
}
