//! Shared frame buffer between the decode thread and the display layer.
//!
//! The decode thread is the sole writer; readers take snapshot copies. One
//! mutex guards the published frame and its freshness flag, and the lock is
//! only ever held for a memory copy:
//!
//! - `publish` runs the caller's fill closure under the lock (the closure is
//!   a pixel copy out of an already decoded frame, never I/O or decode work)
//! - `snapshot` clones the published frame under the lock and returns the copy
//!
//! A reader can therefore never observe a buffer mixing bytes from two
//! different frames.

use std::sync::Mutex;

/// One decoded image: pixel bytes plus geometry.
///
/// `channels` is 3 (RGB) or 4 (RGBA); `stride` is the row pitch in bytes.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    stride: usize,
    channels: u8,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        let mut frame = FrameBuffer::default();
        frame.reset(width, height, channels);
        frame
    }

    /// Reallocate for the given geometry. Cheap when the geometry is
    /// unchanged; existing pixel content is not preserved otherwise.
    pub fn reset(&mut self, width: u32, height: u32, channels: u8) {
        self.width = width;
        self.height = height;
        self.channels = channels;
        self.stride = width as usize * channels as usize;
        self.data.resize(self.stride * height as usize, 0);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    frame: FrameBuffer,
    fresh: bool,
}

/// The published frame, jointly owned by the decode thread (writer) and any
/// number of snapshot readers.
#[derive(Debug, Default)]
pub struct SharedFrameBuffer {
    slot: Mutex<Slot>,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a new frame under the lock and mark it fresh.
    ///
    /// The closure receives the published buffer and is expected to `reset`
    /// it to the incoming geometry and copy pixels in.
    pub fn publish<F>(&self, fill: F)
    where
        F: FnOnce(&mut FrameBuffer),
    {
        let mut slot = self.slot.lock().unwrap();
        fill(&mut slot.frame);
        slot.fresh = true;
    }

    /// Copy out the latest published frame, clearing the fresh flag.
    ///
    /// Returns `None` until the first frame has been published.
    pub fn snapshot(&self) -> Option<FrameBuffer> {
        let mut slot = self.slot.lock().unwrap();
        if slot.frame.is_empty() {
            return None;
        }
        slot.fresh = false;
        Some(slot.frame.clone())
    }

    /// True if a frame has been published since the last snapshot.
    pub fn has_new_frame(&self) -> bool {
        self.slot.lock().unwrap().fresh
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let slot = self.slot.lock().unwrap();
        (slot.frame.width(), slot.frame.height())
    }
}
