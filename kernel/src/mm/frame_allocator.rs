//! Physical Frame Allocator
//!
//! A free list of frame numbers. A frame is either on this list or backing
//! exactly one valid page-table entry somewhere; the allocator only sees the
//! first half of that bargain.

use super::memory_layout::Frame;
use crate::{KernelError, KernelResult};
use alloc::vec::Vec;
use core::ops::Range;

pub struct FrameAllocator {
    free: Vec<Frame>,
    total: usize,
}

impl FrameAllocator {
    /// Create an allocator owning every frame in `frames`
    pub fn new(frames: Range<usize>) -> Self {
        // Reversed so the lowest frame is handed out first
        let free: Vec<Frame> = frames.rev().map(Frame).collect();
        let total = free.len();
        Self { free, total }
    }

    /// Allocate a physical frame
    pub fn allocate(&mut self) -> KernelResult<Frame> {
        match self.free.pop() {
            Some(frame) => Ok(frame),
            None => {
                log::warn!("frame allocator exhausted ({} frames)", self.total);
                Err(KernelError::OutOfMemory)
            }
        }
    }

    /// Return a frame to the free list.
    ///
    /// The caller must have invalidated the entry that owned it.
    pub fn release(&mut self, frame: Frame) {
        debug_assert!(!self.free.contains(&frame), "double release of {}", frame);
        self.free.push(frame);
    }

    /// Get number of free frames
    pub fn free_frames(&self) -> usize {
        self.free.len()
    }

    /// Get total number of frames
    pub fn total_frames(&self) -> usize {
        self.total
    }

    pub fn is_free(&self, frame: Frame) -> bool {
        self.free.contains(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_until_exhausted_then_recovers() {
        let mut frames = FrameAllocator::new(10..13);
        assert_eq!(frames.total_frames(), 3);

        let a = frames.allocate().unwrap();
        let b = frames.allocate().unwrap();
        let c = frames.allocate().unwrap();
        assert_eq!(a, Frame(10));
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(frames.allocate(), Err(KernelError::OutOfMemory));
        assert_eq!(frames.free_frames(), 0);

        frames.release(b);
        assert!(frames.is_free(b));
        assert_eq!(frames.allocate(), Ok(b));
    }

    #[test]
    fn free_plus_held_is_constant() {
        let mut frames = FrameAllocator::new(0..8);
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(frames.allocate().unwrap());
            assert_eq!(frames.free_frames() + held.len(), frames.total_frames());
        }
        while let Some(frame) = held.pop() {
            frames.release(frame);
            assert_eq!(frames.free_frames() + held.len(), frames.total_frames());
        }
    }
}
