//! Deferred resource destruction for multi-frame-in-flight rendering.
//!
//! A resource retired on frame `n` may still be referenced by command
//! buffers of the frames in flight, so it is only destroyed once
//! `frames_in_flight` further frames have started.

use std::collections::VecDeque;

use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::error::Result;
use crate::image::Image;
use crate::sampler::Sampler;
use crate::texture::Texture;

/// A GPU resource waiting for destruction.
pub enum Retired {
    Buffer(Buffer),
    Image(Image),
    Sampler(Sampler),
    Texture(Texture),
}

impl Retired {
    /// Destroy the resource now.
    pub fn destroy(self, ctx: &GpuContext) -> Result<()> {
        match self {
            Self::Buffer(buffer) => buffer.destroy(ctx),
            Self::Image(image) => image.destroy(ctx),
            Self::Sampler(sampler) => {
                sampler.destroy(ctx);
                Ok(())
            }
            Self::Texture(texture) => texture.destroy(ctx),
        }
    }
}

impl From<Buffer> for Retired {
    fn from(buffer: Buffer) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<Image> for Retired {
    fn from(image: Image) -> Self {
        Self::Image(image)
    }
}

impl From<Sampler> for Retired {
    fn from(sampler: Sampler) -> Self {
        Self::Sampler(sampler)
    }
}

impl From<Texture> for Retired {
    fn from(texture: Texture) -> Self {
        Self::Texture(texture)
    }
}

#[derive(Debug)]
struct PendingDeletion<T> {
    item: T,
    frame_queued: u64,
}

/// Queue for deferred deletions, ordered by the frame they were queued on.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    pending: VecDeque<PendingDeletion<T>>,
    frames_in_flight: usize,
}

impl<T> DeferredQueue<T> {
    /// Create a queue that holds items for `frames_in_flight` frames.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            frames_in_flight,
        }
    }

    /// Queue an item retired on `frame_number`.
    pub fn queue(&mut self, item: T, frame_number: u64) {
        self.pending.push_back(PendingDeletion {
            item,
            frame_queued: frame_number,
        });
    }

    /// Release every item old enough that no in-flight frame can use it.
    ///
    /// Call at the start of each frame, after the slot's fence wait. Stops at
    /// the first error; the failing item is consumed, the rest stay queued.
    pub fn process<F>(&mut self, current_frame_number: u64, mut release: F) -> Result<()>
    where
        F: FnMut(T) -> Result<()>,
    {
        let cutoff = current_frame_number.saturating_sub(self.frames_in_flight as u64);

        // Frame numbers are non-decreasing, so only the front can mature.
        while self
            .pending
            .front()
            .is_some_and(|p| p.frame_queued < cutoff)
        {
            if let Some(pending) = self.pending.pop_front() {
                release(pending.item)?;
            }
        }
        Ok(())
    }

    /// Release everything immediately.
    ///
    /// Only valid once the device is idle (shutdown).
    pub fn flush<F>(&mut self, mut release: F) -> Result<()>
    where
        F: FnMut(T) -> Result<()>,
    {
        while let Some(pending) = self.pending.pop_front() {
            release(pending.item)?;
        }
        Ok(())
    }

    /// Get the number of pending deletions.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(queue: &mut DeferredQueue<u32>, frame: u64) -> Vec<u32> {
        let mut released = Vec::new();
        queue
            .process(frame, |item| {
                released.push(item);
                Ok(())
            })
            .unwrap();
        released
    }

    #[test]
    fn items_survive_frames_in_flight() {
        let mut queue = DeferredQueue::new(3);
        queue.queue(1, 10);
        queue.queue(2, 11);

        assert!(collect(&mut queue, 11).is_empty());
        assert!(collect(&mut queue, 13).is_empty());
        assert_eq!(collect(&mut queue, 14), vec![1]);
        assert_eq!(collect(&mut queue, 15), vec![2]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn flush_releases_everything_in_order() {
        let mut queue = DeferredQueue::new(2);
        for (item, frame) in [(7, 1), (8, 1), (9, 5)] {
            queue.queue(item, frame);
        }
        let mut released = Vec::new();
        queue
            .flush(|item| {
                released.push(item);
                Ok(())
            })
            .unwrap();
        assert_eq!(released, vec![7, 8, 9]);
    }

    #[test]
    fn error_stops_processing() {
        let mut queue = DeferredQueue::new(0);
        queue.queue(1, 0);
        queue.queue(2, 0);
        let result = queue.process(5, |_| {
            Err(crate::error::GpuError::InvalidState("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(queue.pending_count(), 1);
    }
}
