//! Frame slots and their lifecycle.
//!
//! Each in-flight slot moves `Idle -> Recording -> Submitted` and returns to
//! `Idle` only once its fence has been waited on. [`FrameRing`] tracks that
//! state machine without touching the device so the pacing rules can be
//! checked in isolation; [`FrameContext`] holds the Vulkan objects of a slot.

use ash::vk;
use kestrel_gpu::command::CommandPool;
use kestrel_gpu::sync::FrameSync;
use kestrel_gpu::{GpuError, Result};

/// Lifecycle state of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Fence signaled; the command buffer may be reset.
    Idle,
    /// Commands are being recorded.
    Recording,
    /// Handed to the queue; the fence is pending.
    Submitted,
}

/// Round-robin bookkeeping for the frames in flight.
#[derive(Debug, Clone)]
pub struct FrameRing {
    states: Vec<FrameState>,
    current: usize,
    frame_number: u64,
}

impl FrameRing {
    /// Create a ring with `frames_in_flight` idle slots (at least one).
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            states: vec![FrameState::Idle; frames_in_flight.max(1)],
            current: 0,
            frame_number: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.states.len()
    }

    /// Index of the slot the next frame uses.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of frames started so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn state(&self, slot: usize) -> Option<FrameState> {
        self.states.get(slot).copied()
    }

    /// Record that the current slot's fence has been waited on.
    pub fn retire(&mut self) {
        let state = &mut self.states[self.current];
        if *state == FrameState::Submitted {
            *state = FrameState::Idle;
        }
    }

    /// Start recording into the current slot.
    ///
    /// Fails unless the slot is idle, i.e. its previous submission has been
    /// retired.
    pub fn begin_recording(&mut self) -> Result<usize> {
        let slot = self.current;
        match self.states[slot] {
            FrameState::Idle => {
                self.states[slot] = FrameState::Recording;
                Ok(slot)
            }
            other => Err(GpuError::InvalidState(format!(
                "frame slot {slot} is {other:?}, expected Idle"
            ))),
        }
    }

    /// Mark the recorded slot as submitted.
    pub fn submit(&mut self) -> Result<()> {
        let slot = self.current;
        match self.states[slot] {
            FrameState::Recording => {
                self.states[slot] = FrameState::Submitted;
                Ok(())
            }
            other => Err(GpuError::InvalidState(format!(
                "cannot submit frame slot {slot} in state {other:?}"
            ))),
        }
    }

    /// Drop a frame that was started but never submitted.
    pub fn abandon(&mut self) {
        let state = &mut self.states[self.current];
        if *state == FrameState::Recording {
            *state = FrameState::Idle;
        }
    }

    /// Move to the next slot.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.states.len();
        self.frame_number += 1;
    }
}

/// Device objects owned by one frame slot.
pub struct FrameContext {
    pub command_buffer: vk::CommandBuffer,
    pub sync: FrameSync,
}

/// The per-slot command pool and contexts.
pub struct FrameContexts {
    pool: CommandPool,
    frames: Vec<FrameContext>,
}

impl FrameContexts {
    /// Create `count` contexts on the graphics queue family.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, queue_family: u32, count: usize) -> Result<Self> {
        let pool = unsafe {
            CommandPool::new(
                device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;
        let command_buffers = match unsafe {
            pool.allocate_command_buffers(device, vk::CommandBufferLevel::PRIMARY, count as u32)
        } {
            Ok(buffers) => buffers,
            Err(err) => {
                unsafe { pool.destroy(device) };
                return Err(err);
            }
        };

        let mut contexts = Self {
            pool,
            frames: Vec::with_capacity(count),
        };
        for command_buffer in command_buffers {
            match unsafe { FrameSync::new(device) } {
                Ok(sync) => contexts.frames.push(FrameContext {
                    command_buffer,
                    sync,
                }),
                Err(err) => {
                    unsafe { contexts.destroy(device) };
                    return Err(err);
                }
            }
        }
        Ok(contexts)
    }

    pub fn get(&self, slot: usize) -> Option<&FrameContext> {
        self.frames.get(slot)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Destroy every slot and the pool.
    ///
    /// # Safety
    /// No submission of these contexts may be pending.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for frame in self.frames.drain(..) {
                frame.sync.destroy(device);
            }
            self.pool.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_slot_cannot_be_rerecorded_before_retire() {
        let mut ring = FrameRing::new(2);
        ring.begin_recording().unwrap();
        ring.submit().unwrap();
        ring.advance();
        ring.begin_recording().unwrap();
        ring.submit().unwrap();
        ring.advance();

        // Back at slot 0 with its fence still pending.
        assert_eq!(ring.current(), 0);
        assert!(ring.begin_recording().is_err());
        ring.retire();
        assert_eq!(ring.begin_recording().unwrap(), 0);
    }

    #[test]
    fn wrapping_past_unretired_slots_is_refused() {
        let frames_in_flight = 3;
        let mut ring = FrameRing::new(frames_in_flight);

        for frame in 0..frames_in_flight {
            assert_eq!(ring.begin_recording().unwrap(), frame);
            ring.submit().unwrap();
            ring.advance();
        }

        // Frame fif + 1 lands on slot 0 whose fence was never waited on.
        assert_eq!(ring.frame_number(), frames_in_flight as u64);
        assert_eq!(ring.current(), 0);
        assert!(ring.begin_recording().is_err());
        assert_eq!(ring.state(0), Some(FrameState::Submitted));
        for slot in 1..frames_in_flight {
            assert_eq!(ring.state(slot), Some(FrameState::Submitted));
        }
    }

    #[test]
    fn abandoned_frame_returns_to_idle() {
        let mut ring = FrameRing::new(1);
        ring.begin_recording().unwrap();
        ring.abandon();
        assert_eq!(ring.state(0), Some(FrameState::Idle));
        assert!(ring.submit().is_err());
    }

    #[test]
    fn zero_slots_clamps_to_one() {
        let mut ring = FrameRing::new(0);
        assert_eq!(ring.frames_in_flight(), 1);
        ring.advance();
        assert_eq!(ring.current(), 0);
    }
}
