//! Host-visible buffers replicated per frame slot.
//!
//! The CPU only writes the copy of the slot it is about to record, after
//! that slot's fence wait, so frames still in flight keep reading their own
//! data.

use std::marker::PhantomData;

use ash::vk;
use bytemuck::Pod;
use kestrel_gpu::{Buffer, BufferDesc, GpuContext, GpuError, Residency, Result};

/// One `T` per frame slot.
pub struct PerFrameBuffer<T: Pod> {
    buffers: Vec<Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Pod> PerFrameBuffer<T> {
    pub fn new(
        ctx: &GpuContext,
        name: &str,
        usage: vk::BufferUsageFlags,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let size = std::mem::size_of::<T>() as u64;
        let mut buffers = Vec::with_capacity(frames_in_flight);
        for slot in 0..frames_in_flight {
            let slot_name = format!("{name}[{slot}]");
            match Buffer::new(ctx, &BufferDesc::new(&slot_name, size, usage, Residency::Host)) {
                Ok(buffer) => buffers.push(buffer),
                Err(err) => {
                    for buffer in buffers {
                        buffer.destroy(ctx)?;
                    }
                    return Err(err);
                }
            }
        }
        tracing::debug!(
            "Created per-frame buffer '{name}': {frames_in_flight} x {size} bytes"
        );
        Ok(Self {
            buffers,
            _marker: PhantomData,
        })
    }

    /// Overwrite the slot's copy.
    pub fn update(&mut self, ctx: &GpuContext, slot: usize, value: &T) -> Result<()> {
        let frames = self.buffers.len();
        let buffer = self.buffers.get_mut(slot).ok_or_else(|| {
            GpuError::InvalidState(format!("frame slot {slot} out of range ({frames} slots)"))
        })?;
        buffer.write(ctx, std::slice::from_ref(value), 0)
    }

    pub fn buffer(&self, slot: usize) -> Option<&Buffer> {
        self.buffers.get(slot)
    }

    pub fn descriptor_info(&self, slot: usize) -> Option<vk::DescriptorBufferInfo> {
        self.buffers.get(slot).map(Buffer::descriptor_info)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Destroy every copy. No frame using them may be in flight.
    pub fn destroy(&mut self, ctx: &GpuContext) -> Result<()> {
        for buffer in self.buffers.drain(..) {
            buffer.destroy(ctx)?;
        }
        Ok(())
    }
}
