//! Buffers and host/device copies.

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::Allocation;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::{texel_size, Image, ImageLayout};
use crate::memory::{align_down, host_range, Residency};

/// Parameters for creating a buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub residency: Residency,
}

impl<'a> BufferDesc<'a> {
    pub fn new(name: &'a str, size: u64, usage: vk::BufferUsageFlags, residency: Residency) -> Self {
        Self {
            name,
            size,
            usage,
            residency,
        }
    }

    /// Host-visible transfer source sized for `size` bytes.
    pub fn staging(name: &'a str, size: u64) -> Self {
        Self::new(name, size, vk::BufferUsageFlags::TRANSFER_SRC, Residency::Host)
    }
}

/// A buffer and its memory. Usage and residency are fixed at creation.
pub struct Buffer {
    handle: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: vk::BufferUsageFlags,
    residency: Residency,
    name: String,
}

impl Buffer {
    /// Allocate and bind a buffer.
    pub fn new(ctx: &GpuContext, desc: &BufferDesc<'_>) -> Result<Self> {
        let (handle, allocation) = ctx.allocator().lock().allocate_buffer(
            desc.name,
            desc.size,
            desc.usage,
            desc.residency,
        )?;
        ctx.set_debug_name(handle, desc.name);
        tracing::debug!(
            "Created buffer '{}' ({} bytes, {:?}, {:?})",
            desc.name,
            desc.size,
            desc.usage,
            desc.residency
        );

        Ok(Self {
            handle,
            allocation: Some(allocation),
            size: desc.size,
            usage: desc.usage,
            residency: desc.residency,
            name: desc.name.to_string(),
        })
    }

    /// Create a host-visible buffer holding `data`.
    pub fn with_data<T: Pod>(
        ctx: &GpuContext,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(
            ctx,
            &BufferDesc::new(name, bytes.len() as u64, usage, Residency::Host),
        )?;
        buffer.copy_from_host(ctx, bytes, 0)?;
        Ok(buffer)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mapped_memory(&mut self) -> Result<(&mut Allocation, std::ops::Range<u64>)> {
        if !self.residency.is_host_visible() {
            return Err(GpuError::NotHostVisible(self.name.clone()));
        }
        let allocation = self
            .allocation
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState(format!("buffer '{}' was freed", self.name)))?;
        let range = allocation.offset()..allocation.offset() + allocation.size();
        Ok((allocation, range))
    }

    /// Copy `data` into the buffer at `offset`.
    ///
    /// Only valid on host-visible buffers. Non-coherent memory is flushed
    /// before returning.
    pub fn copy_from_host(&mut self, ctx: &GpuContext, data: &[u8], offset: u64) -> Result<()> {
        let range = host_range(&self.name, self.size, offset, data.len())?;
        let name = self.name.clone();
        let (allocation, memory_range) = self.mapped_memory()?;

        let mapped = allocation
            .mapped_slice_mut()
            .ok_or_else(|| GpuError::NotHostVisible(name))?;
        mapped[range].copy_from_slice(data);

        if !allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            let atom = ctx.capabilities().non_coherent_atom_size;
            let flush = vk::MappedMemoryRange::default()
                .memory(unsafe { allocation.memory() })
                .offset(align_down(memory_range.start, atom))
                .size(vk::WHOLE_SIZE);
            unsafe { ctx.device().flush_mapped_memory_ranges(&[flush]) }?;
        }
        Ok(())
    }

    /// Write a slice of plain-old-data values at `offset`.
    pub fn write<T: Pod>(&mut self, ctx: &GpuContext, data: &[T], offset: u64) -> Result<()> {
        self.copy_from_host(ctx, bytemuck::cast_slice(data), offset)
    }

    /// Read `out.len()` bytes at `offset` back to the host.
    ///
    /// Non-coherent memory is invalidated first.
    pub fn read_to_host(&mut self, ctx: &GpuContext, offset: u64, out: &mut [u8]) -> Result<()> {
        let range = host_range(&self.name, self.size, offset, out.len())?;
        let name = self.name.clone();
        let (allocation, memory_range) = self.mapped_memory()?;

        if !allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            let atom = ctx.capabilities().non_coherent_atom_size;
            let invalidate = vk::MappedMemoryRange::default()
                .memory(unsafe { allocation.memory() })
                .offset(align_down(memory_range.start, atom))
                .size(vk::WHOLE_SIZE);
            unsafe { ctx.device().invalidate_mapped_memory_ranges(&[invalidate]) }?;
        }

        let mapped = allocation
            .mapped_slice()
            .ok_or_else(|| GpuError::NotHostVisible(name))?;
        out.copy_from_slice(&mapped[range]);
        Ok(())
    }

    /// Copy the whole buffer into `dst` on the immediate-submit path.
    pub fn copy_to_buffer(&self, ctx: &GpuContext, dst: &Self) -> Result<()> {
        if self.size != dst.size {
            return Err(GpuError::SizeMismatch {
                src: self.name.clone(),
                src_size: self.size,
                dst: dst.name.clone(),
                dst_size: dst.size,
            });
        }

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: self.size,
        };
        let (src, dst) = (self.handle, dst.handle);
        ctx.immediate_submit(|device, cmd| {
            unsafe { device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region)) };
            Ok(())
        })
    }

    /// Copy tightly packed texels starting at `offset` into mip 0 of `image`.
    ///
    /// The image must already be in the transfer-destination layout, and the
    /// buffer must hold a full mip 0 worth of texels from `offset` on.
    pub fn copy_to_image(&self, ctx: &GpuContext, image: &Image, offset: u64) -> Result<()> {
        if image.layout() != ImageLayout::TransferDst {
            return Err(GpuError::IllegalLayoutTransition {
                name: image.name().to_string(),
                from: image.layout(),
                to: ImageLayout::TransferDst,
            });
        }
        let extent = image.extent();
        let texel = texel_size(image.format()).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "no buffer copy size known for '{}' ({:?})",
                image.name(),
                image.format()
            ))
        })?;
        let required = image_copy_len(texel, extent.width, extent.height);
        check_image_copy(&self.name, self.size, offset, image.name(), required)?;

        let region = vk::BufferImageCopy {
            buffer_offset: offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: image.aspect(),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: image.extent(),
        };
        let (src, dst) = (self.handle, image.handle());
        ctx.immediate_submit(|device, cmd| {
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    src,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&region),
                );
            }
            Ok(())
        })
    }

    /// Descriptor info covering the whole buffer.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.handle,
            offset: 0,
            range: self.size,
        }
    }

    /// Destroy the buffer and free its memory.
    pub fn destroy(mut self, ctx: &GpuContext) -> Result<()> {
        unsafe { ctx.device().destroy_buffer(self.handle, None) };
        if let Some(allocation) = self.allocation.take() {
            ctx.allocator().lock().free(allocation)?;
        }
        Ok(())
    }
}

/// Bytes of a tightly packed `width` x `height` copy.
fn image_copy_len(texel: u64, width: u32, height: u32) -> u64 {
    texel * u64::from(width) * u64::from(height)
}

/// Validate that `size - offset` bytes cover a `required` byte image copy.
fn check_image_copy(
    buffer: &str,
    size: u64,
    offset: u64,
    image: &str,
    required: u64,
) -> Result<()> {
    if offset >= size {
        return Err(GpuError::OutOfBounds {
            name: buffer.to_string(),
            offset,
            len: required,
            size,
        });
    }
    let available = size - offset;
    if available < required {
        return Err(GpuError::SizeMismatch {
            src: buffer.to_string(),
            src_size: available,
            dst: image.to_string(),
            dst_size: required,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_copy_len_scales_with_texel_size() {
        assert_eq!(image_copy_len(4, 16, 16), 1024);
        assert_eq!(image_copy_len(8, 3, 5), 120);
        assert_eq!(image_copy_len(4, 0, 16), 0);
    }

    #[test]
    fn image_copy_needs_full_mip_after_offset() {
        assert!(check_image_copy("staging", 1024, 0, "checker", 1024).is_ok());
        assert!(check_image_copy("staging", 2048, 1024, "checker", 1024).is_ok());

        assert!(matches!(
            check_image_copy("staging", 1024, 4, "checker", 1024),
            Err(GpuError::SizeMismatch {
                src_size: 1020,
                dst_size: 1024,
                ..
            })
        ));
        assert!(matches!(
            check_image_copy("staging", 512, 0, "checker", 1024),
            Err(GpuError::SizeMismatch { src_size: 512, .. })
        ));
    }

    #[test]
    fn image_copy_offset_past_end_is_out_of_bounds() {
        assert!(matches!(
            check_image_copy("staging", 1024, 1024, "checker", 16),
            Err(GpuError::OutOfBounds {
                offset: 1024,
                len: 16,
                size: 1024,
                ..
            })
        ));
    }
}
