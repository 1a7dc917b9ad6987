//! GPU memory management.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Where a resource's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Host visible, written by the CPU and read by the GPU (uploads, per-frame data).
    Host,
    /// Device local, not mappable.
    Device,
    /// Host visible, written by the GPU and read back by the CPU.
    Readback,
}

impl Residency {
    /// The allocator location backing this residency class.
    pub const fn location(self) -> MemoryLocation {
        match self {
            Self::Host => MemoryLocation::CpuToGpu,
            Self::Device => MemoryLocation::GpuOnly,
            Self::Readback => MemoryLocation::GpuToCpu,
        }
    }

    /// Whether memory of this class can be mapped.
    pub const fn is_host_visible(self) -> bool {
        !matches!(self, Self::Device)
    }
}

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(format!("allocator creation: {e}")))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    /// Create a buffer and bind freshly allocated memory to it.
    pub fn allocate_buffer(
        &mut self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        residency: Residency,
    ) -> Result<(vk::Buffer, Allocation)> {
        if size == 0 {
            return Err(GpuError::AllocationFailed(format!(
                "buffer '{name}' requested with zero size"
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.inner().and_then(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: residency.location(),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    GpuError::AllocationFailed(format!(
                        "buffer '{name}' ({size} bytes, usage {usage:?}, {residency:?}): {e}"
                    ))
                })
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(err) = bound {
            unsafe { self.device.destroy_buffer(buffer, None) };
            self.free(allocation)?;
            return Err(err.into());
        }

        Ok((buffer, allocation))
    }

    /// Create an image and bind freshly allocated memory to it.
    pub fn allocate_image(
        &mut self,
        name: &str,
        create_info: &vk::ImageCreateInfo<'_>,
        residency: Residency,
    ) -> Result<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(create_info, None) }?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.inner().and_then(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: residency.location(),
                    linear: create_info.tiling == vk::ImageTiling::LINEAR,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    GpuError::AllocationFailed(format!(
                        "image '{name}' ({}x{}x{}, {:?}, {} mips, usage {:?}, {residency:?}): {e}",
                        create_info.extent.width,
                        create_info.extent.height,
                        create_info.extent.depth,
                        create_info.format,
                        create_info.mip_levels,
                        create_info.usage,
                    ))
                })
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(err) = bound {
            unsafe { self.device.destroy_image(image, None) };
            self.free(allocation)?;
            return Err(err.into());
        }

        Ok((image, allocation))
    }

    /// Return an allocation to the allocator.
    pub fn free(&mut self, allocation: Allocation) -> Result<()> {
        self.inner()?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(format!("free: {e}")))
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Round `value` down to a multiple of `alignment` (a power of two or zero).
pub(crate) const fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        value - value % alignment
    }
}

/// Validate a host access of `len` bytes at `offset` against a resource of `size` bytes.
pub(crate) fn host_range(
    name: &str,
    size: u64,
    offset: u64,
    len: usize,
) -> Result<std::ops::Range<usize>> {
    let out_of_bounds = || GpuError::OutOfBounds {
        name: name.to_string(),
        offset,
        len: len as u64,
        size,
    };
    let end = offset.checked_add(len as u64).ok_or_else(out_of_bounds)?;
    if end > size {
        return Err(out_of_bounds());
    }
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    Ok(start..start + len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residency_maps_to_locations() {
        assert_eq!(Residency::Host.location(), MemoryLocation::CpuToGpu);
        assert_eq!(Residency::Device.location(), MemoryLocation::GpuOnly);
        assert_eq!(Residency::Readback.location(), MemoryLocation::GpuToCpu);
        assert!(!Residency::Device.is_host_visible());
        assert!(Residency::Readback.is_host_visible());
    }

    #[test]
    fn host_range_bounds() {
        assert_eq!(host_range("b", 64, 16, 48).unwrap(), 16..64);
        assert_eq!(host_range("b", 64, 64, 0).unwrap(), 64..64);
        assert!(matches!(
            host_range("b", 64, 16, 49),
            Err(GpuError::OutOfBounds { offset: 16, len: 49, size: 64, .. })
        ));
        assert!(host_range("b", 64, u64::MAX, 1).is_err());
    }

    #[test]
    fn align_down_to_atom() {
        assert_eq!(align_down(300, 256), 256);
        assert_eq!(align_down(256, 256), 256);
        assert_eq!(align_down(17, 0), 17);
    }
}
