//! Synchronization primitives.

use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.create_semaphore(&create_info, None) }?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&create_info, None) }?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns) }?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence]) }?;
    Ok(())
}

/// Per-frame-slot synchronization objects.
///
/// The render-finished semaphore is not here: presentation keeps it busy
/// until its swapchain image is re-acquired, so it is owned per image
/// (see [`PresentSemaphores`]).
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to be written
    pub image_available: vk::Semaphore,
    /// Signaled when the GPU has finished this slot's submission
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources. The fence starts signaled.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        unsafe {
            Ok(Self {
                image_available: create_semaphore(device)?,
                in_flight: create_fence(device, true)?,
            })
        }
    }

    /// Block until the GPU has finished this slot's previous submission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { wait_for_fence(device, self.in_flight, u64::MAX) }
    }

    /// Reset the fence for the next submission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { reset_fence(device, self.in_flight) }
    }

    /// Destroy synchronization resources.
    ///
    /// # Safety
    /// The device must be valid and resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// One render-finished semaphore per swapchain image.
pub struct PresentSemaphores {
    semaphores: Vec<vk::Semaphore>,
}

impl PresentSemaphores {
    /// Create `image_count` semaphores.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, image_count: usize) -> Result<Self> {
        let mut semaphores = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            match unsafe { create_semaphore(device) } {
                Ok(semaphore) => semaphores.push(semaphore),
                Err(err) => {
                    for semaphore in semaphores {
                        unsafe { device.destroy_semaphore(semaphore, None) };
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self { semaphores })
    }

    /// Semaphore for a swapchain image index.
    pub fn get(&self, image_index: u32) -> Option<vk::Semaphore> {
        self.semaphores.get(image_index as usize).copied()
    }

    /// Number of semaphores.
    pub fn len(&self) -> usize {
        self.semaphores.len()
    }

    /// Whether there are no semaphores.
    pub fn is_empty(&self) -> bool {
        self.semaphores.is_empty()
    }

    /// Destroy all semaphores.
    ///
    /// # Safety
    /// No presentation may be waiting on them.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for semaphore in self.semaphores.drain(..) {
            unsafe { device.destroy_semaphore(semaphore, None) };
        }
    }
}
