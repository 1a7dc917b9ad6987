//! GPU context management.
//!
//! [`GpuContext`] is the explicitly constructed rendering context: it owns
//! the instance, the selected device, its queues, the memory allocator and
//! the immediate-submit path. Every resource factory takes it by reference,
//! and it must outlive every resource created from it.

use crate::capabilities::{DeviceCandidate, DeviceRequirements, GpuCapabilities, QueueFamilies};
use crate::command::ImmediateSubmit;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device, DebugMessenger};
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;
use ash::vk;
use parking_lot::{Mutex, MutexGuard};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    immediate: Mutex<ImmediateSubmit>,
    /// Serializes host access to the graphics and present queues.
    queue_lock: Mutex<()>,

    pub(crate) queue_families: QueueFamilies,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the Vulkan device.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        Arc::clone(&self.device)
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue (may equal the graphics queue).
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.queue_families.graphics
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.queue_families.present
    }

    /// Both queue family indices.
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Format features supported by the device.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// Record and run commands on the blocking immediate-submit path.
    ///
    /// Intended for uploads and one-off layout changes, never for per-frame work.
    /// Safe to call from any thread; the submission takes the queue lock.
    pub fn immediate_submit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let immediate = self.immediate.lock();
        unsafe { immediate.execute(&self.device, &self.queue_lock, f) }
    }

    /// Lock the graphics and present queues.
    ///
    /// Every `vkQueueSubmit`, `vkQueuePresentKHR` and `vkQueueWaitIdle` on
    /// [`Self::graphics_queue`] or [`Self::present_queue`] must happen while
    /// the guard is held. The immediate-submit path takes it internally.
    pub fn lock_queues(&self) -> MutexGuard<'_, ()> {
        self.queue_lock.lock()
    }

    /// Attach a debug name to a Vulkan object. No-op without validation.
    pub fn set_debug_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        if let Err(err) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            tracing::debug!("Failed to name object {name:?}: {err}");
        }
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        let _queues = self.queue_lock.lock();
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.immediate.lock().destroy(&self.device);

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        tracing::info!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    requirements: DeviceRequirements,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Kestrel".to_string(),
            enable_validation: cfg!(debug_assertions),
            requirements: DeviceRequirements::default(),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Core features the device must support; they are enabled on the device.
    pub fn require_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.requirements.features = features;
        self
    }

    /// Add a device extension the device must support.
    pub fn require_extension(mut self, extension: &'static CStr) -> Self {
        self.requirements.extensions.push(extension);
        self
    }

    /// Add a device extension that is enabled only when available.
    pub fn optional_extension(mut self, extension: &'static CStr) -> Self {
        self.requirements.optional_extensions.push(extension);
        self
    }

    /// Build a headless GPU context (no surface, no presentation check).
    pub fn build(self) -> Result<GpuContext> {
        let entry = load_entry()?;
        let (instance, debug_utils) =
            unsafe { create_instance(&entry, &self.app_name, None, self.enable_validation) }?;

        let result = unsafe { self.finish(entry.clone(), instance.clone(), debug_utils, None) };
        match result {
            Ok(context) => Ok(context),
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    /// Build a GPU context able to present to `window`, plus its surface.
    ///
    /// The surface must be destroyed with [`SurfaceContext::destroy`] before
    /// the context is dropped.
    pub fn build_for_window<W>(mut self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?
            .as_raw();

        if !self.requirements.extensions.contains(&ash::khr::swapchain::NAME) {
            self.requirements.extensions.push(ash::khr::swapchain::NAME);
        }

        let entry = load_entry()?;
        let (instance, debug_utils) = unsafe {
            create_instance(&entry, &self.app_name, Some(display), self.enable_validation)
        }?;

        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display, window_handle, None)
        } {
            Ok(surface) => surface,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(GpuError::SurfaceCreation(err.to_string()));
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let present = |physical_device: vk::PhysicalDevice, family: u32| unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, family, surface)
                .unwrap_or(false)
        };

        let result = unsafe { self.finish(entry, instance.clone(), debug_utils, Some(&present)) };
        match result {
            Ok(context) => {
                let surface = SurfaceContext::new(&context, surface_loader, surface);
                Ok((context, surface))
            }
            Err(err) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                Err(err)
            }
        }
    }

    /// Select the device and create everything that hangs off it.
    ///
    /// On error the caller still owns (and must destroy) the instance.
    unsafe fn finish(
        self,
        entry: ash::Entry,
        instance: ash::Instance,
        debug_utils: bool,
        present: Option<&dyn Fn(vk::PhysicalDevice, u32) -> bool>,
    ) -> Result<GpuContext> {
        let (physical_device, candidate, queue_families) =
            unsafe { select_physical_device(&instance, &self.requirements, present) }?;

        let capabilities = unsafe {
            GpuCapabilities::query(&instance, physical_device, &candidate, queue_families)
        }?;
        tracing::info!("Selected GPU: {}", capabilities.summary());

        let device = unsafe {
            create_device(
                &instance,
                physical_device,
                &candidate,
                &self.requirements,
                queue_families,
            )
        }?;
        let device = Arc::new(device);

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        let built = (|| -> Result<(GpuAllocator, ImmediateSubmit)> {
            let allocator =
                unsafe { GpuAllocator::new(&instance, Arc::clone(&device), physical_device) }?;
            let immediate =
                unsafe { ImmediateSubmit::new(&device, queue_families.graphics, graphics_queue) }?;
            Ok((allocator, immediate))
        })();
        let (allocator, immediate) = match built {
            Ok(parts) => parts,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(err);
            }
        };

        let (debug_messenger, debug_utils) = if debug_utils {
            let messenger = match unsafe { DebugMessenger::new(&entry, &instance) } {
                Ok(messenger) => Some(messenger),
                Err(err) => {
                    tracing::warn!("Failed to install debug messenger: {err}");
                    None
                }
            };
            (
                messenger,
                Some(ash::ext::debug_utils::Device::new(&instance, &device)),
            )
        } else {
            (None, None)
        };

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            debug_utils,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            immediate: Mutex::new(immediate),
            queue_lock: Mutex::new(()),
            queue_families,
            graphics_queue,
            present_queue,
        })
    }
}

fn load_entry() -> Result<ash::Entry> {
    unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))
}

/// Create the logical device with the negotiated extensions and features.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidate: &DeviceCandidate,
    requirements: &DeviceRequirements,
    queue_families: QueueFamilies,
) -> Result<ash::Device> {
    let unique_families: BTreeSet<u32> = [queue_families.graphics, queue_families.present]
        .into_iter()
        .collect();

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let missing_optional = candidate.missing_optional_extensions(requirements);
    let extension_names: Vec<*const c_char> = requirements
        .extensions
        .iter()
        .chain(
            requirements
                .optional_extensions
                .iter()
                .filter(|ext| !missing_optional.contains(ext)),
        )
        .map(|ext| ext.as_ptr())
        .collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let indexing = requirements.descriptor_indexing;
    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default()
        .descriptor_indexing(indexing.any())
        .descriptor_binding_partially_bound(indexing.descriptor_binding_partially_bound)
        .descriptor_binding_sampled_image_update_after_bind(
            indexing.descriptor_binding_sampled_image_update_after_bind,
        )
        .descriptor_binding_storage_buffer_update_after_bind(
            indexing.descriptor_binding_storage_buffer_update_after_bind,
        )
        .descriptor_binding_update_unused_while_pending(
            indexing.descriptor_binding_update_unused_while_pending,
        )
        .runtime_descriptor_array(indexing.runtime_descriptor_array)
        .shader_sampled_image_array_non_uniform_indexing(
            indexing.shader_sampled_image_array_non_uniform_indexing,
        );

    // Anisotropic filtering is enabled whenever the hardware has it.
    let mut features = requirements.features;
    if candidate.features.sampler_anisotropy == vk::TRUE {
        features.sampler_anisotropy = vk::TRUE;
    }

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }?;

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_can_be_shared_with_loader_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GpuContext>();
    }
}
