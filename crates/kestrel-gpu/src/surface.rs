//! Surface management for windowed rendering.
//!
//! The surface itself is created by [`GpuContextBuilder::build_for_window`]
//! because device selection needs it for the presentation check.
//!
//! [`GpuContextBuilder::build_for_window`]: crate::context::GpuContextBuilder::build_for_window

use crate::context::GpuContext;
use crate::error::Result;
use crate::swapchain::{
    calculate_extent, select_present_mode, select_surface_format, Swapchain, SwapchainConfig,
};
use ash::vk;

/// Surface context for windowed rendering.
///
/// Owns the Vulkan surface and the swapchain loader for a window.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Wrap a surface created on the context's instance.
    pub fn new(
        gpu: &GpuContext,
        surface_loader: ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());
        Self {
            surface,
            surface_loader,
            swapchain_loader,
        }
    }

    /// The raw surface handle.
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// The swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Query surface capabilities.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Create a swapchain for this surface.
    ///
    /// `old_swapchain` is handed to the driver for resource reuse; the caller
    /// still destroys it afterwards.
    pub fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let caps = self.capabilities(gpu)?;

        let config = SwapchainConfig {
            surface: self.surface,
            surface_format: select_surface_format(&caps.formats)?,
            present_mode: select_present_mode(&caps.present_modes, vsync),
            extent: calculate_extent(&caps.capabilities, width, height),
            queue_families: gpu.queue_families(),
            old_swapchain,
        };

        let swapchain = unsafe {
            Swapchain::new(
                gpu.device(),
                &self.swapchain_loader,
                &caps.capabilities,
                &config,
            )
        }?;
        for &image in swapchain.images() {
            gpu.set_debug_name(image, "swapchain image");
        }

        tracing::info!(
            "Swapchain created: {}x{} {:?} {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.present_mode,
            swapchain.image_count()
        );
        Ok(swapchain)
    }

    /// Replace the swapchain with one of the new dimensions.
    ///
    /// # Safety
    /// The old swapchain must not be in use (wait for the device to idle).
    pub unsafe fn recreate_swapchain(
        &self,
        gpu: &GpuContext,
        old_swapchain: Swapchain,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Swapchain> {
        let created = self.create_swapchain(gpu, width, height, vsync, Some(old_swapchain.handle()));
        unsafe { old_swapchain.destroy(gpu.device(), &self.swapchain_loader) };
        created
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// Every swapchain of this surface must already be destroyed.
    pub unsafe fn destroy(&self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
