//! Application context.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use ash::vk;
use kestrel_core::RenderSettings;
use kestrel_gpu::{GpuContext, Retired, SurfaceContext, Texture};
use kestrel_render::{ForwardStrategy, Renderer, RendererInfo};
use winit::window::Window;

/// Application context shared across all app methods.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// Frame driver with the forward strategy.
    pub renderer: Renderer,
    /// Surface of the window.
    pub surface: SurfaceContext,
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// Settings the renderer was created with.
    pub settings: RenderSettings,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    pub(crate) fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        surface: SurfaceContext,
        settings: RenderSettings,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let strategy =
            ForwardStrategy::new(&gpu, &settings).context("Failed to create forward strategy")?;
        let renderer = Renderer::new(
            &gpu,
            &surface,
            strategy,
            &settings,
            size.width,
            size.height,
        )
        .context("Failed to create renderer")?;

        Ok(Self {
            window,
            renderer,
            surface,
            gpu,
            settings,
            last_frame_time: Instant::now(),
        })
    }

    /// Current swapchain extent, zero while the window is minimized.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.extent().unwrap_or_default()
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    /// Frames started so far.
    pub fn frame_count(&self) -> u64 {
        self.renderer.frame_number()
    }

    /// Statistics of the most recent frames.
    pub fn renderer_info(&self) -> RendererInfo {
        self.renderer.info()
    }

    /// Make a texture sampleable through the bindless array.
    pub fn register_texture(&mut self, texture: &Texture) -> anyhow::Result<u32> {
        self.renderer
            .strategy_mut()
            .register_texture(texture)?
            .with_context(|| format!("No bindless slot for texture '{}'", texture.name()))
    }

    /// Free a texture's bindless slot and destroy the texture once the
    /// frames in flight are done with it.
    pub fn release_texture(&mut self, texture: Texture, slot: u32) -> anyhow::Result<()> {
        let frame_number = self.renderer.frame_number();
        self.renderer
            .strategy_mut()
            .unregister_texture(slot, frame_number)?;
        self.renderer.retire(Retired::Texture(texture));
        Ok(())
    }

    /// Destroy the renderer and the surface.
    ///
    /// The GPU context itself is dropped with the struct.
    pub(crate) fn cleanup(&mut self) -> anyhow::Result<()> {
        self.renderer.destroy(&self.gpu, &self.surface)?;
        unsafe { self.surface.destroy() };
        Ok(())
    }
}
