//! `RenderApp` trait definition.

use kestrel_render::SceneFrame;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

use crate::context::AppContext;

/// Trait for Kestrel applications.
///
/// The framework owns the window, the GPU context and the frame driver. An
/// application updates its own state and describes each frame as a
/// [`SceneFrame`]; acquiring, recording, submitting and presenting are done
/// for it.
pub trait RenderApp: Sized {
    /// Initialize the application.
    ///
    /// Called once, after the window, GPU context and renderer exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance application state by `dt` seconds.
    fn update(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()>;

    /// Describe the next frame: camera, lights and draws.
    fn prepare_frame(&mut self, ctx: &AppContext) -> SceneFrame;

    /// The drawable size changed.
    ///
    /// The renderer rebuilds its swapchain on the next frame; only
    /// application-owned size-dependent state needs handling here.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a window event. Return `true` to stop further processing.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Handle raw device input.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Release application resources before shutdown.
    ///
    /// The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
