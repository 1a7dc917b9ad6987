//! The pluggable part of the frame: what gets drawn and with which data.

use ash::vk;
use kestrel_gpu::{GpuContext, Result};

use crate::draw::SceneFrame;
use crate::recorder::CommandRecorder;

/// Attachment formats of the rendering scope opened by the frame driver.
///
/// Pipelines used by a strategy must be built for these formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// A rendering technique driven by [`FrameDriver`](crate::FrameDriver).
///
/// Call order per frame: `prepare` (any time before `render`), then, after
/// the slot's fence wait, `update` and `record_passes` for that slot.
pub trait DrawStrategy {
    /// Take the scene input of the next frame.
    fn prepare(&mut self, scene: SceneFrame);

    /// Write the slot's per-frame data for frame `frame_number`. The slot's
    /// previous submission has completed.
    fn update(&mut self, gpu: &GpuContext, slot: usize, frame_number: u64) -> Result<()>;

    /// Record draws inside the frame's rendering scope.
    fn record_passes(&mut self, recorder: &mut CommandRecorder<'_>, frame_index: usize);

    /// Color the attachment is cleared to.
    fn clear_color(&self) -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }

    /// The render targets were rebuilt. The device is idle.
    fn on_resize(&mut self, _gpu: &GpuContext, _extent: vk::Extent2D, _formats: TargetFormats) -> Result<()> {
        Ok(())
    }

    /// Release every GPU resource. The device is idle.
    fn destroy(&mut self, gpu: &GpuContext) -> Result<()>;
}
