//! The frame driver: acquire, record, submit and present with several
//! frames in flight.

use ash::vk;
use kestrel_core::RenderSettings;
use kestrel_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffer};
use kestrel_gpu::image::record_untracked_transition;
use kestrel_gpu::{
    AcquireOutcome, DeferredQueue, GpuContext, GpuError, ImageLayout, PresentSemaphores, Result,
    Retired, SemaphoreStage, SurfaceContext, Swapchain, TimestampQueries,
};

use crate::draw::SceneFrame;
use crate::frame::{FrameContexts, FrameRing};
use crate::info::{DrawTimeStats, RendererInfo};
use crate::recorder::CommandRecorder;
use crate::strategy::{DrawStrategy, TargetFormats};
use crate::targets::DepthTarget;

/// What happened to a call to [`FrameDriver::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented.
    Rendered,
    /// Nothing was drawn: the surface is zero-sized or the swapchain was
    /// rebuilt.
    Skipped,
}

/// Everything that depends on the drawable size.
struct SwapchainTargets {
    swapchain: Swapchain,
    render_finished: PresentSemaphores,
    depth: DepthTarget,
}

impl SwapchainTargets {
    fn create(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        extent: vk::Extent2D,
        vsync: bool,
        old: Option<Swapchain>,
    ) -> Result<Self> {
        let swapchain = match old {
            Some(old) => unsafe {
                surface.recreate_swapchain(gpu, old, extent.width, extent.height, vsync)
            }?,
            None => surface.create_swapchain(gpu, extent.width, extent.height, vsync, None)?,
        };

        let render_finished =
            match unsafe { PresentSemaphores::new(gpu.device(), swapchain.image_count()) } {
                Ok(semaphores) => semaphores,
                Err(err) => {
                    unsafe { swapchain.destroy(gpu.device(), surface.swapchain_loader()) };
                    return Err(err);
                }
            };

        match DepthTarget::new(gpu, swapchain.extent()) {
            Ok(depth) => Ok(Self {
                swapchain,
                render_finished,
                depth,
            }),
            Err(err) => {
                let mut render_finished = render_finished;
                unsafe {
                    render_finished.destroy(gpu.device());
                    swapchain.destroy(gpu.device(), surface.swapchain_loader());
                }
                Err(err)
            }
        }
    }

    fn formats(&self) -> TargetFormats {
        TargetFormats {
            color: self.swapchain.format(),
            depth: self.depth.format(),
        }
    }

    /// Destroy the size-dependent resources but keep the swapchain so its
    /// replacement can be created from it.
    ///
    /// # Safety
    /// The device must be idle.
    unsafe fn into_swapchain(mut self, gpu: &GpuContext) -> Result<Swapchain> {
        unsafe { self.render_finished.destroy(gpu.device()) };
        self.depth.destroy(gpu)?;
        Ok(self.swapchain)
    }

    /// # Safety
    /// The device must be idle.
    unsafe fn destroy(self, gpu: &GpuContext, surface: &SurfaceContext) -> Result<()> {
        let swapchain = unsafe { self.into_swapchain(gpu) }?;
        unsafe { swapchain.destroy(gpu.device(), surface.swapchain_loader()) };
        Ok(())
    }
}

/// Drives a [`DrawStrategy`] through the per-frame protocol.
///
/// Each call to [`render`](Self::render) runs, for the current frame slot:
/// fence wait, retirement of finished work, acquire, record, submit, present
/// and advance. Stale surfaces are rebuilt and the frame is skipped.
pub struct FrameDriver<S: DrawStrategy> {
    strategy: S,
    frames: FrameContexts,
    ring: FrameRing,
    targets: Option<SwapchainTargets>,
    target_extent: vk::Extent2D,
    needs_rebuild: bool,
    vsync: bool,
    timestamps: Option<TimestampQueries>,
    draw_times: DrawTimeStats,
    deferred: DeferredQueue<Retired>,
    info: RendererInfo,
}

/// The frame driver with the forward strategy.
pub type Renderer = FrameDriver<crate::forward::ForwardStrategy>;

impl<S: DrawStrategy> FrameDriver<S> {
    pub fn new(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        mut strategy: S,
        settings: &RenderSettings,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let frames_in_flight = settings.frames_in_flight;
        let device = gpu.device();
        let frames = unsafe {
            FrameContexts::new(device, gpu.graphics_queue_family(), frames_in_flight)
        }?;

        let caps = gpu.capabilities();
        let timestamps = if caps.supports_timestamps() {
            Some(unsafe {
                TimestampQueries::new(
                    device,
                    frames_in_flight as u32,
                    caps.timestamp_period,
                    caps.timestamp_valid_bits,
                )
            }?)
        } else {
            tracing::warn!("Graphics queue has no timestamp support, draw time stays at 0");
            None
        };

        let target_extent = vk::Extent2D { width, height };
        let targets = if width == 0 || height == 0 {
            None
        } else {
            let targets =
                SwapchainTargets::create(gpu, surface, target_extent, settings.vsync, None)?;
            strategy.on_resize(gpu, targets.swapchain.extent(), targets.formats())?;
            Some(targets)
        };

        Ok(Self {
            strategy,
            frames,
            ring: FrameRing::new(frames_in_flight),
            needs_rebuild: targets.is_none(),
            targets,
            target_extent,
            vsync: settings.vsync,
            timestamps,
            draw_times: DrawTimeStats::new(frames_in_flight),
            deferred: DeferredQueue::new(frames_in_flight),
            info: RendererInfo::default(),
        })
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// Statistics of the most recent frames.
    pub fn info(&self) -> RendererInfo {
        self.info
    }

    /// Frames started so far.
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    /// Current swapchain extent, if the swapchain exists.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.targets.as_ref().map(|t| t.swapchain.extent())
    }

    /// Attachment formats, if the swapchain exists.
    pub fn formats(&self) -> Option<TargetFormats> {
        self.targets.as_ref().map(SwapchainTargets::formats)
    }

    /// Hand the next frame's scene input to the strategy.
    pub fn prepare(&mut self, scene: SceneFrame) {
        self.strategy.prepare(scene);
    }

    /// Rebuild the swapchain for a new drawable size on the next frame.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.target_extent = vk::Extent2D { width, height };
        self.needs_rebuild = true;
    }

    /// Destroy a resource once no frame in flight can reference it.
    pub fn retire(&mut self, resource: impl Into<Retired>) {
        self.deferred
            .queue(resource.into(), self.ring.frame_number());
    }

    /// Resources waiting for destruction.
    pub fn retired_count(&self) -> usize {
        self.deferred.pending_count()
    }

    /// Run one frame.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn render(&mut self, gpu: &GpuContext, surface: &SurfaceContext) -> Result<FrameOutcome> {
        let device = gpu.device();
        let slot = self.ring.current();
        let frame = self.frames.get(slot).ok_or_else(|| {
            GpuError::InvalidState(format!("frame slot {slot} has no context"))
        })?;
        let (cmd, image_available, in_flight) = (
            frame.command_buffer,
            frame.sync.image_available,
            frame.sync.in_flight,
        );

        // Backpressure: the slot's previous submission must be complete.
        unsafe { frame.sync.wait(device) }?;
        self.ring.retire();
        self.poll_timestamps(device, slot)?;
        self.deferred
            .process(self.ring.frame_number(), |resource| resource.destroy(gpu))?;

        if self.target_extent.width == 0 || self.target_extent.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }
        if self.needs_rebuild || self.targets.is_none() {
            self.rebuild(gpu, surface)?;
            return Ok(FrameOutcome::Skipped);
        }
        let Some(targets) = self.targets.as_ref() else {
            return Ok(FrameOutcome::Skipped);
        };

        let acquired = unsafe {
            targets
                .swapchain
                .acquire_next_image(surface.swapchain_loader(), image_available, u64::MAX)
        }?;
        let image_index = match acquired {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    self.needs_rebuild = true;
                }
                index
            }
            AcquireOutcome::Stale => {
                tracing::debug!("Swapchain out of date on acquire, rebuilding");
                self.rebuild(gpu, surface)?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        let render_finished = targets.render_finished.get(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("no render-finished semaphore for image {image_index}"))
        })?;

        self.ring.begin_recording()?;
        if let Err(err) = self.record(gpu, cmd, slot, image_index) {
            self.ring.abandon();
            return Err(err);
        }

        // Only now is the frame certain to be submitted.
        let queues = gpu.lock_queues();
        unsafe {
            device.reset_fences(&[in_flight])?;
            submit_command_buffer(
                device,
                gpu.graphics_queue(),
                cmd,
                &[SemaphoreStage {
                    semaphore: image_available,
                    stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                }],
                &[SemaphoreStage {
                    semaphore: render_finished,
                    stage: vk::PipelineStageFlags2::ALL_COMMANDS,
                }],
                in_flight,
            )?;
        }
        self.ring.submit()?;

        let presented = match self.targets.as_ref() {
            Some(targets) => unsafe {
                targets.swapchain.present(
                    surface.swapchain_loader(),
                    gpu.present_queue(),
                    image_index,
                    &[render_finished],
                )
            },
            None => Err(GpuError::InvalidState(
                "swapchain vanished during the frame".to_string(),
            )),
        };
        drop(queues);
        self.ring.advance();

        if presented?.needs_rebuild() {
            self.needs_rebuild = true;
        }
        Ok(FrameOutcome::Rendered)
    }

    fn poll_timestamps(&mut self, device: &ash::Device, slot: usize) -> Result<()> {
        let Some(timestamps) = &self.timestamps else {
            return Ok(());
        };
        if let Some(ms) = unsafe { timestamps.poll(device, slot as u32) }? {
            self.draw_times.record(slot, ms);
            self.info.draw_time_ms = self.draw_times.average_ms();
        }
        Ok(())
    }

    fn record(
        &mut self,
        gpu: &GpuContext,
        cmd: vk::CommandBuffer,
        slot: usize,
        image_index: u32,
    ) -> Result<()> {
        let device = gpu.device();
        self.strategy.update(gpu, slot, self.ring.frame_number())?;

        let targets = self
            .targets
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("recording without a swapchain".to_string()))?;
        let extent = targets.swapchain.extent();
        let (image, view) = targets
            .swapchain
            .image(image_index)
            .zip(targets.swapchain.image_view(image_index))
            .ok_or_else(|| {
                GpuError::InvalidState(format!("swapchain image {image_index} out of range"))
            })?;
        let pair = slot as u32;

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            if let Some(timestamps) = &self.timestamps {
                timestamps.record_reset(device, cmd, pair);
                timestamps.write_start(device, cmd, pair);
            }

            record_untracked_transition(
                device,
                cmd,
                image,
                "swapchain image",
                ImageLayout::Undefined,
                ImageLayout::ColorAttachment,
            )?;
            targets.depth.record_reuse_barrier(device, cmd);

            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(ImageLayout::ColorAttachment.to_vk())
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.strategy.clear_color(),
                    },
                });
            let depth_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(targets.depth.view())
                .image_layout(ImageLayout::DepthStencilAttachment.to_vk())
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                });
            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent,
                })
                .layer_count(1)
                .color_attachments(std::slice::from_ref(&color_attachment))
                .depth_attachment(&depth_attachment);

            device.cmd_begin_rendering(cmd, &rendering_info);
            let mut recorder = CommandRecorder::new(device, cmd, extent);
            self.strategy.record_passes(&mut recorder, slot);
            self.info.vertices_drawn = recorder.vertices_drawn();
            self.info.meshes_drawn = recorder.meshes_drawn();
            device.cmd_end_rendering(cmd);

            record_untracked_transition(
                device,
                cmd,
                image,
                "swapchain image",
                ImageLayout::ColorAttachment,
                ImageLayout::PresentSrc,
            )?;

            if let Some(timestamps) = &mut self.timestamps {
                timestamps.write_end(device, cmd, pair);
            }
            end_command_buffer(device, cmd)?;
        }
        Ok(())
    }

    /// Tear down and recreate the swapchain and everything sized by it.
    fn rebuild(&mut self, gpu: &GpuContext, surface: &SurfaceContext) -> Result<()> {
        gpu.wait_idle()?;
        let old = match self.targets.take() {
            Some(targets) => Some(unsafe { targets.into_swapchain(gpu) }?),
            None => None,
        };
        let targets =
            SwapchainTargets::create(gpu, surface, self.target_extent, self.vsync, old)?;
        let extent = targets.swapchain.extent();
        self.strategy.on_resize(gpu, extent, targets.formats())?;
        self.targets = Some(targets);
        self.needs_rebuild = false;
        tracing::debug!("Render targets rebuilt at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Wait for the GPU and release everything the driver owns, including
    /// the strategy and retired resources.
    pub fn destroy(&mut self, gpu: &GpuContext, surface: &SurfaceContext) -> Result<()> {
        gpu.wait_idle()?;
        self.strategy.destroy(gpu)?;
        self.deferred.flush(|resource| resource.destroy(gpu))?;
        let device = gpu.device();
        unsafe {
            if let Some(targets) = self.targets.take() {
                targets.destroy(gpu, surface)?;
            }
            if let Some(timestamps) = self.timestamps.take() {
                timestamps.destroy(device);
            }
            self.frames.destroy(device);
        }
        tracing::info!(
            "Frame driver destroyed after {} frames",
            self.ring.frame_number()
        );
        Ok(())
    }
}
