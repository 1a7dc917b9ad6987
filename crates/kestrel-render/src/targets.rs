//! Size-dependent render targets, rebuilt together with the swapchain.

use ash::vk;
use kestrel_gpu::{GpuContext, Image, ImageDesc, ImageLayout, Result};

/// The depth buffer shared by every frame slot.
pub struct DepthTarget {
    image: Image,
}

impl DepthTarget {
    /// Create a depth image of `extent` in the device's best depth format,
    /// already in depth-attachment layout.
    pub fn new(ctx: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let desc = ImageDesc::new(
            "depth target",
            extent.width,
            extent.height,
            ctx.capabilities().depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        let mut image = Image::new(ctx, &desc)?;
        if let Err(err) = image.transition_layout(ctx, ImageLayout::DepthStencilAttachment) {
            image.destroy(ctx)?;
            return Err(err);
        }
        tracing::debug!(
            "Depth target created: {}x{} {:?}",
            extent.width,
            extent.height,
            image.format()
        );
        Ok(Self { image })
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    pub fn extent(&self) -> vk::Extent2D {
        let extent = self.image.extent();
        vk::Extent2D {
            width: extent.width,
            height: extent.height,
        }
    }

    /// Order this frame's depth writes after the previous frame's.
    ///
    /// The contents are cleared on load, so the barrier only carries the
    /// write-after-write dependency between frames in flight.
    ///
    /// # Safety
    /// `cmd` must be recording outside a rendering scope.
    pub unsafe fn record_reuse_barrier(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        let stages = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
        let access = vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
        let layout = ImageLayout::DepthStencilAttachment.to_vk();
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(stages)
            .dst_access_mask(access)
            .old_layout(layout)
            .new_layout(layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image.handle())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.image.aspect(),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    pub fn destroy(self, ctx: &GpuContext) -> Result<()> {
        self.image.destroy(ctx)
    }
}
