//! Images, their layout state machine and mip chain generation.
//!
//! The recorded layout of an [`Image`] only changes through
//! [`ImageState::apply_transition`], which accepts the edges listed in
//! [`transition_barrier`] and rejects everything else. Barriers are emitted
//! with synchronization2.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use kestrel_core::constants::MIP_GENERATION_MIN_TEXELS;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::Residency;

/// Access layout of an image as tracked on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferSrc,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    DepthStencilAttachment,
    General,
    PresentSrc,
}

impl ImageLayout {
    /// The Vulkan layout.
    pub const fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::General => vk::ImageLayout::GENERAL,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

/// Stage and access masks for one layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// Barrier masks for a legal transition, `None` for anything undeclared.
pub fn transition_barrier(from: ImageLayout, to: ImageLayout) -> Option<LayoutBarrier> {
    use vk::AccessFlags2 as A;
    use vk::PipelineStageFlags2 as S;
    use ImageLayout as L;

    let (src_stage, src_access, dst_stage, dst_access) = match (from, to) {
        (L::Undefined, L::TransferDst) => (S::TOP_OF_PIPE, A::NONE, S::TRANSFER, A::TRANSFER_WRITE),
        (L::TransferDst, L::ShaderReadOnly) => (
            S::TRANSFER,
            A::TRANSFER_WRITE,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        (L::TransferDst, L::TransferSrc) => {
            (S::TRANSFER, A::TRANSFER_WRITE, S::TRANSFER, A::TRANSFER_READ)
        }
        (L::TransferSrc, L::ShaderReadOnly) => (
            S::TRANSFER,
            A::TRANSFER_READ,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        (L::ShaderReadOnly, L::TransferSrc) => (
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
            S::TRANSFER,
            A::TRANSFER_READ,
        ),
        (L::Undefined, L::DepthStencilAttachment) => (
            S::TOP_OF_PIPE,
            A::NONE,
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        // Source stage matches the acquire semaphore wait stage.
        (L::Undefined, L::ColorAttachment) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::NONE,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::ColorAttachment, L::PresentSrc) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::BOTTOM_OF_PIPE,
            A::NONE,
        ),
        (L::ColorAttachment, L::ShaderReadOnly) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
        ),
        (L::ShaderReadOnly, L::ColorAttachment) => (
            S::FRAGMENT_SHADER,
            A::SHADER_READ,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::Undefined, L::General) => (
            S::TOP_OF_PIPE,
            A::NONE,
            S::ALL_COMMANDS,
            A::MEMORY_READ | A::MEMORY_WRITE,
        ),
        _ => return None,
    };

    Some(LayoutBarrier {
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    })
}

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub const fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = if width > height { width } else { height };
    if largest == 0 {
        1
    } else {
        u32::BITS - largest.leading_zeros()
    }
}

/// Aspect mask implied by a format.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Bytes per texel of a tightly packed buffer copy into `format`.
///
/// `None` for block-compressed formats and combined depth/stencil formats,
/// which cannot be copied as a single aspect.
pub fn texel_size(format: vk::Format) -> Option<u64> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB | vk::Format::R8_UINT | vk::Format::S8_UINT => 1,
        vk::Format::R8G8_UNORM
        | vk::Format::R8G8_SRGB
        | vk::Format::R16_UNORM
        | vk::Format::R16_SFLOAT
        | vk::Format::R16_UINT
        | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::B10G11R11_UFLOAT_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::D32_SFLOAT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,
        vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => return None,
    };
    Some(size)
}

/// One blit of the mip chain: level `src_level` into `src_level + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    pub src_level: u32,
    pub src_extent: [i32; 2],
    pub dst_extent: [i32; 2],
}

impl MipBlit {
    /// Destination level.
    pub const fn dst_level(&self) -> u32 {
        self.src_level + 1
    }
}

/// Ordered blits producing every level below the base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipChainPlan {
    pub blits: Vec<MipBlit>,
}

impl MipChainPlan {
    /// Halve each dimension per level, never below one texel.
    pub fn new(width: u32, height: u32, levels: u32) -> Self {
        let mut extent = [width as i32, height as i32];
        let blits = (0..levels.saturating_sub(1))
            .map(|src_level| {
                let dst = [(extent[0] / 2).max(1), (extent[1] / 2).max(1)];
                let blit = MipBlit {
                    src_level,
                    src_extent: extent,
                    dst_extent: dst,
                };
                extent = dst;
                blit
            })
            .collect();
        Self { blits }
    }
}

/// CPU-side state of an image: name, dimensions and recorded layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageState {
    name: String,
    width: u32,
    height: u32,
    mip_levels: u32,
    layout: ImageLayout,
    mips_generated: bool,
}

impl ImageState {
    /// A fresh image in the undefined layout.
    pub fn new(name: impl Into<String>, width: u32, height: u32, mip_levels: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            mip_levels: mip_levels.max(1),
            layout: ImageLayout::Undefined,
            mips_generated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub const fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub const fn mips_generated(&self) -> bool {
        self.mips_generated
    }

    /// Barrier for moving to `to`, without changing the recorded layout.
    pub fn plan_transition(&self, to: ImageLayout) -> Result<LayoutBarrier> {
        transition_barrier(self.layout, to).ok_or_else(|| GpuError::IllegalLayoutTransition {
            name: self.name.clone(),
            from: self.layout,
            to,
        })
    }

    /// Move to `to`, returning the barrier that must be recorded.
    pub fn apply_transition(&mut self, to: ImageLayout) -> Result<LayoutBarrier> {
        let barrier = self.plan_transition(to)?;
        self.layout = to;
        Ok(barrier)
    }

    /// Decide whether and how to build the mip chain.
    ///
    /// Returns `Ok(None)` with a warning when generation is skipped for a
    /// reason that is not a caller bug: a base level below the size threshold
    /// or a format without linear filtering.
    pub fn plan_mip_chain(&self, linear_filter_supported: bool) -> Result<Option<MipChainPlan>> {
        let reject = |reason: &str| GpuError::MipGeneration {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.mips_generated {
            return Err(reject("mip chain already generated"));
        }
        if self.layout != ImageLayout::TransferDst {
            return Err(reject(&format!(
                "image must be in TransferDst layout, found {:?}",
                self.layout
            )));
        }
        if u64::from(self.width) * u64::from(self.height) < MIP_GENERATION_MIN_TEXELS {
            tracing::warn!(
                "Skipping mip generation for '{}': {}x{} is below the size threshold",
                self.name,
                self.width,
                self.height
            );
            return Ok(None);
        }
        if self.mip_levels < 2 {
            return Err(reject("image was created with a single mip level"));
        }
        if !linear_filter_supported {
            tracing::warn!(
                "Skipping mip generation for '{}': format does not support linear blit filtering",
                self.name
            );
            return Ok(None);
        }

        Ok(Some(MipChainPlan::new(
            self.width,
            self.height,
            self.mip_levels,
        )))
    }

    /// Record that the chain was generated; every level is now shader-readable.
    pub fn complete_mip_chain(&mut self) {
        self.layout = ImageLayout::ShaderReadOnly;
        self.mips_generated = true;
    }
}

/// Record a layout barrier over a mip range.
///
/// # Safety
/// `cmd` must be recording and `image` must be valid.
#[allow(clippy::too_many_arguments)]
pub unsafe fn record_layout_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    from: ImageLayout,
    to: ImageLayout,
    barrier: &LayoutBarrier,
    mips: std::ops::Range<u32>,
) {
    let image_barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(barrier.src_stage)
        .src_access_mask(barrier.src_access)
        .dst_stage_mask(barrier.dst_stage)
        .dst_access_mask(barrier.dst_access)
        .old_layout(from.to_vk())
        .new_layout(to.to_vk())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: mips.start,
            level_count: mips.end - mips.start,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        });

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&image_barrier));
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

/// Record a legal transition on an image that is not tracked by an [`Image`]
/// (swapchain images).
///
/// # Safety
/// `cmd` must be recording and `image` must be valid.
pub unsafe fn record_untracked_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    name: &str,
    from: ImageLayout,
    to: ImageLayout,
) -> Result<()> {
    let barrier =
        transition_barrier(from, to).ok_or_else(|| GpuError::IllegalLayoutTransition {
            name: name.to_string(),
            from,
            to,
        })?;
    unsafe {
        record_layout_barrier(
            device,
            cmd,
            image,
            vk::ImageAspectFlags::COLOR,
            from,
            to,
            &barrier,
            0..1,
        );
    }
    Ok(())
}

/// Parameters for creating a 2D image.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// Allocate a full mip chain (adds transfer src/dst usage for blits).
    pub mipmapped: bool,
    pub samples: vk::SampleCountFlags,
    pub residency: Residency,
}

impl<'a> ImageDesc<'a> {
    /// Device-local, single-sampled, no mips.
    pub fn new(
        name: &'a str,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name,
            width,
            height,
            format,
            usage,
            mipmapped: false,
            samples: vk::SampleCountFlags::TYPE_1,
            residency: Residency::Device,
        }
    }

    /// Request a full mip chain.
    pub fn mipmapped(mut self, mipmapped: bool) -> Self {
        self.mipmapped = mipmapped;
        self
    }

    /// Set the sample count.
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
}

/// A 2D image, its default view and its allocation.
pub struct Image {
    handle: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    samples: vk::SampleCountFlags,
    state: ImageState,
}

impl Image {
    /// Create an image with a view over every mip level.
    pub fn new(ctx: &GpuContext, desc: &ImageDesc<'_>) -> Result<Self> {
        let mip_levels = if desc.mipmapped {
            mip_level_count(desc.width, desc.height)
        } else {
            1
        };
        let mut usage = desc.usage;
        if mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        }
        let extent = vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (handle, allocation) =
            ctx.allocator
                .lock()
                .allocate_image(desc.name, &create_info, desc.residency)?;

        let aspect = aspect_for_format(desc.format);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { ctx.device().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(err) => {
                unsafe { ctx.device().destroy_image(handle, None) };
                ctx.allocator.lock().free(allocation)?;
                return Err(err.into());
            }
        };

        ctx.set_debug_name(handle, desc.name);
        ctx.set_debug_name(view, desc.name);
        tracing::debug!(
            "Created image '{}' {}x{} {:?}, {} mips",
            desc.name,
            desc.width,
            desc.height,
            desc.format,
            mip_levels
        );

        Ok(Self {
            handle,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent,
            usage,
            aspect,
            samples: desc.samples,
            state: ImageState::new(desc.name, desc.width, desc.height, mip_levels),
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn layout(&self) -> ImageLayout {
        self.state.layout()
    }

    pub fn mip_levels(&self) -> u32 {
        self.state.mip_levels()
    }

    pub fn state(&self) -> &ImageState {
        &self.state
    }

    /// Transition every mip level on the immediate-submit path.
    pub fn transition_layout(&mut self, ctx: &GpuContext, to: ImageLayout) -> Result<()> {
        let from = self.state.layout();
        let barrier = self.state.plan_transition(to)?;
        let (handle, aspect, levels) = (self.handle, self.aspect, self.state.mip_levels());

        ctx.immediate_submit(|device, cmd| {
            unsafe {
                record_layout_barrier(device, cmd, handle, aspect, from, to, &barrier, 0..levels);
            }
            Ok(())
        })?;

        self.state.apply_transition(to)?;
        Ok(())
    }

    /// Record a transition of every mip level into a frame's command buffer.
    ///
    /// # Safety
    /// `cmd` must be recording, and the recorded layout is updated
    /// immediately, before the GPU executes the barrier.
    pub unsafe fn record_transition(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        to: ImageLayout,
    ) -> Result<()> {
        let from = self.state.layout();
        let barrier = self.state.apply_transition(to)?;
        unsafe {
            record_layout_barrier(
                device,
                cmd,
                self.handle,
                self.aspect,
                from,
                to,
                &barrier,
                0..self.state.mip_levels(),
            );
        }
        Ok(())
    }

    /// Build every mip level from the base level by successive linear blits.
    ///
    /// Returns `Ok(false)` when generation is skipped (small image or a
    /// format without linear filtering); the layout then stays TransferDst.
    pub fn generate_mip_chain(&mut self, ctx: &GpuContext) -> Result<bool> {
        let linear_filter = ctx
            .format_properties(self.format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR);
        let Some(plan) = self.state.plan_mip_chain(linear_filter)? else {
            return Ok(false);
        };

        let (handle, aspect, levels) = (self.handle, self.aspect, self.state.mip_levels());
        let barrier = |from, to| {
            transition_barrier(from, to).ok_or_else(|| GpuError::IllegalLayoutTransition {
                name: self.state.name().to_string(),
                from,
                to,
            })
        };
        let to_src = barrier(ImageLayout::TransferDst, ImageLayout::TransferSrc)?;
        let src_to_read = barrier(ImageLayout::TransferSrc, ImageLayout::ShaderReadOnly)?;
        let dst_to_read = barrier(ImageLayout::TransferDst, ImageLayout::ShaderReadOnly)?;

        ctx.immediate_submit(|device, cmd| {
            for blit in &plan.blits {
                let src = blit.src_level;
                unsafe {
                    record_layout_barrier(
                        device,
                        cmd,
                        handle,
                        aspect,
                        ImageLayout::TransferDst,
                        ImageLayout::TransferSrc,
                        &to_src,
                        src..src + 1,
                    );
                }

                let region = vk::ImageBlit {
                    src_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: src,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    src_offsets: [
                        vk::Offset3D::default(),
                        vk::Offset3D {
                            x: blit.src_extent[0],
                            y: blit.src_extent[1],
                            z: 1,
                        },
                    ],
                    dst_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: blit.dst_level(),
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    dst_offsets: [
                        vk::Offset3D::default(),
                        vk::Offset3D {
                            x: blit.dst_extent[0],
                            y: blit.dst_extent[1],
                            z: 1,
                        },
                    ],
                };
                unsafe {
                    device.cmd_blit_image(
                        cmd,
                        handle,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        handle,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        std::slice::from_ref(&region),
                        vk::Filter::LINEAR,
                    );
                    record_layout_barrier(
                        device,
                        cmd,
                        handle,
                        aspect,
                        ImageLayout::TransferSrc,
                        ImageLayout::ShaderReadOnly,
                        &src_to_read,
                        src..src + 1,
                    );
                }
            }

            unsafe {
                record_layout_barrier(
                    device,
                    cmd,
                    handle,
                    aspect,
                    ImageLayout::TransferDst,
                    ImageLayout::ShaderReadOnly,
                    &dst_to_read,
                    levels - 1..levels,
                );
            }
            Ok(())
        })?;

        self.state.complete_mip_chain();
        tracing::debug!("Generated {levels} mip levels for '{}'", self.state.name());
        Ok(true)
    }

    /// Descriptor info for sampling this image with `sampler`.
    pub fn descriptor_info(&self, sampler: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler,
            image_view: self.view,
            image_layout: self.state.layout().to_vk(),
        }
    }

    /// Destroy the view and image and free the memory.
    pub fn destroy(mut self, ctx: &GpuContext) -> Result<()> {
        unsafe {
            ctx.device().destroy_image_view(self.view, None);
            ctx.device().destroy_image(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            ctx.allocator.lock().free(allocation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECLARED: [(ImageLayout, ImageLayout); 11] = [
        (ImageLayout::Undefined, ImageLayout::TransferDst),
        (ImageLayout::TransferDst, ImageLayout::ShaderReadOnly),
        (ImageLayout::TransferDst, ImageLayout::TransferSrc),
        (ImageLayout::TransferSrc, ImageLayout::ShaderReadOnly),
        (ImageLayout::ShaderReadOnly, ImageLayout::TransferSrc),
        (ImageLayout::Undefined, ImageLayout::DepthStencilAttachment),
        (ImageLayout::Undefined, ImageLayout::ColorAttachment),
        (ImageLayout::ColorAttachment, ImageLayout::PresentSrc),
        (ImageLayout::ColorAttachment, ImageLayout::ShaderReadOnly),
        (ImageLayout::ShaderReadOnly, ImageLayout::ColorAttachment),
        (ImageLayout::Undefined, ImageLayout::General),
    ];

    const ALL: [ImageLayout; 8] = [
        ImageLayout::Undefined,
        ImageLayout::TransferSrc,
        ImageLayout::TransferDst,
        ImageLayout::ShaderReadOnly,
        ImageLayout::ColorAttachment,
        ImageLayout::DepthStencilAttachment,
        ImageLayout::General,
        ImageLayout::PresentSrc,
    ];

    fn state_in(layout: ImageLayout, width: u32, height: u32) -> ImageState {
        let mut state = ImageState::new("test", width, height, mip_level_count(width, height));
        state.layout = layout;
        state
    }

    #[test]
    fn declared_transitions_update_layout() {
        for (from, to) in DECLARED {
            let mut state = state_in(from, 4, 4);
            assert!(state.apply_transition(to).is_ok(), "{from:?} -> {to:?}");
            assert_eq!(state.layout(), to);
        }
    }

    #[test]
    fn undeclared_transitions_fail_and_keep_layout() {
        for from in ALL {
            for to in ALL {
                if DECLARED.contains(&(from, to)) {
                    continue;
                }
                let mut state = state_in(from, 4, 4);
                let err = state.apply_transition(to).unwrap_err();
                assert!(matches!(
                    err,
                    GpuError::IllegalLayoutTransition { from: f, to: t, .. } if f == from && t == to
                ));
                assert_eq!(state.layout(), from);
            }
        }
    }

    #[test]
    fn shader_read_only_to_transfer_dst_is_illegal() {
        let mut state = state_in(ImageLayout::ShaderReadOnly, 4, 4);
        assert!(state.apply_transition(ImageLayout::TransferDst).is_err());
    }

    #[test]
    fn mip_counts() {
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(1920, 1080), 11);
        assert_eq!(mip_level_count(300, 17), 9);
    }

    #[test]
    fn mip_chain_for_512_has_nine_blits_ending_at_one() {
        let mut state = ImageState::new("albedo", 512, 512, mip_level_count(512, 512));
        state.apply_transition(ImageLayout::TransferDst).unwrap();
        let plan = state.plan_mip_chain(true).unwrap().unwrap();
        assert_eq!(plan.blits.len(), 9);
        assert_eq!(plan.blits[0].src_extent, [512, 512]);
        assert_eq!(plan.blits[0].dst_extent, [256, 256]);
        assert_eq!(plan.blits[8].dst_extent, [1, 1]);
        assert_eq!(plan.blits[8].dst_level(), 9);

        state.complete_mip_chain();
        assert_eq!(state.mip_levels(), 10);
        assert_eq!(state.layout(), ImageLayout::ShaderReadOnly);
        assert!(matches!(
            state.plan_mip_chain(true),
            Err(GpuError::MipGeneration { .. })
        ));
    }

    #[test]
    fn non_square_chain_clamps_to_one() {
        let plan = MipChainPlan::new(1024, 256, mip_level_count(1024, 256));
        assert_eq!(plan.blits.len(), 10);
        assert_eq!(plan.blits[7].dst_extent, [4, 1]);
        assert_eq!(plan.blits[9].dst_extent, [1, 1]);
    }

    #[test]
    fn small_image_skips_mip_generation() {
        let state = state_in(ImageLayout::TransferDst, 64, 64);
        assert_eq!(state.plan_mip_chain(true).unwrap(), None);
        assert_eq!(state.layout(), ImageLayout::TransferDst);
    }

    #[test]
    fn unfilterable_format_skips_mip_generation() {
        let state = state_in(ImageLayout::TransferDst, 512, 512);
        assert_eq!(state.plan_mip_chain(false).unwrap(), None);
    }

    #[test]
    fn mip_generation_requires_transfer_dst() {
        let state = state_in(ImageLayout::Undefined, 512, 512);
        assert!(matches!(
            state.plan_mip_chain(true),
            Err(GpuError::MipGeneration { .. })
        ));
    }

    #[test]
    fn texel_sizes_follow_format_width() {
        assert_eq!(texel_size(vk::Format::R8_UNORM), Some(1));
        assert_eq!(texel_size(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(texel_size(vk::Format::R16G16B16A16_SFLOAT), Some(8));
        assert_eq!(texel_size(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(texel_size(vk::Format::D24_UNORM_S8_UINT), None);
        assert_eq!(texel_size(vk::Format::BC7_SRGB_BLOCK), None);
    }

    #[test]
    fn depth_formats_have_depth_aspect() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::R8G8B8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }
}
