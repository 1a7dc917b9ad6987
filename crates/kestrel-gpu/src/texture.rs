//! Sampled textures uploaded from host pixels.

use ash::vk;

use crate::buffer::{Buffer, BufferDesc};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::{Image, ImageDesc, ImageLayout};
use crate::sampler::{Sampler, SamplerDesc};

/// An image, its view and a sampler, ready for shader reads.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Upload tightly packed RGBA8 sRGB pixels.
    ///
    /// The pixels go through a staging buffer. When `mipmapped` is set and
    /// the image is large enough, the full chain is generated; otherwise the
    /// image is only transitioned to shader-read-only. The sampler's max LOD
    /// matches the levels that actually hold data.
    pub fn from_rgba8(
        ctx: &GpuContext,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        mipmapped: bool,
        sampler: SamplerDesc,
    ) -> Result<Self> {
        let expected = u64::from(width) * u64::from(height) * 4;
        if pixels.len() as u64 != expected {
            return Err(GpuError::SizeMismatch {
                src: format!("{name} pixels"),
                src_size: pixels.len() as u64,
                dst: name.to_string(),
                dst_size: expected,
            });
        }

        let staging_name = format!("{name} staging");
        let mut staging = Buffer::new(ctx, &BufferDesc::staging(&staging_name, expected))?;
        let image = Self::upload(ctx, name, width, height, pixels, mipmapped, &mut staging);
        staging.destroy(ctx)?;
        let image = image?;

        let max_lod = if image.state().mips_generated() {
            image.mip_levels() as f32
        } else {
            0.0
        };
        let sampler = match Sampler::new(
            ctx,
            &format!("{name} sampler"),
            sampler.lod_range(sampler.min_lod, max_lod),
        ) {
            Ok(sampler) => sampler,
            Err(err) => {
                image.destroy(ctx)?;
                return Err(err);
            }
        };

        tracing::debug!(
            "Uploaded texture '{name}' {width}x{height}, {} mips",
            if image.state().mips_generated() {
                image.mip_levels()
            } else {
                1
            }
        );
        Ok(Self { image, sampler })
    }

    fn upload(
        ctx: &GpuContext,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        mipmapped: bool,
        staging: &mut Buffer,
    ) -> Result<Image> {
        staging.copy_from_host(ctx, pixels, 0)?;

        let desc = ImageDesc::new(
            name,
            width,
            height,
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .mipmapped(mipmapped);
        let mut image = Image::new(ctx, &desc)?;

        let filled = (|| -> Result<()> {
            image.transition_layout(ctx, ImageLayout::TransferDst)?;
            staging.copy_to_image(ctx, &image, 0)?;
            let generated = mipmapped && image.generate_mip_chain(ctx)?;
            if !generated {
                image.transition_layout(ctx, ImageLayout::ShaderReadOnly)?;
            }
            Ok(())
        })();

        match filled {
            Ok(()) => Ok(image),
            Err(err) => {
                image.destroy(ctx)?;
                Err(err)
            }
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn name(&self) -> &str {
        self.image.name()
    }

    /// Combined image sampler descriptor in the shader-read-only layout.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        self.image.descriptor_info(self.sampler.handle())
    }

    pub fn destroy(self, ctx: &GpuContext) -> Result<()> {
        self.sampler.destroy(ctx);
        self.image.destroy(ctx)
    }
}
