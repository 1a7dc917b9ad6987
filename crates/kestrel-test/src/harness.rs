//! Headless GPU context and image readback for tests.
//!
//! Tests that touch the device create a [`HeadlessGpu`], upload or render
//! into an image, read it back with [`readback_rgba8`] and compare the
//! result against a baseline PNG.

use std::path::Path;

use ash::vk;
use image::{ImageBuffer, Rgba, RgbaImage};

use kestrel_gpu::{
    Buffer, BufferDesc, GpuContext, GpuContextBuilder, Image, ImageLayout, Residency,
};

use crate::{Result, TestError, VisualTestConfig};

/// GPU context without a surface.
pub struct HeadlessGpu {
    context: GpuContext,
    config: VisualTestConfig,
}

impl HeadlessGpu {
    /// Create a headless context with validation enabled.
    pub fn new() -> Result<Self> {
        Self::with_config(VisualTestConfig::default())
    }

    pub fn with_config(config: VisualTestConfig) -> Result<Self> {
        let context = GpuContextBuilder::new()
            .app_name("kestrel-test")
            .validation(true)
            .build()?;
        tracing::info!("Headless GPU: {}", context.capabilities().summary());
        Ok(Self { context, config })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Save `image` to the output directory and compare it with the stored
    /// baseline. A missing baseline is created from `image`.
    pub fn check_baseline(&self, name: &str, image: &RgbaImage) -> Result<()> {
        std::fs::create_dir_all(&self.config.baseline_dir)?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let baseline_path = format!("{}/{}.png", self.config.baseline_dir, name);
        let output_path = format!("{}/{}.png", self.config.output_dir, name);
        image.save(&output_path)?;

        if !Path::new(&baseline_path).exists() {
            image.save(&baseline_path)?;
            tracing::info!("Created new baseline: {}", baseline_path);
            return Ok(());
        }

        let baseline = image::open(&baseline_path)?.to_rgba8();
        let diff = compare_images(&baseline, image)?;
        if diff > self.config.threshold {
            let diff_path = format!("{}/{}_diff.png", self.config.output_dir, name);
            create_diff_image(&baseline, image).save(&diff_path)?;
            return Err(TestError::ImageComparison(format!(
                "Image difference {:.4} exceeds threshold {:.4} (see {})",
                diff, self.config.threshold, diff_path
            )));
        }
        Ok(())
    }
}

fn is_rgba8(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB
    )
}

/// Copy mip 0 of an RGBA8 image back to the host.
///
/// The image is left in the transfer-source layout and must have been
/// created with `TRANSFER_SRC` usage.
pub fn readback_rgba8(ctx: &GpuContext, image: &mut Image) -> Result<RgbaImage> {
    if !is_rgba8(image.format()) {
        return Err(TestError::Readback(format!(
            "'{}' has format {:?}, expected RGBA8",
            image.name(),
            image.format()
        )));
    }
    if !image.usage().contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        return Err(TestError::Readback(format!(
            "'{}' was not created with TRANSFER_SRC usage",
            image.name()
        )));
    }

    if image.layout() != ImageLayout::TransferSrc {
        image.transition_layout(ctx, ImageLayout::TransferSrc)?;
    }

    let extent = image.extent();
    let size = u64::from(extent.width) * u64::from(extent.height) * 4;
    let name = format!("{} readback", image.name());
    let mut buffer = Buffer::new(
        ctx,
        &BufferDesc::new(
            &name,
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            Residency::Readback,
        ),
    )?;

    let pixels = copy_image_to_buffer(ctx, image, &mut buffer, size);
    buffer.destroy(ctx)?;
    let pixels = pixels?;

    ImageBuffer::from_raw(extent.width, extent.height, pixels).ok_or_else(|| {
        TestError::Readback(format!(
            "{} bytes do not fill a {}x{} image",
            size, extent.width, extent.height
        ))
    })
}

fn copy_image_to_buffer(
    ctx: &GpuContext,
    image: &Image,
    buffer: &mut Buffer,
    size: u64,
) -> Result<Vec<u8>> {
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: image.aspect(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: image.extent(),
    };
    let (src, dst) = (image.handle(), buffer.handle());
    ctx.immediate_submit(|device, cmd| {
        unsafe {
            device.cmd_copy_image_to_buffer(
                cmd,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                std::slice::from_ref(&region),
            );
        }
        Ok(())
    })?;

    let len = usize::try_from(size)
        .map_err(|_| TestError::Readback(format!("{size} bytes do not fit in memory")))?;
    let mut pixels = vec![0u8; len];
    buffer.read_to_host(ctx, 0, &mut pixels)?;
    Ok(pixels)
}

/// Compare two images and return the normalized RGB difference (0.0-1.0).
pub fn compare_images(a: &RgbaImage, b: &RgbaImage) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(TestError::ImageComparison(format!(
            "Image dimensions don't match: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }

    let total_diff: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            (0..3)
                .map(|c| u64::from(pa[c].abs_diff(pb[c])))
                .sum::<u64>()
        })
        .sum();

    let max_diff = u64::from(a.width()) * u64::from(a.height()) * 3 * 255;
    if max_diff == 0 {
        return Ok(0.0);
    }
    Ok(total_diff as f64 / max_diff as f64)
}

/// Visual diff: differing pixels in red scaled by the difference, the rest
/// as a dimmed copy of `a`.
pub fn create_diff_image(a: &RgbaImage, b: &RgbaImage) -> RgbaImage {
    let (width, height) = a.dimensions();
    let mut diff = ImageBuffer::new(width, height);

    for (x, y, pixel) in diff.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel_checked(x, y).unwrap_or(pa);
        let delta = (0..3).map(|c| pa[c].abs_diff(pb[c])).max().unwrap_or(0);
        *pixel = if delta > 0 {
            Rgba([delta.max(64), 0, 0, 255])
        } else {
            Rgba([pa[0] / 4, pa[1] / 4, pa[2] / 4, 255])
        };
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kestrel_gpu::{
        BindlessDescriptorSet, DescriptorInfo, DescriptorPool, DescriptorPoolDesc,
        DescriptorSetLayoutBuilder, GpuError, ImageDesc, SamplerDesc, SlotRequest, Texture,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn checkerboard(size: u32) -> Vec<u8> {
        (0..size * size)
            .flat_map(|i| {
                let (x, y) = (i % size, i / size);
                if (x + y) % 2 == 0 {
                    [255, 255, 255, 255]
                } else {
                    [0, 0, 0, 255]
                }
            })
            .collect()
    }

    #[test]
    fn identical_images_have_no_difference() {
        let a = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        assert_relative_eq!(compare_images(&a, &a.clone()).unwrap(), 0.0);
    }

    #[test]
    fn black_and_white_differ_completely() {
        let a = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let b = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 0]));
        assert_relative_eq!(compare_images(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = RgbaImage::new(4, 4);
        let b = RgbaImage::new(4, 5);
        assert!(matches!(
            compare_images(&a, &b),
            Err(TestError::ImageComparison(_))
        ));
    }

    #[test]
    fn diff_image_marks_changed_pixels() {
        let a = RgbaImage::from_pixel(2, 1, Rgba([200, 200, 200, 255]));
        let mut b = a.clone();
        b.put_pixel(1, 0, Rgba([190, 200, 200, 255]));

        let diff = create_diff_image(&a, &b);
        assert_eq!(diff.get_pixel(0, 0), &Rgba([50, 50, 50, 255]));
        assert_eq!(diff.get_pixel(1, 0), &Rgba([64, 0, 0, 255]));
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn host_buffer_round_trip() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let values: Vec<u32> = (0..64).collect();
        let size = (values.len() * 4) as u64;

        let mut upload = Buffer::new(
            ctx,
            &BufferDesc::new("upload", size, vk::BufferUsageFlags::TRANSFER_SRC, Residency::Host),
        )
        .unwrap();
        let mut readback = Buffer::new(
            ctx,
            &BufferDesc::new(
                "readback",
                size,
                vk::BufferUsageFlags::TRANSFER_DST,
                Residency::Readback,
            ),
        )
        .unwrap();

        upload.write(ctx, &values, 0).unwrap();
        upload.copy_to_buffer(ctx, &readback).unwrap();

        let mut bytes = vec![0u8; size as usize];
        readback.read_to_host(ctx, 0, &mut bytes).unwrap();
        let read: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(read, values);

        upload.destroy(ctx).unwrap();
        readback.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn buffer_copy_rejects_size_mismatch() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let src = Buffer::new(ctx, &BufferDesc::staging("src", 256)).unwrap();
        let dst = Buffer::new(
            ctx,
            &BufferDesc::new(
                "dst",
                128,
                vk::BufferUsageFlags::TRANSFER_DST,
                Residency::Device,
            ),
        )
        .unwrap();

        let err = src.copy_to_buffer(ctx, &dst).unwrap_err();
        assert!(matches!(err, GpuError::SizeMismatch { src_size: 256, dst_size: 128, .. }));

        src.destroy(ctx).unwrap();
        dst.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn large_texture_gets_full_mip_chain() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let texture = Texture::from_rgba8(
            ctx,
            "checker 512",
            512,
            512,
            &checkerboard(512),
            true,
            SamplerDesc::linear(),
        )
        .unwrap();

        assert_eq!(texture.image().mip_levels(), 10);
        assert!(texture.image().state().mips_generated());
        assert_eq!(texture.image().layout(), ImageLayout::ShaderReadOnly);
        assert_relative_eq!(texture.sampler().desc().max_lod, 10.0);

        texture.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn small_image_skips_mip_generation() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let desc = ImageDesc::new(
            "small",
            64,
            64,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .mipmapped(true);
        let mut image = Image::new(ctx, &desc).unwrap();
        image.transition_layout(ctx, ImageLayout::TransferDst).unwrap();

        assert!(!image.generate_mip_chain(ctx).unwrap());
        assert_eq!(image.layout(), ImageLayout::TransferDst);
        assert!(!image.state().mips_generated());

        image.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn uploaded_pixels_read_back_unchanged() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let pixels = checkerboard(16);

        let mut staging =
            Buffer::new(ctx, &BufferDesc::staging("checker staging", pixels.len() as u64))
                .unwrap();
        staging.copy_from_host(ctx, &pixels, 0).unwrap();

        let desc = ImageDesc::new(
            "checker",
            16,
            16,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
        );
        let mut image = Image::new(ctx, &desc).unwrap();
        image.transition_layout(ctx, ImageLayout::TransferDst).unwrap();
        staging.copy_to_image(ctx, &image, 0).unwrap();

        let read = readback_rgba8(ctx, &mut image).unwrap();
        assert_eq!(read.dimensions(), (16, 16));
        assert_eq!(read.as_raw(), &pixels);
        assert_eq!(image.layout(), ImageLayout::TransferSrc);

        staging.destroy(ctx).unwrap();
        image.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn copy_to_image_rejects_short_buffer() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        // 16x16 RGBA8 needs 1024 bytes.
        let staging = Buffer::new(ctx, &BufferDesc::staging("short staging", 1024)).unwrap();
        let desc = ImageDesc::new(
            "target",
            16,
            16,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST,
        );
        let mut image = Image::new(ctx, &desc).unwrap();
        image.transition_layout(ctx, ImageLayout::TransferDst).unwrap();

        assert!(matches!(
            staging.copy_to_image(ctx, &image, 4),
            Err(GpuError::SizeMismatch {
                src_size: 1020,
                dst_size: 1024,
                ..
            })
        ));
        assert!(matches!(
            staging.copy_to_image(ctx, &image, 1024),
            Err(GpuError::OutOfBounds { .. })
        ));
        staging.copy_to_image(ctx, &image, 0).unwrap();

        staging.destroy(ctx).unwrap();
        image.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn immediate_submit_waits_for_queue_lock() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let submitted = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let queues = ctx.lock_queues();
            let loader = scope.spawn(|| {
                ctx.immediate_submit(|_, _| Ok(())).unwrap();
                submitted.store(true, Ordering::SeqCst);
            });

            std::thread::sleep(Duration::from_millis(100));
            assert!(!submitted.load(Ordering::SeqCst));
            drop(queues);
            loader.join().unwrap();
        });
        assert!(submitted.load(Ordering::SeqCst));
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn bindless_storage_buffers_bind_and_reuse_slots() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let device = ctx.device();
        let storage = |name: &str| {
            Buffer::new(
                ctx,
                &BufferDesc::new(
                    name,
                    256,
                    vk::BufferUsageFlags::STORAGE_BUFFER,
                    Residency::Device,
                ),
            )
            .unwrap()
        };
        let (first, second) = (storage("first"), storage("second"));

        let mut pool = unsafe {
            DescriptorPool::new(
                device,
                &DescriptorPoolDesc::new("bindless buffers", 1)
                    .size(vk::DescriptorType::STORAGE_BUFFER, 2)
                    .update_after_bind(true),
            )
        }
        .unwrap();
        let layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .shader_stages(vk::ShaderStageFlags::FRAGMENT)
                .add_bindless_binding(3, vk::DescriptorType::STORAGE_BUFFER, 2)
                .unwrap()
                .build(device)
        }
        .unwrap();
        let bindings = layout.bindings().clone();
        let id = pool.register_layout(layout);
        let set = unsafe { pool.allocate(device, id) }.unwrap();
        let mut bindless = BindlessDescriptorSet::new(set, &bindings, 2);
        let bound = |bindless: &BindlessDescriptorSet, slot| match bindless
            .table()
            .bound_info(3, slot)
        {
            Some(DescriptorInfo::Buffer(info)) => Some(info.buffer),
            _ => None,
        };

        let slot = bindless
            .write_buffer(3, &first, false, SlotRequest::Auto)
            .unwrap();
        assert_eq!(slot, Some(0));
        assert_eq!(bindless.table().pending_count(), 1);

        // Occupied without overwrite: untouched, nothing new staged.
        let again = bindless
            .write_buffer(3, &second, false, SlotRequest::Index(0))
            .unwrap();
        assert_eq!(again, Some(0));
        assert_eq!(bound(&bindless, 0), Some(first.handle()));
        assert_eq!(bindless.table().pending_count(), 1);

        assert_eq!(unsafe { bindless.flush(device) }.unwrap(), 1);
        assert_eq!(bindless.table().pending_count(), 0);

        bindless
            .write_buffer(3, &second, true, SlotRequest::Index(0))
            .unwrap();
        assert_eq!(bound(&bindless, 0), Some(second.handle()));
        assert_eq!(unsafe { bindless.flush(device) }.unwrap(), 1);

        // A retired slot comes back only after the frames in flight.
        assert!(bindless.retire_index(3, 0, 5).unwrap());
        assert_eq!(bindless.release_retired(7).unwrap(), 0);
        assert_eq!(bindless.table().first_free_index(3).unwrap(), 1);
        assert_eq!(bindless.release_retired(8).unwrap(), 1);
        assert_eq!(bindless.table().first_free_index(3).unwrap(), 0);

        unsafe { pool.destroy(device) };
        first.destroy(ctx).unwrap();
        second.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn bindless_array_fills_and_flushes() {
        let gpu = HeadlessGpu::new().unwrap();
        let ctx = gpu.context();
        let device = ctx.device();
        let texture = Texture::from_rgba8(
            ctx,
            "white",
            1,
            1,
            &[255; 4],
            false,
            SamplerDesc::nearest(),
        )
        .unwrap();

        let mut pool = unsafe {
            DescriptorPool::new(
                device,
                &DescriptorPoolDesc::new("bindless test", 1)
                    .size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
                    .update_after_bind(true),
            )
        }
        .unwrap();
        let layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .shader_stages(vk::ShaderStageFlags::FRAGMENT)
                .add_bindless_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
                .unwrap()
                .build(device)
        }
        .unwrap();
        let bindings = layout.bindings().clone();
        let id = pool.register_layout(layout);
        let set = unsafe { pool.allocate(device, id) }.unwrap();
        let mut bindless = BindlessDescriptorSet::new(set, &bindings, 2);

        for expected in 0..4 {
            let slot = bindless
                .write_texture(2, &texture, false, SlotRequest::Auto)
                .unwrap();
            assert_eq!(slot, Some(expected));
        }
        assert!(matches!(
            bindless.write_texture(2, &texture, false, SlotRequest::Auto),
            Err(GpuError::DescriptorSetFull { binding: 2, capacity: 4 })
        ));
        assert_eq!(unsafe { bindless.flush(device) }.unwrap(), 4);

        assert!(unsafe { bindless.free_index(device, 2, 1, true) }.unwrap());
        assert_eq!(bindless.table().first_free_index(2).unwrap(), 1);

        unsafe { pool.destroy(device) };
        texture.destroy(ctx).unwrap();
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn exhausted_pool_reports_error() {
        let gpu = HeadlessGpu::new().unwrap();
        let device = gpu.context().device();
        let mut pool = unsafe {
            DescriptorPool::new(
                device,
                &DescriptorPoolDesc::new("tiny", 1).size(vk::DescriptorType::UNIFORM_BUFFER, 1),
            )
        }
        .unwrap();
        let layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .shader_stages(vk::ShaderStageFlags::VERTEX)
                .uniform_buffer(0)
                .unwrap()
                .build(device)
        }
        .unwrap();
        let id = pool.register_layout(layout);

        let _first = unsafe { pool.allocate(device, id) }.unwrap();
        let second = unsafe { pool.allocate(device, id) };
        assert!(matches!(second, Err(GpuError::PoolExhausted(_))));

        unsafe { pool.destroy(device) };
    }
}
