//! Single-pass forward rendering.
//!
//! Descriptor sets shared by every draw:
//! - set 0, one per frame slot: camera uniform buffer and light storage buffer
//! - set 1, shared: the bindless texture array
//!
//! Bindless slot 0 always holds a 1x1 white texture so a draw without a
//! texture of its own can sample index 0.

use ash::vk;
use kestrel_core::constants::{
    BINDLESS_TEXTURE_BINDING, STORAGE_BUFFER_BINDING, UNIFORM_BUFFER_BINDING,
};
use kestrel_core::{CameraMatrices, RenderSettings};
use kestrel_gpu::{
    BindlessDescriptorSet, DescriptorPool, DescriptorPoolDesc, DescriptorSet,
    DescriptorSetLayoutBuilder, GpuContext, GpuError, LayoutId, Result, SamplerDesc, SlotRequest,
    Texture,
};

use crate::draw::{DrawConstants, GpuLights, SceneFrame};
use crate::per_frame::PerFrameBuffer;
use crate::recorder::CommandRecorder;
use crate::strategy::DrawStrategy;

/// Bindless slot of the fallback texture.
pub const FALLBACK_TEXTURE_SLOT: u32 = 0;

/// Clamp the requested bindless capacity to what the device allows.
fn bindless_capacity(requested: u32, device_limit: u32) -> Result<u32> {
    if device_limit == 0 {
        return Err(GpuError::FeatureNotSupported(
            "update-after-bind sampled image arrays".to_string(),
        ));
    }
    if requested > device_limit {
        tracing::warn!(
            "Bindless texture capacity {requested} exceeds device limit {device_limit}, clamping"
        );
    }
    Ok(requested.min(device_limit))
}

/// Forward strategy with per-frame globals and a bindless texture array.
pub struct ForwardStrategy {
    pool: DescriptorPool,
    frame_layout: LayoutId,
    bindless_layout: LayoutId,
    frame_sets: Vec<DescriptorSet>,
    bindless: BindlessDescriptorSet,
    camera: PerFrameBuffer<CameraMatrices>,
    lights: PerFrameBuffer<GpuLights>,
    fallback: Option<Texture>,
    scene: SceneFrame,
    max_draws: usize,
    clear_color: [f32; 4],
}

impl ForwardStrategy {
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn new(gpu: &GpuContext, settings: &RenderSettings) -> Result<Self> {
        let device = gpu.device();
        let frames = settings.frames_in_flight;
        let capacity = bindless_capacity(
            settings.bindless_textures,
            gpu.capabilities().max_bindless_sampled_images,
        )?;

        let frame_layout = DescriptorSetLayoutBuilder::new()
            .shader_stages(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .uniform_buffer(UNIFORM_BUFFER_BINDING)?
            .storage_buffer(STORAGE_BUFFER_BINDING)?;
        let bindless_layout = DescriptorSetLayoutBuilder::new()
            .shader_stages(vk::ShaderStageFlags::FRAGMENT)
            .add_bindless_binding(
                BINDLESS_TEXTURE_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                capacity,
            )?;

        let frame_count = frames as u32;
        let pool_desc = DescriptorPoolDesc::new("forward globals", frame_count + 1)
            .size(vk::DescriptorType::UNIFORM_BUFFER, frame_count)
            .size(vk::DescriptorType::STORAGE_BUFFER, frame_count)
            .size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, capacity)
            .update_after_bind(true);
        let mut pool = unsafe { DescriptorPool::new(device, &pool_desc) }?;
        let frame_layout = pool.register_layout(unsafe { frame_layout.build(device) }?);
        let bindless_layout = pool.register_layout(unsafe { bindless_layout.build(device) }?);

        let camera = PerFrameBuffer::new(
            gpu,
            "camera uniforms",
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            frames,
        )?;
        let lights = PerFrameBuffer::new(
            gpu,
            "scene lights",
            vk::BufferUsageFlags::STORAGE_BUFFER,
            frames,
        )?;

        let mut frame_sets = Vec::with_capacity(frames);
        for slot in 0..frames {
            let mut set = unsafe { pool.allocate(device, frame_layout) }?;
            if let (Some(camera_info), Some(lights_info)) =
                (camera.descriptor_info(slot), lights.descriptor_info(slot))
            {
                set.write_uniform_buffer(UNIFORM_BUFFER_BINDING, camera_info)?;
                set.write_storage_buffer(STORAGE_BUFFER_BINDING, lights_info)?;
            }
            unsafe { set.flush(device) };
            gpu.set_debug_name(set.handle(), &format!("forward frame set[{slot}]"));
            frame_sets.push(set);
        }

        let bindless_set = unsafe { pool.allocate(device, bindless_layout) }?;
        let bindings = pool
            .layout(bindless_layout)
            .map(|layout| layout.bindings().clone())
            .unwrap_or_default();
        let mut bindless = BindlessDescriptorSet::new(bindless_set, &bindings, frames);
        gpu.set_debug_name(bindless.handle(), "bindless textures");

        let fallback = Texture::from_rgba8(
            gpu,
            "fallback texture",
            1,
            1,
            &[255; 4],
            false,
            SamplerDesc::nearest(),
        )?;
        bindless.write_texture(
            BINDLESS_TEXTURE_BINDING,
            &fallback,
            false,
            SlotRequest::Index(FALLBACK_TEXTURE_SLOT),
        )?;
        unsafe { bindless.flush(device) }?;

        tracing::info!(
            "Forward strategy ready: {frames} frames in flight, {capacity} bindless textures"
        );

        Ok(Self {
            pool,
            frame_layout,
            bindless_layout,
            frame_sets,
            bindless,
            camera,
            lights,
            fallback: Some(fallback),
            scene: SceneFrame::default(),
            max_draws: settings.max_draws,
            clear_color: [0.02, 0.02, 0.03, 1.0],
        })
    }

    /// Layouts of set 0 and set 1, in that order.
    pub fn set_layouts(&self) -> Vec<vk::DescriptorSetLayout> {
        [self.frame_layout, self.bindless_layout]
            .into_iter()
            .filter_map(|id| self.pool.layout(id))
            .map(|layout| layout.handle())
            .collect()
    }

    /// Create a pipeline layout compatible with the global sets, followed by
    /// `extra` set layouts and the [`DrawConstants`] push range.
    ///
    /// # Safety
    /// The device must be valid. The caller destroys the layout.
    pub unsafe fn create_pipeline_layout(
        &self,
        device: &ash::Device,
        extra: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout> {
        let mut layouts = self.set_layouts();
        layouts.extend_from_slice(extra);
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(DrawConstants::SIZE);
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&layouts)
            .push_constant_ranges(std::slice::from_ref(&push_range));
        Ok(unsafe { device.create_pipeline_layout(&create_info, None) }?)
    }

    /// Put a texture in the first free bindless slot.
    ///
    /// The descriptor reaches the device on the next frame's update. Returns
    /// `None` when the slot request was out of range.
    pub fn register_texture(&mut self, texture: &Texture) -> Result<Option<u32>> {
        let slot = self.bindless.write_texture(
            BINDLESS_TEXTURE_BINDING,
            texture,
            false,
            SlotRequest::Auto,
        )?;
        if let Some(slot) = slot {
            tracing::debug!("Texture '{}' bound to bindless slot {slot}", texture.name());
        }
        Ok(slot)
    }

    /// Release a bindless slot on `frame_number`.
    ///
    /// The slot is handed out again only once every frame in flight at the
    /// time of the release has completed. The texture itself must be retired
    /// through the driver on the same frame.
    pub fn unregister_texture(&mut self, slot: u32, frame_number: u64) -> Result<bool> {
        if slot == FALLBACK_TEXTURE_SLOT {
            tracing::warn!("Refusing to free the fallback texture slot");
            return Ok(false);
        }
        self.bindless
            .retire_index(BINDLESS_TEXTURE_BINDING, slot, frame_number)
    }

    pub fn bindless(&self) -> &BindlessDescriptorSet {
        &self.bindless
    }

    pub fn bindless_mut(&mut self) -> &mut BindlessDescriptorSet {
        &mut self.bindless
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }
}

impl DrawStrategy for ForwardStrategy {
    fn prepare(&mut self, mut scene: SceneFrame) {
        if scene.draws.len() > self.max_draws {
            tracing::warn!(
                "Dropping {} draws over the per-frame limit of {}",
                scene.draws.len() - self.max_draws,
                self.max_draws
            );
            scene.draws.truncate(self.max_draws);
        }
        self.scene = scene;
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn update(&mut self, gpu: &GpuContext, slot: usize, frame_number: u64) -> Result<()> {
        let released = self.bindless.release_retired(frame_number)?;
        if released > 0 {
            tracing::debug!("Returned {released} bindless slots to the free list");
        }
        self.camera.update(gpu, slot, &self.scene.camera)?;
        self.lights
            .update(gpu, slot, &GpuLights::from_scene(&self.scene))?;
        let flushed = unsafe { self.bindless.flush(gpu.device()) }?;
        if flushed > 0 {
            tracing::trace!("Flushed {flushed} bindless writes");
        }
        Ok(())
    }

    fn record_passes(&mut self, recorder: &mut CommandRecorder<'_>, frame_index: usize) {
        let Some(frame_set) = self.frame_sets.get(frame_index) else {
            return;
        };
        if self.scene.draws.is_empty() {
            return;
        }
        let globals = [frame_set.handle(), self.bindless.handle()];
        recorder.set_full_viewport();
        for item in &self.scene.draws {
            recorder.draw_item(item, &globals);
        }
    }

    fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        self.camera.destroy(gpu)?;
        self.lights.destroy(gpu)?;
        if let Some(fallback) = self.fallback.take() {
            fallback.destroy(gpu)?;
        }
        self.frame_sets.clear();
        unsafe { self.pool.destroy(gpu.device()) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped_to_device_limit() {
        assert_eq!(bindless_capacity(1024, 500_000).unwrap(), 1024);
        assert_eq!(bindless_capacity(1024, 256).unwrap(), 256);
    }

    #[test]
    fn missing_descriptor_indexing_is_fatal() {
        assert!(matches!(
            bindless_capacity(1024, 0),
            Err(GpuError::FeatureNotSupported(_))
        ));
    }
}
