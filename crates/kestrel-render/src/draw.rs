//! Per-frame scene input consumed by the renderer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use kestrel_core::constants::{MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS};
use kestrel_core::{CameraMatrices, DirectionalLight, LightArray, PointLight};

/// Push constants of one draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawConstants {
    pub model: Mat4,
    /// Slot of the draw's texture in the bindless array.
    pub texture_index: u32,
    pub material: u32,
    pub _pad: [u32; 2],
}

impl DrawConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(model: Mat4, texture_index: u32) -> Self {
        Self {
            model,
            texture_index,
            material: 0,
            _pad: [0; 2],
        }
    }
}

impl Default for DrawConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, 0)
    }
}

/// One mesh draw. Handles are borrowed; the scene owns the resources.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    /// Null for non-indexed draws.
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub vertex_count: u32,
    pub constants: DrawConstants,
    /// Bound after the strategy's global sets.
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

impl DrawItem {
    pub fn is_indexed(&self) -> bool {
        self.index_buffer != vk::Buffer::null() && self.index_count > 0
    }

    /// Vertices processed by this draw.
    pub fn primitive_count(&self) -> u32 {
        if self.is_indexed() {
            self.index_count
        } else {
            self.vertex_count
        }
    }
}

/// Everything the scene hands to the renderer for one frame.
#[derive(Debug, Clone, Default)]
pub struct SceneFrame {
    pub camera: CameraMatrices,
    pub draws: Vec<DrawItem>,
    pub directional_lights: LightArray<DirectionalLight, MAX_DIRECTIONAL_LIGHTS>,
    pub point_lights: LightArray<PointLight, MAX_POINT_LIGHTS>,
}

impl SceneFrame {
    pub fn new(camera: CameraMatrices) -> Self {
        Self {
            camera,
            ..Self::default()
        }
    }
}

/// Contents of the light storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuLights {
    pub directional_count: u32,
    pub point_count: u32,
    pub _pad: [u32; 2],
    pub directional: [DirectionalLight; MAX_DIRECTIONAL_LIGHTS],
    pub point: [PointLight; MAX_POINT_LIGHTS],
}

impl GpuLights {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn from_scene(frame: &SceneFrame) -> Self {
        Self {
            directional_count: frame.directional_lights.len() as u32,
            point_count: frame.point_lights.len() as u32,
            _pad: [0; 2],
            directional: *frame.directional_lights.storage(),
            point: *frame.point_lights.storage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn item(index_count: u32, vertex_count: u32, indexed: bool) -> DrawItem {
        DrawItem {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            vertex_buffer: vk::Buffer::null(),
            index_buffer: if indexed {
                <vk::Buffer as vk::Handle>::from_raw(1)
            } else {
                vk::Buffer::null()
            },
            index_count,
            vertex_count,
            constants: DrawConstants::default(),
            descriptor_sets: Vec::new(),
        }
    }

    #[test]
    fn primitive_count_follows_draw_kind() {
        assert_eq!(item(36, 24, true).primitive_count(), 36);
        assert_eq!(item(36, 24, false).primitive_count(), 24);
        assert_eq!(item(0, 3, true).primitive_count(), 3);
    }

    #[test]
    fn push_constants_fit_guaranteed_range() {
        assert_eq!(DrawConstants::SIZE, 80);
        assert!(DrawConstants::SIZE <= 128);
    }

    #[test]
    fn lights_upload_counts_and_layout() {
        assert_eq!(GpuLights::SIZE, 16 + 16 * 32 + 64 * 32);

        let mut frame = SceneFrame::default();
        frame
            .point_lights
            .push(PointLight::new(Vec3::ONE, 5.0, Vec3::X, 2.0))
            .unwrap();
        let lights = GpuLights::from_scene(&frame);
        assert_eq!(lights.directional_count, 0);
        assert_eq!(lights.point_count, 1);
        assert_eq!(lights.point[0], frame.point_lights.as_slice()[0]);
        assert_eq!(lights.point[1], PointLight::default());
    }
}
