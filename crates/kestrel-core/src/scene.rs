//! Per-frame inputs supplied by the scene layer.
//!
//! These types are laid out for direct upload: every struct is `Pod` and
//! padded to 16-byte multiples so it matches std140/std430 on the GPU side.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::{CoreError, Result};

/// Camera matrices uploaded once per frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraMatrices {
    /// World to view transform
    pub view: Mat4,
    /// View to clip transform
    pub projection: Mat4,
    /// `projection * view`
    pub view_projection: Mat4,
    /// Camera position in world space (w = 1)
    pub position: Vec4,
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO)
    }
}

impl CameraMatrices {
    /// Build from view and projection matrices.
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            position: position.extend(1.0),
        }
    }

    /// Right-handed perspective camera looking from `eye` at `target`.
    ///
    /// The projection flips Y for Vulkan clip space.
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let mut projection = Mat4::perspective_rh(fov_y, aspect, near, far);
        projection.y_axis.y *= -1.0;
        Self::new(view, projection, eye)
    }
}

/// Directional light (sun-like).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DirectionalLight {
    /// Direction the light travels, xyz; w unused
    pub direction: Vec4,
    /// Linear color in xyz, intensity in w
    pub color_intensity: Vec4,
}

impl DirectionalLight {
    /// Create a directional light.
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero().extend(0.0),
            color_intensity: color.extend(intensity),
        }
    }
}

/// Point light.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    /// World position xyz, range in w
    pub position_range: Vec4,
    /// Linear color in xyz, intensity in w
    pub color_intensity: Vec4,
}

impl PointLight {
    /// Create a point light.
    pub fn new(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            position_range: position.extend(range),
            color_intensity: color.extend(intensity),
        }
    }
}

/// Fixed-capacity array with a live count.
///
/// The storage is always `N` elements so the whole array can be uploaded
/// without reallocation; only the first [`len`](Self::len) are meaningful.
#[derive(Clone, Copy, Debug)]
pub struct LightArray<T: Pod, const N: usize> {
    items: [T; N],
    count: usize,
}

impl<T: Pod, const N: usize> Default for LightArray<T, N> {
    fn default() -> Self {
        Self {
            items: [T::zeroed(); N],
            count: 0,
        }
    }
}

impl<T: Pod, const N: usize> LightArray<T, N> {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a light, returning its index.
    pub fn push(&mut self, item: T) -> Result<usize> {
        if self.count == N {
            return Err(CoreError::CapacityExceeded {
                what: "light array",
                capacity: N,
            });
        }
        let index = self.count;
        self.items[index] = item;
        self.count += 1;
        Ok(index)
    }

    /// Remove every light. The backing storage is zeroed.
    pub fn clear(&mut self) {
        self.items[..self.count].fill(T::zeroed());
        self.count = 0;
    }

    /// Live lights.
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.count]
    }

    /// The full backing storage, including unused zeroed entries.
    pub const fn storage(&self) -> &[T; N] {
        &self.items
    }

    /// Number of live lights.
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether no light is live.
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fixed capacity.
    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn light_array_push_until_full() {
        let mut lights = LightArray::<PointLight, 2>::new();
        assert_eq!(lights.push(PointLight::default()).unwrap(), 0);
        assert_eq!(lights.push(PointLight::default()).unwrap(), 1);
        assert!(matches!(
            lights.push(PointLight::default()),
            Err(CoreError::CapacityExceeded { capacity: 2, .. })
        ));
        assert_eq!(lights.len(), 2);
    }

    #[test]
    fn light_array_clear_zeroes_storage() {
        let mut lights = LightArray::<DirectionalLight, 4>::new();
        lights
            .push(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 3.0))
            .unwrap();
        lights.clear();
        assert!(lights.is_empty());
        assert_eq!(lights.storage()[0], DirectionalLight::default());
    }

    #[test]
    fn directional_light_direction_is_normalized() {
        let light = DirectionalLight::new(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE, 1.0);
        assert_relative_eq!(light.direction.truncate().length(), 1.0);
        assert_relative_eq!(light.color_intensity.w, 1.0);
    }

    #[test]
    fn camera_view_projection_matches_product() {
        let camera = CameraMatrices::look_at(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            100.0,
        );
        let expected = camera.projection * camera.view;
        assert!(camera.view_projection.abs_diff_eq(expected, 1e-6));
        assert_relative_eq!(camera.position.w, 1.0);
    }

    #[test]
    fn gpu_struct_sizes() {
        assert_eq!(std::mem::size_of::<CameraMatrices>(), 208);
        assert_eq!(std::mem::size_of::<DirectionalLight>(), 32);
        assert_eq!(std::mem::size_of::<PointLight>(), 32);
    }
}
