//! Texture samplers.

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};

/// Sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub mip_lod_bias: f32,
    /// Requested maximum anisotropy, `None` to disable.
    pub anisotropy: Option<f32>,
    pub compare_op: Option<vk::CompareOp>,
    pub border_color: vk::BorderColor,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self::linear()
    }
}

impl SamplerDesc {
    /// Trilinear, repeating, no anisotropy.
    pub fn linear() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            mip_lod_bias: 0.0,
            anisotropy: None,
            compare_op: None,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        }
    }

    /// Point sampling, clamped to edge.
    pub fn nearest() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ..Self::linear()
        }
    }

    pub fn address_mode(mut self, mode: vk::SamplerAddressMode) -> Self {
        self.address_mode = mode;
        self
    }

    pub fn anisotropy(mut self, max: f32) -> Self {
        self.anisotropy = Some(max);
        self
    }

    pub fn lod_range(mut self, min: f32, max: f32) -> Self {
        self.min_lod = min;
        self.max_lod = max;
        self
    }

    pub fn compare(mut self, op: vk::CompareOp) -> Self {
        self.compare_op = Some(op);
        self
    }

    pub fn border_color(mut self, color: vk::BorderColor) -> Self {
        self.border_color = color;
        self
    }
}

/// Effective anisotropy for a request against the device.
///
/// Requesting anisotropy on a device without the feature is an error; the
/// value is otherwise clamped to `1.0..=device_max`.
pub fn resolve_anisotropy(
    requested: Option<f32>,
    supported: bool,
    device_max: f32,
) -> Result<Option<f32>> {
    match requested {
        None => Ok(None),
        Some(_) if !supported => Err(GpuError::FeatureNotSupported(
            "samplerAnisotropy".to_string(),
        )),
        Some(value) => Ok(Some(value.clamp(1.0, device_max.max(1.0)))),
    }
}

/// A sampler and the parameters it was created with.
pub struct Sampler {
    handle: vk::Sampler,
    desc: SamplerDesc,
    name: String,
}

impl Sampler {
    pub fn new(ctx: &GpuContext, name: &str, desc: SamplerDesc) -> Result<Self> {
        let caps = ctx.capabilities();
        let anisotropy = resolve_anisotropy(
            desc.anisotropy,
            caps.sampler_anisotropy,
            caps.max_sampler_anisotropy,
        )?;

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(desc.compare_op.is_some())
            .compare_op(desc.compare_op.unwrap_or(vk::CompareOp::ALWAYS))
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(desc.border_color)
            .unnormalized_coordinates(false);

        let handle = unsafe { ctx.device().create_sampler(&create_info, None) }?;
        ctx.set_debug_name(handle, name);

        Ok(Self {
            handle,
            desc: SamplerDesc {
                anisotropy,
                ..desc
            },
            name: name.to_string(),
        })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }

    /// The parameters in effect, with anisotropy already clamped.
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destroy(self, ctx: &GpuContext) {
        unsafe { ctx.device().destroy_sampler(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn anisotropy_requires_feature() {
        assert!(matches!(
            resolve_anisotropy(Some(8.0), false, 16.0),
            Err(GpuError::FeatureNotSupported(_))
        ));
        assert_eq!(resolve_anisotropy(None, false, 16.0).unwrap(), None);
    }

    #[test]
    fn anisotropy_is_clamped_to_device_limit() {
        let value = resolve_anisotropy(Some(32.0), true, 16.0).unwrap().unwrap();
        assert_relative_eq!(value, 16.0);
        let value = resolve_anisotropy(Some(0.25), true, 16.0).unwrap().unwrap();
        assert_relative_eq!(value, 1.0);
    }

    #[test]
    fn builders_compose() {
        let desc = SamplerDesc::nearest()
            .lod_range(0.0, 4.0)
            .compare(vk::CompareOp::LESS);
        assert_eq!(desc.min_filter, vk::Filter::NEAREST);
        assert_relative_eq!(desc.max_lod, 4.0);
        assert_eq!(desc.compare_op, Some(vk::CompareOp::LESS));
    }
}
