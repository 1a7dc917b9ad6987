//! GPU capability detection and device negotiation.
//!
//! Device selection is split into an inspection step that reads everything the
//! negotiator needs from a physical device into a [`DeviceCandidate`], and a
//! pure evaluation step that checks the candidate against
//! [`DeviceRequirements`]. Only `DeviceCandidate::inspect` touches Vulkan.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

use crate::error::{GpuError, Result};

/// Color formats tried for offscreen targets, best first.
pub const COLOR_FORMAT_CANDIDATES: [vk::Format; 2] =
    [vk::Format::R8G8B8A8_SRGB, vk::Format::R8G8B8A8_UNORM];

/// Depth formats tried for depth targets, best first.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

trait FeatureBit {
    fn is_set(&self) -> bool;
}

impl FeatureBit for vk::Bool32 {
    fn is_set(&self) -> bool {
        *self == vk::TRUE
    }
}

impl FeatureBit for bool {
    fn is_set(&self) -> bool {
        *self
    }
}

/// Field-by-field `required <= supported` over a feature struct.
macro_rules! missing_features {
    ($required:expr, $supported:expr; $($field:ident),+ $(,)?) => {{
        let mut missing: Vec<&'static str> = Vec::new();
        $(
            if $required.$field.is_set() && !$supported.$field.is_set() {
                missing.push(stringify!($field));
            }
        )+
        missing
    }};
}

/// Names of the core features set in `required` that `supported` lacks.
pub fn missing_core_features(
    required: &vk::PhysicalDeviceFeatures,
    supported: &vk::PhysicalDeviceFeatures,
) -> Vec<&'static str> {
    missing_features!(required, supported;
        robust_buffer_access,
        full_draw_index_uint32,
        image_cube_array,
        independent_blend,
        geometry_shader,
        tessellation_shader,
        sample_rate_shading,
        dual_src_blend,
        logic_op,
        multi_draw_indirect,
        draw_indirect_first_instance,
        depth_clamp,
        depth_bias_clamp,
        fill_mode_non_solid,
        depth_bounds,
        wide_lines,
        large_points,
        alpha_to_one,
        multi_viewport,
        sampler_anisotropy,
        texture_compression_etc2,
        texture_compression_astc_ldr,
        texture_compression_bc,
        occlusion_query_precise,
        pipeline_statistics_query,
        vertex_pipeline_stores_and_atomics,
        fragment_stores_and_atomics,
        shader_tessellation_and_geometry_point_size,
        shader_image_gather_extended,
        shader_storage_image_extended_formats,
        shader_storage_image_multisample,
        shader_storage_image_read_without_format,
        shader_storage_image_write_without_format,
        shader_uniform_buffer_array_dynamic_indexing,
        shader_sampled_image_array_dynamic_indexing,
        shader_storage_buffer_array_dynamic_indexing,
        shader_storage_image_array_dynamic_indexing,
        shader_clip_distance,
        shader_cull_distance,
        shader_float64,
        shader_int64,
        shader_int16,
        shader_resource_residency,
        shader_resource_min_lod,
        sparse_binding,
        sparse_residency_buffer,
        sparse_residency_image2_d,
        sparse_residency_image3_d,
        sparse_residency2_samples,
        sparse_residency4_samples,
        sparse_residency8_samples,
        sparse_residency16_samples,
        sparse_residency_aliased,
        variable_multisample_rate,
        inherited_queries,
    )
}

/// Descriptor indexing features needed by bindless bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorIndexingFeatures {
    pub descriptor_binding_partially_bound: bool,
    pub descriptor_binding_sampled_image_update_after_bind: bool,
    pub descriptor_binding_storage_buffer_update_after_bind: bool,
    pub descriptor_binding_update_unused_while_pending: bool,
    pub runtime_descriptor_array: bool,
    pub shader_sampled_image_array_non_uniform_indexing: bool,
}

impl DescriptorIndexingFeatures {
    /// Everything a bindless texture/buffer table needs.
    pub const BINDLESS: Self = Self {
        descriptor_binding_partially_bound: true,
        descriptor_binding_sampled_image_update_after_bind: true,
        descriptor_binding_storage_buffer_update_after_bind: true,
        descriptor_binding_update_unused_while_pending: true,
        runtime_descriptor_array: true,
        shader_sampled_image_array_non_uniform_indexing: true,
    };

    /// Extract from the Vulkan 1.2 feature struct.
    pub fn from_vulkan12(features: &vk::PhysicalDeviceVulkan12Features<'_>) -> Self {
        Self {
            descriptor_binding_partially_bound: features.descriptor_binding_partially_bound
                == vk::TRUE,
            descriptor_binding_sampled_image_update_after_bind: features
                .descriptor_binding_sampled_image_update_after_bind
                == vk::TRUE,
            descriptor_binding_storage_buffer_update_after_bind: features
                .descriptor_binding_storage_buffer_update_after_bind
                == vk::TRUE,
            descriptor_binding_update_unused_while_pending: features
                .descriptor_binding_update_unused_while_pending
                == vk::TRUE,
            runtime_descriptor_array: features.runtime_descriptor_array == vk::TRUE,
            shader_sampled_image_array_non_uniform_indexing: features
                .shader_sampled_image_array_non_uniform_indexing
                == vk::TRUE,
        }
    }

    /// Names of the features set here that `supported` lacks.
    pub fn missing(&self, supported: &Self) -> Vec<&'static str> {
        missing_features!(self, supported;
            descriptor_binding_partially_bound,
            descriptor_binding_sampled_image_update_after_bind,
            descriptor_binding_storage_buffer_update_after_bind,
            descriptor_binding_update_unused_while_pending,
            runtime_descriptor_array,
            shader_sampled_image_array_non_uniform_indexing,
        )
    }

    /// Whether any feature is requested.
    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// What a physical device must offer to be selected.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    /// Core features that must be supported (and are enabled on the device).
    pub features: vk::PhysicalDeviceFeatures,
    /// Descriptor indexing features that must be supported.
    pub descriptor_indexing: DescriptorIndexingFeatures,
    /// Extensions that must be present.
    pub extensions: Vec<&'static CStr>,
    /// Extensions enabled when present; absence only logs a warning.
    pub optional_extensions: Vec<&'static CStr>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            features: vk::PhysicalDeviceFeatures::default(),
            descriptor_indexing: DescriptorIndexingFeatures::BINDLESS,
            extensions: Vec::new(),
            optional_extensions: Vec::new(),
        }
    }
}

/// Queue family properties relevant to selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    /// Supports graphics operations
    pub graphics: bool,
    /// Can present to the representative surface
    pub present: bool,
    /// Valid bits of timestamps written on this family (0 = unsupported)
    pub timestamp_valid_bits: u32,
}

/// Chosen queue family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Graphics and present are the same family.
    pub fn is_unified(&self) -> bool {
        self.graphics == self.present
    }
}

/// Everything the negotiator reads from a physical device.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub api_version: u32,
    pub features: vk::PhysicalDeviceFeatures,
    pub descriptor_indexing: DescriptorIndexingFeatures,
    pub extensions: HashSet<String>,
    pub queue_families: Vec<QueueFamilySupport>,
}

impl DeviceCandidate {
    /// Read a physical device's features, extensions and queue families.
    ///
    /// `present` reports whether a queue family can present to the
    /// representative surface; headless callers pass `None`.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn inspect(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        present: Option<&dyn Fn(u32) -> bool>,
    ) -> Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        let mut vulkan_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_2);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        let features = features2.features;
        let descriptor_indexing = DescriptorIndexingFeatures::from_vulkan12(&vulkan_1_2);

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }?
            .iter()
            .filter_map(|ext| {
                ext.extension_name_as_c_str()
                    .ok()
                    .and_then(|name| name.to_str().ok())
                    .map(String::from)
            })
            .collect();

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
                .iter()
                .enumerate()
                .map(|(index, family)| QueueFamilySupport {
                    graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    present: present.map_or(true, |supports| supports(index as u32)),
                    timestamp_valid_bits: family.timestamp_valid_bits,
                })
                .collect();

        Ok(Self {
            name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<unnamed device>".to_string()),
            api_version: properties.api_version,
            features,
            descriptor_indexing,
            extensions,
            queue_families,
        })
    }

    /// Check the candidate against the requirements.
    ///
    /// Returns the chosen queue families, or a human readable rejection
    /// reason naming every unmet requirement.
    pub fn evaluate(
        &self,
        requirements: &DeviceRequirements,
    ) -> std::result::Result<QueueFamilies, String> {
        let mut problems = Vec::new();

        let (major, minor) = (
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
        );
        if major < 1 || (major == 1 && minor < 3) {
            problems.push(format!("Vulkan 1.3 required, device reports {major}.{minor}"));
        }

        let graphics = self
            .queue_families
            .iter()
            .position(|family| family.graphics);
        // Prefer presenting from the graphics family to avoid ownership transfers.
        let present = graphics
            .filter(|&index| self.queue_families[index].present)
            .or_else(|| self.queue_families.iter().position(|family| family.present));
        if graphics.is_none() {
            problems.push("no graphics queue family".to_string());
        }
        if present.is_none() {
            problems.push("no queue family can present to the surface".to_string());
        }

        for extension in &requirements.extensions {
            let name = extension.to_string_lossy();
            if !self.extensions.contains(name.as_ref()) {
                problems.push(format!("missing extension {name}"));
            }
        }

        let missing = missing_core_features(&requirements.features, &self.features);
        if !missing.is_empty() {
            problems.push(format!("missing features {}", missing.join(", ")));
        }
        let missing = requirements
            .descriptor_indexing
            .missing(&self.descriptor_indexing);
        if !missing.is_empty() {
            problems.push(format!(
                "missing descriptor indexing features {}",
                missing.join(", ")
            ));
        }

        match (graphics, present) {
            (Some(graphics), Some(present)) if problems.is_empty() => Ok(QueueFamilies {
                graphics: graphics as u32,
                present: present as u32,
            }),
            _ => Err(format!("{}: {}", self.name, problems.join(", "))),
        }
    }

    /// Optional extensions from `requirements` that this device lacks.
    pub fn missing_optional_extensions<'a>(
        &self,
        requirements: &'a DeviceRequirements,
    ) -> Vec<&'a CStr> {
        requirements
            .optional_extensions
            .iter()
            .copied()
            .filter(|ext| !self.extensions.contains(ext.to_string_lossy().as_ref()))
            .collect()
    }
}

/// First candidate format whose tiling features contain `required`.
pub fn select_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    required: vk::FormatFeatureFlags,
    mut properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = properties(format);
        let supported = if tiling == vk::ImageTiling::LINEAR {
            props.linear_tiling_features
        } else {
            props.optimal_tiling_features
        };
        supported.contains(required)
    })
}

/// Highest sample count usable for both color and depth attachments.
pub fn max_sample_count(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color & depth;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Detected GPU capabilities of the selected device.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type (discrete, integrated, ...)
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Memory type table
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Alignment for flushing non-coherent mapped ranges
    pub non_coherent_atom_size: u64,

    /// Best offscreen color format
    pub color_format: vk::Format,
    /// Best depth-stencil format
    pub depth_format: vk::Format,
    /// Highest sample count usable for color and depth together
    pub max_samples: vk::SampleCountFlags,

    /// Anisotropic filtering is supported (and enabled on the device)
    pub sampler_anisotropy: bool,
    /// Maximum sampler anisotropy
    pub max_sampler_anisotropy: f32,

    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    /// Valid timestamp bits on the graphics queue (0 = no timestamps)
    pub timestamp_valid_bits: u32,

    /// Largest sampled image array usable in an update-after-bind set
    pub max_bindless_sampled_images: u32,
    /// Largest storage buffer array usable in an update-after-bind set
    pub max_bindless_storage_buffers: u32,

    /// Available device extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from the selected physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        candidate: &DeviceCandidate,
        families: QueueFamilies,
    ) -> Result<Self> {
        let mut vulkan_1_2 = vk::PhysicalDeviceVulkan12Properties::default();
        let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut vulkan_1_2);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
        let properties = properties2.properties;
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let format_properties = |format| unsafe {
            instance.get_physical_device_format_properties(physical_device, format)
        };
        let color_format = select_format(
            &COLOR_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::COLOR_ATTACHMENT,
            format_properties,
        )
        .ok_or_else(|| GpuError::NoSupportedFormat {
            purpose: "color",
            candidates: COLOR_FORMAT_CANDIDATES.to_vec(),
            required: vk::FormatFeatureFlags::COLOR_ATTACHMENT,
        })?;
        let depth_format = select_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            format_properties,
        )
        .ok_or_else(|| GpuError::NoSupportedFormat {
            purpose: "depth",
            candidates: DEPTH_FORMAT_CANDIDATES.to_vec(),
            required: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        })?;

        let limits = properties.limits;
        let timestamp_valid_bits = if limits.timestamp_compute_and_graphics == vk::TRUE {
            candidate
                .queue_families
                .get(families.graphics as usize)
                .map_or(0, |family| family.timestamp_valid_bits)
        } else {
            0
        };

        Ok(Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: candidate.name.clone(),
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            memory_properties,
            non_coherent_atom_size: limits.non_coherent_atom_size,
            color_format,
            depth_format,
            max_samples: max_sample_count(
                limits.framebuffer_color_sample_counts,
                limits.framebuffer_depth_sample_counts,
            ),
            sampler_anisotropy: candidate.features.sampler_anisotropy == vk::TRUE,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
            timestamp_period: limits.timestamp_period,
            timestamp_valid_bits,
            max_bindless_sampled_images: vulkan_1_2
                .max_descriptor_set_update_after_bind_sampled_images
                .min(vulkan_1_2.max_per_stage_descriptor_update_after_bind_sampled_images),
            max_bindless_storage_buffers: vulkan_1_2
                .max_descriptor_set_update_after_bind_storage_buffers
                .min(vulkan_1_2.max_per_stage_descriptor_update_after_bind_storage_buffers),
            available_extensions: candidate.extensions.clone(),
        })
    }

    /// Whether GPU timestamps can be recorded on the graphics queue.
    pub fn supports_timestamps(&self) -> bool {
        self.timestamp_valid_bits > 0 && self.timestamp_period > 0.0
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM - color {:?}, depth {:?}, {:?} max samples",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.color_format,
            self.depth_format,
            self.max_samples,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> DeviceCandidate {
        DeviceCandidate {
            name: "Test GPU".to_string(),
            api_version: vk::make_api_version(0, 1, 3, 250),
            features: vk::PhysicalDeviceFeatures {
                sampler_anisotropy: vk::TRUE,
                shader_int64: vk::TRUE,
                ..Default::default()
            },
            descriptor_indexing: DescriptorIndexingFeatures::BINDLESS,
            extensions: ["VK_KHR_swapchain".to_string()].into_iter().collect(),
            queue_families: vec![
                QueueFamilySupport {
                    graphics: false,
                    present: true,
                    timestamp_valid_bits: 0,
                },
                QueueFamilySupport {
                    graphics: true,
                    present: true,
                    timestamp_valid_bits: 64,
                },
            ],
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn features_compared_field_by_field() {
        let required = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            geometry_shader: vk::TRUE,
            ..Default::default()
        };
        let supported = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            wide_lines: vk::TRUE,
            ..Default::default()
        };
        assert_eq!(
            missing_core_features(&required, &supported),
            vec!["geometry_shader"]
        );
        assert!(missing_core_features(&vk::PhysicalDeviceFeatures::default(), &supported).is_empty());
    }

    #[test]
    fn graphics_family_preferred_for_present() {
        let families = candidate()
            .evaluate(&DeviceRequirements::default())
            .unwrap();
        assert_eq!(families.graphics, 1);
        assert_eq!(families.present, 1);
        assert!(families.is_unified());
    }

    #[test]
    fn separate_present_family_when_graphics_cannot_present() {
        let mut device = candidate();
        device.queue_families[1].present = false;
        let families = device.evaluate(&DeviceRequirements::default()).unwrap();
        assert_eq!(families.graphics, 1);
        assert_eq!(families.present, 0);
    }

    #[test]
    fn rejection_lists_every_problem() {
        let mut device = candidate();
        device.api_version = vk::make_api_version(0, 1, 2, 0);
        device.descriptor_indexing.runtime_descriptor_array = false;
        let requirements = DeviceRequirements {
            extensions: vec![ash::khr::swapchain::NAME, c"VK_EXT_mesh_shader"],
            features: vk::PhysicalDeviceFeatures {
                geometry_shader: vk::TRUE,
                ..Default::default()
            },
            ..Default::default()
        };
        let reason = device.evaluate(&requirements).unwrap_err();
        assert!(reason.starts_with("Test GPU: "));
        assert!(reason.contains("Vulkan 1.3 required"));
        assert!(reason.contains("missing extension VK_EXT_mesh_shader"));
        assert!(reason.contains("geometry_shader"));
        assert!(reason.contains("runtime_descriptor_array"));
        assert!(!reason.contains("VK_KHR_swapchain"));
    }

    #[test]
    fn no_graphics_queue_rejected() {
        let mut device = candidate();
        device.queue_families.iter_mut().for_each(|f| f.graphics = false);
        let reason = device.evaluate(&DeviceRequirements::default()).unwrap_err();
        assert!(reason.contains("no graphics queue family"));
    }

    #[test]
    fn optional_extensions_reported_not_rejected() {
        let requirements = DeviceRequirements {
            optional_extensions: vec![c"VK_EXT_memory_budget"],
            ..Default::default()
        };
        let device = candidate();
        assert!(device.evaluate(&requirements).is_ok());
        assert_eq!(
            device.missing_optional_extensions(&requirements),
            vec![c"VK_EXT_memory_budget"]
        );
    }

    #[test]
    fn format_search_returns_first_match() {
        let props = |format: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if format == vk::Format::D32_SFLOAT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        };
        assert_eq!(
            select_format(
                &DEPTH_FORMAT_CANDIDATES,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                props,
            ),
            Some(vk::Format::D32_SFLOAT)
        );
        assert_eq!(
            select_format(
                &DEPTH_FORMAT_CANDIDATES,
                vk::ImageTiling::LINEAR,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                props,
            ),
            None
        );
    }

    #[test]
    fn sample_count_is_highest_common_bit() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(max_sample_count(color, depth), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            max_sample_count(vk::SampleCountFlags::TYPE_1, depth),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
