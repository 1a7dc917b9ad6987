//! Vulkan instance creation, validation and physical device selection.

use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::capabilities::{DeviceCandidate, DeviceRequirements, QueueFamilies};
use crate::error::{GpuError, Result};

/// Validation layers to enable when validation is requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Instance extensions for the given display, plus debug utils when validating.
///
/// Headless contexts pass `None` and get no surface extensions.
pub fn required_instance_extensions(
    display: Option<RawDisplayHandle>,
    enable_validation: bool,
) -> Result<Vec<*const c_char>> {
    let mut extensions = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::SurfaceCreation(format!("Unsupported display: {e}")))?
            .to_vec(),
        None => Vec::new(),
    };

    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());

    Ok(extensions)
}

/// Create a Vulkan instance.
///
/// Returns the instance and whether debug utils were enabled; validation
/// degrades to a warning when the layer or extension is unavailable.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: Option<RawDisplayHandle>,
    enable_validation: bool,
) -> Result<(ash::Instance, bool)> {
    let app_name = CString::new(app_name)
        .map_err(|_| GpuError::InvalidState(format!("Invalid application name {app_name:?}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Kestrel")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let debug_utils_available = enable_validation
        && unsafe { entry.enumerate_instance_extension_properties(None) }?
            .iter()
            .any(|ext| ext.extension_name_as_c_str().ok() == Some(ash::ext::debug_utils::NAME));
    if enable_validation && !debug_utils_available {
        tracing::warn!("VK_EXT_debug_utils not available, validation messages will not be logged");
    }
    let extension_names = required_instance_extensions(display, debug_utils_available)?;

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are not fatal; the instance is created without them.
    let available_layers = unsafe { entry.enumerate_instance_layer_properties() }?;
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().ok() == Some(*layer));
            if !found {
                tracing::warn!("Validation layer {} not available", layer.to_string_lossy());
            }
            found
        })
        .collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None) }?;

    Ok((instance, debug_utils_available))
}

/// Debug messenger forwarding validation output to `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Install the messenger on an instance created with debug utils enabled.
    ///
    /// # Safety
    /// The entry and instance must be valid.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }?;

        Ok(Self { loader, messenger })
    }

    /// Destroy the messenger.
    ///
    /// # Safety
    /// Must be called before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if data.is_null() {
        Cow::Borrowed("(no message)")
    } else {
        match unsafe { (*data).message_as_c_str() } {
            Some(message) => message.to_string_lossy(),
            None => Cow::Borrowed("(no message)"),
        }
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vulkan", "{message_type:?} {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", "{message_type:?} {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::debug!(target: "vulkan", "{message_type:?} {message}");
        }
        _ => {
            tracing::trace!(target: "vulkan", "{message_type:?} {message}");
        }
    }

    vk::FALSE
}

/// Select the first physical device that satisfies the requirements.
///
/// `present` reports whether a queue family of a device can present to the
/// representative surface; headless contexts pass `None`.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    requirements: &DeviceRequirements,
    present: Option<&dyn Fn(vk::PhysicalDevice, u32) -> bool>,
) -> Result<(vk::PhysicalDevice, DeviceCandidate, QueueFamilies)> {
    let devices = unsafe { instance.enumerate_physical_devices() }?;
    let mut reasons = Vec::with_capacity(devices.len());

    for &physical_device in &devices {
        let supports_present =
            present.map(|present| move |family: u32| present(physical_device, family));
        let candidate = unsafe {
            DeviceCandidate::inspect(
                instance,
                physical_device,
                supports_present
                    .as_ref()
                    .map(|f| f as &dyn Fn(u32) -> bool),
            )
        }?;

        match candidate.evaluate(requirements) {
            Ok(families) => {
                for missing in candidate.missing_optional_extensions(requirements) {
                    tracing::warn!(
                        "{}: optional extension {} not supported",
                        candidate.name,
                        missing.to_string_lossy()
                    );
                }
                return Ok((physical_device, candidate, families));
            }
            Err(reason) => {
                tracing::debug!("Rejected GPU {reason}");
                reasons.push(reason);
            }
        }
    }

    Err(GpuError::NoSuitableDevice {
        inspected: devices.len(),
        reasons,
    })
}
