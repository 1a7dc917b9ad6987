//! GPU error types.

use ash::vk;
use thiserror::Error;

use crate::image::ImageLayout;

/// GPU-related errors.
///
/// Every variant that refers to a resource carries its debug name and the
/// parameters it was requested with so startup failures are diagnosable.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No physical device satisfied the requirements.
    #[error("No suitable GPU found ({inspected} inspected): {}", .reasons.join("; "))]
    NoSuitableDevice {
        /// Number of physical devices enumerated
        inspected: usize,
        /// One entry per rejected device
        reasons: Vec<String>,
    },

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Required device feature not supported.
    #[error("Required device feature not supported: {0}")]
    FeatureNotSupported(String),

    /// None of the candidate formats supports the requested features.
    #[error("No supported {purpose} format among {candidates:?} (needs {required:?})")]
    NoSupportedFormat {
        /// What the format is for (color, depth)
        purpose: &'static str,
        /// Candidates that were tried, in priority order
        candidates: Vec<vk::Format>,
        /// Format features the search required
        required: vk::FormatFeatureFlags,
    },

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Host access on memory that is not host visible.
    #[error("Resource '{0}' is not host visible")]
    NotHostVisible(String),

    /// A host copy range falls outside the resource.
    #[error("Range {offset}..{offset}+{len} is out of bounds for '{name}' ({size} bytes)")]
    OutOfBounds {
        /// Resource name
        name: String,
        /// Byte offset of the access
        offset: u64,
        /// Byte length of the access
        len: u64,
        /// Resource size in bytes
        size: u64,
    },

    /// Buffer to buffer copies require equal sizes.
    #[error("Cannot copy '{src}' ({src_size} bytes) into '{dst}' ({dst_size} bytes): sizes differ")]
    SizeMismatch {
        /// Source buffer name
        src: String,
        /// Source buffer size
        src_size: u64,
        /// Destination buffer name
        dst: String,
        /// Destination buffer size
        dst_size: u64,
    },

    /// The image layout state machine has no edge for this request.
    #[error("Illegal layout transition for image '{name}': {from:?} -> {to:?}")]
    IllegalLayoutTransition {
        /// Image name
        name: String,
        /// Recorded layout
        from: ImageLayout,
        /// Requested layout
        to: ImageLayout,
    },

    /// Mip chain generation was requested in an invalid state.
    #[error("Cannot generate mip chain for image '{name}': {reason}")]
    MipGeneration {
        /// Image name
        name: String,
        /// Why the request was rejected
        reason: String,
    },

    /// A descriptor set layout declares the same binding twice.
    #[error("Descriptor binding {0} is already registered")]
    DuplicateBinding(u32),

    /// A binding was added before the builder's stage mask was set.
    #[error("Descriptor binding {0} added before a shader stage mask was set")]
    MissingStageMask(u32),

    /// A write or lookup targets a binding the layout does not declare.
    #[error("Binding {0} is not declared in the descriptor set layout")]
    UnknownBinding(u32),

    /// A write does not match the descriptor type declared for its binding.
    #[error("Binding {binding} expects {expected:?}, got {actual:?}")]
    DescriptorTypeMismatch {
        /// Binding index
        binding: u32,
        /// Type declared in the layout
        expected: vk::DescriptorType,
        /// Type of the attempted write
        actual: vk::DescriptorType,
    },

    /// The descriptor pool has no room left for the request.
    #[error("Descriptor pool exhausted: {0}")]
    PoolExhausted(String),

    /// Every slot of a bindless binding is occupied.
    #[error("Descriptor set is full: binding {binding} has all {capacity} slots occupied")]
    DescriptorSetFull {
        /// Binding index
        binding: u32,
        /// Array capacity of the binding
        capacity: u32,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_resource() {
        let err = GpuError::OutOfBounds {
            name: "camera".to_string(),
            offset: 64,
            len: 128,
            size: 128,
        };
        let message = err.to_string();
        assert!(message.contains("camera"));
        assert!(message.contains("128 bytes"));

        let err = GpuError::NoSuitableDevice {
            inspected: 2,
            reasons: vec!["a: no graphics queue".into(), "b: missing VK_KHR_swapchain".into()],
        };
        assert!(err.to_string().contains("a: no graphics queue; b: missing"));
    }
}
