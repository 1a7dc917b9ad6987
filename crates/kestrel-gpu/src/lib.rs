//! Vulkan abstraction layer for the Kestrel engine.
//!
//! This crate provides:
//! - Vulkan instance creation and device negotiation
//! - Memory allocation via gpu-allocator
//! - Buffers, images with a layout state machine, samplers and textures
//! - Descriptor layouts, budgeted pools and bindless descriptor arrays
//! - Swapchain handling, synchronization primitives and timestamp queries
//! - Deferred destruction for resources shared with in-flight frames

pub mod bindless;
pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod instance;
pub mod memory;
pub mod query;
pub mod sampler;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use bindless::{BindlessDescriptorSet, BindlessTable, SlotRequest};
pub use buffer::{Buffer, BufferDesc};
pub use capabilities::{DeviceRequirements, GpuCapabilities, GpuVendor, QueueFamilies};
pub use command::{CommandPool, SemaphoreStage};
pub use context::{GpuContext, GpuContextBuilder};
pub use deferred::{DeferredQueue, Retired};
pub use descriptors::{
    DescriptorInfo, DescriptorPool, DescriptorPoolDesc, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, LayoutId,
};
pub use error::{GpuError, Result};
pub use image::{texel_size, Image, ImageDesc, ImageLayout};
pub use memory::{GpuAllocator, Residency};
pub use query::TimestampQueries;
pub use sampler::{Sampler, SamplerDesc};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use sync::{FrameSync, PresentSemaphores};
pub use texture::Texture;
