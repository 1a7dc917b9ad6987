//! Core types and limits for the Kestrel engine.
//!
//! This crate provides the renderer-agnostic pieces shared by every layer:
//! - Engine-wide limits and descriptor binding slots
//! - Render settings (frames in flight, vsync, bindless capacity)
//! - Scene-facing per-frame inputs (camera matrices, bounded light arrays)
//! - Common error types

pub mod error;
pub mod scene;
pub mod settings;

pub use error::{CoreError, Result};
pub use scene::{CameraMatrices, DirectionalLight, LightArray, PointLight};
pub use settings::RenderSettings;

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
    /// Upper bound on draw items submitted in a single frame.
    pub const MAX_MESHES: usize = 8192;
    /// Capacity of the point light array uploaded each frame.
    pub const MAX_POINT_LIGHTS: usize = 64;
    /// Capacity of the directional light array uploaded each frame.
    pub const MAX_DIRECTIONAL_LIGHTS: usize = 16;
    /// Default capacity of the bindless texture array.
    pub const MAX_BINDLESS_TEXTURES: u32 = 1024;

    /// Per-frame uniform data (camera).
    pub const UNIFORM_BUFFER_BINDING: u32 = 0;
    /// Per-frame storage data (lights).
    pub const STORAGE_BUFFER_BINDING: u32 = 1;
    /// Bindless combined image sampler array.
    pub const BINDLESS_TEXTURE_BINDING: u32 = 2;

    /// Base level texel count below which mip generation is skipped (256x256).
    pub const MIP_GENERATION_MIN_TEXELS: u64 = 256 * 256;
}
