//! Frame loop and draw strategies for the Kestrel engine.
//!
//! This crate provides:
//! - The frame driver (fence wait, acquire, record, submit, present)
//! - The `DrawStrategy` seam and the forward strategy
//! - Per-frame buffers, render targets and render statistics

pub mod draw;
pub mod driver;
pub mod forward;
pub mod frame;
pub mod info;
pub mod per_frame;
pub mod recorder;
pub mod strategy;
pub mod targets;

pub use draw::{DrawConstants, DrawItem, GpuLights, SceneFrame};
pub use driver::{FrameDriver, FrameOutcome, Renderer};
pub use forward::ForwardStrategy;
pub use frame::{FrameContext, FrameRing, FrameState};
pub use info::RendererInfo;
pub use per_frame::PerFrameBuffer;
pub use recorder::CommandRecorder;
pub use strategy::{DrawStrategy, TargetFormats};
