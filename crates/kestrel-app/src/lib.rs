//! Application framework for the Kestrel engine.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Logging setup
//! - Window creation and management
//! - GPU context and renderer initialization
//! - Resize and minimize handling
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use kestrel_app::{run_app, AppConfig, AppContext, RenderApp, SceneFrame};
//!
//! struct MyApp;
//!
//! impl RenderApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut AppContext, _dt: f32) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn prepare_frame(&mut self, _ctx: &AppContext) -> SceneFrame {
//!         SceneFrame::default()
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My app"))
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::RenderApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use kestrel_core::RenderSettings;
pub use kestrel_gpu::{GpuContext, GpuContextBuilder};
pub use kestrel_render::{RendererInfo, SceneFrame};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
