//! Kestrel sandbox.
//!
//! Uploads a texture (a PNG given on the command line, or a generated
//! checkerboard), registers it in the bindless array and drives the frame
//! loop with an orbiting camera and a handful of lights.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p kestrel-sandbox -- [OPTIONS] [IMAGE.png]
//! ```
//!
//! ## Keys
//!
//! - `R`: release the texture and upload it again (exercises deferred destruction)
//! - `V`: print renderer statistics
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use kestrel_app::{run_app, AppConfig, RenderSettings};

use crate::app::Sandbox;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let settings = RenderSettings {
        vsync: !args.iter().any(|arg| arg == "--no-vsync"),
        validation: args.iter().any(|arg| arg == "--validation") || cfg!(debug_assertions),
        ..RenderSettings::default()
    };

    run_app::<Sandbox>(
        AppConfig::new("Kestrel Sandbox")
            .with_size(WIDTH, HEIGHT)
            .with_settings(settings),
    )
}

fn print_help() {
    eprintln!(
        "Kestrel Sandbox

USAGE:
    cargo run -p kestrel-sandbox -- [OPTIONS] [IMAGE.png]

OPTIONS:
    --no-vsync              Present without waiting for vertical blank
    --validation            Enable validation layers in release builds
    -h, --help              Print this help message

KEYS:
    R                       Release and re-upload the texture
    V                       Print renderer statistics

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
