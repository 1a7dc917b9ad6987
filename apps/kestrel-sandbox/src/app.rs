//! Sandbox application.

use std::path::PathBuf;

use anyhow::Context as _;
use glam::Vec3;
use kestrel_app::{AppContext, RenderApp, SceneFrame, WindowEvent};
use kestrel_core::{CameraMatrices, DirectionalLight, PointLight};
use kestrel_gpu::{SamplerDesc, Texture};
use tracing::{info, warn};
use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

/// Camera orbit speed in radians per second.
const ORBIT_SPEED: f32 = 0.4;
const ORBIT_RADIUS: f32 = 6.0;
const ORBIT_HEIGHT: f32 = 2.5;
const POINT_LIGHTS: usize = 8;
const CHECKER_SIZE: u32 = 512;
const CHECKER_CELL: u32 = 32;

/// Pixels and dimensions of the texture to upload.
struct TextureSource {
    name: String,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureSource {
    /// The first non-flag argument names a PNG; otherwise a checkerboard.
    fn from_args() -> anyhow::Result<Self> {
        let path = std::env::args()
            .skip(1)
            .find(|arg| !arg.starts_with('-'))
            .map(PathBuf::from);

        match path {
            Some(path) => {
                let image = image::open(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?
                    .to_rgba8();
                let (width, height) = image.dimensions();
                Ok(Self {
                    name: path.display().to_string(),
                    width,
                    height,
                    pixels: image.into_raw(),
                })
            }
            None => Ok(Self::checkerboard(CHECKER_SIZE, CHECKER_CELL)),
        }
    }

    fn checkerboard(size: u32, cell: u32) -> Self {
        let pixels = (0..size * size)
            .flat_map(|i| {
                let (x, y) = (i % size, i / size);
                if (x / cell + y / cell) % 2 == 0 {
                    [230, 230, 230, 255]
                } else {
                    [40, 90, 160, 255]
                }
            })
            .collect();
        Self {
            name: "checkerboard".to_string(),
            width: size,
            height: size,
            pixels,
        }
    }

    fn upload(&self, ctx: &AppContext) -> anyhow::Result<Texture> {
        Texture::from_rgba8(
            &ctx.gpu,
            &self.name,
            self.width,
            self.height,
            &self.pixels,
            true,
            SamplerDesc::linear(),
        )
        .with_context(|| format!("Failed to upload '{}'", self.name))
    }
}

/// Sandbox state.
pub struct Sandbox {
    source: TextureSource,
    /// Uploaded texture and its bindless slot.
    texture: Option<(Texture, u32)>,
    time: f32,
    reload_requested: bool,
    stats_requested: bool,
}

impl Sandbox {
    fn upload_and_register(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let texture = self.source.upload(ctx)?;
        let slot = match ctx.register_texture(&texture) {
            Ok(slot) => slot,
            Err(err) => {
                texture.destroy(&ctx.gpu)?;
                return Err(err);
            }
        };
        info!("Registered '{}' at bindless slot {slot}", self.source.name);
        self.texture = Some((texture, slot));
        Ok(())
    }

    fn release(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        if let Some((texture, slot)) = self.texture.take() {
            ctx.release_texture(texture, slot)?;
            info!("Released bindless slot {slot}");
        }
        Ok(())
    }

    fn camera(&self, aspect: f32) -> CameraMatrices {
        let angle = self.time * ORBIT_SPEED;
        let eye = Vec3::new(
            angle.cos() * ORBIT_RADIUS,
            ORBIT_HEIGHT,
            angle.sin() * ORBIT_RADIUS,
        );
        CameraMatrices::look_at(eye, Vec3::ZERO, 60.0_f32.to_radians(), aspect, 0.1, 100.0)
    }

    fn clear_color(&self) -> [f32; 4] {
        let pulse = (self.time * 0.5).sin().mul_add(0.05, 0.1);
        [pulse, pulse * 1.2, pulse * 1.6, 1.0]
    }
}

impl RenderApp for Sandbox {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let source = TextureSource::from_args()?;
        info!(
            "Texture source '{}' ({}x{})",
            source.name, source.width, source.height
        );

        let mut app = Self {
            source,
            texture: None,
            time: 0.0,
            reload_requested: false,
            stats_requested: false,
        };
        app.upload_and_register(ctx)?;
        Ok(app)
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()> {
        self.time += dt;

        if std::mem::take(&mut self.reload_requested) {
            self.release(ctx)?;
            self.upload_and_register(ctx)?;
        }

        if std::mem::take(&mut self.stats_requested) {
            let stats = ctx.renderer_info();
            info!(
                "Frame {}: GPU {:.3} ms, {} meshes, {} vertices, {} resources awaiting release",
                ctx.frame_count(),
                stats.draw_time_ms,
                stats.meshes_drawn,
                stats.vertices_drawn,
                ctx.renderer.retired_count()
            );
        }

        let clear = self.clear_color();
        ctx.renderer.strategy_mut().set_clear_color(clear);
        Ok(())
    }

    fn prepare_frame(&mut self, ctx: &AppContext) -> SceneFrame {
        let mut scene = SceneFrame::new(self.camera(ctx.aspect_ratio()));

        let sun = DirectionalLight::new(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE, 2.0);
        if let Err(err) = scene.directional_lights.push(sun) {
            warn!("Dropping sun light: {err}");
        }

        for i in 0..POINT_LIGHTS {
            let phase = self.time + i as f32 * std::f32::consts::TAU / POINT_LIGHTS as f32;
            let position = Vec3::new(phase.cos() * 3.0, 1.0, phase.sin() * 3.0);
            let hue = i as f32 / POINT_LIGHTS as f32;
            let color = Vec3::new(hue, 1.0 - hue, 0.5);
            if let Err(err) = scene
                .point_lights
                .push(PointLight::new(position, 4.0, color, 1.5))
            {
                warn!("Dropping point light {i}: {err}");
                break;
            }
        }

        scene
    }

    fn on_event(&mut self, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return false;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return false;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::KeyR) => {
                self.reload_requested = true;
                true
            }
            PhysicalKey::Code(KeyCode::KeyV) => {
                self.stats_requested = true;
                true
            }
            _ => false,
        }
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        if let Err(err) = self.release(ctx) {
            warn!("Failed to release texture: {err:#}");
        }
    }
}
