//! Render settings shared by the frame driver and the application runner.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BINDLESS_TEXTURES, MAX_FRAMES_IN_FLIGHT, MAX_MESHES};
use crate::{CoreError, Result};

/// Tunables for the frame loop and the global descriptor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Number of frame contexts the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Present with FIFO (vsync) instead of mailbox/immediate.
    pub vsync: bool,
    /// Enable the Khronos validation layer and debug messenger.
    pub validation: bool,
    /// Capacity of the bindless texture array.
    pub bindless_textures: u32,
    /// Draw items accepted per frame; extra items are dropped with a warning.
    pub max_draws: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            vsync: true,
            validation: cfg!(debug_assertions),
            bindless_textures: MAX_BINDLESS_TEXTURES,
            max_draws: MAX_MESHES,
        }
    }
}

impl RenderSettings {
    /// Check that every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(CoreError::InvalidSetting(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.bindless_textures == 0 {
            return Err(CoreError::InvalidSetting(
                "bindless_textures must be at least 1".to_string(),
            ));
        }
        if self.max_draws == 0 || self.max_draws > MAX_MESHES {
            return Err(CoreError::InvalidSetting(format!(
                "max_draws must be in 1..={MAX_MESHES}, got {}",
                self.max_draws
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = RenderSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.frames_in_flight, MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn zero_frames_in_flight_rejected() {
        let settings = RenderSettings {
            frames_in_flight: 0,
            ..RenderSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CoreError::InvalidSetting(_))
        ));
    }

    #[test]
    fn too_many_draws_rejected() {
        let settings = RenderSettings {
            max_draws: MAX_MESHES + 1,
            ..RenderSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
