//! Engine-wide defaults for part bundles and async binding

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::Error;
use crate::part::BlendType;

/// Defaults applied to every new [`PartBundle`](crate::part::PartBundle).
///
/// Each bundle copies these values at construction; changing a bundle's
/// flags afterwards does not touch the config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanConfig {
    /// Blend used between multiple animations and between frames
    pub blend_type: BlendType,
    /// Interpolate between consecutive frames instead of snapping to the
    /// integer frame
    pub interpolate_frames: bool,
    /// Return unanimated joints to their default value
    pub restore_initial_pose: bool,
    /// Allow more than one animation to drive the same joints at once
    pub anim_blend_flag: bool,
    /// Minimum seconds between two non-forced updates
    pub update_delay: f64,
    /// Priority given to async bind requests (higher runs first)
    pub async_bind_priority: i32,
    /// Worker threads for a loader that owns its runtime
    pub async_bind_threads: usize,
}

impl Default for ChanConfig {
    fn default() -> Self {
        Self {
            blend_type: BlendType::NormalizedLinear,
            interpolate_frames: false,
            restore_initial_pose: true,
            anim_blend_flag: false,
            update_delay: 0.0,
            async_bind_priority: 100,
            async_bind_threads: 1,
        }
    }
}

impl ChanConfig {
    /// Parse a config from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config file (sync)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Save to file (sync)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
