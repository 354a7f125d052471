// config.rs — Engine configuration, read from TOML
//
// Every field has a default so an empty document gives the stock engine
// settings. A file only lists what it overrides:
//
//   [pmove]
//   gravity = 400.0
//
//   [world]
//   stitch_curves = false
//
//   [precache]
//   shadow_volumes = false

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pmove: PmoveConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub precache: PrecacheConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

// ============================================================
// Player movement
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmoveConfig {
    /// Downward acceleration in units/s².
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// Highest ledge a walking player climbs without jumping.
    #[serde(default = "default_step_size")]
    pub step_size: f32,
    /// Overbounce applied when clipping velocity against a plane.
    #[serde(default = "default_overclip")]
    pub overclip: f32,
    /// Nonzero enables movement diagnostics.
    #[serde(default)]
    pub debug_level: i32,
}

fn default_gravity() -> f32 {
    800.0
}

fn default_step_size() -> f32 {
    18.0
}

fn default_overclip() -> f32 {
    1.001
}

impl Default for PmoveConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            step_size: default_step_size(),
            overclip: default_overclip(),
            debug_level: 0,
        }
    }
}

// ============================================================
// World loading
// ============================================================

/// Overbright settings are clamped to this many bits.
pub const MAX_OVERBRIGHT_BITS: i32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Repair cracks between neighbouring curved surfaces.
    #[serde(default = "default_true")]
    pub stitch_curves: bool,
    /// Maximum distance a subdivided curve may stray from the true surface.
    #[serde(default = "default_subdivisions")]
    pub subdivisions: f32,
    #[serde(default = "default_map_overbright_bits")]
    pub map_overbright_bits: i32,
    #[serde(default = "default_overbright_bits")]
    pub overbright_bits: i32,
    /// Light grid cell size when worldspawn doesn't set `gridsize`.
    #[serde(default = "default_grid_size")]
    pub default_grid_size: [f32; 3],
    /// Planar faces with more verts than this are truncated.
    #[serde(default = "default_max_face_points")]
    pub max_face_points: usize,
}

fn default_true() -> bool {
    true
}

fn default_subdivisions() -> f32 {
    4.0
}

fn default_map_overbright_bits() -> i32 {
    2
}

fn default_overbright_bits() -> i32 {
    1
}

fn default_grid_size() -> [f32; 3] {
    [64.0, 64.0, 128.0]
}

fn default_max_face_points() -> usize {
    64
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            stitch_curves: true,
            subdivisions: default_subdivisions(),
            map_overbright_bits: default_map_overbright_bits(),
            overbright_bits: default_overbright_bits(),
            default_grid_size: default_grid_size(),
            max_face_points: default_max_face_points(),
        }
    }
}

impl WorldConfig {
    /// Left shift applied to baked lighting bytes.
    pub fn color_shift(&self) -> i32 {
        let map = self.map_overbright_bits.clamp(0, MAX_OVERBRIGHT_BITS);
        (map - self.hardware_overbright_bits()).max(0)
    }

    /// Intensity that reaches full white after the hardware overbright scale.
    pub fn identity_light(&self) -> f32 {
        1.0 / (1u32 << self.hardware_overbright_bits()) as f32
    }

    fn hardware_overbright_bits(&self) -> i32 {
        self.overbright_bits.clamp(0, MAX_OVERBRIGHT_BITS)
    }
}

// ============================================================
// Light interaction precache
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecacheConfig {
    #[serde(default = "default_true")]
    pub light_indexes: bool,
    #[serde(default = "default_true")]
    pub shadow_indexes: bool,
    /// Stencil shadow volumes are in use.
    #[serde(default = "default_true")]
    pub shadow_volumes: bool,
    /// Per-surface index budget.
    #[serde(default = "default_max_indexes")]
    pub max_indexes: usize,
}

fn default_max_indexes() -> usize {
    600_000
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            light_indexes: true,
            shadow_indexes: true,
            shadow_volumes: true,
            max_indexes: default_max_indexes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_document_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.pmove.gravity, 800.0);
        assert_eq!(cfg.world.default_grid_size, [64.0, 64.0, 128.0]);
        assert!(cfg.precache.shadow_volumes);
    }

    #[test]
    fn test_partial_sections() {
        let cfg = EngineConfig::from_toml_str(
            "[pmove]\nstep_size = 24.0\n\n[precache]\nshadow_volumes = false\nmax_indexes = 96\n",
        )
        .unwrap();
        assert_eq!(cfg.pmove.step_size, 24.0);
        assert_eq!(cfg.pmove.overclip, 1.001);
        assert!(!cfg.precache.shadow_volumes);
        assert_eq!(cfg.precache.max_indexes, 96);
        assert!(cfg.world.stitch_curves);
    }

    #[test]
    fn test_bad_document() {
        assert!(matches!(
            EngineConfig::from_toml_str("[pmove]\ngravity = \"heavy\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_color_shift() {
        let mut w = WorldConfig::default();
        assert_eq!(w.color_shift(), 1);
        w.overbright_bits = 4;
        assert_eq!(w.color_shift(), 0);
    }

    #[test]
    fn test_extreme_overbright_bits_are_clamped() {
        let mut w = WorldConfig::default();
        assert_relative_eq!(w.identity_light(), 0.5);

        w.map_overbright_bits = i32::MAX;
        w.overbright_bits = i32::MIN;
        assert_eq!(w.color_shift(), MAX_OVERBRIGHT_BITS);
        assert_relative_eq!(w.identity_light(), 1.0);

        w.map_overbright_bits = 40;
        w.overbright_bits = 64;
        assert_eq!(w.color_shift(), 0);
        assert_relative_eq!(w.identity_light(), 1.0 / 256.0);
    }
}
