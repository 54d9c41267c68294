//! Pipeline Configuration
//!
//! Session-level settings for the tiled deferred lighting pipeline, with
//! serde support so hosts can keep them in TOML alongside other settings.
//!
//! # Example Config File
//!
//! ```toml
//! enabled = true
//! resolution_multiplier = 0.5
//! max_lights = 4096
//! tile_size = 16
//! max_lights_per_tile = 256
//! max_resolution = [2560, 1440]
//! depth_bounds_culling = true
//! blur_lights = false
//! debug_mode = "tile_heatmap"
//! ```

use std::path::Path;

use relights_math::div_ceil;
use serde::{Deserialize, Serialize};

use crate::debug::DebugMode;
use crate::error::{PipelineError, Result};

/// Default maximum registered lights uploaded per frame
pub const DEFAULT_MAX_LIGHTS: u32 = 1 << 12;
/// Default tile edge in pixels
pub const DEFAULT_TILE_SIZE: u32 = 16;
/// Default per-tile light list capacity
pub const DEFAULT_MAX_LIGHTS_PER_TILE: u32 = 256;
/// Default maximum supported output resolution
pub const DEFAULT_MAX_RESOLUTION: (u32, u32) = (2560, 1440);

/// Largest accepted `max_lights`
pub const MAX_LIGHTS_LIMIT: u32 = 1 << 20;
/// Largest accepted `max_lights_per_tile`
pub const MAX_LIGHTS_PER_TILE_LIMIT: u32 = 1 << 12;
/// Largest light index buffer (`max_tiles * max_lights_per_tile`) accepted
pub const MAX_LIGHT_INDEX_ENTRIES: u64 = 1 << 26;

/// Lowest accepted resolution multiplier
pub const MIN_RESOLUTION_MULTIPLIER: f32 = 0.1;
/// Highest accepted resolution multiplier
pub const MAX_RESOLUTION_MULTIPLIER: f32 = 1.0;

/// Deferred lighting configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredLightsConfig {
    /// Deferred pass toggle; when off the output is the base color
    pub enabled: bool,

    /// Internal lighting resolution relative to output (0.1 - 1.0)
    pub resolution_multiplier: f32,

    /// Capacity of the light data and visible light buffers
    pub max_lights: u32,

    /// Tile edge in pixels
    pub tile_size: u32,

    /// Capacity of each tile's light list
    pub max_lights_per_tile: u32,

    /// Largest supported output size; bounds the tile count
    pub max_resolution: (u32, u32),

    /// Bound each tile by the depth range of its G-buffer pixels
    pub depth_bounds_culling: bool,

    /// Blur the low-resolution lighting texture before upsampling
    pub blur_lights: bool,

    /// Debug visualization selected at startup
    pub debug_mode: DebugMode,

    /// Light count mapped to the hottest heatmap color
    pub heatmap_max_lights: u32,

    /// Worker pool size (None = one per CPU)
    pub worker_threads: Option<usize>,
}

impl Default for DeferredLightsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution_multiplier: 0.5,
            max_lights: DEFAULT_MAX_LIGHTS,
            tile_size: DEFAULT_TILE_SIZE,
            max_lights_per_tile: DEFAULT_MAX_LIGHTS_PER_TILE,
            max_resolution: DEFAULT_MAX_RESOLUTION,
            depth_bounds_culling: true,
            blur_lights: false,
            debug_mode: DebugMode::None,
            heatmap_max_lights: 32,
            worker_threads: None,
        }
    }
}

impl DeferredLightsConfig {
    /// Full-resolution lighting
    pub fn high_quality() -> Self {
        Self {
            resolution_multiplier: 1.0,
            ..Default::default()
        }
    }

    /// Half-resolution lighting with a blur to hide upsampling
    pub fn performance() -> Self {
        Self {
            resolution_multiplier: 0.5,
            blur_lights: true,
            ..Default::default()
        }
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::ConfigParse(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigParse(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::ConfigParse(e.to_string()))
    }

    /// Check every value is inside its domain
    pub fn validate(&self) -> Result<()> {
        if !self.resolution_multiplier.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "resolution_multiplier must be finite, got {}",
                self.resolution_multiplier
            )));
        }
        if self.tile_size == 0 {
            return Err(PipelineError::InvalidConfig("tile_size must be non-zero".into()));
        }
        if self.max_lights == 0 {
            return Err(PipelineError::InvalidConfig("max_lights must be non-zero".into()));
        }
        if self.max_lights_per_tile == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_lights_per_tile must be non-zero".into(),
            ));
        }
        if self.max_resolution.0 == 0 || self.max_resolution.1 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_resolution must be non-zero, got {:?}",
                self.max_resolution
            )));
        }
        if self.max_lights > MAX_LIGHTS_LIMIT {
            return Err(PipelineError::InvalidConfig(format!(
                "max_lights {} exceeds limit {}",
                self.max_lights, MAX_LIGHTS_LIMIT
            )));
        }
        if self.max_lights_per_tile > MAX_LIGHTS_PER_TILE_LIMIT {
            return Err(PipelineError::InvalidConfig(format!(
                "max_lights_per_tile {} exceeds limit {}",
                self.max_lights_per_tile, MAX_LIGHTS_PER_TILE_LIMIT
            )));
        }
        let index_entries =
            (self.max_tiles() as u64).saturating_mul(self.max_lights_per_tile as u64);
        if index_entries > MAX_LIGHT_INDEX_ENTRIES {
            return Err(PipelineError::InvalidConfig(format!(
                "light index buffer of {} entries exceeds limit {}",
                index_entries, MAX_LIGHT_INDEX_ENTRIES
            )));
        }
        if self.heatmap_max_lights == 0 {
            return Err(PipelineError::InvalidConfig(
                "heatmap_max_lights must be non-zero".into(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(PipelineError::InvalidConfig("worker_threads must be non-zero".into()));
        }
        Ok(())
    }

    /// Resolution multiplier clamped to the supported range
    #[inline]
    pub fn effective_multiplier(&self) -> f32 {
        self.resolution_multiplier
            .clamp(MIN_RESOLUTION_MULTIPLIER, MAX_RESOLUTION_MULTIPLIER)
    }

    /// Internal lighting resolution for an output size
    pub fn internal_resolution(&self, width: u32, height: u32) -> (u32, u32) {
        let m = self.effective_multiplier();
        (
            ((width as f32 * m) as u32).max(1),
            ((height as f32 * m) as u32).max(1),
        )
    }

    /// Tile grid dimensions covering an internal resolution
    pub fn tile_grid(&self, internal_width: u32, internal_height: u32) -> (u32, u32) {
        (
            div_ceil(internal_width, self.tile_size),
            div_ceil(internal_height, self.tile_size),
        )
    }

    /// Tile count at the maximum supported resolution
    pub fn max_tiles(&self) -> usize {
        let (w, h) = self.max_resolution;
        (div_ceil(w, self.tile_size) as usize).saturating_mul(div_ceil(h, self.tile_size) as usize)
    }

    /// Check an output size against the supported maximum
    pub fn check_resolution(&self, width: u32, height: u32) -> Result<()> {
        let (max_width, max_height) = self.max_resolution;
        if width > max_width || height > max_height {
            return Err(PipelineError::ResolutionExceedsLimit {
                width,
                height,
                max_width,
                max_height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DeferredLightsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_lights, 4096);
        assert_eq!(config.max_tiles(), 160 * 90);
    }

    #[test]
    fn test_multiplier_is_clamped() {
        let mut config = DeferredLightsConfig::default();
        config.resolution_multiplier = 4.0;
        assert_eq!(config.internal_resolution(1920, 1080), (1920, 1080));

        config.resolution_multiplier = 0.0;
        assert_eq!(config.internal_resolution(1000, 500), (100, 50));
    }

    #[test]
    fn test_internal_resolution_never_zero() {
        let config = DeferredLightsConfig::default();
        assert_eq!(config.internal_resolution(1, 1), (1, 1));
    }

    #[test]
    fn test_tile_grid() {
        let config = DeferredLightsConfig::high_quality();
        let (w, h) = config.internal_resolution(1920, 1080);
        assert_eq!(config.tile_grid(w, h), (120, 68));

        let half = DeferredLightsConfig::default();
        let (w, h) = half.internal_resolution(1920, 1080);
        assert_eq!((w, h), (960, 540));
        assert_eq!(half.tile_grid(w, h), (60, 34));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = DeferredLightsConfig::default();
        config.tile_size = 0;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = DeferredLightsConfig::default();
        config.resolution_multiplier = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = DeferredLightsConfig::default();
        config.worker_threads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capacities_above_limits_rejected() {
        let mut config = DeferredLightsConfig::default();
        config.max_lights = u32::MAX;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = DeferredLightsConfig::default();
        config.max_lights_per_tile = u32::MAX;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = DeferredLightsConfig::default();
        config.max_lights = MAX_LIGHTS_LIMIT;
        config.max_lights_per_tile = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_index_buffer_size_bounded() {
        let mut config = DeferredLightsConfig::default();
        config.tile_size = 1;
        config.max_resolution = (u32::MAX, u32::MAX);
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        // 2560x1440 tiles of one pixel at 256 lights each
        let mut config = DeferredLightsConfig::default();
        config.tile_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolution_limit() {
        let config = DeferredLightsConfig::default();
        assert!(config.check_resolution(2560, 1440).is_ok());
        assert!(matches!(
            config.check_resolution(3840, 2160),
            Err(PipelineError::ResolutionExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let text = r#"
            resolution_multiplier = 0.75
            tile_size = 32
            max_resolution = [1920, 1080]
            debug_mode = "tile_heatmap"
        "#;
        let config = DeferredLightsConfig::from_toml_str(text).unwrap();
        assert_eq!(config.tile_size, 32);
        assert_eq!(config.max_resolution, (1920, 1080));
        assert_eq!(config.debug_mode, DebugMode::TileHeatmap);
        assert_eq!(config.max_lights, DEFAULT_MAX_LIGHTS);

        let back = DeferredLightsConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_toml_parse_error() {
        assert!(matches!(
            DeferredLightsConfig::from_toml_str("tile_size = \"big\""),
            Err(PipelineError::ConfigParse(_))
        ));
    }
}
