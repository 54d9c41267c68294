//! Boot Configuration
//!
//! Everything the demo host needs before the first frame: pipeline
//! settings, the synthetic scene, and where to write the result.
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `RELIGHTS_LIGHTS`, `RELIGHTS_FRAMES`,
//!    `RELIGHTS_DEBUG_MODE`, `RELIGHTS_OUTPUT`
//! 2. Config file named by `RELIGHTS_CONFIG`
//! 3. Config file `relights.toml` in the working directory
//! 4. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! [pipeline]
//! resolution_multiplier = 0.5
//! max_lights = 4096
//! tile_size = 16
//! debug_mode = "none"   # none, normals, depth, positions, albedo, specular, tile_heatmap
//!
//! [scene]
//! resolution = [1280, 720]
//! lights = 512
//! frames = 60
//! seed = 7
//!
//! [output]
//! path = "relights.png"
//! heatmap_path = "relights_heatmap.png"
//! ```

use std::path::{Path, PathBuf};

use relights_render::{DebugMode, DeferredLightsConfig};
use serde::{Deserialize, Serialize};

/// Synthetic scene settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Output resolution (width, height)
    pub resolution: (u32, u32),
    /// Number of point lights scattered over the floor
    pub lights: u32,
    /// Frames to render
    pub frames: u32,
    /// Seed for light placement
    pub seed: u64,
    /// Light range interval
    pub light_range: (f32, f32),
    /// Orbit lights around the scene center between frames
    pub animate: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            resolution: (1280, 720),
            lights: 512,
            frames: 60,
            seed: 7,
            light_range: (2.0, 8.0),
            animate: true,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// PNG path for the last frame's composited output
    pub path: Option<PathBuf>,
    /// PNG path for the last frame's tile heatmap
    pub heatmap_path: Option<PathBuf>,
    /// Log statistics every N frames (0 = only at the end)
    pub stats_interval: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("relights.png")),
            heatmap_path: None,
            stats_interval: 10,
        }
    }
}

/// Complete boot configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Deferred lighting pipeline settings
    pub pipeline: DeferredLightsConfig,
    /// Demo scene settings
    pub scene: SceneConfig,
    /// Output settings
    pub output: OutputConfig,
    /// File the configuration was read from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl BootConfig {
    /// Load boot configuration from all sources
    pub fn load() -> Self {
        let mut config = Self::default();

        // 1. Config file
        let candidates = std::env::var_os("RELIGHTS_CONFIG")
            .map(PathBuf::from)
            .into_iter()
            .chain(std::iter::once(PathBuf::from("relights.toml")));
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(loaded) => {
                    config = loaded;
                    config.config_path = Some(path.clone());
                    log::info!("Loaded boot config from {}", path.display());
                    break;
                }
                Err(e) => log::warn!("Ignoring {}: {}", path.display(), e),
            }
        }

        // 2. Environment overrides
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Parse a TOML config file
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(lights) = var("RELIGHTS_LIGHTS").and_then(|v| v.parse().ok()) {
            self.scene.lights = lights;
            log::info!("Light count from env: {}", lights);
        }

        if let Some(frames) = var("RELIGHTS_FRAMES").and_then(|v| v.parse().ok()) {
            self.scene.frames = frames;
        }

        if let Some(mode) = var("RELIGHTS_DEBUG_MODE") {
            match DebugMode::parse(&mode) {
                Some(mode) => {
                    self.pipeline.debug_mode = mode;
                    log::info!("Debug mode from env: {}", mode.name());
                }
                None => log::warn!("Unknown debug mode '{}'", mode),
            }
        }

        if let Some(path) = var("RELIGHTS_OUTPUT") {
            self.output.path = if path.is_empty() { None } else { Some(PathBuf::from(path)) };
        }
    }

    /// Log the effective configuration
    pub fn print_summary(&self) {
        let (width, height) = self.scene.resolution;
        let (iw, ih) = self.pipeline.internal_resolution(width, height);
        log::info!("Boot Configuration:");
        log::info!("  Output: {}x{} (lighting {}x{})", width, height, iw, ih);
        log::info!(
            "  Lights: {} (capacity {}, {} per tile)",
            self.scene.lights,
            self.pipeline.max_lights,
            self.pipeline.max_lights_per_tile
        );
        log::info!("  Frames: {}, seed {}", self.scene.frames, self.scene.seed);
        log::info!("  Debug: {}", self.pipeline.debug_mode.name());
        if let Some(path) = &self.config_path {
            log::info!("  Config: {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BootConfig::default();
        assert_eq!(config.scene.resolution, (1280, 720));
        assert!(config.pipeline.enabled);
        assert_eq!(config.output.path, Some(PathBuf::from("relights.png")));
    }

    #[test]
    fn test_parse_sections() {
        let config = BootConfig::from_toml_str(
            r#"
            [pipeline]
            tile_size = 32
            debug_mode = "tile_heatmap"

            [scene]
            resolution = [640, 360]
            lights = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.tile_size, 32);
        assert_eq!(config.pipeline.debug_mode, DebugMode::TileHeatmap);
        assert_eq!(config.pipeline.max_lights, DeferredLightsConfig::default().max_lights);
        assert_eq!(config.scene.resolution, (640, 360));
        assert_eq!(config.scene.lights, 64);
        assert_eq!(config.scene.frames, SceneConfig::default().frames);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RELIGHTS_LIGHTS", "99"),
            ("RELIGHTS_FRAMES", "3"),
            ("RELIGHTS_DEBUG_MODE", "2"),
            ("RELIGHTS_OUTPUT", ""),
        ]
        .into_iter()
        .collect();

        let mut config = BootConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.scene.lights, 99);
        assert_eq!(config.scene.frames, 3);
        assert_eq!(config.pipeline.debug_mode, DebugMode::Depth);
        assert_eq!(config.output.path, None);
    }

    #[test]
    fn test_bad_env_values_ignored() {
        let mut config = BootConfig::default();
        config.apply_env(|key| match key {
            "RELIGHTS_LIGHTS" => Some("many".to_string()),
            "RELIGHTS_DEBUG_MODE" => Some("wireframe".to_string()),
            _ => None,
        });
        assert_eq!(config.scene.lights, SceneConfig::default().lights);
        assert_eq!(config.pipeline.debug_mode, DebugMode::None);
    }
}
