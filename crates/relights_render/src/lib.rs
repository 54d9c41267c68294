//! # relights_render - Tiled Deferred Lighting
//!
//! CPU tiled deferred lighting for scenes with many point lights:
//! - Explicit light registration into a flat array
//! - Parallel frustum culling into a bounded visible list
//! - Cached per-tile view-space frustums
//! - Per-tile light lists built with atomic append
//! - Deferred shading at a reduced internal resolution
//! - Magic-kernel upsampling onto the base color
//! - Debug visualizations (G-buffer channels, tile heatmap)
//!
//! ## Architecture
//!
//! Every frame runs a fixed sequence of stages, each reading the buffers
//! the previous stage produced:
//!
//! 1. **Upload**: [`LightRegistry`] -> [`LightDataBuffer`]
//! 2. **Cull**: [`FrustumCuller`] builds the visible list
//! 3. **Bin**: [`TileFrustumBuilder`] + [`TileLightBinner`] build tile lists
//! 4. **Shade**: [`DeferredShader`] accumulates lighting per pixel
//! 5. **Composite**: upsample and add onto the base color
//!
//! [`DeferredLightsPipeline`] owns the buffers and enforces stage order.
//!
//! ## Example
//!
//! ```ignore
//! use relights_render::prelude::*;
//!
//! let mut registry = LightRegistry::new();
//! let lamp = registry.add(PointLight::new(Vec3::new(0.0, 2.0, 0.0), 8.0));
//!
//! let mut pipeline = DeferredLightsPipeline::new(DeferredLightsConfig::default());
//! let outcome = pipeline.render_frame(&registry, &FrameInput {
//!     camera: &camera,
//!     gbuffer: &gbuffer,
//!     base_color: &albedo,
//! });
//!
//! if let Some(err) = outcome.error {
//!     log::warn!("lighting skipped: {}", err);
//! }
//! registry.remove(lamp);
//! ```

pub mod binning;
pub mod buffers;
pub mod config;
pub mod cull;
pub mod debug;
pub mod error;
pub mod light;
pub mod pipeline;
pub mod registry;
pub mod resample;
pub mod shading;
pub mod stats;
pub mod texture;
pub mod tiles;

pub use binning::{BinningResult, TileLightBinner};
pub use buffers::{AppendBuffer, LightDataBuffer, TileData, UploadResult};
pub use config::{
    DeferredLightsConfig, MAX_LIGHTS_LIMIT, MAX_LIGHTS_PER_TILE_LIMIT, MAX_LIGHT_INDEX_ENTRIES,
};
pub use cull::{CullResult, FrustumCuller};
pub use debug::{DebugMode, DebugState, SharedDebugState};
pub use error::{PipelineError, Result};
pub use light::{GpuLight, PointLight};
pub use pipeline::{DeferredLightsPipeline, FrameInput, FrameOutcome, PipelineStage};
pub use registry::{LightId, LightRegistry};
pub use shading::{DeferredShader, LightingModel, SimpleBrdf, SurfaceData};
pub use stats::{FrameStats, StageTimings, StatsCollector};
pub use texture::{GBuffer, NamedTexture, Texture2D};
pub use tiles::{DepthBounds, TileFrustumBuilder, TileGrid};

pub mod prelude {
    pub use crate::config::DeferredLightsConfig;
    pub use crate::debug::DebugMode;
    pub use crate::error::{PipelineError, Result};
    pub use crate::light::PointLight;
    pub use crate::pipeline::{DeferredLightsPipeline, FrameInput, FrameOutcome, PipelineStage};
    pub use crate::registry::{LightId, LightRegistry};
    pub use crate::stats::FrameStats;
    pub use crate::texture::{GBuffer, NamedTexture, Texture2D};
    pub use relights_math::{Camera, Vec3, Vec4};
}
