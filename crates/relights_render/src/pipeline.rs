//! Deferred Lights Pipeline
//!
//! Sequences the per-frame stages in a fixed order and owns every buffer
//! they share:
//!
//! ```text
//! Idle -> LightsRegistered -> Culled -> TilesBinned -> Shaded -> Composited -> Idle
//!         (upload_lights)     (cull)    (bin_tiles)    (shade)   (composite)   (end_frame)
//! ```
//!
//! Each stage checks the frame state machine and fails with
//! [`PipelineError::StageOrder`] when called out of turn. Stage boundaries
//! are the synchronization points: a stage's parallel work has fully
//! completed before the next stage reads its buffers.
//!
//! [`DeferredLightsPipeline::render_frame`] runs the whole table inside the
//! pipeline's worker pool and never fails the caller's frame. On any error
//! the frame is abandoned and the base color is passed through.
//!
//! # Example
//!
//! ```ignore
//! let mut pipeline = DeferredLightsPipeline::new(DeferredLightsConfig::default());
//! let outcome = pipeline.render_frame(&registry, &FrameInput {
//!     camera: &camera,
//!     gbuffer: &gbuffer,
//!     base_color: &albedo,
//! });
//! let image = pipeline.output();
//! ```

use std::sync::Arc;
use std::time::Instant;

use relights_math::{Camera, TileFrustum, Vec3};
use serde::{Deserialize, Serialize};

use crate::binning::{BinningResult, TileLightBinner};
use crate::buffers::{LightDataBuffer, TileData, UploadResult};
use crate::config::DeferredLightsConfig;
use crate::cull::{CullResult, FrustumCuller};
use crate::debug::{render_heatmap, visualize, DebugSources, DebugState, SharedDebugState};
use crate::error::{PipelineError, Result};
use crate::light::GpuLight;
use crate::registry::LightRegistry;
use crate::shading::{DeferredShader, LightingModel, ShadeInputs, ShadeResult, SimpleBrdf};
use crate::stats::FrameStats;
use crate::texture::{GBuffer, NamedTexture, Texture2D};
use crate::tiles::{compute_depth_bounds, DepthBounds, TileFrustumBuilder, TileGrid};

/// Frame state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Between frames
    #[default]
    Idle,
    /// Lights uploaded for this frame
    LightsRegistered,
    /// Visible list built
    Culled,
    /// Tile lists built
    TilesBinned,
    /// Lighting accumulated
    Shaded,
    /// Output written
    Composited,
}

impl PipelineStage {
    /// Stage that follows this one
    pub fn next(self) -> Self {
        match self {
            PipelineStage::Idle => PipelineStage::LightsRegistered,
            PipelineStage::LightsRegistered => PipelineStage::Culled,
            PipelineStage::Culled => PipelineStage::TilesBinned,
            PipelineStage::TilesBinned => PipelineStage::Shaded,
            PipelineStage::Shaded => PipelineStage::Composited,
            PipelineStage::Composited => PipelineStage::Idle,
        }
    }
}

/// Per-frame inputs from the host
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
    /// Camera the G-buffer was rendered from
    pub camera: &'a Camera,
    /// G-buffer at the internal lighting resolution
    pub gbuffer: &'a GBuffer,
    /// Full-resolution color the lighting is added onto
    pub base_color: &'a Texture2D<Vec3>,
}

/// Result of [`DeferredLightsPipeline::render_frame`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    /// Statistics for the frame
    pub stats: FrameStats,
    /// Error that stopped the frame, if any
    pub error: Option<PipelineError>,
    /// Output is the unmodified base color
    pub passthrough: bool,
}

type StageFn = fn(&mut DeferredLightsPipeline, &LightRegistry, &FrameInput<'_>) -> Result<()>;

fn stage_upload(
    p: &mut DeferredLightsPipeline,
    registry: &LightRegistry,
    _: &FrameInput<'_>,
) -> Result<()> {
    p.upload_lights(registry).map(drop)
}

fn stage_cull(
    p: &mut DeferredLightsPipeline,
    _: &LightRegistry,
    input: &FrameInput<'_>,
) -> Result<()> {
    p.cull(input.camera).map(drop)
}

fn stage_bin(
    p: &mut DeferredLightsPipeline,
    _: &LightRegistry,
    input: &FrameInput<'_>,
) -> Result<()> {
    p.bin_tiles(input).map(drop)
}

fn stage_shade(
    p: &mut DeferredLightsPipeline,
    _: &LightRegistry,
    input: &FrameInput<'_>,
) -> Result<()> {
    p.shade(input).map(drop)
}

fn stage_composite(
    p: &mut DeferredLightsPipeline,
    _: &LightRegistry,
    input: &FrameInput<'_>,
) -> Result<()> {
    p.composite(input)
}

fn stage_end(p: &mut DeferredLightsPipeline, _: &LightRegistry, _: &FrameInput<'_>) -> Result<()> {
    p.end_frame().map(drop)
}

/// Fixed stage table, run in order after `begin_frame`
const STAGES: [(PipelineStage, StageFn); 6] = [
    (PipelineStage::LightsRegistered, stage_upload),
    (PipelineStage::Culled, stage_cull),
    (PipelineStage::TilesBinned, stage_bin),
    (PipelineStage::Shaded, stage_shade),
    (PipelineStage::Composited, stage_composite),
    (PipelineStage::Idle, stage_end),
];

/// Warning conditions logged once per transition into them
#[derive(Debug, Default)]
struct ConditionLog {
    upload_truncated: bool,
    cull_truncated: bool,
    tile_overflow: bool,
    frame_error: Option<String>,
}

fn warn_on_transition(active: &mut bool, now: bool, message: impl FnOnce() -> String) {
    if now && !*active {
        log::warn!("{}", message());
    }
    *active = now;
}

/// Tiled deferred lighting pipeline
pub struct DeferredLightsPipeline {
    config: DeferredLightsConfig,
    pool: Option<Arc<rayon::ThreadPool>>,
    init_error: Option<PipelineError>,

    stage: PipelineStage,
    frame_open: bool,
    frame: u64,
    grid: TileGrid,

    light_data: LightDataBuffer,
    culler: FrustumCuller,
    tile_builder: TileFrustumBuilder,
    depth_bounds: Vec<DepthBounds>,
    binner: TileLightBinner,
    shader: Option<DeferredShader>,

    output: Texture2D<Vec3>,
    heatmap: Texture2D<Vec3>,
    debug: SharedDebugState,
    stats: FrameStats,
    conditions: ConditionLog,
}

impl DeferredLightsPipeline {
    /// Create with the default lighting model
    pub fn new(config: DeferredLightsConfig) -> Self {
        Self::with_lighting_model(config, Some(Arc::new(SimpleBrdf)))
    }

    /// Create with a custom lighting model
    ///
    /// A missing model or invalid configuration disables the pipeline for
    /// the session; every frame then passes the base color through.
    pub fn with_lighting_model(
        config: DeferredLightsConfig,
        model: Option<Arc<dyn LightingModel>>,
    ) -> Self {
        let debug = SharedDebugState::new(DebugState {
            mode: config.debug_mode,
            heatmap_max_lights: config.heatmap_max_lights.max(1),
        });

        // Buffers are sized only from a configuration that passed validation
        let validated = config.validate();
        let capacity = match validated {
            Ok(()) => config.max_lights as usize,
            Err(_) => 0,
        };

        let mut pipeline = Self {
            light_data: LightDataBuffer::new(capacity),
            culler: FrustumCuller::new(capacity),
            tile_builder: TileFrustumBuilder::new(config.max_resolution),
            depth_bounds: Vec::new(),
            binner: TileLightBinner::new(config.max_lights_per_tile),
            shader: None,
            pool: None,
            init_error: None,
            stage: PipelineStage::Idle,
            frame_open: false,
            frame: 0,
            grid: TileGrid::default(),
            output: Texture2D::default(),
            heatmap: Texture2D::default(),
            debug,
            stats: FrameStats::default(),
            conditions: ConditionLog::default(),
            config,
        };

        if let Err(err) = validated.and_then(|()| pipeline.init(model)) {
            log::error!("Deferred lighting disabled for this session: {}", err);
            pipeline.init_error = Some(err);
        }
        pipeline
    }

    fn init(&mut self, model: Option<Arc<dyn LightingModel>>) -> Result<()> {
        let model = model.ok_or_else(|| PipelineError::MissingResource("lighting model".into()))?;
        self.pool = Some(build_pool(self.config.worker_threads)?);

        log::info!(
            "Deferred lighting ready: {} model, {} lights, {}px tiles, {}/tile, x{:.2} resolution",
            model.name(),
            self.config.max_lights,
            self.config.tile_size,
            self.config.max_lights_per_tile,
            self.config.effective_multiplier()
        );
        self.shader = Some(DeferredShader::new(model));
        Ok(())
    }

    // === Frame driver ===

    /// Run every stage for one frame
    ///
    /// Never fails the frame: on error the output is the base color and
    /// the error is returned in the outcome.
    pub fn render_frame(
        &mut self,
        registry: &LightRegistry,
        input: &FrameInput<'_>,
    ) -> FrameOutcome {
        if let Some(err) = &self.init_error {
            let error = Some(err.clone());
            self.passthrough(input.base_color);
            return FrameOutcome {
                stats: FrameStats::default(),
                error,
                passthrough: true,
            };
        }

        if !self.config.enabled {
            self.abandon_frame();
            self.passthrough(input.base_color);
            return FrameOutcome {
                passthrough: true,
                ..Default::default()
            };
        }

        let result = match self.pool.clone() {
            Some(pool) => pool.install(|| self.run_stages(registry, input)),
            None => self.run_stages(registry, input),
        };

        match result {
            Ok(stats) => {
                self.conditions.frame_error = None;
                FrameOutcome {
                    stats,
                    error: None,
                    passthrough: false,
                }
            }
            Err(err) => {
                let message = err.to_string();
                if self.conditions.frame_error.as_deref() != Some(message.as_str()) {
                    log::warn!("Frame {} fell back to pass-through: {}", self.frame, message);
                    self.conditions.frame_error = Some(message);
                }
                self.abandon_frame();
                self.passthrough(input.base_color);
                FrameOutcome {
                    stats: self.stats.clone(),
                    error: Some(err),
                    passthrough: true,
                }
            }
        }
    }

    fn run_stages(
        &mut self,
        registry: &LightRegistry,
        input: &FrameInput<'_>,
    ) -> Result<FrameStats> {
        if self.frame_open {
            self.abandon_frame();
        }
        self.begin_frame(input)?;
        for (stage, run) in STAGES {
            run(self, registry, input)?;
            debug_assert_eq!(self.stage, stage);
        }
        Ok(self.stats.clone())
    }

    fn passthrough(&mut self, base: &Texture2D<Vec3>) {
        let (width, height) = base.dimensions();
        self.output.resize(width, height, Vec3::ZERO);
        self.output.data_mut().copy_from_slice(base.data());
    }

    // === Stages ===

    /// Validate frame inputs and open a frame
    pub fn begin_frame(&mut self, input: &FrameInput<'_>) -> Result<()> {
        self.ensure_enabled()?;
        if self.frame_open || self.stage != PipelineStage::Idle {
            return Err(PipelineError::StageOrder {
                expected: PipelineStage::Idle,
                found: self.stage,
            });
        }

        let (width, height) = input.base_color.dimensions();
        self.config.check_resolution(width, height)?;
        let internal = self.config.internal_resolution(width, height);
        input.gbuffer.validate(internal)?;

        let grid = TileGrid::new(internal.0, internal.1, self.config.tile_size);
        if grid != self.grid {
            log::debug!(
                "Tile grid {}x{} -> {}x{}",
                self.grid.tiles_x,
                self.grid.tiles_y,
                grid.tiles_x,
                grid.tiles_y
            );
        }
        self.grid = grid;
        self.frame += 1;
        self.frame_open = true;
        self.stats = FrameStats {
            frame: self.frame,
            grid: (grid.tiles_x, grid.tiles_y),
            internal_resolution: internal,
            ..Default::default()
        };
        Ok(())
    }

    /// Upload enabled registry lights
    pub fn upload_lights(&mut self, registry: &LightRegistry) -> Result<UploadResult> {
        self.enter(PipelineStage::Idle)?;
        let start = Instant::now();

        let result = self.light_data.upload(registry);
        warn_on_transition(&mut self.conditions.upload_truncated, result.truncated > 0, || {
            format!(
                "Light capacity {} exceeded: {} lights dropped",
                self.light_data.capacity(),
                result.truncated
            )
        });

        self.stats.registered_lights = registry.len() as u32;
        self.stats.uploaded_lights = result.uploaded;
        self.stats.upload_truncated = result.truncated;
        self.stats.timings.upload_ms = elapsed_ms(start);
        self.advance();
        Ok(result)
    }

    /// Cull uploaded lights against the camera frustum
    pub fn cull(&mut self, camera: &Camera) -> Result<CullResult> {
        self.enter(PipelineStage::LightsRegistered)?;
        let start = Instant::now();

        let result = self.culler.cull(&camera.frustum(), self.light_data.lights());
        warn_on_transition(&mut self.conditions.cull_truncated, result.truncated(), || {
            format!("Visible light list full: {} lights dropped", result.dropped)
        });

        self.stats.visible_lights = result.visible;
        self.stats.cull_truncated = result.dropped;
        self.stats.timings.cull_ms = elapsed_ms(start);
        log::trace!("Frame {}: {} of {} lights visible", self.frame, result.visible, result.tested);
        self.advance();
        Ok(result)
    }

    /// Refresh tile frustums and bin visible lights into tiles
    pub fn bin_tiles(&mut self, input: &FrameInput<'_>) -> Result<BinningResult> {
        self.enter(PipelineStage::Culled)?;
        let camera = input.camera;

        let start = Instant::now();
        let rebuilt = self.tile_builder.build(&camera.projection(), self.grid)?;
        self.stats.frustums_rebuilt = rebuilt;
        self.stats.timings.tiles_ms = elapsed_ms(start);

        let start = Instant::now();
        let bounds = if self.config.depth_bounds_culling {
            compute_depth_bounds(input.gbuffer, &self.grid, camera.far, &mut self.depth_bounds);
            Some(self.depth_bounds.as_slice())
        } else {
            None
        };

        let result = self.binner.bin(
            self.tile_builder.frustums(),
            bounds,
            self.culler.visible_lights(),
            &camera.view(),
        );
        warn_on_transition(&mut self.conditions.tile_overflow, result.overflowed(), || {
            format!(
                "Tile light capacity {} exceeded in {} tiles: {} assignments dropped",
                self.config.max_lights_per_tile,
                result.overflowed_tiles,
                result.dropped
            )
        });

        self.stats.index_entries = result.entries;
        self.stats.overflowed_tiles = result.overflowed_tiles;
        self.stats.dropped_assignments = result.dropped;
        self.stats.tiles_with_lights = result.tiles_with_lights;
        self.stats.max_tile_lights = result.max_tile_lights;
        self.stats.timings.bin_ms = elapsed_ms(start);
        self.advance();
        Ok(result)
    }

    /// Accumulate lighting over the G-buffer
    pub fn shade(&mut self, input: &FrameInput<'_>) -> Result<ShadeResult> {
        self.enter(PipelineStage::TilesBinned)?;
        let start = Instant::now();

        let shader = self.shader.as_mut().ok_or(PipelineError::Disabled)?;
        let result = shader.shade(
            ShadeInputs {
                gbuffer: input.gbuffer,
                grid: &self.grid,
                tile_data: self.binner.tile_data(),
                light_indices: self.binner.light_indices(),
                visible_lights: self.culler.visible_lights(),
                camera_position: input.camera.position,
                far: input.camera.far,
            },
            self.config.blur_lights,
        );

        self.stats.light_evaluations = result.light_evaluations;
        self.stats.timings.shade_ms = elapsed_ms(start);
        self.advance();
        Ok(result)
    }

    /// Upsample lighting onto the base color and apply the debug view
    pub fn composite(&mut self, input: &FrameInput<'_>) -> Result<()> {
        self.enter(PipelineStage::Shaded)?;
        let start = Instant::now();

        let shader = self.shader.as_mut().ok_or(PipelineError::Disabled)?;
        shader.composite(input.base_color, &mut self.output);

        let debug = self.debug.get();
        render_heatmap(
            &self.grid,
            self.binner.tile_data(),
            debug.heatmap_max_lights,
            &mut self.heatmap,
        );
        visualize(
            debug.mode,
            &DebugSources {
                gbuffer: input.gbuffer,
                grid: &self.grid,
                tile_data: self.binner.tile_data(),
                far: input.camera.far,
                heatmap_max_lights: debug.heatmap_max_lights,
            },
            &mut self.output,
        );

        self.stats.timings.composite_ms = elapsed_ms(start);
        self.advance();
        Ok(())
    }

    /// Close the frame and return its statistics
    pub fn end_frame(&mut self) -> Result<FrameStats> {
        self.enter(PipelineStage::Composited)?;
        self.advance();
        self.frame_open = false;
        log::debug!(
            "Frame {}: {} visible, {} entries, {} lit tiles, {:.2} ms",
            self.stats.frame,
            self.stats.visible_lights,
            self.stats.index_entries,
            self.stats.tiles_with_lights,
            self.stats.timings.total_ms()
        );
        Ok(self.stats.clone())
    }

    /// Drop the current frame between stages
    pub fn abandon_frame(&mut self) {
        if self.frame_open || self.stage != PipelineStage::Idle {
            log::debug!("Frame {} abandoned in {:?}", self.frame, self.stage);
        }
        self.stage = PipelineStage::Idle;
        self.frame_open = false;
    }

    fn ensure_enabled(&self) -> Result<()> {
        match &self.init_error {
            Some(_) => Err(PipelineError::Disabled),
            None => Ok(()),
        }
    }

    fn enter(&self, expected: PipelineStage) -> Result<()> {
        self.ensure_enabled()?;
        if !self.frame_open {
            return Err(PipelineError::FrameNotStarted);
        }
        if self.stage != expected {
            return Err(PipelineError::StageOrder {
                expected,
                found: self.stage,
            });
        }
        Ok(())
    }

    #[inline]
    fn advance(&mut self) {
        self.stage = self.stage.next();
    }

    // === Configuration ===

    /// Current configuration
    #[inline]
    pub fn config(&self) -> &DeferredLightsConfig {
        &self.config
    }

    /// Replace the configuration between frames
    ///
    /// Capacities are updated in place and the tile frustums rebuilt on
    /// the next frame. An invalid configuration is rejected and the
    /// current one kept.
    pub fn set_config(&mut self, config: DeferredLightsConfig) -> Result<()> {
        self.ensure_enabled()?;
        config.validate()?;

        if config.worker_threads != self.config.worker_threads {
            self.pool = Some(build_pool(config.worker_threads)?);
        }
        if config.debug_mode != self.config.debug_mode {
            self.debug.set_mode(config.debug_mode);
        }
        self.debug.set_heatmap_max_lights(config.heatmap_max_lights);

        self.light_data.set_capacity(config.max_lights as usize);
        self.culler.set_capacity(config.max_lights as usize);
        self.binner.set_max_lights_per_tile(config.max_lights_per_tile);
        self.tile_builder.set_max_resolution(config.max_resolution);
        self.tile_builder.mark_dirty();

        self.abandon_frame();
        self.config = config;
        Ok(())
    }

    /// Error that disabled the pipeline at startup
    #[inline]
    pub fn init_error(&self) -> Option<&PipelineError> {
        self.init_error.as_ref()
    }

    /// Check the pipeline initialized and the deferred pass is on
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.init_error.is_none() && self.config.enabled
    }

    // === Accessors ===

    /// Current frame state
    #[inline]
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Frames begun this session
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Grid of the current or last frame
    #[inline]
    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    /// Statistics of the current or last frame
    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Uploaded light buffer
    #[inline]
    pub fn light_data(&self) -> &LightDataBuffer {
        &self.light_data
    }

    /// Visible light list
    #[inline]
    pub fn visible_lights(&self) -> &[GpuLight] {
        self.culler.visible_lights()
    }

    /// Per-tile `(offset, count)`
    #[inline]
    pub fn tile_data(&self) -> &[TileData] {
        self.binner.tile_data()
    }

    /// Visible-list indices of the lights binned into one tile
    #[inline]
    pub fn tile_light_indices(&self, tile: usize) -> &[u32] {
        self.binner.tile_lights(tile)
    }

    /// Cached view-space tile frustums
    #[inline]
    pub fn tile_frustums(&self) -> &[TileFrustum] {
        self.tile_builder.frustums()
    }

    /// Tile frustum rebuilds this session
    #[inline]
    pub fn frustum_rebuilds(&self) -> u64 {
        self.tile_builder.rebuild_count()
    }

    /// Named intermediate texture
    pub fn texture(&self, name: NamedTexture) -> Option<&Texture2D<Vec3>> {
        match name {
            NamedTexture::Lights => self.shader.as_ref().map(DeferredShader::lights),
            NamedTexture::Output => Some(&self.output),
            NamedTexture::TileHeatmap => Some(&self.heatmap),
        }
    }

    /// Final composited color
    #[inline]
    pub fn output(&self) -> &Texture2D<Vec3> {
        &self.output
    }

    /// Shared debug state handle
    pub fn debug_state(&self) -> SharedDebugState {
        self.debug.clone()
    }
}

impl std::fmt::Debug for DeferredLightsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredLightsPipeline")
            .field("stage", &self.stage)
            .field("frame", &self.frame)
            .field("grid", &self.grid)
            .field("init_error", &self.init_error)
            .finish()
    }
}

fn build_pool(threads: Option<usize>) -> Result<Arc<rayon::ThreadPool>> {
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(|i| format!("relights-worker-{}", i));
    if let Some(threads) = threads {
        builder = builder.num_threads(threads);
    }
    builder
        .build()
        .map(Arc::new)
        .map_err(|e| PipelineError::MissingResource(format!("worker pool: {}", e)))
}

#[inline]
fn elapsed_ms(start: Instant) -> f32 {
    start.elapsed().as_secs_f32() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::PointLight;
    use relights_math::Vec4;

    fn config() -> DeferredLightsConfig {
        DeferredLightsConfig {
            resolution_multiplier: 1.0,
            worker_threads: Some(2),
            ..Default::default()
        }
    }

    fn scene(width: u32, height: u32) -> (Camera, GBuffer, Texture2D<Vec3>) {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), 60f32.to_radians(), 1.0, 0.1, 100.0)
            .with_aspect_from_size(width, height);
        let mut gbuffer = GBuffer::new(width, height);
        gbuffer.albedo.clear(Vec3::splat(0.5));
        gbuffer.specular_roughness.clear(Vec4::new(0.04, 0.04, 0.04, 0.5));
        gbuffer.normal_depth.clear(Vec4::new(0.0, 0.0, 1.0, 10.0));
        gbuffer.world_position = Texture2D::from_fn(width, height, |x, y| {
            let pixel = relights_math::Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let ray = camera.world_ray(pixel, width, height);
            camera.position + ray * (10.0 / -ray.z)
        });
        let base = gbuffer.albedo.clone();
        (camera, gbuffer, base)
    }

    #[test]
    fn test_stage_sequence() {
        let mut pipeline = DeferredLightsPipeline::new(config());
        let (camera, gbuffer, base) = scene(64, 32);
        let input = FrameInput {
            camera: &camera,
            gbuffer: &gbuffer,
            base_color: &base,
        };
        let mut registry = LightRegistry::new();
        registry.add(PointLight::new(Vec3::new(0.0, 0.0, 1.0), 5.0));

        pipeline.begin_frame(&input).unwrap();
        assert_eq!(pipeline.upload_lights(&registry).unwrap().uploaded, 1);
        assert_eq!(pipeline.stage(), PipelineStage::LightsRegistered);
        assert_eq!(pipeline.cull(&camera).unwrap().visible, 1);
        assert!(pipeline.bin_tiles(&input).unwrap().entries > 0);
        pipeline.shade(&input).unwrap();
        pipeline.composite(&input).unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Composited);
        let stats = pipeline.end_frame().unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Idle);
        assert_eq!(stats.visible_lights, 1);
        assert!(stats.frustums_rebuilt);
    }

    #[test]
    fn test_out_of_order_stage_rejected() {
        let mut pipeline = DeferredLightsPipeline::new(config());
        let (camera, gbuffer, base) = scene(32, 32);
        let input = FrameInput {
            camera: &camera,
            gbuffer: &gbuffer,
            base_color: &base,
        };

        assert_eq!(pipeline.cull(&camera).unwrap_err(), PipelineError::FrameNotStarted);

        pipeline.begin_frame(&input).unwrap();
        assert_eq!(
            pipeline.shade(&input).unwrap_err(),
            PipelineError::StageOrder {
                expected: PipelineStage::TilesBinned,
                found: PipelineStage::Idle,
            }
        );

        pipeline.abandon_frame();
        assert_eq!(pipeline.stage(), PipelineStage::Idle);
        assert!(pipeline.begin_frame(&input).is_ok());
    }

    #[test]
    fn test_render_frame_lights_output() {
        let mut pipeline = DeferredLightsPipeline::new(config());
        let (camera, gbuffer, base) = scene(64, 64);
        let mut registry = LightRegistry::new();
        registry.add(PointLight::new(Vec3::new(0.0, 0.0, 1.0), 5.0).with_intensity(4.0));

        let outcome = pipeline.render_frame(
            &registry,
            &FrameInput {
                camera: &camera,
                gbuffer: &gbuffer,
                base_color: &base,
            },
        );

        assert!(outcome.error.is_none());
        assert!(!outcome.passthrough);
        let center = pipeline.output().get(32, 32).unwrap();
        assert!(center.x > base.get(32, 32).unwrap().x);
        assert!(pipeline.texture(NamedTexture::TileHeatmap).unwrap().width() == 4);
    }

    #[test]
    fn test_gbuffer_mismatch_passes_through() {
        let mut pipeline = DeferredLightsPipeline::new(DeferredLightsConfig {
            resolution_multiplier: 0.5,
            ..config()
        });
        let (camera, gbuffer, base) = scene(64, 64);

        let outcome = pipeline.render_frame(
            &LightRegistry::new(),
            &FrameInput {
                camera: &camera,
                gbuffer: &gbuffer,
                base_color: &base,
            },
        );

        assert!(outcome.passthrough);
        assert_eq!(
            outcome.error,
            Some(PipelineError::GBufferSizeMismatch {
                expected: (32, 32),
                found: (64, 64),
            })
        );
        assert_eq!(pipeline.output(), &base);
        assert_eq!(pipeline.stage(), PipelineStage::Idle);
    }

    #[test]
    fn test_invalid_config_disables_session() {
        let mut pipeline = DeferredLightsPipeline::new(DeferredLightsConfig {
            tile_size: 0,
            ..config()
        });
        assert!(matches!(pipeline.init_error(), Some(PipelineError::InvalidConfig(_))));
        assert!(!pipeline.is_enabled());

        let (camera, gbuffer, base) = scene(16, 16);
        let input = FrameInput {
            camera: &camera,
            gbuffer: &gbuffer,
            base_color: &base,
        };
        let outcome = pipeline.render_frame(&LightRegistry::new(), &input);
        assert!(outcome.passthrough);
        assert_eq!(pipeline.output(), &base);
        assert_eq!(pipeline.begin_frame(&input).unwrap_err(), PipelineError::Disabled);
    }

    #[test]
    fn test_oversized_capacities_disable_session() {
        let pipeline = DeferredLightsPipeline::new(DeferredLightsConfig {
            max_lights: u32::MAX,
            max_lights_per_tile: u32::MAX,
            ..config()
        });
        assert!(matches!(pipeline.init_error(), Some(PipelineError::InvalidConfig(_))));
        assert!(!pipeline.is_enabled());
    }

    #[test]
    fn test_missing_model_disables_session() {
        let pipeline = DeferredLightsPipeline::with_lighting_model(config(), None);
        assert!(matches!(pipeline.init_error(), Some(PipelineError::MissingResource(_))));
        assert!(pipeline.texture(NamedTexture::Lights).is_none());
    }

    #[test]
    fn test_disabled_toggle_passes_through() {
        let mut pipeline = DeferredLightsPipeline::new(DeferredLightsConfig {
            enabled: false,
            ..config()
        });
        let (camera, gbuffer, base) = scene(16, 16);
        let outcome = pipeline.render_frame(
            &LightRegistry::new(),
            &FrameInput {
                camera: &camera,
                gbuffer: &gbuffer,
                base_color: &base,
            },
        );
        assert!(outcome.passthrough);
        assert!(outcome.error.is_none());
        assert_eq!(pipeline.frame(), 0);
    }

    #[test]
    fn test_set_config_forces_rebuild() {
        let mut pipeline = DeferredLightsPipeline::new(config());
        let (camera, gbuffer, base) = scene(32, 32);
        let registry = LightRegistry::new();
        let input = FrameInput {
            camera: &camera,
            gbuffer: &gbuffer,
            base_color: &base,
        };

        pipeline.render_frame(&registry, &input);
        pipeline.render_frame(&registry, &input);
        assert_eq!(pipeline.frustum_rebuilds(), 1);

        pipeline.set_config(DeferredLightsConfig { tile_size: 8, ..config() }).unwrap();
        let outcome = pipeline.render_frame(&registry, &input);
        assert!(outcome.stats.frustums_rebuilt);
        assert_eq!(pipeline.tile_frustums().len(), 16);

        assert!(pipeline.set_config(DeferredLightsConfig { max_lights: 0, ..config() }).is_err());
        assert_eq!(pipeline.config().tile_size, 8);
    }

    #[test]
    fn test_debug_mode_switch_keeps_lighting() {
        let mut pipeline = DeferredLightsPipeline::new(config());
        let (camera, gbuffer, base) = scene(32, 32);
        let mut registry = LightRegistry::new();
        registry.add(PointLight::new(Vec3::new(0.0, 0.0, 1.0), 5.0));
        let input = FrameInput {
            camera: &camera,
            gbuffer: &gbuffer,
            base_color: &base,
        };

        pipeline.render_frame(&registry, &input);
        let lit = pipeline.texture(NamedTexture::Lights).unwrap().clone();

        pipeline.debug_state().set_mode(crate::debug::DebugMode::Albedo);
        pipeline.render_frame(&registry, &input);

        assert_eq!(pipeline.texture(NamedTexture::Lights).unwrap(), &lit);
        assert_eq!(pipeline.output(), &gbuffer.albedo);
    }
}
