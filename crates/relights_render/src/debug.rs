//! Debug Visualization
//!
//! Numbered debug modes that replace the composited output with a view of
//! an intermediate buffer. Selection happens after compositing, so the
//! lighting computation is identical in every mode.
//!
//! The current mode lives in a [`SharedDebugState`] that consumers (UI,
//! overlays, tools) can read and change between frames.
//!
//! # Example
//!
//! ```ignore
//! use relights_render::debug::{DebugMode, SharedDebugState};
//!
//! let state = pipeline.debug_state();
//! state.set_mode(DebugMode::TileHeatmap);
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use relights_math::{lerp, saturate, Vec3};
use serde::{Deserialize, Serialize};

use crate::buffers::TileData;
use crate::texture::{is_geometry_depth, GBuffer, Texture2D};
use crate::tiles::TileGrid;

/// Output visualization selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum DebugMode {
    /// Lit output
    #[default]
    None = 0,
    /// World normals remapped to [0, 1]
    Normals = 1,
    /// Linear depth over the far plane
    Depth = 2,
    /// World positions
    Positions = 3,
    /// Diffuse albedo
    Albedo = 4,
    /// Specular color
    Specular = 5,
    /// Lights per tile
    TileHeatmap = 6,
}

impl DebugMode {
    /// Every mode in index order
    pub const ALL: [DebugMode; 7] = [
        DebugMode::None,
        DebugMode::Normals,
        DebugMode::Depth,
        DebugMode::Positions,
        DebugMode::Albedo,
        DebugMode::Specular,
        DebugMode::TileHeatmap,
    ];

    /// Mode from its number
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Mode number
    #[inline]
    pub fn index(&self) -> u32 {
        *self as u32
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            DebugMode::None => "None",
            DebugMode::Normals => "Normals",
            DebugMode::Depth => "Depth",
            DebugMode::Positions => "Positions",
            DebugMode::Albedo => "Albedo",
            DebugMode::Specular => "Specular",
            DebugMode::TileHeatmap => "TileHeatmap",
        }
    }

    /// Parse a number or a name (case-insensitive)
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(index) = text.parse::<u32>() {
            return Self::from_index(index);
        }
        let normalized: String = text
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(&normalized))
    }
}

/// Debug state shared with consumers
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugState {
    /// Current mode
    pub mode: DebugMode,
    /// Tile count mapped to the hottest heatmap color
    pub heatmap_max_lights: u32,
}

/// Shared handle to the current debug mode
#[derive(Clone, Debug, Default)]
pub struct SharedDebugState(Arc<RwLock<DebugState>>);

impl SharedDebugState {
    /// Create with an initial state
    pub fn new(state: DebugState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Copy of the current state
    pub fn get(&self) -> DebugState {
        *self.0.read()
    }

    /// Current mode
    pub fn mode(&self) -> DebugMode {
        self.0.read().mode
    }

    /// Change the mode
    pub fn set_mode(&self, mode: DebugMode) {
        let mut state = self.0.write();
        if state.mode != mode {
            log::debug!("Debug mode {} -> {}", state.mode.name(), mode.name());
            state.mode = mode;
        }
    }

    /// Change the heatmap scale
    pub fn set_heatmap_max_lights(&self, max: u32) {
        self.0.write().heatmap_max_lights = max.max(1);
    }
}

const HEATMAP_RAMP: [Vec3; 6] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
];

/// Heatmap color for a light count
///
/// Black at zero through blue, cyan, green and yellow to red at `max`.
pub fn heatmap_color(count: u32, max: u32) -> Vec3 {
    let t = saturate(count as f32 / max.max(1) as f32);
    let scaled = t * (HEATMAP_RAMP.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(HEATMAP_RAMP.len() - 2);
    let f = scaled - i as f32;
    let (a, b) = (HEATMAP_RAMP[i], HEATMAP_RAMP[i + 1]);
    Vec3::new(lerp(a.x, b.x, f), lerp(a.y, b.y, f), lerp(a.z, b.z, f))
}

/// One pixel per tile, colored by light count
pub fn render_heatmap(
    grid: &TileGrid,
    tile_data: &[TileData],
    max: u32,
    out: &mut Texture2D<Vec3>,
) {
    out.resize(grid.tiles_x, grid.tiles_y, Vec3::ZERO);
    out.data_mut()
        .par_iter_mut()
        .zip(tile_data.par_iter())
        .for_each(|(pixel, data)| *pixel = heatmap_color(data.count, max));
}

/// Buffers a visualization can read
#[derive(Clone, Copy)]
pub struct DebugSources<'a> {
    pub gbuffer: &'a GBuffer,
    pub grid: &'a TileGrid,
    pub tile_data: &'a [TileData],
    pub far: f32,
    pub heatmap_max_lights: u32,
}

fn debug_color(mode: DebugMode, sources: &DebugSources<'_>, x: u32, y: u32) -> Vec3 {
    let gbuffer = sources.gbuffer;
    let normal_depth = gbuffer.normal_depth.get(x, y).unwrap_or_default();
    let geometry = is_geometry_depth(normal_depth.w, sources.far);

    match mode {
        DebugMode::None => Vec3::ZERO,
        DebugMode::Normals if geometry => normal_depth.truncate() * 0.5 + Vec3::splat(0.5),
        DebugMode::Depth if geometry => Vec3::splat(saturate(normal_depth.w / sources.far)),
        DebugMode::Positions if geometry => {
            let p = gbuffer.world_position.get(x, y).unwrap_or_default();
            (p / sources.far) * 0.5 + Vec3::splat(0.5)
        }
        DebugMode::Albedo => gbuffer.albedo.get(x, y).unwrap_or_default(),
        DebugMode::Specular => gbuffer
            .specular_roughness
            .get(x, y)
            .unwrap_or_default()
            .truncate(),
        DebugMode::TileHeatmap => {
            let tile = sources.grid.tile_of_pixel(x, y);
            let count = sources.tile_data.get(tile).map_or(0, |d| d.count);
            heatmap_color(count, sources.heatmap_max_lights)
        }
        _ => Vec3::ZERO,
    }
}

/// Replace `output` with a visualization
///
/// Output pixels sample the internal-resolution buffers nearest-neighbor.
/// Returns false and leaves `output` untouched for [`DebugMode::None`].
pub fn visualize(
    mode: DebugMode,
    sources: &DebugSources<'_>,
    output: &mut Texture2D<Vec3>,
) -> bool {
    if mode == DebugMode::None {
        return false;
    }

    let (src_w, src_h) = sources.gbuffer.dimensions();
    let (dst_w, dst_h) = output.dimensions();
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return false;
    }

    output.par_rows_mut().enumerate().for_each(|(y, row)| {
        let sy = ((y as u64 * src_h as u64) / dst_h as u64) as u32;
        for (x, pixel) in row.iter_mut().enumerate() {
            let sx = ((x as u64 * src_w as u64) / dst_w as u64) as u32;
            *pixel = debug_color(mode, sources, sx, sy);
        }
    });
    true
}
