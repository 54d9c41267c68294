//! Per-tile light binning
//!
//! Visible lights are moved into view space once, then every tile tests
//! every light against its frustum (and depth slice when available) in
//! parallel. Each tile gathers its hits locally, reserves a contiguous run
//! of the shared light index buffer with one atomic `fetch_add`, and
//! records `(offset, count)` in its [`TileData`].
//!
//! Capacity is bounded twice: a tile keeps at most `max_lights_per_tile`
//! lights, and the shared buffer holds `tiles * max_lights_per_tile`
//! entries. Excess lights are dropped and counted, never wrapped. Order
//! within a tile's list is unspecified.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;
use relights_math::{Mat4, Sphere, TileFrustum};

use crate::buffers::{AppendBuffer, TileData};
use crate::light::GpuLight;
use crate::tiles::DepthBounds;

/// Outcome of one binning pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinningResult {
    /// Index entries written
    pub entries: u32,
    /// Light assignments dropped over capacity
    pub dropped: u32,
    /// Tiles that hit a capacity limit
    pub overflowed_tiles: u32,
    /// Tiles with at least one light
    pub tiles_with_lights: u32,
    /// Largest per-tile light count
    pub max_tile_lights: u32,
}

impl BinningResult {
    /// Check if any assignment was dropped
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }
}

/// Assigns visible lights to screen tiles
#[derive(Debug)]
pub struct TileLightBinner {
    max_lights_per_tile: u32,
    view_lights: Vec<Sphere>,
    tile_data: Vec<TileData>,
    indices: AppendBuffer,
    index_list: Vec<u32>,
}

impl TileLightBinner {
    /// Create with a per-tile capacity
    pub fn new(max_lights_per_tile: u32) -> Self {
        Self {
            max_lights_per_tile,
            view_lights: Vec::new(),
            tile_data: Vec::new(),
            indices: AppendBuffer::default(),
            index_list: Vec::new(),
        }
    }

    /// Change the per-tile capacity
    pub fn set_max_lights_per_tile(&mut self, max_lights_per_tile: u32) {
        self.max_lights_per_tile = max_lights_per_tile;
    }

    /// Per-tile capacity
    #[inline]
    pub fn max_lights_per_tile(&self) -> u32 {
        self.max_lights_per_tile
    }

    /// Bin `visible` lights into `frustums`
    ///
    /// `view` moves world-space light positions into the space the tile
    /// frustums were built in. With `depth_bounds`, tiles are also bounded
    /// by their geometry's depth range, and tiles without geometry get no
    /// lights.
    pub fn bin(
        &mut self,
        frustums: &[TileFrustum],
        depth_bounds: Option<&[DepthBounds]>,
        visible: &[GpuLight],
        view: &Mat4,
    ) -> BinningResult {
        let tile_count = frustums.len();
        let per_tile = self.max_lights_per_tile as usize;

        let depth_bounds = depth_bounds.filter(|bounds| {
            let matches = bounds.len() == tile_count;
            if !matches {
                log::debug!(
                    "Ignoring depth bounds for {} tiles, grid has {}",
                    bounds.len(),
                    tile_count
                );
            }
            matches
        });

        self.view_lights.clear();
        self.view_lights.extend(
            visible
                .iter()
                .map(|light| Sphere::new(light.position(), light.range).transformed(view)),
        );

        // Counter reset happens-before any append below
        self.tile_data.clear();
        self.tile_data.resize(tile_count, TileData::default());
        if self.indices.prepare(tile_count * per_tile) {
            log::info!(
                "Light index buffer grown to {} entries ({} tiles x {})",
                self.indices.storage(),
                tile_count,
                per_tile
            );
        }

        let overflowed_tiles = AtomicU32::new(0);
        let tile_dropped = AtomicU32::new(0);
        let view_lights = &self.view_lights;
        let indices = &self.indices;

        self.tile_data
            .par_iter_mut()
            .zip(frustums.par_iter())
            .enumerate()
            .for_each_init(
                || Vec::with_capacity(per_tile),
                |local: &mut Vec<u32>, (tile, (data, frustum))| {
                    local.clear();
                    *data = TileData::default();

                    let bounds = depth_bounds.map(|b| b[tile]);
                    if bounds.map_or(false, |b| b.is_empty()) {
                        return;
                    }

                    let mut over = 0u32;
                    for (i, light) in view_lights.iter().enumerate() {
                        let hit = match bounds {
                            Some(b) => frustum.intersects_sphere_in_depth_range(
                                light.center,
                                light.radius,
                                b.min,
                                b.max,
                            ),
                            None => frustum.intersects_sphere(light.center, light.radius),
                        };
                        if !hit {
                            continue;
                        }
                        if local.len() < per_tile {
                            local.push(i as u32);
                        } else {
                            over += 1;
                        }
                    }

                    let granted = match indices.reserve(local.len()) {
                        Some(range) => {
                            for (slot, &light) in range.clone().zip(local.iter()) {
                                indices.write(slot, light);
                            }
                            *data = TileData {
                                offset: range.start as u32,
                                count: range.len() as u32,
                            };
                            range.len()
                        }
                        None => 0,
                    };

                    if over > 0 || granted < local.len() {
                        overflowed_tiles.fetch_add(1, Ordering::Relaxed);
                        tile_dropped.fetch_add(over, Ordering::Relaxed);
                    }
                },
            );

        // Stage barrier: every append is visible from here on
        self.indices.copy_to(&mut self.index_list);

        let mut result = BinningResult {
            entries: self.index_list.len() as u32,
            dropped: tile_dropped.into_inner() + self.indices.dropped(),
            overflowed_tiles: overflowed_tiles.into_inner(),
            ..Default::default()
        };
        for data in &self.tile_data {
            if data.count > 0 {
                result.tiles_with_lights += 1;
                result.max_tile_lights = result.max_tile_lights.max(data.count);
            }
        }

        if result.overflowed() {
            log::debug!(
                "{} tiles exceeded light capacity, {} assignments dropped",
                result.overflowed_tiles,
                result.dropped
            );
        }
        log::trace!(
            "Binned {} lights into {} tiles: {} entries, {} lit tiles",
            visible.len(),
            tile_count,
            result.entries,
            result.tiles_with_lights
        );

        result
    }

    /// Per-tile `(offset, count)`
    #[inline]
    pub fn tile_data(&self) -> &[TileData] {
        &self.tile_data
    }

    /// Flat light index buffer
    #[inline]
    pub fn light_indices(&self) -> &[u32] {
        &self.index_list
    }

    /// Visible-list indices of the lights in one tile
    pub fn tile_lights(&self, tile: usize) -> &[u32] {
        match self.tile_data.get(tile) {
            Some(data) => self.index_list.get(data.range()).unwrap_or(&[]),
            None => &[],
        }
    }
}
