//! Screen tiles and their view-space frustums
//!
//! The lighting buffer is split into square tiles of `tile_size` pixels.
//! Each tile gets four side planes through the camera origin, built by
//! unprojecting the tile's corners with the inverse projection matrix.
//! Tile frustums live in view space, so they depend only on the projection
//! and the grid, never on camera position or orientation. They are cached
//! and rebuilt when the grid, render size or projection changes.
//!
//! Near and far bounds are not planes: when a depth prepass is available
//! each tile is bounded by the [`DepthBounds`] of its G-buffer pixels.

use rayon::prelude::*;
use relights_math::{div_ceil, unproject_pixel, Mat4, TileFrustum, Vec2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::texture::{is_geometry_depth, GBuffer};

/// Tile partition of a render target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGrid {
    /// Tiles per row
    pub tiles_x: u32,
    /// Tiles per column
    pub tiles_y: u32,
    /// Tile edge in pixels
    pub tile_size: u32,
    /// Render target width in pixels
    pub width: u32,
    /// Render target height in pixels
    pub height: u32,
}

impl TileGrid {
    /// Partition a `width x height` target into tiles
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            tiles_x: div_ceil(width, tile_size),
            tiles_y: div_ceil(height, tile_size),
            tile_size,
            width,
            height,
        }
    }

    /// Total tiles
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Linear index `ty * tiles_x + tx`
    #[inline]
    pub fn tile_index(&self, tx: u32, ty: u32) -> usize {
        ty as usize * self.tiles_x as usize + tx as usize
    }

    /// Tile coordinates from a linear index
    #[inline]
    pub fn tile_coords(&self, index: usize) -> (u32, u32) {
        let tiles_x = self.tiles_x.max(1) as usize;
        ((index % tiles_x) as u32, (index / tiles_x) as u32)
    }

    /// Linear index of the tile containing a pixel
    #[inline]
    pub fn tile_of_pixel(&self, x: u32, y: u32) -> usize {
        self.tile_index(x / self.tile_size, y / self.tile_size)
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` of a tile, clipped to the target
    pub fn pixel_bounds(&self, tx: u32, ty: u32) -> (u32, u32, u32, u32) {
        let x0 = tx * self.tile_size;
        let y0 = ty * self.tile_size;
        (
            x0.min(self.width),
            y0.min(self.height),
            (x0 + self.tile_size).min(self.width),
            (y0 + self.tile_size).min(self.height),
        )
    }
}

/// Build the view-space frustum of one tile
pub fn tile_frustum(inverse_projection: &Mat4, grid: &TileGrid, tx: u32, ty: u32) -> TileFrustum {
    let ts = grid.tile_size as f32;
    let x0 = tx as f32 * ts;
    let y0 = ty as f32 * ts;
    let x1 = x0 + ts;
    let y1 = y0 + ts;

    let corner = |x, y| {
        unproject_pixel(inverse_projection, Vec2::new(x, y), grid.width, grid.height)
    };
    TileFrustum::from_view_corners([
        corner(x0, y0),
        corner(x1, y0),
        corner(x1, y1),
        corner(x0, y1),
    ])
}

/// Cached per-tile frustums
#[derive(Clone, Debug)]
pub struct TileFrustumBuilder {
    max_resolution: (u32, u32),
    grid: Option<TileGrid>,
    projection: Mat4,
    frustums: Vec<TileFrustum>,
    dirty: bool,
    rebuilds: u64,
}

impl TileFrustumBuilder {
    /// Create an empty cache bounded by a maximum render size
    pub fn new(max_resolution: (u32, u32)) -> Self {
        Self {
            max_resolution,
            grid: None,
            projection: Mat4::IDENTITY,
            frustums: Vec::new(),
            dirty: true,
            rebuilds: 0,
        }
    }

    /// Change the maximum render size; forces a rebuild
    pub fn set_max_resolution(&mut self, max_resolution: (u32, u32)) {
        self.max_resolution = max_resolution;
        self.dirty = true;
    }

    /// Force a rebuild on the next [`build`](Self::build)
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Check if `grid` and `projection` differ from the cached ones
    pub fn needs_rebuild(&self, grid: &TileGrid, projection: &Mat4) -> bool {
        self.dirty || self.grid.as_ref() != Some(grid) || self.projection != *projection
    }

    /// Make the cache valid for `grid` under `projection`
    ///
    /// Returns true when the frustums were rebuilt.
    pub fn build(&mut self, projection: &Mat4, grid: TileGrid) -> Result<bool> {
        let max_tiles = (div_ceil(self.max_resolution.0, grid.tile_size) as usize)
            .saturating_mul(div_ceil(self.max_resolution.1, grid.tile_size) as usize);
        if grid.tile_count() > max_tiles {
            return Err(PipelineError::ResolutionExceedsLimit {
                width: grid.width,
                height: grid.height,
                max_width: self.max_resolution.0,
                max_height: self.max_resolution.1,
            });
        }

        if !self.needs_rebuild(&grid, projection) {
            return Ok(false);
        }

        let previous = self.grid.map(|g| (g.tiles_x, g.tiles_y));
        log::info!(
            "Rebuilding {}x{} tile frustums for {}x{} lighting buffer (was {:?})",
            grid.tiles_x,
            grid.tiles_y,
            grid.width,
            grid.height,
            previous
        );

        let inverse_projection = projection.inverse();
        self.frustums.resize(grid.tile_count(), TileFrustum::default());
        self.frustums
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, frustum)| {
                let (tx, ty) = grid.tile_coords(index);
                *frustum = tile_frustum(&inverse_projection, &grid, tx, ty);
            });

        self.grid = Some(grid);
        self.projection = *projection;
        self.dirty = false;
        self.rebuilds += 1;
        Ok(true)
    }

    /// Cached frustums, indexed by `ty * tiles_x + tx`
    #[inline]
    pub fn frustums(&self) -> &[TileFrustum] {
        &self.frustums
    }

    /// Grid the cache was built for
    #[inline]
    pub fn grid(&self) -> Option<TileGrid> {
        self.grid
    }

    /// Number of rebuilds this session
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

/// Linear view depth range covered by a tile's geometry
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthBounds {
    pub min: f32,
    pub max: f32,
}

impl DepthBounds {
    /// Bounds of a tile with no geometry
    pub const EMPTY: Self = Self {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    /// Check if no geometry depth was recorded
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Extend to include a depth
    #[inline]
    pub fn include(&mut self, depth: f32) {
        self.min = self.min.min(depth);
        self.max = self.max.max(depth);
    }
}

impl Default for DepthBounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Per-tile depth ranges from the G-buffer depth
///
/// Background pixels are skipped; a tile with only background ends up
/// [`DepthBounds::EMPTY`].
pub fn compute_depth_bounds(
    gbuffer: &GBuffer,
    grid: &TileGrid,
    far: f32,
    out: &mut Vec<DepthBounds>,
) {
    out.clear();
    out.resize(grid.tile_count(), DepthBounds::EMPTY);
    out.par_iter_mut().enumerate().for_each(|(index, bounds)| {
        let (tx, ty) = grid.tile_coords(index);
        let (x0, y0, x1, y1) = grid.pixel_bounds(tx, ty);
        for y in y0..y1 {
            let row = gbuffer.normal_depth.row(y);
            for nd in &row[x0 as usize..x1 as usize] {
                if is_geometry_depth(nd.w, far) {
                    bounds.include(nd.w);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use relights_math::{Camera, Vec3, Vec4};

    fn camera() -> Camera {
        Camera::new(Vec3::ZERO, 60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0)
    }

    #[test]
    fn test_grid_dimensions() {
        let grid = TileGrid::new(1920, 1080, 16);
        assert_eq!((grid.tiles_x, grid.tiles_y), (120, 68));
        assert_eq!(grid.tile_count(), 8160);
        assert_eq!(grid.tile_of_pixel(40, 56), grid.tile_index(2, 3));
        assert_eq!(grid.tile_coords(grid.tile_index(7, 9)), (7, 9));
        assert_eq!(grid.pixel_bounds(119, 67), (1904, 1072, 1920, 1080));
    }

    #[test]
    fn test_build_is_cached() {
        let proj = camera().projection();
        let mut builder = TileFrustumBuilder::new((2560, 1440));
        let grid = TileGrid::new(640, 360, 16);

        assert!(builder.build(&proj, grid).unwrap());
        assert!(!builder.build(&proj, grid).unwrap());
        assert_eq!(builder.rebuild_count(), 1);
        assert_eq!(builder.frustums().len(), 40 * 23);
    }

    #[test]
    fn test_rebuild_on_resize_and_projection_change() {
        let mut builder = TileFrustumBuilder::new((2560, 1440));
        let proj = camera().projection();
        builder.build(&proj, TileGrid::new(640, 360, 16)).unwrap();

        assert!(builder.build(&proj, TileGrid::new(1280, 720, 16)).unwrap());
        assert_eq!(builder.frustums().len(), 80 * 45);

        let wide = Camera { fov_y: 1.2, ..camera() }.projection();
        assert!(builder.build(&wide, TileGrid::new(1280, 720, 16)).unwrap());

        builder.mark_dirty();
        assert!(builder.build(&wide, TileGrid::new(1280, 720, 16)).unwrap());
        assert_eq!(builder.rebuild_count(), 4);
    }

    #[test]
    fn test_grid_over_limit_rejected() {
        let mut builder = TileFrustumBuilder::new((640, 360));
        let err = builder
            .build(&camera().projection(), TileGrid::new(1280, 720, 16))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ResolutionExceedsLimit { .. }));
    }

    #[test]
    fn test_tile_frustums_partition_screen() {
        let cam = camera();
        let grid = TileGrid::new(320, 180, 16);
        let mut builder = TileFrustumBuilder::new((2560, 1440));
        builder.build(&cam.projection(), grid).unwrap();

        // A point on the ray through a pixel center falls inside that tile only
        let pixel = relights_math::Vec2::new(100.5, 70.5);
        let point = cam.view_ray(pixel, grid.width, grid.height) * 20.0;
        let owner = grid.tile_of_pixel(100, 70);

        for (index, frustum) in builder.frustums().iter().enumerate() {
            let inside = frustum.intersects_sphere(point, 0.0);
            assert_eq!(inside, index == owner, "tile {}", index);
        }
    }

    #[test]
    fn test_depth_bounds() {
        let grid = TileGrid::new(32, 16, 16);
        let mut gbuffer = GBuffer::new(32, 16);
        gbuffer.normal_depth.set(1, 1, Vec4::new(0.0, 1.0, 0.0, 5.0));
        gbuffer.normal_depth.set(3, 7, Vec4::new(0.0, 1.0, 0.0, 9.0));
        gbuffer.normal_depth.set(4, 4, Vec4::new(0.0, 1.0, 0.0, 500.0));

        let mut bounds = Vec::new();
        compute_depth_bounds(&gbuffer, &grid, 100.0, &mut bounds);

        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[0], DepthBounds { min: 5.0, max: 9.0 });
        assert!(bounds[1].is_empty());
    }
}
