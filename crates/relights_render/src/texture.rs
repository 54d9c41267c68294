//! CPU textures and the G-buffer attachment set

use std::ops::{Add, Mul};

use rayon::prelude::*;
use relights_math::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Pixel types that can be filtered
pub trait Texel: Copy + Default + Send + Sync + Add<Output = Self> + Mul<f32, Output = Self> {}

impl<T> Texel for T where
    T: Copy + Default + Send + Sync + Add<Output = T> + Mul<f32, Output = T>
{
}

/// Row-major 2D texture
#[derive(Clone, Debug, PartialEq)]
pub struct Texture2D<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Copy + Default> Default for Texture2D<T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl<T: Copy + Default> Texture2D<T> {
    /// Create a texture filled with `T::default()`
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, T::default())
    }
}

impl<T: Copy> Texture2D<T> {
    /// Create a texture filled with one value
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Create a texture from a per-pixel function
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Read a pixel
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        if x < self.width && y < self.height {
            Some(self.data[self.index(x, y)])
        } else {
            None
        }
    }

    /// Read a pixel with coordinates clamped to the edge
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> T {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.data[self.index(x, y)]
    }

    /// Write a pixel; returns false when out of bounds
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) -> bool {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.data[i] = value;
            true
        } else {
            false
        }
    }

    /// Fill every pixel
    pub fn clear(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Change dimensions, reusing storage
    ///
    /// Contents are reset to `value`. Returns true when the dimensions
    /// changed.
    pub fn resize(&mut self, width: u32, height: u32, value: T) -> bool {
        let changed = (width, height) != (self.width, self.height);
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize, value);
        changed
    }

    /// Pixel data
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable pixel data
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// One row
    #[inline]
    pub fn row(&self, y: u32) -> &[T] {
        let start = self.index(0, y);
        &self.data[start..start + self.width as usize]
    }
}

impl<T: Copy + Send + Sync> Texture2D<T> {
    /// Rows for parallel iteration
    pub fn par_rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, T> {
        let width = self.width.max(1) as usize;
        self.data.par_chunks_mut(width)
    }
}

/// G-buffer attachments produced by the geometry pass
///
/// All attachments share the internal lighting resolution. Normals are in
/// world space; `normal_depth.w` is positive linear view depth, with depth
/// `<= 0` or `>= far` marking background pixels.
#[derive(Clone, Debug, Default)]
pub struct GBuffer {
    /// Diffuse albedo
    pub albedo: Texture2D<Vec3>,
    /// Specular color in `xyz`, roughness in `w`
    pub specular_roughness: Texture2D<Vec4>,
    /// World-space position
    pub world_position: Texture2D<Vec3>,
    /// World-space normal in `xyz`, linear view depth in `w`
    pub normal_depth: Texture2D<Vec4>,
}

impl GBuffer {
    /// Create empty attachments
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            albedo: Texture2D::new(width, height),
            specular_roughness: Texture2D::new(width, height),
            world_position: Texture2D::new(width, height),
            normal_depth: Texture2D::new(width, height),
        }
    }

    /// Dimensions of the albedo attachment
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.albedo.dimensions()
    }

    /// Check every attachment matches `expected`
    pub fn validate(&self, expected: (u32, u32)) -> Result<()> {
        let attachments = [
            self.albedo.dimensions(),
            self.specular_roughness.dimensions(),
            self.world_position.dimensions(),
            self.normal_depth.dimensions(),
        ];
        for found in attachments {
            if found != expected {
                return Err(PipelineError::GBufferSizeMismatch { expected, found });
            }
        }
        Ok(())
    }

    /// Linear view depth of a pixel
    #[inline]
    pub fn depth(&self, x: u32, y: u32) -> f32 {
        self.normal_depth.get(x, y).map_or(0.0, |nd| nd.w)
    }
}

/// Check a linear depth belongs to geometry rather than background
#[inline]
pub fn is_geometry_depth(depth: f32, far: f32) -> bool {
    depth > 0.0 && depth < far
}

/// Intermediate textures exposed to downstream consumers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedTexture {
    /// Low-resolution accumulated lighting
    Lights,
    /// Final composited color
    Output,
    /// Per-tile light count heatmap (one pixel per tile)
    TileHeatmap,
}

impl NamedTexture {
    /// Shader-style resource name
    pub fn name(&self) -> &'static str {
        match self {
            NamedTexture::Lights => "_LightsTexture",
            NamedTexture::Output => "_OutputTexture",
            NamedTexture::TileHeatmap => "_TileHeatmap",
        }
    }
}
