//! Deferred shading over the G-buffer
//!
//! Each pixel of the internal-resolution lighting buffer looks up its
//! tile's light list and accumulates contributions through a
//! [`LightingModel`]. The low-resolution result is optionally blurred, then
//! upsampled with the magic kernel and added onto the full-resolution base
//! color. Lighting and output live in separate textures, so no pass reads
//! and writes the same resource.

use std::sync::Arc;

use rayon::prelude::*;
use relights_math::{saturate, Vec3};

use crate::buffers::TileData;
use crate::light::GpuLight;
use crate::resample::{gaussian_blur, resample};
use crate::texture::{is_geometry_depth, GBuffer, Texture2D};
use crate::tiles::TileGrid;

/// Lowest roughness fed to the specular term
pub const MIN_ROUGHNESS: f32 = 0.02;

/// Surface attributes of one G-buffer pixel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceData {
    /// Diffuse albedo
    pub diffuse: Vec3,
    /// World-space unit normal
    pub normal: Vec3,
    /// Linear view depth
    pub depth: f32,
    /// Unit vector from the surface toward the camera
    pub view_dir: Vec3,
    /// World position
    pub position: Vec3,
    /// Specular color
    pub specular: Vec3,
    pub roughness: f32,
    pub roughness2: f32,
    pub roughness2_minus_one: f32,
    /// Specular normalization `roughness * 4 + 2`
    pub normalization_term: f32,
}

impl SurfaceData {
    /// Build from surface attributes
    pub fn new(
        diffuse: Vec3,
        normal: Vec3,
        depth: f32,
        position: Vec3,
        specular: Vec3,
        roughness: f32,
        camera_position: Vec3,
    ) -> Self {
        let roughness = roughness.clamp(MIN_ROUGHNESS, 1.0);
        let roughness2 = roughness * roughness;
        Self {
            diffuse,
            normal: normal.normalize_or_zero(),
            depth,
            view_dir: (camera_position - position).normalize_or_zero(),
            position,
            specular,
            roughness,
            roughness2,
            roughness2_minus_one: roughness2 - 1.0,
            normalization_term: roughness * 4.0 + 2.0,
        }
    }

    /// Read a G-buffer pixel; `None` for background
    pub fn from_gbuffer(
        gbuffer: &GBuffer,
        x: u32,
        y: u32,
        camera_position: Vec3,
        far: f32,
    ) -> Option<Self> {
        let normal_depth = gbuffer.normal_depth.get(x, y)?;
        if !is_geometry_depth(normal_depth.w, far) {
            return None;
        }
        let specular_roughness = gbuffer.specular_roughness.get(x, y)?;

        Some(Self::new(
            gbuffer.albedo.get(x, y)?,
            normal_depth.truncate(),
            normal_depth.w,
            gbuffer.world_position.get(x, y)?,
            specular_roughness.truncate(),
            specular_roughness.w,
            camera_position,
        ))
    }
}

/// Per-light shading function
pub trait LightingModel: Send + Sync {
    /// Radiance one light adds to a surface
    fn shade(&self, surface: &SurfaceData, light: &GpuLight) -> Vec3;

    /// Model name for logs
    fn name(&self) -> &str {
        "custom"
    }
}

/// Lambert diffuse plus a normalized Blinn-style specular lobe
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleBrdf;

impl LightingModel for SimpleBrdf {
    fn shade(&self, surface: &SurfaceData, light: &GpuLight) -> Vec3 {
        let to_light = light.position() - surface.position;
        let distance_sqr = to_light.length_squared();
        let attenuation = light.attenuation_at(distance_sqr);
        if attenuation <= 0.0 {
            return Vec3::ZERO;
        }

        let l = to_light.normalize_or_zero();
        let n_dot_l = saturate(surface.normal.dot(l));
        if n_dot_l <= 0.0 {
            return Vec3::ZERO;
        }

        let h = (l + surface.view_dir).normalize_or_zero();
        let n_dot_h = saturate(surface.normal.dot(h));
        let l_dot_h = saturate(l.dot(h));

        let d = n_dot_h * n_dot_h * surface.roughness2_minus_one + 1.00001;
        let specular_term = surface.roughness2
            / (d * d * (l_dot_h * l_dot_h).max(0.1) * surface.normalization_term);

        (surface.diffuse + surface.specular * specular_term)
            * light.color()
            * (n_dot_l * attenuation)
    }

    fn name(&self) -> &str {
        "simple_brdf"
    }
}

/// Inputs the shading pass reads
#[derive(Clone, Copy)]
pub struct ShadeInputs<'a> {
    pub gbuffer: &'a GBuffer,
    pub grid: &'a TileGrid,
    pub tile_data: &'a [TileData],
    pub light_indices: &'a [u32],
    pub visible_lights: &'a [GpuLight],
    pub camera_position: Vec3,
    pub far: f32,
}

/// Outcome of one shading pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShadeResult {
    /// Pixels with geometry
    pub surface_pixels: u64,
    /// Light evaluations performed
    pub light_evaluations: u64,
}

/// Tiled deferred shader
pub struct DeferredShader {
    model: Arc<dyn LightingModel>,
    lights: Texture2D<Vec3>,
    upsampled: Texture2D<Vec3>,
    scratch: Texture2D<Vec3>,
}

impl DeferredShader {
    /// Create with a lighting model
    pub fn new(model: Arc<dyn LightingModel>) -> Self {
        Self {
            model,
            lights: Texture2D::default(),
            upsampled: Texture2D::default(),
            scratch: Texture2D::default(),
        }
    }

    /// Active lighting model
    pub fn model(&self) -> &dyn LightingModel {
        self.model.as_ref()
    }

    /// Accumulate lighting at the G-buffer resolution
    pub fn shade(&mut self, inputs: ShadeInputs<'_>, blur: bool) -> ShadeResult {
        let (width, height) = inputs.gbuffer.dimensions();
        self.lights.resize(width, height, Vec3::ZERO);

        let model = self.model.as_ref();
        let (surface_pixels, light_evaluations) = self
            .lights
            .par_rows_mut()
            .enumerate()
            .map(|(y, row)| {
                let y = y as u32;
                let mut surfaces = 0u64;
                let mut evaluations = 0u64;

                for (x, out) in row.iter_mut().enumerate() {
                    let x = x as u32;
                    let Some(surface) = SurfaceData::from_gbuffer(
                        inputs.gbuffer,
                        x,
                        y,
                        inputs.camera_position,
                        inputs.far,
                    ) else {
                        continue;
                    };
                    surfaces += 1;

                    let tile = inputs.grid.tile_of_pixel(x, y);
                    let Some(data) = inputs.tile_data.get(tile) else {
                        continue;
                    };
                    let indices = inputs.light_indices.get(data.range()).unwrap_or(&[]);

                    let mut sum = Vec3::ZERO;
                    for &index in indices {
                        if let Some(light) = inputs.visible_lights.get(index as usize) {
                            sum += model.shade(&surface, light);
                        }
                    }
                    evaluations += indices.len() as u64;
                    *out = sum;
                }

                (surfaces, evaluations)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        if blur {
            gaussian_blur(&mut self.lights, &mut self.scratch);
        }

        ShadeResult {
            surface_pixels,
            light_evaluations,
        }
    }

    /// Upsample lighting onto `base` into `output`
    pub fn composite(&mut self, base: &Texture2D<Vec3>, output: &mut Texture2D<Vec3>) {
        let (width, height) = base.dimensions();
        self.upsampled.resize(width, height, Vec3::ZERO);
        resample(&self.lights, &mut self.upsampled, &mut self.scratch);

        output.resize(width, height, Vec3::ZERO);
        output
            .data_mut()
            .par_iter_mut()
            .zip(base.data().par_iter().zip(self.upsampled.data().par_iter()))
            .for_each(|(out, (&color, &light))| *out = color + light);
    }

    /// Low-resolution lighting from the last shade
    #[inline]
    pub fn lights(&self) -> &Texture2D<Vec3> {
        &self.lights
    }
}

impl std::fmt::Debug for DeferredShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredShader")
            .field("model", &self.model.name())
            .field("lights", &self.lights.dimensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relights_math::Vec4;

    fn flat_gbuffer(width: u32, height: u32) -> GBuffer {
        let mut gbuffer = GBuffer::new(width, height);
        gbuffer.albedo.clear(Vec3::splat(0.5));
        gbuffer.specular_roughness.clear(Vec4::new(0.04, 0.04, 0.04, 0.5));
        gbuffer.normal_depth.clear(Vec4::new(0.0, 0.0, 1.0, 10.0));
        gbuffer.world_position = Texture2D::from_fn(width, height, |x, y| {
            Vec3::new(x as f32, y as f32, -10.0)
        });
        gbuffer
    }

    #[test]
    fn test_surface_terms() {
        let s = SurfaceData::new(
            Vec3::ONE,
            Vec3::new(0.0, 2.0, 0.0),
            5.0,
            Vec3::ZERO,
            Vec3::ZERO,
            0.5,
            Vec3::new(0.0, 0.0, 3.0),
        );
        assert_eq!(s.normal, Vec3::Y);
        assert_eq!(s.view_dir, Vec3::Z);
        assert_relative_eq!(s.roughness2, 0.25);
        assert_relative_eq!(s.roughness2_minus_one, -0.75);
        assert_relative_eq!(s.normalization_term, 4.0);
    }

    #[test]
    fn test_background_has_no_surface() {
        let mut gbuffer = flat_gbuffer(2, 1);
        gbuffer.normal_depth.set(1, 0, Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert!(SurfaceData::from_gbuffer(&gbuffer, 0, 0, Vec3::ZERO, 100.0).is_some());
        assert!(SurfaceData::from_gbuffer(&gbuffer, 1, 0, Vec3::ZERO, 100.0).is_none());
    }

    #[test]
    fn test_brdf_light_in_front_and_behind() {
        let surface = SurfaceData::new(
            Vec3::ONE,
            Vec3::Z,
            10.0,
            Vec3::ZERO,
            Vec3::ZERO,
            0.5,
            Vec3::new(0.0, 0.0, 10.0),
        );
        let front = GpuLight::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ONE, 10.0);
        let behind = GpuLight::new(Vec3::new(0.0, 0.0, -2.0), Vec3::ONE, 10.0);
        let far_away = GpuLight::new(Vec3::new(0.0, 0.0, 20.0), Vec3::ONE, 10.0);

        let lit = SimpleBrdf.shade(&surface, &front);
        assert_relative_eq!(lit.x, 0.25, epsilon = 1e-5);
        assert_eq!(SimpleBrdf.shade(&surface, &behind), Vec3::ZERO);
        assert_eq!(SimpleBrdf.shade(&surface, &far_away), Vec3::ZERO);
    }

    #[test]
    fn test_shade_uses_tile_lists() {
        let gbuffer = flat_gbuffer(32, 16);
        let grid = TileGrid::new(32, 16, 16);
        let lights = [GpuLight::new(Vec3::new(8.0, 8.0, -8.0), Vec3::ONE, 20.0)];

        // Only the left tile lists the light
        let tile_data = [TileData { offset: 0, count: 1 }, TileData::default()];
        let indices = [0u32];

        let mut shader = DeferredShader::new(Arc::new(SimpleBrdf));
        let result = shader.shade(
            ShadeInputs {
                gbuffer: &gbuffer,
                grid: &grid,
                tile_data: &tile_data,
                light_indices: &indices,
                visible_lights: &lights,
                camera_position: Vec3::new(16.0, 8.0, 10.0),
                far: 100.0,
            },
            false,
        );

        assert_eq!(result.surface_pixels, 32 * 16);
        assert_eq!(result.light_evaluations, 16 * 16);
        assert!(shader.lights().get(8, 8).unwrap().x > 0.0);
        assert_eq!(shader.lights().get(24, 8).unwrap(), Vec3::ZERO);
    }

    #[test]
    fn test_composite_without_lighting_is_base() {
        let mut shader = DeferredShader::new(Arc::new(SimpleBrdf));
        let gbuffer = flat_gbuffer(8, 8);
        let grid = TileGrid::new(8, 8, 16);
        shader.shade(
            ShadeInputs {
                gbuffer: &gbuffer,
                grid: &grid,
                tile_data: &[TileData::default()],
                light_indices: &[],
                visible_lights: &[],
                camera_position: Vec3::ZERO,
                far: 100.0,
            },
            true,
        );

        let base = Texture2D::from_fn(16, 16, |x, y| Vec3::new(x as f32, y as f32, 1.0));
        let mut output = Texture2D::default();
        shader.composite(&base, &mut output);
        assert_eq!(output, base);
    }
}
