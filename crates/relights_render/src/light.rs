//! Point light data
//!
//! Scene-side [`PointLight`] description and the packed [`GpuLight`] record
//! the culling, binning and shading stages consume.
//!
//! # Attenuation
//!
//! Falloff is inverse-square, windowed so it fades smoothly to zero between
//! 80% of the range and the range itself:
//!
//! ```text
//! x = 1 / max(1e-4, range²)
//! y = range² / (range² - (0.8 * range)²)
//! falloff(d²) = 1 / max(d², 1e-4) * saturate((1 - d² * x) * y)
//! ```

use relights_math::consts::MIN_DISTANCE_SQR;
use relights_math::{saturate, Vec3};
use serde::{Deserialize, Serialize};

/// Fraction of the range where the attenuation window starts fading
pub const FADE_START: f32 = 0.8;

/// Scene-side point light
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    /// World position
    pub position: Vec3,
    /// Linear RGB color
    pub color: Vec3,
    /// Scalar intensity applied to color
    pub intensity: f32,
    /// Radius of influence
    pub range: f32,
    /// Disabled lights stay registered but are not uploaded
    pub enabled: bool,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            enabled: true,
        }
    }
}

impl PointLight {
    /// Create a white light
    pub fn new(position: Vec3, range: f32) -> Self {
        Self {
            position,
            range,
            ..Default::default()
        }
    }

    /// Set color
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// Set intensity
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Check the light can contribute anything
    pub fn is_valid(&self) -> bool {
        self.range.is_finite() && self.range > 0.0 && self.position.is_finite()
    }

    /// Pack into the GPU record
    pub fn to_gpu(&self) -> GpuLight {
        GpuLight::new(
            self.position,
            (self.color * self.intensity).max(Vec3::ZERO),
            self.range,
        )
    }
}

/// Packed light record
///
/// Matches the shader-side layout: two `float4` rows followed by the
/// attenuation pair and padding (48 bytes).
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
    bytemuck::Pod,
    bytemuck::Zeroable,
)]
pub struct GpuLight {
    /// World position
    pub position: [f32; 3],
    /// Range squared
    pub range_sqr: f32,
    /// Color pre-multiplied by intensity
    pub color: [f32; 3],
    /// Range (sphere radius for culling)
    pub range: f32,
    /// Precomputed window terms `[1 / range², range² / (range² - fade²)]`
    pub attenuation: [f32; 2],
    /// Padding
    pub _pad: [f32; 2],
}

impl GpuLight {
    /// Size in bytes
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Create a record from world position, scaled color and range
    pub fn new(position: Vec3, color: Vec3, range: f32) -> Self {
        let range = range.max(0.0);
        Self {
            position: position.to_array(),
            range_sqr: range * range,
            color: color.to_array(),
            range,
            attenuation: attenuation_terms(range),
            _pad: [0.0; 2],
        }
    }

    /// World position
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Scaled color
    #[inline]
    pub fn color(&self) -> Vec3 {
        Vec3::from_array(self.color)
    }

    /// Distance attenuation at a squared distance
    #[inline]
    pub fn attenuation_at(&self, distance_sqr: f32) -> f32 {
        distance_attenuation(distance_sqr, self.attenuation)
    }
}

/// Window terms for a light range
pub fn attenuation_terms(range: f32) -> [f32; 2] {
    let range_sqr = range * range;
    let fade = FADE_START * range;
    let fade_sqr = fade * fade;
    let window = range_sqr - fade_sqr;

    [
        1.0 / range_sqr.max(MIN_DISTANCE_SQR),
        if window > 0.0 { range_sqr / window } else { 0.0 },
    ]
}

/// Windowed inverse-square falloff
#[inline]
pub fn distance_attenuation(distance_sqr: f32, attenuation: [f32; 2]) -> f32 {
    let inverse_square = 1.0 / distance_sqr.max(MIN_DISTANCE_SQR);
    let window = saturate((1.0 - distance_sqr * attenuation[0]) * attenuation[1]);
    inverse_square * window
}
