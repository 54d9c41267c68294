//! # relights_math - Culling Geometry
//!
//! Geometry primitives for light culling and tiled light assignment:
//! - Half-space planes and sphere tests
//! - Six-plane camera frustums extracted from a view-projection matrix
//! - Four-plane view-space tile frustums
//! - A perspective camera with screen <-> view space conversions
//!
//! Vectors and matrices come from `glam`; this crate only adds the
//! culling-specific types on top.

pub mod bounds;
pub mod camera;
pub mod frustum;

pub use bounds::Sphere;
pub use camera::{unproject_pixel, Camera};
pub use frustum::{FrustumPlanes, Plane, TileFrustum};

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

/// Common math constants
pub mod consts {
    pub const EPSILON: f32 = 1e-6;
    /// Smallest squared distance used by inverse-square falloff
    pub const MIN_DISTANCE_SQR: f32 = 1e-4;
}

/// Clamp to [0, 1]
#[inline]
pub fn saturate(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Linear interpolation
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Integer division rounding up, used for tile grid sizing
#[inline]
pub fn div_ceil(value: u32, divisor: u32) -> u32 {
    value / divisor + u32::from(value % divisor != 0)
}

pub mod prelude {
    pub use crate::bounds::Sphere;
    pub use crate::camera::{unproject_pixel, Camera};
    pub use crate::frustum::{FrustumPlanes, Plane, TileFrustum};
    pub use crate::{div_ceil, lerp, saturate};
    pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_ceil() {
        assert_eq!(div_ceil(1920, 16), 120);
        assert_eq!(div_ceil(1080, 16), 68);
        assert_eq!(div_ceil(16, 16), 1);
        assert_eq!(div_ceil(17, 16), 2);
        assert_eq!(div_ceil(u32::MAX, 1), u32::MAX);
        assert_eq!(div_ceil(u32::MAX, 16), u32::MAX / 16 + 1);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(-1.0), 0.0);
        assert_eq!(saturate(0.25), 0.25);
        assert_eq!(saturate(3.0), 1.0);
    }
}
