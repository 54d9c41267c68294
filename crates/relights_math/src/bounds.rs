//! Bounding volumes

use glam::{Mat4, Vec3};

/// Bounding sphere
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sphere {
    /// Center point
    pub center: Vec3,
    /// Radius (non-negative)
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere
    #[inline]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// Move the sphere into another space (rigid transforms only)
    #[inline]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            center: matrix.transform_point3(self.center),
            radius: self.radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_negative_radius_clamped() {
        let sphere = Sphere::new(Vec3::ZERO, -4.0);
        assert_eq!(sphere.radius, 0.0);
    }

    #[test]
    fn test_sphere_transformed_keeps_radius() {
        let sphere = Sphere::new(Vec3::ZERO, 3.0);
        let moved = sphere.transformed(&Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
        assert_eq!(moved.center, Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(moved.radius, 3.0);
    }

    #[test]
    fn test_sphere_into_view_space() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let sphere = Sphere::new(Vec3::new(2.0, 1.0, 0.0), 1.5).transformed(&view);
        assert!((sphere.center - Vec3::new(2.0, 1.0, -10.0)).length() < 1e-5);
        assert_eq!(sphere.radius, 1.5);
    }
}
