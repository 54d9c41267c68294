//! Frustum culling types
//!
//! Provides structured plane and frustum types for light culling:
//! - [`Plane`]: signed-distance half-space, `normal·p + distance >= 0` is inside
//! - [`FrustumPlanes`]: the six camera planes extracted from a view-projection matrix
//! - [`TileFrustum`]: four side planes of one screen tile, in view space
//!
//! All sphere tests are conservative: a sphere is rejected only when it lies
//! entirely behind at least one plane. Spheres near frustum corners can pass
//! every plane individually while missing the volume; callers treat such
//! results as "may be visible".

use glam::{Mat4, Vec3, Vec4};

/// Plane in 3D space (ax + by + cz + d = 0)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    /// Plane normal (unit vector, pointing into the inside half-space)
    pub normal: Vec3,
    /// Signed offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    ///
    /// Both are rescaled so the normal has unit length.
    #[inline]
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.length();
        if len > 1e-10 {
            Self {
                normal: normal / len,
                distance: distance / len,
            }
        } else {
            Self::default()
        }
    }

    /// Create a plane from packed `(a, b, c, d)` coefficients
    #[inline]
    pub fn from_vec4(coefficients: Vec4) -> Self {
        Self::new(coefficients.truncate(), coefficients.w)
    }

    /// Signed distance from a point to the plane (positive = inside)
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Sphere-vs-half-space test: false only when the sphere is fully outside
    #[inline]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.distance_to_point(center) + radius >= 0.0
    }

    /// Flip the plane so `point` lies on its inside
    pub fn oriented_towards(self, point: Vec3) -> Self {
        if self.distance_to_point(point) < 0.0 {
            Self {
                normal: -self.normal,
                distance: -self.distance,
            }
        } else {
            self
        }
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
        }
    }
}

/// Camera view frustum
///
/// The six planes are: left, right, bottom, top, near, far.
/// All planes have normals pointing inward (toward the visible region).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrustumPlanes {
    /// Frustum planes (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl FrustumPlanes {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb/Hartmann extraction for a 0..1 clip depth range, so the near
    /// plane is row 2 alone rather than `row3 + row2`.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                Plane::from_vec4(r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    /// Quick visibility test: `dot(n, c) + d + r >= 0` for every plane
    #[inline]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.intersects_sphere(center, radius))
    }

}

impl Default for FrustumPlanes {
    fn default() -> Self {
        Self {
            planes: [Plane::default(); 6],
        }
    }
}

/// Side planes of a single screen tile in view space
///
/// Every plane passes through the camera origin, so `distance` is zero.
/// Near and far bounds are handled separately through depth ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileFrustum {
    /// Planes (top, right, bottom, left)
    pub planes: [Plane; 4],
}

impl TileFrustum {
    pub const TOP: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const LEFT: usize = 3;

    /// Build a tile frustum from four view-space corner points
    ///
    /// Corners are given in screen order: top-left, top-right,
    /// bottom-right, bottom-left. Each plane contains the origin and one
    /// edge of the corner quad, and is oriented toward the quad's centroid.
    pub fn from_view_corners(corners: [Vec3; 4]) -> Self {
        let centroid = (corners[0] + corners[1] + corners[2] + corners[3]) * 0.25;

        let plane = |a: Vec3, b: Vec3| Plane::new(a.cross(b), 0.0).oriented_towards(centroid);

        Self {
            planes: [
                plane(corners[0], corners[1]),
                plane(corners[1], corners[2]),
                plane(corners[2], corners[3]),
                plane(corners[3], corners[0]),
            ],
        }
    }

    /// Conservative sphere test against the four side planes
    #[inline]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.intersects_sphere(center, radius))
    }

    /// Sphere test additionally bounded by a view depth slice
    ///
    /// Depth is positive distance along the view direction (`-z`).
    #[inline]
    pub fn intersects_sphere_in_depth_range(
        &self,
        center: Vec3,
        radius: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> bool {
        let depth = -center.z;
        if depth + radius < min_depth || depth - radius > max_depth {
            return false;
        }
        self.intersects_sphere(center, radius)
    }
}

impl Default for TileFrustum {
    fn default() -> Self {
        Self {
            planes: [Plane::default(); 4],
        }
    }
}
