//! Perspective camera
//!
//! Right-handed view space (camera looks down `-Z`), 0..1 clip depth.
//! Screen coordinates are pixels with the origin at the top-left corner.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

use crate::frustum::FrustumPlanes;

/// Perspective camera description
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// World orientation (identity looks down -Z with +Y up)
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width / height
    pub aspect: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Create a camera at `position` with the given projection
    pub fn new(position: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y,
            aspect,
            near,
            far,
        }
    }

    /// Orient the camera toward `target`
    pub fn look_at(mut self, target: Vec3, up: Vec3) -> Self {
        let forward = (target - self.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return self;
        }
        let mut right = forward.cross(up);
        if right.length_squared() < 1e-12 {
            right = forward.any_orthonormal_vector();
        }
        let right = right.normalize();
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward));
        self
    }

    /// Set aspect ratio from a render size
    pub fn with_aspect_from_size(mut self, width: u32, height: u32) -> Self {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
        self
    }

    /// Camera-to-world matrix
    #[inline]
    pub fn camera_to_world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// World-to-camera (view) matrix
    #[inline]
    pub fn view(&self) -> Mat4 {
        self.camera_to_world().inverse()
    }

    /// Projection matrix
    #[inline]
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Inverse projection matrix
    #[inline]
    pub fn inverse_projection(&self) -> Mat4 {
        self.projection().inverse()
    }

    /// Combined projection * view
    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// Six world-space culling planes
    pub fn frustum(&self) -> FrustumPlanes {
        FrustumPlanes::from_view_projection(&self.view_projection())
    }

    /// Forward direction in world space
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Positive view depth of a world-space point
    #[inline]
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.view().transform_point3(world).z
    }

    /// Unproject a pixel position to a point on the far plane in view space
    #[inline]
    pub fn unproject_to_view(&self, pixel: Vec2, width: u32, height: u32) -> Vec3 {
        unproject_pixel(&self.inverse_projection(), pixel, width, height)
    }

    /// Normalized view-space ray through a pixel
    pub fn view_ray(&self, pixel: Vec2, width: u32, height: u32) -> Vec3 {
        self.unproject_to_view(pixel, width, height).normalize_or_zero()
    }

    /// Normalized world-space ray through a pixel
    pub fn world_ray(&self, pixel: Vec2, width: u32, height: u32) -> Vec3 {
        (self.rotation * self.view_ray(pixel, width, height)).normalize_or_zero()
    }

    /// World-space ray through the center of pixel `(px, py)`
    #[inline]
    pub fn screen_ray(&self, px: u32, py: u32, width: u32, height: u32) -> Vec3 {
        self.world_ray(Vec2::new(px as f32 + 0.5, py as f32 + 0.5), width, height)
    }

    /// Project a world-space point to pixel coordinates
    ///
    /// Returns `None` for points behind the camera.
    pub fn world_to_screen(&self, world: Vec3, width: u32, height: u32) -> Option<Vec2> {
        let clip = self.view_projection() * world.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * width as f32,
            (1.0 - ndc.y) * 0.5 * height as f32,
        ))
    }
}

/// Unproject a pixel position to the far plane through an inverse projection
///
/// Pixels are measured from the top-left corner; the result is in view
/// space.
pub fn unproject_pixel(inverse_projection: &Mat4, pixel: Vec2, width: u32, height: u32) -> Vec3 {
    let ndc_x = pixel.x / width.max(1) as f32 * 2.0 - 1.0;
    let ndc_y = 1.0 - pixel.y / height.max(1) as f32 * 2.0;
    inverse_projection.project_point3(Vec3::new(ndc_x, ndc_y, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let camera = Camera::default();
        assert_relative_eq!(camera.forward().z, -1.0);
        assert_relative_eq!(camera.view_depth(Vec3::new(0.0, 0.0, -7.0)), 7.0);
    }

    #[test]
    fn test_center_ray_is_forward() {
        let camera = Camera::default();
        let ray = camera.view_ray(Vec2::new(960.0, 540.0), 1920, 1080);
        assert_relative_eq!(ray.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ray.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ray.z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_unproject_corners_reach_far_plane() {
        let camera = Camera::new(Vec3::ZERO, 90f32.to_radians(), 2.0, 0.1, 50.0);
        let inverse = camera.inverse_projection();

        let top_left = unproject_pixel(&inverse, Vec2::ZERO, 200, 100);
        assert_relative_eq!(top_left.z, -50.0, epsilon = 0.05);
        assert_relative_eq!(top_left.x, -100.0, epsilon = 0.05);
        assert_relative_eq!(top_left.y, 50.0, epsilon = 0.05);

        let pixel = Vec2::new(37.0, 81.0);
        assert_eq!(
            camera.unproject_to_view(pixel, 200, 100),
            unproject_pixel(&inverse, pixel, 200, 100)
        );
    }

    #[test]
    fn test_screen_round_trip() {
        let camera =
            Camera::new(Vec3::new(0.0, 2.0, 10.0), 60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0)
                .look_at(Vec3::ZERO, Vec3::Y);

        let pixel = Vec2::new(300.0, 200.0);
        let ray = camera.world_ray(pixel, 1920, 1080);
        let point = camera.position + ray * 25.0;
        let projected = camera.world_to_screen(point, 1920, 1080).unwrap();

        assert_relative_eq!(projected.x, pixel.x, epsilon = 0.05);
        assert_relative_eq!(projected.y, pixel.y, epsilon = 0.05);
    }

    #[test]
    fn test_screen_ray_samples_pixel_center() {
        let camera = Camera::default().look_at(Vec3::new(3.0, -1.0, -10.0), Vec3::Y);
        let ray = camera.screen_ray(100, 40, 640, 480);
        let expected = camera.world_ray(Vec2::new(100.5, 40.5), 640, 480);
        assert_relative_eq!(ray.dot(expected), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_point_behind_camera_not_projected() {
        let camera = Camera::default();
        assert!(camera.world_to_screen(Vec3::new(0.0, 0.0, 5.0), 640, 480).is_none());
    }

    #[test]
    fn test_look_at_target_is_centered() {
        let target = Vec3::new(3.0, 1.0, -4.0);
        let camera = Camera::new(Vec3::new(-2.0, 5.0, 6.0), 1.0, 1.0, 0.1, 100.0)
            .look_at(target, Vec3::Y);
        let pixel = camera.world_to_screen(target, 800, 800).unwrap();
        assert_relative_eq!(pixel.x, 400.0, epsilon = 0.01);
        assert_relative_eq!(pixel.y, 400.0, epsilon = 0.01);
    }
}
