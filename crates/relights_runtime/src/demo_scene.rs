//! Demo Scene
//!
//! A ray-cast room (checkered floor and a back wall) standing in for a real
//! geometry pass, plus a field of randomly placed point lights.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relights_math::{Camera, Vec2, Vec3, Vec4};
use relights_render::{GBuffer, LightId, LightRegistry, PointLight, Texture2D};

use crate::boot_config::SceneConfig;

const WALL_Z: f32 = -12.0;
const AMBIENT: f32 = 0.04;

/// Light that circles the scene's vertical axis
#[derive(Debug, Clone, Copy)]
struct Orbit {
    id: LightId,
    radius: f32,
    height: f32,
    phase: f32,
    speed: f32,
}

/// Camera, G-buffer and lights for the demo
pub struct DemoScene {
    pub camera: Camera,
    pub gbuffer: GBuffer,
    pub base_color: Texture2D<Vec3>,
    pub registry: LightRegistry,
    orbits: Vec<Orbit>,
    animate: bool,
}

impl DemoScene {
    /// Build the scene
    ///
    /// The G-buffer is rendered at `internal` resolution and the base
    /// color at the full output resolution.
    pub fn new(config: &SceneConfig, internal: (u32, u32)) -> Self {
        let (width, height) = config.resolution;
        let camera = Camera::new(Vec3::new(0.0, 7.0, 18.0), 55f32.to_radians(), 1.0, 0.1, 200.0)
            .with_aspect_from_size(width, height)
            .look_at(Vec3::new(0.0, 1.0, -2.0), Vec3::Y);

        let gbuffer = render_gbuffer(&camera, internal.0, internal.1);
        let base_color = Texture2D::from_fn(width, height, |x, y| {
            trace(&camera, x, y, width, height).map_or(Vec3::ZERO, |hit| hit.albedo * AMBIENT)
        });

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut registry = LightRegistry::with_capacity(config.lights as usize);
        let (min_range, max_range) = config.light_range;
        let orbits = (0..config.lights)
            .map(|_| {
                let radius = rng.gen_range(0.5f32..14.0);
                let height = rng.gen_range(0.3f32..3.0);
                let phase = rng.gen_range(0.0..std::f32::consts::TAU);
                let color = Vec3::new(
                    rng.gen_range(0.2..1.0),
                    rng.gen_range(0.2..1.0),
                    rng.gen_range(0.2..1.0),
                );
                let range = if max_range > min_range {
                    rng.gen_range(min_range..max_range)
                } else {
                    min_range
                };

                let light = PointLight::new(orbit_position(radius, height, phase), range)
                    .with_color(color)
                    .with_intensity(rng.gen_range(1.0..4.0));
                Orbit {
                    id: registry.add(light),
                    radius,
                    height,
                    phase,
                    speed: rng.gen_range(-0.05..0.05),
                }
            })
            .collect();

        log::info!(
            "Demo scene: {} lights, G-buffer {}x{}, output {}x{}",
            config.lights,
            internal.0,
            internal.1,
            width,
            height
        );

        Self {
            camera,
            gbuffer,
            base_color,
            registry,
            orbits,
            animate: config.animate,
        }
    }

    /// Move lights to their positions for `frame`
    pub fn update(&mut self, frame: u32) {
        if !self.animate {
            return;
        }
        for orbit in &self.orbits {
            let angle = orbit.phase + orbit.speed * frame as f32;
            self.registry
                .set_position(orbit.id, orbit_position(orbit.radius, orbit.height, angle));
        }
    }
}

fn orbit_position(radius: f32, height: f32, angle: f32) -> Vec3 {
    let (s, c) = angle.sin_cos();
    Vec3::new(c * radius, height, s * radius * 0.8 - 1.0)
}

struct Hit {
    position: Vec3,
    normal: Vec3,
    albedo: Vec3,
}

fn trace(camera: &Camera, x: u32, y: u32, width: u32, height: u32) -> Option<Hit> {
    let ray = camera.world_ray(Vec2::new(x as f32 + 0.5, y as f32 + 0.5), width, height);
    let origin = camera.position;

    let floor = (ray.y < -1e-6).then(|| -origin.y / ray.y);
    let wall = (ray.z < -1e-6).then(|| (WALL_Z - origin.z) / ray.z);

    let (t, normal) = match (floor, wall) {
        (Some(f), Some(w)) if w < f => (w, Vec3::Z),
        (Some(f), _) => (f, Vec3::Y),
        (None, Some(w)) => (w, Vec3::Z),
        (None, None) => return None,
    };
    let position = origin + ray * t;

    let albedo = if normal == Vec3::Y {
        let checker = ((position.x * 0.5).floor() as i32 + (position.z * 0.5).floor() as i32) & 1;
        if checker == 0 {
            Vec3::splat(0.8)
        } else {
            Vec3::splat(0.35)
        }
    } else if (position.y * 2.0).floor() as i32 & 1 == 0 {
        Vec3::new(0.75, 0.6, 0.45)
    } else {
        Vec3::new(0.65, 0.5, 0.4)
    };

    Some(Hit {
        position,
        normal,
        albedo,
    })
}

/// Ray-cast the room into a G-buffer
pub fn render_gbuffer(camera: &Camera, width: u32, height: u32) -> GBuffer {
    let mut gbuffer = GBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let Some(hit) = trace(camera, x, y, width, height) else {
                continue;
            };
            let depth = camera.view_depth(hit.position);
            if depth >= camera.far {
                continue;
            }
            gbuffer.albedo.set(x, y, hit.albedo);
            gbuffer.specular_roughness.set(x, y, Vec4::new(0.04, 0.04, 0.04, 0.4));
            gbuffer.world_position.set(x, y, hit.position);
            gbuffer.normal_depth.set(x, y, hit.normal.extend(depth));
        }
    }
    gbuffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SceneConfig {
        SceneConfig {
            resolution: (64, 36),
            lights: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_gbuffer_at_internal_resolution() {
        let scene = DemoScene::new(&config(), (32, 18));
        assert_eq!(scene.gbuffer.dimensions(), (32, 18));
        assert_eq!(scene.base_color.dimensions(), (64, 36));
        assert_eq!(scene.registry.len(), 16);
    }

    #[test]
    fn test_center_pixel_hits_geometry() {
        let scene = DemoScene::new(&config(), (32, 18));
        let depth = scene.gbuffer.depth(16, 9);
        assert!(depth > 0.0 && depth < scene.camera.far);
    }

    #[test]
    fn test_update_moves_lights() {
        let mut scene = DemoScene::new(&config(), (32, 18));
        let before = scene.registry.revision();
        scene.update(5);
        assert!(scene.registry.revision() > before);
    }

    #[test]
    fn test_same_seed_same_lights() {
        let a = DemoScene::new(&config(), (8, 8));
        let b = DemoScene::new(&config(), (8, 8));
        assert_eq!(a.registry.lights(), b.registry.lights());
    }
}
