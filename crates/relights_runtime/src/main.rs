//! Relights demo host
//!
//! Drives the tiled deferred lighting pipeline over a synthetic scene:
//! - Loads the boot configuration (file + environment)
//! - Ray-casts a G-buffer and scatters point lights
//! - Renders N frames, logging per-frame statistics
//! - Writes the last composited frame to a PNG
//!
//! Run with: cargo run -p relights_runtime
//!       or: cargo run --bin relights

mod boot_config;
mod demo_scene;

use std::path::Path;

use relights_math::Vec3;
use relights_render::{
    DeferredLightsPipeline, FrameInput, FrameStats, NamedTexture, StatsCollector, Texture2D,
};

use boot_config::BootConfig;
use demo_scene::DemoScene;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BootConfig::load();
    config.print_summary();

    let (width, height) = config.scene.resolution;
    let internal = config.pipeline.internal_resolution(width, height);
    let mut scene = DemoScene::new(&config.scene, internal);

    let mut pipeline = DeferredLightsPipeline::new(config.pipeline.clone());
    if let Some(err) = pipeline.init_error() {
        log::error!("Pipeline unavailable, frames will show the base color: {}", err);
    }

    let mut collector = StatsCollector::default();
    for frame in 0..config.scene.frames {
        scene.update(frame);

        let outcome = pipeline.render_frame(
            &scene.registry,
            &FrameInput {
                camera: &scene.camera,
                gbuffer: &scene.gbuffer,
                base_color: &scene.base_color,
            },
        );

        if let Some(err) = &outcome.error {
            if err.is_session_fatal() {
                break;
            }
            continue;
        }

        let interval = config.output.stats_interval;
        if interval > 0 && (frame + 1) % interval == 0 {
            log_frame(&outcome.stats);
        }
        collector.record(outcome.stats);
    }

    if collector.frames() > 0 {
        log_frame(collector.last());
        let average = collector.average();
        log::info!(
            "{} frames rendered, recent average {:.2} ms",
            collector.frames(),
            average.total_ms()
        );
        log::info!(
            "  upload {:.2}, cull {:.2}, tiles {:.2}, bin {:.2}, shade {:.2}, composite {:.2}",
            average.upload_ms,
            average.cull_ms,
            average.tiles_ms,
            average.bin_ms,
            average.shade_ms,
            average.composite_ms
        );
    }

    if let Some(path) = &config.output.path {
        save_png(pipeline.output(), path);
    }
    if let Some(path) = &config.output.heatmap_path {
        if let Some(heatmap) = pipeline.texture(NamedTexture::TileHeatmap) {
            save_png(heatmap, path);
        }
    }
}

fn log_frame(stats: &FrameStats) {
    log::info!(
        "Frame {}: {}/{} lights visible, grid {}x{}, {:.2} ms",
        stats.frame,
        stats.visible_lights,
        stats.registered_lights,
        stats.grid.0,
        stats.grid.1,
        stats.timings.total_ms()
    );
    log::info!(
        "  {} lit tiles (avg {:.1}, max {}), {} evaluations",
        stats.tiles_with_lights,
        stats.average_tile_lights(),
        stats.max_tile_lights,
        stats.light_evaluations
    );
    if stats.truncated() {
        log::info!(
            "  Truncated: {} at upload, {} at cull, {} tile assignments",
            stats.upload_truncated,
            stats.cull_truncated,
            stats.dropped_assignments
        );
    }
}

/// Tonemap (clamp + gamma) and write an RGB PNG
fn save_png(texture: &Texture2D<Vec3>, path: &Path) {
    let (width, height) = texture.dimensions();
    if width == 0 || height == 0 {
        log::warn!("Nothing to write to {}", path.display());
        return;
    }

    let encode = |c: f32| (c.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0 + 0.5) as u8;
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        let color = texture.get(x, y).unwrap_or(Vec3::ZERO);
        image::Rgb([encode(color.x), encode(color.y), encode(color.z)])
    });

    match image.save(path) {
        Ok(()) => log::info!("Wrote {}x{} image to {}", width, height, path.display()),
        Err(e) => log::error!("Failed to write {}: {}", path.display(), e),
    }
}
