//! Frame Statistics
//!
//! Per-frame counters and stage timings for the deferred lighting
//! pipeline, plus a rolling average over recent frames.
//!
//! # Example
//!
//! ```ignore
//! let outcome = pipeline.render_frame(&registry, &input);
//! collector.record(outcome.stats.clone());
//! log::info!("avg total: {:.2} ms", collector.average().total_ms());
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default averaging window in frames
pub const DEFAULT_STATS_WINDOW: usize = 60;

/// Time spent in each stage (milliseconds)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub upload_ms: f32,
    pub cull_ms: f32,
    pub tiles_ms: f32,
    pub bin_ms: f32,
    pub shade_ms: f32,
    pub composite_ms: f32,
}

impl StageTimings {
    /// Sum of all stages
    pub fn total_ms(&self) -> f32 {
        self.upload_ms
            + self.cull_ms
            + self.tiles_ms
            + self.bin_ms
            + self.shade_ms
            + self.composite_ms
    }

    fn add(&mut self, other: &StageTimings) {
        self.upload_ms += other.upload_ms;
        self.cull_ms += other.cull_ms;
        self.tiles_ms += other.tiles_ms;
        self.bin_ms += other.bin_ms;
        self.shade_ms += other.shade_ms;
        self.composite_ms += other.composite_ms;
    }

    fn scale(&mut self, factor: f32) {
        self.upload_ms *= factor;
        self.cull_ms *= factor;
        self.tiles_ms *= factor;
        self.bin_ms *= factor;
        self.shade_ms *= factor;
        self.composite_ms *= factor;
    }
}

/// Statistics for one frame
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Frame number
    pub frame: u64,

    // === Lights ===
    /// Lights in the registry
    pub registered_lights: u32,
    /// Lights written to the light buffer
    pub uploaded_lights: u32,
    /// Lights in the visible list
    pub visible_lights: u32,
    /// Enabled lights dropped at upload
    pub upload_truncated: u32,
    /// Visible lights dropped at culling
    pub cull_truncated: u32,

    // === Tiles ===
    /// Tile grid `(x, y)`
    pub grid: (u32, u32),
    /// Internal lighting resolution
    pub internal_resolution: (u32, u32),
    /// Light index entries written
    pub index_entries: u32,
    /// Tiles that hit a capacity limit
    pub overflowed_tiles: u32,
    /// Light assignments dropped over capacity
    pub dropped_assignments: u32,
    /// Tiles with at least one light
    pub tiles_with_lights: u32,
    /// Largest per-tile light count
    pub max_tile_lights: u32,
    /// Tile frustums were rebuilt this frame
    pub frustums_rebuilt: bool,

    // === Shading ===
    /// Light evaluations in the shading pass
    pub light_evaluations: u64,

    /// Stage timings
    pub timings: StageTimings,
}

impl FrameStats {
    /// Check if any capacity limit dropped data this frame
    pub fn truncated(&self) -> bool {
        self.upload_truncated > 0 || self.cull_truncated > 0 || self.dropped_assignments > 0
    }

    /// Average lights per lit tile
    pub fn average_tile_lights(&self) -> f32 {
        if self.tiles_with_lights == 0 {
            0.0
        } else {
            self.index_entries as f32 / self.tiles_with_lights as f32
        }
    }
}

/// Keeps the last frame and a rolling timing average
#[derive(Clone, Debug)]
pub struct StatsCollector {
    window: usize,
    history: VecDeque<StageTimings>,
    last: FrameStats,
    frames: u64,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_WINDOW)
    }
}

impl StatsCollector {
    /// Create with an averaging window
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
            last: FrameStats::default(),
            frames: 0,
        }
    }

    /// Record a finished frame
    pub fn record(&mut self, stats: FrameStats) {
        if self.history.len() >= self.window {
            self.history.pop_front();
        }
        self.history.push_back(stats.timings);
        self.last = stats;
        self.frames += 1;
    }

    /// Last recorded frame
    #[inline]
    pub fn last(&self) -> &FrameStats {
        &self.last
    }

    /// Frames recorded
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Mean stage timings over the window
    pub fn average(&self) -> StageTimings {
        let mut sum = StageTimings::default();
        if self.history.is_empty() {
            return sum;
        }
        for timings in &self.history {
            sum.add(timings);
        }
        sum.scale(1.0 / self.history.len() as f32);
        sum
    }

    /// Forget history
    pub fn reset(&mut self) {
        self.history.clear();
        self.last = FrameStats::default();
        self.frames = 0;
    }
}
