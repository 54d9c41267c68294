//! Frame buffers
//!
//! CPU stand-ins for the GPU resources the stages share:
//! - [`AppendBuffer`]: atomic reserve-slot-then-write index buffer
//! - [`LightDataBuffer`]: packed lights uploaded from the registry
//! - [`TileData`]: per-tile `(offset, count)` into the light index buffer
//!
//! All buffers are grow-only. Storage is sized for the largest
//! configuration seen this session and reused frame to frame.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::light::GpuLight;
use crate::registry::LightRegistry;

/// Append-only `u32` buffer shared by parallel writers
///
/// Writers reserve slots with an atomic `fetch_add` on a shared counter and
/// then store into the reserved slots. Reservations past the limit are
/// dropped and counted, never wrapped. Counter resets take `&mut self`, so
/// a reset always happens-before the next frame's appends.
#[derive(Debug, Default)]
pub struct AppendBuffer {
    slots: Vec<AtomicU32>,
    limit: usize,
    counter: AtomicU32,
    dropped: AtomicU32,
}

impl AppendBuffer {
    /// Create with a fixed initial limit
    pub fn new(limit: usize) -> Self {
        let mut buffer = Self::default();
        buffer.prepare(limit);
        buffer
    }

    /// Reset the counters and set the limit for a new frame
    ///
    /// Storage grows when the limit exceeds it and never shrinks. Returns
    /// true when storage was reallocated.
    pub fn prepare(&mut self, limit: usize) -> bool {
        let grew = limit > self.slots.len();
        if grew {
            self.slots.resize_with(limit, || AtomicU32::new(0));
        }
        self.limit = limit;
        *self.counter.get_mut() = 0;
        *self.dropped.get_mut() = 0;
        grew
    }

    /// Append a single value
    ///
    /// Returns false when the buffer is full.
    #[inline]
    pub fn push(&self, value: u32) -> bool {
        match self.reserve(1) {
            Some(range) if !range.is_empty() => {
                self.slots[range.start].store(value, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Reserve a contiguous run of up to `count` slots
    ///
    /// The returned range may be shorter than requested when the buffer
    /// runs out; the shortfall is counted as dropped. `None` when no slot
    /// could be reserved at all.
    pub fn reserve(&self, count: usize) -> Option<Range<usize>> {
        if count == 0 {
            return Some(0..0);
        }
        let start = self.counter.fetch_add(count as u32, Ordering::Relaxed) as usize;
        let end = (start + count).min(self.limit);
        if end < start + count {
            let granted = end.saturating_sub(start);
            self.dropped
                .fetch_add((count - granted) as u32, Ordering::Relaxed);
        }
        if start >= end {
            return None;
        }
        Some(start..end)
    }

    /// Store into a previously reserved slot
    #[inline]
    pub fn write(&self, slot: usize, value: u32) {
        self.slots[slot].store(value, Ordering::Relaxed);
    }

    /// Read a slot
    #[inline]
    pub fn get(&self, slot: usize) -> Option<u32> {
        if slot < self.len() {
            Some(self.slots[slot].load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Number of values stored
    #[inline]
    pub fn len(&self) -> usize {
        (self.counter.load(Ordering::Relaxed) as usize).min(self.limit)
    }

    /// Check if nothing was appended
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical capacity for this frame
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Allocated storage
    #[inline]
    pub fn storage(&self) -> usize {
        self.slots.len()
    }

    /// Values rejected since the last reset
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Check if any append was rejected
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.dropped() > 0
    }

    /// Copy stored values out
    pub fn copy_to(&self, out: &mut Vec<u32>) {
        out.clear();
        out.extend(
            self.slots[..self.len()]
                .iter()
                .map(|slot| slot.load(Ordering::Relaxed)),
        );
    }
}

/// Per-tile slice of the light index buffer
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bytemuck::Pod,
    bytemuck::Zeroable,
)]
pub struct TileData {
    /// First index in the light index buffer
    pub offset: u32,
    /// Number of lights in the tile
    pub count: u32,
}

impl TileData {
    /// Index range in the light index buffer
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset as usize..(self.offset + self.count) as usize
    }
}

/// Result of a registry upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// Enabled lights in the registry
    pub requested: u32,
    /// Lights written to the buffer
    pub uploaded: u32,
    /// Lights dropped over capacity
    pub truncated: u32,
    /// Upload was skipped because nothing changed
    pub reused: bool,
}

/// Packed lights uploaded from a [`LightRegistry`]
///
/// Holds at most `max_lights` records. When more lights are enabled, the
/// earliest registrations are kept and the rest dropped. Repeated uploads
/// of an unchanged registry are skipped.
#[derive(Clone, Debug, Default)]
pub struct LightDataBuffer {
    lights: Vec<GpuLight>,
    capacity: usize,
    last_revision: Option<u64>,
    last_result: UploadResult,
}

impl LightDataBuffer {
    /// Create with a light capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            lights: Vec::with_capacity(capacity),
            capacity,
            last_revision: None,
            last_result: UploadResult::default(),
        }
    }

    /// Change the capacity; forces the next upload
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity != self.capacity {
            self.capacity = capacity;
            self.last_revision = None;
            if capacity > self.lights.capacity() {
                self.lights.reserve(capacity - self.lights.len());
            }
        }
    }

    /// Pack enabled lights from the registry
    pub fn upload(&mut self, registry: &LightRegistry) -> UploadResult {
        if self.last_revision == Some(registry.revision()) {
            return UploadResult {
                reused: true,
                ..self.last_result
            };
        }

        self.lights.clear();
        let mut requested = 0u32;
        for light in registry.lights() {
            if !light.enabled || !light.is_valid() {
                continue;
            }
            requested += 1;
            if self.lights.len() < self.capacity {
                self.lights.push(light.to_gpu());
            }
        }

        let uploaded = self.lights.len() as u32;
        let result = UploadResult {
            requested,
            uploaded,
            truncated: requested - uploaded,
            reused: false,
        };

        if result.truncated > 0 {
            log::debug!(
                "Light buffer full: {} of {} enabled lights uploaded, {} dropped",
                uploaded,
                requested,
                result.truncated
            );
        }

        self.last_revision = Some(registry.revision());
        self.last_result = result;
        result
    }

    /// Uploaded lights
    #[inline]
    pub fn lights(&self) -> &[GpuLight] {
        &self.lights
    }

    /// Light capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Result of the last upload
    #[inline]
    pub fn last_result(&self) -> UploadResult {
        self.last_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::PointLight;
    use rayon::prelude::*;
    use relights_math::Vec3;

    #[test]
    fn test_append_within_limit() {
        let buffer = AppendBuffer::new(4);
        assert!(buffer.push(7));
        assert!(buffer.push(9));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.get(1), Some(9));
        assert_eq!(buffer.get(2), None);
        assert!(!buffer.overflowed());
    }

    #[test]
    fn test_append_overflow_drops() {
        let buffer = AppendBuffer::new(2);
        assert!(buffer.push(1));
        assert!(buffer.push(2));
        assert!(!buffer.push(3));
        assert!(!buffer.push(4));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 2);
    }

    #[test]
    fn test_reserve_partial() {
        let buffer = AppendBuffer::new(5);
        assert_eq!(buffer.reserve(3), Some(0..3));
        assert_eq!(buffer.reserve(3), Some(3..5));
        assert_eq!(buffer.reserve(2), None);
        assert_eq!(buffer.dropped(), 3);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_prepare_resets_and_grows_only() {
        let mut buffer = AppendBuffer::new(8);
        buffer.push(1);
        assert!(!buffer.prepare(4));
        assert!(buffer.is_empty());
        assert_eq!(buffer.limit(), 4);
        assert_eq!(buffer.storage(), 8);

        assert!(buffer.prepare(16));
        assert_eq!(buffer.storage(), 16);
    }

    #[test]
    fn test_parallel_appends_are_unique() {
        let buffer = AppendBuffer::new(10_000);
        (0..10_000u32).into_par_iter().for_each(|i| {
            buffer.push(i);
        });

        let mut values = Vec::new();
        buffer.copy_to(&mut values);
        values.sort_unstable();
        assert_eq!(values, (0..10_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_upload_truncates_in_registration_order() {
        let mut registry = LightRegistry::new();
        for i in 0..5 {
            registry.add(PointLight::new(Vec3::new(i as f32, 0.0, 0.0), 1.0));
        }

        let mut buffer = LightDataBuffer::new(3);
        let result = buffer.upload(&registry);
        assert_eq!(result.uploaded, 3);
        assert_eq!(result.truncated, 2);

        let xs: Vec<f32> = buffer.lights().iter().map(|l| l.position[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_upload_skips_unchanged_registry() {
        let mut registry = LightRegistry::new();
        let id = registry.add(PointLight::new(Vec3::ZERO, 1.0));

        let mut buffer = LightDataBuffer::new(8);
        assert!(!buffer.upload(&registry).reused);
        assert!(buffer.upload(&registry).reused);

        registry.set_enabled(id, false);
        let result = buffer.upload(&registry);
        assert!(!result.reused);
        assert_eq!(result.uploaded, 0);
        assert!(buffer.lights().is_empty());
    }

    #[test]
    fn test_tile_data_range() {
        let tile = TileData { offset: 10, count: 3 };
        assert_eq!(tile.range(), 10..13);
        assert_eq!(core::mem::size_of::<TileData>(), 8);
    }
}
