//! Frustum culling of uploaded lights
//!
//! Each light's range sphere is tested against the six camera planes in
//! parallel. Survivors are appended through an [`AppendBuffer`], so the
//! visible list comes out in no particular order.

use rayon::prelude::*;
use relights_math::FrustumPlanes;

use crate::buffers::AppendBuffer;
use crate::light::GpuLight;

/// Outcome of one culling pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullResult {
    /// Lights tested
    pub tested: u32,
    /// Lights in the visible list
    pub visible: u32,
    /// Visible lights dropped because the list was full
    pub dropped: u32,
}

impl CullResult {
    /// Check if the visible list was truncated
    #[inline]
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }
}

/// Camera frustum culler with a bounded visible list
#[derive(Debug)]
pub struct FrustumCuller {
    capacity: usize,
    slots: AppendBuffer,
    candidates: Vec<u32>,
    indices: Vec<u32>,
    visible: Vec<GpuLight>,
}

impl FrustumCuller {
    /// Create with a visible-list capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: AppendBuffer::new(capacity),
            candidates: Vec::new(),
            indices: Vec::with_capacity(capacity),
            visible: Vec::with_capacity(capacity),
        }
    }

    /// Change the visible-list capacity
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Visible-list capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cull `lights` against `frustum`
    ///
    /// A light is visible unless its sphere lies fully behind some plane.
    /// Every light is tested; when more are visible than the list holds,
    /// the earliest visible lights are admitted and the rest counted as
    /// dropped.
    pub fn cull(&mut self, frustum: &FrustumPlanes, lights: &[GpuLight]) -> CullResult {
        if self.slots.prepare(self.capacity) {
            log::info!("Visible light buffer grown to {} entries", self.capacity);
        }

        self.candidates.clear();
        self.candidates.par_extend(
            lights
                .par_iter()
                .enumerate()
                .filter(|(_, light)| frustum.intersects_sphere(light.position(), light.range))
                .map(|(i, _)| i as u32),
        );

        let admitted = self.candidates.len().min(self.capacity);
        let rejected = (self.candidates.len() - admitted) as u32;

        let slots = &self.slots;
        self.candidates[..admitted].par_iter().for_each(|&i| {
            slots.push(i);
        });

        self.slots.copy_to(&mut self.indices);
        self.visible.clear();
        self.visible
            .extend(self.indices.iter().map(|&i| lights[i as usize]));

        let result = CullResult {
            tested: lights.len() as u32,
            visible: self.visible.len() as u32,
            dropped: rejected + self.slots.dropped(),
        };

        if result.truncated() {
            log::debug!(
                "Visible light list full ({}), {} visible lights dropped",
                self.capacity,
                result.dropped
            );
        }
        log::trace!("Culled {} lights, {} visible", result.tested, result.visible);

        result
    }

    /// Dense visible list from the last pass
    #[inline]
    pub fn visible_lights(&self) -> &[GpuLight] {
        &self.visible
    }

    /// Source indices of the visible lights
    #[inline]
    pub fn visible_indices(&self) -> &[u32] {
        &self.indices
    }
}
