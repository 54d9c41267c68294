//! Light registry
//!
//! Explicit add/remove registration of scene lights into a flat array. The
//! host keeps membership current as lights are activated and deactivated;
//! the pipeline never scans a scene graph.
//!
//! Storage is dense and kept in registration order so capacity truncation
//! downstream always prefers the lights registered first. Handles are
//! generational: a removed light's [`LightId`] never resolves again, even
//! after its slot is reused.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use relights_math::Vec3;

use crate::light::PointLight;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Generational handle to a registered light
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId {
    /// Lower 32 bits: slot index, upper 32 bits: generation
    bits: u64,
}

impl LightId {
    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
        }
    }

    /// Slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    /// Generation of the slot when the id was issued
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    /// Raw bits
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }
}

impl fmt::Debug for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LightId({}v{})", self.index(), self.generation())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: u32,
    dense: Option<u32>,
}

/// Registered lights in a flat array
#[derive(Clone, Debug, Default)]
pub struct LightRegistry {
    lights: Vec<PointLight>,
    ids: Vec<LightId>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    revision: u64,
}

impl LightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with preallocated storage
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lights: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Register a light
    pub fn add(&mut self, light: PointLight) -> LightId {
        let dense = self.lights.len() as u32;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.dense = Some(dense);
                LightId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    dense: Some(dense),
                });
                LightId::new(index, 0)
            }
        };

        self.lights.push(light);
        self.ids.push(id);
        self.bump_revision();
        id
    }

    /// Deregister a light, returning it if the id was live
    pub fn remove(&mut self, id: LightId) -> Option<PointLight> {
        let dense = self.dense_index(id)?;

        let slot = &mut self.slots[id.index() as usize];
        slot.dense = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());

        let light = self.lights.remove(dense);
        self.ids.remove(dense);
        for moved in &self.ids[dense..] {
            if let Some(index) = self.slots[moved.index() as usize].dense.as_mut() {
                *index -= 1;
            }
        }

        self.bump_revision();
        Some(light)
    }

    /// Look up a light
    pub fn get(&self, id: LightId) -> Option<&PointLight> {
        self.dense_index(id).map(|i| &self.lights[i])
    }

    /// Look up a light for modification
    ///
    /// Counts as a mutation for [`revision`](Self::revision).
    pub fn get_mut(&mut self, id: LightId) -> Option<&mut PointLight> {
        let index = self.dense_index(id)?;
        self.bump_revision();
        Some(&mut self.lights[index])
    }

    /// Enable or disable a light; returns false for stale ids
    pub fn set_enabled(&mut self, id: LightId, enabled: bool) -> bool {
        match self.get_mut(id) {
            Some(light) => {
                light.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Move a light; returns false for stale ids
    pub fn set_position(&mut self, id: LightId, position: Vec3) -> bool {
        match self.get_mut(id) {
            Some(light) => {
                light.position = position;
                true
            }
            None => false,
        }
    }

    /// Check if an id is live
    #[inline]
    pub fn contains(&self, id: LightId) -> bool {
        self.dense_index(id).is_some()
    }

    /// Number of registered lights
    #[inline]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// Check if nothing is registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Number of enabled lights
    pub fn active_count(&self) -> usize {
        self.lights.iter().filter(|l| l.enabled).count()
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = (LightId, &PointLight)> {
        self.ids.iter().copied().zip(self.lights.iter())
    }

    /// Registered lights in registration order
    #[inline]
    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    /// Remove every light
    ///
    /// Outstanding ids are invalidated.
    pub fn clear(&mut self) {
        for id in self.ids.drain(..) {
            let slot = &mut self.slots[id.index() as usize];
            slot.dense = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index());
        }
        self.lights.clear();
        self.bump_revision();
    }

    /// Revision stamp, changed by every mutation
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump_revision(&mut self) {
        // Stamps are unique across all registries in the process
        self.revision = NEXT_REVISION.fetch_add(1, Ordering::Relaxed);
    }

    fn dense_index(&self, id: LightId) -> Option<usize> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.dense.map(|d| d as usize)
    }
}
