// THEORY:
// The `tracked` module is the registry of objects whose positions feed the
// heatmap. Objects join when they become relevant and leave when they go away;
// between those points their owner keeps the registry's copy of their position
// and activity current. On every sampling tick the accumulator reads the
// registry as a plain list of `Sample`s, so it never needs to know what the
// objects are.

use glam::Vec3;
use std::collections::BTreeMap;

/// One observation of a tracked object at a sampling tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: Vec3,
    /// Inactive objects are skipped by the accumulator.
    pub active: bool,
}

impl Sample {
    pub fn active(position: Vec3) -> Self {
        Self {
            position,
            active: true,
        }
    }
}

/// Stable handle to a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackedId(u64);

/// The set of objects currently contributing samples.
#[derive(Debug, Default)]
pub struct TrackedObjects {
    next_id: u64,
    objects: BTreeMap<TrackedId, Sample>,
}

impl TrackedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, position: Vec3) -> TrackedId {
        let id = TrackedId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, Sample::active(position));
        id
    }

    /// Returns `false` when `id` was not registered.
    pub fn unregister(&mut self, id: TrackedId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn set_position(&mut self, id: TrackedId, position: Vec3) {
        if let Some(sample) = self.objects.get_mut(&id) {
            sample.position = position;
        }
    }

    pub fn set_active(&mut self, id: TrackedId, active: bool) {
        if let Some(sample) = self.objects.get_mut(&id) {
            sample.active = active;
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Current samples in registration order.
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.objects.values().copied()
    }
}
