use super::{evaluate, Keyframe};
use std::collections::HashMap;
use thiserror::Error;

/// Key encoding for keyframe lookups: (nodeId << 8) | propertyId
pub fn keyframe_key(node_id: u32, property_id: u8) -> u64 {
    ((node_id as u64) << 8) | (property_id as u64)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("keyframe range {start}+{length} for key {key:#x} is out of bounds or overlaps another track")]
pub struct InvalidRange {
    pub key: u64,
    pub start: usize,
    pub length: usize,
}

/// All keyframe tracks of a document in one flat array.
///
/// `ranges` maps a [`keyframe_key`] to `(start, length)` inside `keyframes`.
/// Ranges never overlap and never run past the end of the array; mutations
/// here keep the array compact so no keyframe is unreferenced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeStore {
    pub keyframes: Vec<Keyframe>,
    pub ranges: HashMap<u64, (usize, usize)>,
}

impl KeyframeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    pub fn track(&self, node_id: u32, property_id: u8) -> &[Keyframe] {
        self.track_by_key(keyframe_key(node_id, property_id))
    }

    /// Empty slice for unknown keys or ranges that do not fit the array.
    pub fn track_by_key(&self, key: u64) -> &[Keyframe] {
        match self.ranges.get(&key) {
            Some(&(start, len)) => {
                let end = start + len;
                if end <= self.keyframes.len() {
                    &self.keyframes[start..end]
                } else {
                    &[]
                }
            }
            None => &[],
        }
    }

    /// Replace the track for `(node_id, property_id)`. Keyframes are sorted by
    /// time; an empty vector removes the track.
    pub fn set_track(&mut self, node_id: u32, property_id: u8, keyframes: Vec<Keyframe>) {
        self.set_track_by_key(keyframe_key(node_id, property_id), keyframes);
    }

    pub fn set_track_by_key(&mut self, key: u64, mut keyframes: Vec<Keyframe>) {
        self.remove_track_by_key(key);
        if keyframes.is_empty() {
            return;
        }
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        let start = self.keyframes.len();
        self.ranges.insert(key, (start, keyframes.len()));
        self.keyframes.extend(keyframes);
    }

    pub fn remove_track(&mut self, node_id: u32, property_id: u8) -> Option<Vec<Keyframe>> {
        self.remove_track_by_key(keyframe_key(node_id, property_id))
    }

    /// Remove a track and close the gap it leaves in the flat array.
    pub fn remove_track_by_key(&mut self, key: u64) -> Option<Vec<Keyframe>> {
        let (start, len) = self.ranges.remove(&key)?;
        let end = (start + len).min(self.keyframes.len());
        let removed: Vec<Keyframe> = self.keyframes.drain(start..end).collect();
        let shift = removed.len();
        for (range_start, _) in self.ranges.values_mut() {
            if *range_start > start {
                *range_start -= shift;
            }
        }
        Some(removed)
    }

    /// Remove every track owned by `node_id`.
    pub fn remove_node(&mut self, node_id: u32) {
        let keys: Vec<u64> = self
            .ranges
            .keys()
            .copied()
            .filter(|&key| (key >> 8) as u32 == node_id)
            .collect();
        for key in keys {
            self.remove_track_by_key(key);
        }
    }

    /// Tracks sorted by key.
    pub fn tracks(&self) -> Vec<(u64, &[Keyframe])> {
        let mut keys: Vec<u64> = self.ranges.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter()
            .map(|key| (key, self.track_by_key(key)))
            .collect()
    }

    pub fn evaluate(&self, node_id: u32, property_id: u8, t: f32, default_value: f32) -> f32 {
        evaluate(self.track(node_id, property_id), t, default_value)
    }

    /// Check that every range fits the array and no two ranges overlap.
    pub fn validate(&self) -> Result<(), InvalidRange> {
        let mut sorted: Vec<(usize, usize, u64)> = self
            .ranges
            .iter()
            .map(|(&key, &(start, length))| (start, length, key))
            .collect();
        sorted.sort_unstable();

        let mut covered = 0usize;
        for (start, length, key) in sorted {
            let end = start.checked_add(length);
            let in_bounds = end.is_some_and(|end| end <= self.keyframes.len());
            if !in_bounds || (length > 0 && start < covered) {
                return Err(InvalidRange { key, start, length });
            }
            if length > 0 {
                covered = start + length;
            }
        }
        Ok(())
    }
}
