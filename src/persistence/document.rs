//! Owned document data for persistence and history.

use super::PersistenceError;
use crate::anchor::AnchorPoint;
use crate::graph::{Graph, PortDataType, PortValue};
use crate::keyframe::KeyframeStore;
use crate::math::Float3;
use std::collections::{HashMap, HashSet};

/// Key encoding for scalar/vector/duration/flag/anchor lookups:
/// (nodeId << 8) | localIndex
pub fn input_key(node_id: u32, local_index: u8) -> u64 {
    ((node_id as u64) << 8) | (local_index as u64)
}

/// Owning node of a composite key.
pub fn key_node_id(key: u64) -> u32 {
    (key >> 8) as u32
}

/// Local port/property index of a composite key.
pub fn key_local_index(key: u64) -> u8 {
    (key & 0xFF) as u8
}

#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DurationType {
    Time = 0,
    Distance = 1,
}

impl DurationType {
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Time),
            1 => Some(Self::Distance),
            _ => None,
        }
    }
}

/// How long a section runs and in which unit.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IterationConfig {
    pub duration: f32,
    pub duration_type: DurationType,
}

impl IterationConfig {
    pub const fn new(duration: f32, duration_type: DurationType) -> Self {
        Self {
            duration,
            duration_type,
        }
    }
}

/// The whole editable document: graph, keyed per-port data and keyframes.
///
/// Each decode yields an independent aggregate; nothing is shared between
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub graph: Graph,
    pub scalars: HashMap<u64, f32>,
    pub vectors: HashMap<u64, Float3>,
    pub durations: HashMap<u64, IterationConfig>,
    pub flags: HashMap<u64, i32>,
    pub anchors: HashMap<u64, AnchorPoint>,
    pub keyframes: KeyframeStore,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
            && self.scalars.is_empty()
            && self.vectors.is_empty()
            && self.durations.is_empty()
            && self.flags.is_empty()
            && self.anchors.is_empty()
            && self.keyframes.is_empty()
    }

    pub fn get_scalar(&self, node_id: u32, local_index: u8, default: f32) -> f32 {
        let key = input_key(node_id, local_index);
        self.scalars.get(&key).copied().unwrap_or(default)
    }

    pub fn get_vector(&self, node_id: u32, local_index: u8, default: Float3) -> Float3 {
        let key = input_key(node_id, local_index);
        self.vectors.get(&key).copied().unwrap_or(default)
    }

    pub fn get_flag(&self, node_id: u32, local_index: u8) -> i32 {
        let key = input_key(node_id, local_index);
        self.flags.get(&key).copied().unwrap_or(0)
    }

    pub fn get_duration(&self, node_id: u32, local_index: u8) -> Option<IterationConfig> {
        self.durations.get(&input_key(node_id, local_index)).copied()
    }

    pub fn get_anchor(&self, node_id: u32, local_index: u8) -> Option<&AnchorPoint> {
        self.anchors.get(&input_key(node_id, local_index))
    }

    /// Inline value of a port, read from the keyed map its data type uses.
    /// Unset scalar/vector inputs read as zero.
    pub fn port_value(&self, port_id: u32) -> Option<PortValue> {
        let spec = self.graph.get_port_spec(port_id)?;
        let owner = self.graph.get_port_owner(port_id)?;
        let value = match spec.data_type {
            PortDataType::Scalar => {
                PortValue::Scalar(self.get_scalar(owner, spec.local_index, 0.0))
            }
            PortDataType::Vector => {
                PortValue::Vector(self.get_vector(owner, spec.local_index, Float3::ZERO))
            }
            PortDataType::Anchor => PortValue::Anchor,
            PortDataType::Path => PortValue::Path,
        };
        Some(value)
    }

    /// Store an inline port value. Returns `false` if the port is unknown or
    /// the value's type does not match the port's.
    pub fn set_port_value(&mut self, port_id: u32, value: PortValue) -> bool {
        let (Some(spec), Some(owner)) = (
            self.graph.get_port_spec(port_id),
            self.graph.get_port_owner(port_id),
        ) else {
            return false;
        };
        if spec.data_type != value.data_type() {
            return false;
        }
        let key = input_key(owner, spec.local_index);
        match value {
            PortValue::Scalar(v) => {
                self.scalars.insert(key, v);
            }
            PortValue::Vector(v) => {
                self.vectors.insert(key, v);
            }
            PortValue::Anchor | PortValue::Path => {}
        }
        true
    }

    /// Remove nodes by rebuilding the graph without them, then drop every
    /// keyed entry and keyframe track they owned.
    pub fn remove_nodes(&mut self, node_ids: &[u32]) {
        let removed: HashSet<u32> = node_ids.iter().copied().collect();
        if removed.is_empty() {
            return;
        }
        self.graph = self.graph.retain_nodes(|id| !removed.contains(&id));

        let keep = |key: &u64| !removed.contains(&key_node_id(*key));
        self.scalars.retain(|k, _| keep(k));
        self.vectors.retain(|k, _| keep(k));
        self.durations.retain(|k, _| keep(k));
        self.flags.retain(|k, _| keep(k));
        self.anchors.retain(|k, _| keep(k));
        for &node_id in &removed {
            self.keyframes.remove_node(node_id);
        }
    }

    /// Check graph integrity and keyframe ranges. Index maps must be current.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        self.graph.validate()?;
        self.keyframes.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PortSpec;
    use crate::keyframe::{keyframe_key, Keyframe};
    use crate::math::Float2;

    fn make_document() -> (Document, u32, u32) {
        let mut doc = Document::new();
        let a = doc.graph.add_node(5, Float2::ZERO).unwrap();
        let b = doc.graph.add_node(0, Float2::new(100.0, 0.0)).unwrap();
        doc.graph
            .add_port(PortSpec::new(PortDataType::Scalar, 1), b, true)
            .unwrap();
        doc.graph
            .add_port(PortSpec::new(PortDataType::Vector, 0), a, true)
            .unwrap();
        (doc, a, b)
    }

    #[test]
    fn input_key_encoding() {
        assert_eq!(input_key(1, 0), 1 << 8);
        assert_eq!(input_key(100, 5), (100 << 8) | 5);
        assert_eq!(input_key(0xFFFF, 255), (0xFFFF << 8) | 255);
        assert_eq!(key_node_id(input_key(0xFFFF_FFFF, 3)), 0xFFFF_FFFF);
        assert_eq!(key_local_index(input_key(9, 240)), 240);
    }

    #[test]
    fn get_scalar_returns_default_when_missing() {
        let doc = Document::new();
        assert_eq!(doc.get_scalar(1, 0, 42.0), 42.0);
        assert_eq!(doc.get_flag(1, 0), 0);
        assert!(doc.get_duration(1, 0).is_none());
    }

    #[test]
    fn port_value_dispatches_by_type() {
        let (mut doc, a, b) = make_document();
        let scalar_port = doc
            .graph
            .try_get_input_by_spec(b, PortDataType::Scalar, 1)
            .unwrap();
        let vector_port = doc
            .graph
            .try_get_input_by_spec(a, PortDataType::Vector, 0)
            .unwrap();

        assert_eq!(doc.port_value(scalar_port), Some(PortValue::Scalar(0.0)));
        assert!(doc.set_port_value(scalar_port, PortValue::Scalar(5.0)));
        assert_eq!(doc.scalars[&input_key(b, 1)], 5.0);
        assert_eq!(doc.port_value(scalar_port), Some(PortValue::Scalar(5.0)));

        let v = Float3::new(0.0, 3.0, 0.0);
        assert!(doc.set_port_value(vector_port, PortValue::Vector(v)));
        assert_eq!(doc.port_value(vector_port), Some(PortValue::Vector(v)));
    }

    #[test]
    fn set_port_value_rejects_mismatched_type() {
        let (mut doc, _, _) = make_document();
        assert!(!doc.set_port_value(1, PortValue::Vector(Float3::ZERO)));
        assert!(!doc.set_port_value(99, PortValue::Scalar(1.0)));
        assert!(doc.scalars.is_empty());
    }

    #[test]
    fn remove_nodes_drops_owned_data() {
        let (mut doc, a, b) = make_document();
        doc.scalars.insert(input_key(b, 1), 5.0);
        doc.vectors.insert(input_key(a, 0), Float3::UP);
        doc.flags.insert(input_key(b, 240), 1);
        doc.durations
            .insert(input_key(b, 2), IterationConfig::new(3.0, DurationType::Time));
        doc.anchors.insert(input_key(a, 0), AnchorPoint::default());
        doc.keyframes
            .set_track(b, 0, vec![Keyframe::linear(0.0, 0.0)]);
        doc.keyframes
            .set_track(a, 0, vec![Keyframe::linear(0.0, 1.0)]);

        doc.remove_nodes(&[b]);

        assert_eq!(doc.graph.node_ids, vec![a]);
        assert!(doc.scalars.is_empty());
        assert!(doc.flags.is_empty());
        assert!(doc.durations.is_empty());
        assert_eq!(doc.vectors.len(), 1);
        assert_eq!(doc.anchors.len(), 1);
        assert!(doc.keyframes.ranges.contains_key(&keyframe_key(a, 0)));
        assert_eq!(doc.keyframes.track_count(), 1);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn validate_reports_bad_keyframe_range() {
        let (mut doc, _, _) = make_document();
        doc.keyframes.ranges.insert(keyframe_key(1, 0), (0, 4));
        assert!(matches!(
            doc.validate(),
            Err(PersistenceError::InvalidKeyframeRange(_))
        ));
    }

    #[test]
    fn duration_type_from_i32() {
        assert_eq!(DurationType::from_i32(1), Some(DurationType::Distance));
        assert_eq!(DurationType::from_i32(7), None);
    }
}
