//! Columnar node/port/edge store.
//!
//! Nodes, ports and edges live in Structure-of-Arrays columns so the codec can
//! stream them field by field. Ids are stable and allocated from per-category
//! counters that never go backwards within a document; array indices are a
//! cache, valid only until the next structural edit or bulk load.
//!
//! After filling the columns directly (decode, FFI), call
//! [`Graph::rebuild_index_maps`] before any id-based lookup.

mod port_spec;

pub use port_spec::{PortDataType, PortSpec, PortValue};

use crate::math::Float2;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Structural violation found by [`Graph::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("column length mismatch in {0} table")]
    ColumnMismatch(&'static str),
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u32 },
    #[error("port {port} references missing owner node {owner}")]
    DanglingPortOwner { port: u32, owner: u32 },
    #[error("edge {edge} references missing port {port}")]
    DanglingEdgeEndpoint { edge: u32, port: u32 },
    #[error("next {kind} id {next} does not exceed existing id {max}")]
    StaleCounter {
        kind: &'static str,
        next: u32,
        max: u32,
    },
}

#[derive(Debug, Clone)]
pub struct Graph {
    // Node SoA
    pub node_ids: Vec<u32>,
    pub node_types: Vec<u32>,
    pub node_positions: Vec<Float2>,
    pub node_input_count: Vec<i32>,
    pub node_output_count: Vec<i32>,

    // Port SoA
    pub port_ids: Vec<u32>,
    pub port_types: Vec<u32>,
    pub port_owners: Vec<u32>,
    pub port_is_input: Vec<bool>,

    // Edge SoA
    pub edge_ids: Vec<u32>,
    pub edge_sources: Vec<u32>,
    pub edge_targets: Vec<u32>,

    // Id counters
    pub next_node_id: u32,
    pub next_port_id: u32,
    pub next_edge_id: u32,

    // Index maps
    node_index: HashMap<u32, usize>,
    port_index: HashMap<u32, usize>,
    edge_index: HashMap<u32, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            node_ids: Vec::new(),
            node_types: Vec::new(),
            node_positions: Vec::new(),
            node_input_count: Vec::new(),
            node_output_count: Vec::new(),
            port_ids: Vec::new(),
            port_types: Vec::new(),
            port_owners: Vec::new(),
            port_is_input: Vec::new(),
            edge_ids: Vec::new(),
            edge_sources: Vec::new(),
            edge_targets: Vec::new(),
            next_node_id: 1,
            next_port_id: 1,
            next_edge_id: 1,
            node_index: HashMap::new(),
            port_index: HashMap::new(),
            edge_index: HashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn port_count(&self) -> usize {
        self.port_ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty() && self.port_ids.is_empty() && self.edge_ids.is_empty()
    }

    /// Rebuild id -> index maps from the id columns. O(n).
    pub fn rebuild_index_maps(&mut self) {
        self.node_index = index_map(&self.node_ids);
        self.port_index = index_map(&self.port_ids);
        self.edge_index = index_map(&self.edge_ids);
    }

    // --- Construction ---

    /// Add a node. Returns `None` once the node id space is exhausted.
    pub fn add_node(&mut self, node_type: u32, position: Float2) -> Option<u32> {
        let id = self.next_node_id;
        self.next_node_id = id.checked_add(1)?;

        self.node_index.insert(id, self.node_ids.len());
        self.node_ids.push(id);
        self.node_types.push(node_type);
        self.node_positions.push(position);
        self.node_input_count.push(0);
        self.node_output_count.push(0);
        Some(id)
    }

    /// Add a port to an existing node. Returns `None` if the owner is unknown
    /// or the port id space is exhausted.
    pub fn add_port(&mut self, spec: PortSpec, owner: u32, is_input: bool) -> Option<u32> {
        self.add_port_encoded(spec.to_encoded(), owner, is_input)
    }

    /// [`Graph::add_port`] with an already-encoded type tag.
    pub fn add_port_encoded(&mut self, port_type: u32, owner: u32, is_input: bool) -> Option<u32> {
        let owner_index = self.get_node_index(owner)?;
        let id = self.next_port_id;
        self.next_port_id = id.checked_add(1)?;

        self.port_index.insert(id, self.port_ids.len());
        self.port_ids.push(id);
        self.port_types.push(port_type);
        self.port_owners.push(owner);
        self.port_is_input.push(is_input);

        if is_input {
            self.node_input_count[owner_index] += 1;
        } else {
            self.node_output_count[owner_index] += 1;
        }
        Some(id)
    }

    /// Connect two existing ports. Returns `None` if either port is unknown.
    ///
    /// The store does not limit how many edges may enter a target port;
    /// callers that want single-input semantics check [`Graph::incoming_edges`]
    /// first.
    pub fn add_edge(&mut self, source_port: u32, target_port: u32) -> Option<u32> {
        self.get_port_index(source_port)?;
        self.get_port_index(target_port)?;
        let id = self.next_edge_id;
        self.next_edge_id = id.checked_add(1)?;

        self.edge_index.insert(id, self.edge_ids.len());
        self.edge_ids.push(id);
        self.edge_sources.push(source_port);
        self.edge_targets.push(target_port);
        Some(id)
    }

    /// Rebuild the store keeping only nodes accepted by `keep`, their ports,
    /// and edges whose endpoints both survive. Id counters carry over.
    pub fn retain_nodes(&self, mut keep: impl FnMut(u32) -> bool) -> Graph {
        let mut out = Graph::new();
        out.next_node_id = self.next_node_id;
        out.next_port_id = self.next_port_id;
        out.next_edge_id = self.next_edge_id;

        let mut kept_nodes = HashSet::new();
        for i in 0..self.node_ids.len() {
            let id = self.node_ids[i];
            if !keep(id) {
                continue;
            }
            kept_nodes.insert(id);
            out.node_ids.push(id);
            out.node_types.push(self.node_types[i]);
            out.node_positions.push(self.node_positions[i]);
            out.node_input_count.push(self.node_input_count[i]);
            out.node_output_count.push(self.node_output_count[i]);
        }

        let mut kept_ports = HashSet::new();
        for i in 0..self.port_ids.len() {
            if !kept_nodes.contains(&self.port_owners[i]) {
                continue;
            }
            kept_ports.insert(self.port_ids[i]);
            out.port_ids.push(self.port_ids[i]);
            out.port_types.push(self.port_types[i]);
            out.port_owners.push(self.port_owners[i]);
            out.port_is_input.push(self.port_is_input[i]);
        }

        for i in 0..self.edge_ids.len() {
            if kept_ports.contains(&self.edge_sources[i])
                && kept_ports.contains(&self.edge_targets[i])
            {
                out.edge_ids.push(self.edge_ids[i]);
                out.edge_sources.push(self.edge_sources[i]);
                out.edge_targets.push(self.edge_targets[i]);
            }
        }

        out.rebuild_index_maps();
        out
    }

    // --- Node lookup ---

    pub fn get_node_index(&self, node_id: u32) -> Option<usize> {
        self.node_index.get(&node_id).copied()
    }

    pub fn contains_node(&self, node_id: u32) -> bool {
        self.node_index.contains_key(&node_id)
    }

    pub fn get_node_type(&self, node_id: u32) -> Option<u32> {
        self.get_node_index(node_id).map(|i| self.node_types[i])
    }

    pub fn get_node_position(&self, node_id: u32) -> Option<Float2> {
        self.get_node_index(node_id).map(|i| self.node_positions[i])
    }

    /// Returns `false` if the node is unknown.
    pub fn set_node_position(&mut self, node_id: u32, position: Float2) -> bool {
        match self.get_node_index(node_id) {
            Some(i) => {
                self.node_positions[i] = position;
                true
            }
            None => false,
        }
    }

    // --- Port lookup ---

    pub fn get_port_index(&self, port_id: u32) -> Option<usize> {
        self.port_index.get(&port_id).copied()
    }

    /// Optimistic lookup for UI code: fills `index` and returns `true` when found.
    pub fn try_get_port_index(&self, port_id: u32, index: &mut usize) -> bool {
        match self.get_port_index(port_id) {
            Some(i) => {
                *index = i;
                true
            }
            None => false,
        }
    }

    pub fn get_port_spec(&self, port_id: u32) -> Option<PortSpec> {
        self.get_port_index(port_id)
            .and_then(|i| PortSpec::try_from_encoded(self.port_types[i]))
    }

    pub fn get_port_owner(&self, port_id: u32) -> Option<u32> {
        self.get_port_index(port_id).map(|i| self.port_owners[i])
    }

    pub fn is_input_port(&self, port_id: u32) -> Option<bool> {
        self.get_port_index(port_id).map(|i| self.port_is_input[i])
    }

    pub fn get_input_ports(&self, node_id: u32) -> Vec<u32> {
        self.ports_of(node_id, true)
    }

    pub fn get_output_ports(&self, node_id: u32) -> Vec<u32> {
        self.ports_of(node_id, false)
    }

    fn ports_of(&self, node_id: u32, inputs: bool) -> Vec<u32> {
        let mut result = Vec::new();
        for i in 0..self.port_ids.len() {
            if self.port_owners[i] == node_id && self.port_is_input[i] == inputs {
                result.push(self.port_ids[i]);
            }
        }
        result
    }

    /// Get nth input port for a node (by ordinal index).
    pub fn try_get_input(&self, node_id: u32, index: usize) -> Option<u32> {
        self.get_input_ports(node_id).get(index).copied()
    }

    /// Get nth output port for a node (by ordinal index).
    pub fn try_get_output(&self, node_id: u32, index: usize) -> Option<u32> {
        self.get_output_ports(node_id).get(index).copied()
    }

    /// Find the input port of `node_id` whose encoded spec is
    /// `(data_type, local_index)`.
    pub fn try_get_input_by_spec(
        &self,
        node_id: u32,
        data_type: PortDataType,
        local_index: u8,
    ) -> Option<u32> {
        self.find_port_by_spec(node_id, PortSpec::new(data_type, local_index), true)
    }

    pub fn try_get_output_by_spec(
        &self,
        node_id: u32,
        data_type: PortDataType,
        local_index: u8,
    ) -> Option<u32> {
        self.find_port_by_spec(node_id, PortSpec::new(data_type, local_index), false)
    }

    fn find_port_by_spec(&self, node_id: u32, spec: PortSpec, is_input: bool) -> Option<u32> {
        let encoded = spec.to_encoded();
        (0..self.port_ids.len())
            .find(|&i| {
                self.port_owners[i] == node_id
                    && self.port_is_input[i] == is_input
                    && self.port_types[i] == encoded
            })
            .map(|i| self.port_ids[i])
    }

    // --- Edge lookup ---

    pub fn get_edge_index(&self, edge_id: u32) -> Option<usize> {
        self.edge_index.get(&edge_id).copied()
    }

    pub fn edge_source(&self, edge_id: u32) -> Option<u32> {
        self.get_edge_index(edge_id).map(|i| self.edge_sources[i])
    }

    pub fn edge_target(&self, edge_id: u32) -> Option<u32> {
        self.get_edge_index(edge_id).map(|i| self.edge_targets[i])
    }

    /// Edges whose target is `port_id`.
    pub fn incoming_edges(&self, port_id: u32) -> Vec<u32> {
        (0..self.edge_ids.len())
            .filter(|&i| self.edge_targets[i] == port_id)
            .map(|i| self.edge_ids[i])
            .collect()
    }

    /// Edges whose source is `port_id`.
    pub fn outgoing_edges(&self, port_id: u32) -> Vec<u32> {
        (0..self.edge_ids.len())
            .filter(|&i| self.edge_sources[i] == port_id)
            .map(|i| self.edge_ids[i])
            .collect()
    }

    // --- Validation ---

    /// Check referential integrity and counter sanity. Index maps must be
    /// current.
    pub fn validate(&self) -> Result<(), GraphError> {
        let nodes = self.node_ids.len();
        if self.node_types.len() != nodes
            || self.node_positions.len() != nodes
            || self.node_input_count.len() != nodes
            || self.node_output_count.len() != nodes
        {
            return Err(GraphError::ColumnMismatch("node"));
        }
        let ports = self.port_ids.len();
        if self.port_types.len() != ports
            || self.port_owners.len() != ports
            || self.port_is_input.len() != ports
        {
            return Err(GraphError::ColumnMismatch("port"));
        }
        let edges = self.edge_ids.len();
        if self.edge_sources.len() != edges || self.edge_targets.len() != edges {
            return Err(GraphError::ColumnMismatch("edge"));
        }

        check_ids("node", &self.node_ids, self.node_index.len(), self.next_node_id)?;
        check_ids("port", &self.port_ids, self.port_index.len(), self.next_port_id)?;
        check_ids("edge", &self.edge_ids, self.edge_index.len(), self.next_edge_id)?;

        for i in 0..ports {
            if !self.contains_node(self.port_owners[i]) {
                return Err(GraphError::DanglingPortOwner {
                    port: self.port_ids[i],
                    owner: self.port_owners[i],
                });
            }
        }

        for i in 0..edges {
            for port in [self.edge_sources[i], self.edge_targets[i]] {
                if self.get_port_index(port).is_none() {
                    return Err(GraphError::DanglingEdgeEndpoint {
                        edge: self.edge_ids[i],
                        port,
                    });
                }
            }
        }

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural equality: columns and counters. Index maps are derived state.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.node_ids == other.node_ids
            && self.node_types == other.node_types
            && self.node_positions == other.node_positions
            && self.node_input_count == other.node_input_count
            && self.node_output_count == other.node_output_count
            && self.port_ids == other.port_ids
            && self.port_types == other.port_types
            && self.port_owners == other.port_owners
            && self.port_is_input == other.port_is_input
            && self.edge_ids == other.edge_ids
            && self.edge_sources == other.edge_sources
            && self.edge_targets == other.edge_targets
            && self.next_node_id == other.next_node_id
            && self.next_port_id == other.next_port_id
            && self.next_edge_id == other.next_edge_id
    }
}

fn index_map(ids: &[u32]) -> HashMap<u32, usize> {
    let mut map = HashMap::with_capacity(ids.len());
    for (i, &id) in ids.iter().enumerate() {
        map.insert(id, i);
    }
    map
}

fn check_ids(
    kind: &'static str,
    ids: &[u32],
    indexed: usize,
    next: u32,
) -> Result<(), GraphError> {
    // A duplicate collapses two ids into one map slot.
    if indexed != ids.len() {
        let mut seen = HashSet::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(GraphError::DuplicateId { kind, id });
            }
        }
    }
    if let Some(&max) = ids.iter().max() {
        if next <= max {
            return Err(GraphError::StaleCounter { kind, next, max });
        }
    }
    Ok(())
}
