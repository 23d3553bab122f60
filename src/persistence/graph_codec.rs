//! GRPH chunk payload.
//!
//! `i32 nodeCount, i32 portCount, i32 edgeCount`, then nodes
//! `{u32 id, u32 type, [f32x2 position,] i32 inputs, i32 outputs}`, ports
//! `{u32 id, u32 type, u32 owner, bool isInput}`, edges
//! `{u32 id, u32 source, u32 target}`, then the three next-id counters.
//! Positions are present from GRAPH_VERSION 2 on.

use super::chunk::{ChunkReader, ChunkWriter};
use super::format::{GRAPH_VERSION, GRAPH_VERSION_NO_POSITIONS};
use super::PersistenceError;
use crate::graph::Graph;
use crate::math::Float2;

const NODE_SIZE: usize = 4 + 4 + 8 + 4 + 4;
const NODE_SIZE_NO_POSITIONS: usize = 4 + 4 + 4 + 4;
const PORT_SIZE: usize = 4 + 4 + 4 + 1;
const EDGE_SIZE: usize = 4 + 4 + 4;

/// Payload size of a GRPH chunk written at the current version.
pub fn encoded_size(graph: &Graph) -> usize {
    3 * 4
        + graph.node_count() * NODE_SIZE
        + graph.port_count() * PORT_SIZE
        + graph.edge_count() * EDGE_SIZE
        + 3 * 4
}

/// Write graph columns and counters at GRAPH_VERSION.
pub fn write(writer: &mut ChunkWriter, graph: &Graph) {
    writer.write_count(graph.node_ids.len());
    writer.write_count(graph.port_ids.len());
    writer.write_count(graph.edge_ids.len());

    // Nodes
    for i in 0..graph.node_ids.len() {
        writer.write_u32(graph.node_ids[i]);
        writer.write_u32(graph.node_types[i]);
        writer.write_float2(graph.node_positions[i]);
        writer.write_i32(graph.node_input_count[i]);
        writer.write_i32(graph.node_output_count[i]);
    }

    // Ports
    for i in 0..graph.port_ids.len() {
        writer.write_u32(graph.port_ids[i]);
        writer.write_u32(graph.port_types[i]);
        writer.write_u32(graph.port_owners[i]);
        writer.write_bool(graph.port_is_input[i]);
    }

    // Edges
    for i in 0..graph.edge_ids.len() {
        writer.write_u32(graph.edge_ids[i]);
        writer.write_u32(graph.edge_sources[i]);
        writer.write_u32(graph.edge_targets[i]);
    }

    // Next IDs
    writer.write_u32(graph.next_node_id);
    writer.write_u32(graph.next_port_id);
    writer.write_u32(graph.next_edge_id);
}

/// Read a GRPH payload written at `version`. Index maps are rebuilt before
/// returning; referential integrity is the caller's to check.
pub fn read(reader: &mut ChunkReader, version: u32) -> Result<Graph, PersistenceError> {
    let has_positions = match version {
        GRAPH_VERSION => true,
        GRAPH_VERSION_NO_POSITIONS => false,
        found => {
            return Err(PersistenceError::UnsupportedVersion {
                chunk: "GRPH",
                found,
                max: GRAPH_VERSION,
            })
        }
    };
    let node_size = if has_positions {
        NODE_SIZE
    } else {
        NODE_SIZE_NO_POSITIONS
    };

    let node_count = reader.read_count(0)?;
    let port_count = reader.read_count(0)?;
    let edge_count = reader.read_count(0)?;
    let needed = node_count
        .saturating_mul(node_size)
        .saturating_add(port_count.saturating_mul(PORT_SIZE))
        .saturating_add(edge_count.saturating_mul(EDGE_SIZE));
    if needed > reader.remaining() {
        return Err(PersistenceError::TruncatedData {
            needed,
            remaining: reader.remaining(),
        });
    }

    let mut graph = Graph::new();
    graph.node_ids.reserve(node_count);
    graph.node_types.reserve(node_count);
    graph.node_positions.reserve(node_count);
    graph.node_input_count.reserve(node_count);
    graph.node_output_count.reserve(node_count);

    for _ in 0..node_count {
        graph.node_ids.push(reader.read_u32()?);
        graph.node_types.push(reader.read_u32()?);
        let position = if has_positions {
            reader.read_float2()?
        } else {
            Float2::ZERO
        };
        graph.node_positions.push(position);
        graph.node_input_count.push(reader.read_i32()?);
        graph.node_output_count.push(reader.read_i32()?);
    }

    graph.port_ids.reserve(port_count);
    graph.port_types.reserve(port_count);
    graph.port_owners.reserve(port_count);
    graph.port_is_input.reserve(port_count);

    for _ in 0..port_count {
        graph.port_ids.push(reader.read_u32()?);
        graph.port_types.push(reader.read_u32()?);
        graph.port_owners.push(reader.read_u32()?);
        graph.port_is_input.push(reader.read_bool()?);
    }

    graph.edge_ids.reserve(edge_count);
    graph.edge_sources.reserve(edge_count);
    graph.edge_targets.reserve(edge_count);

    for _ in 0..edge_count {
        graph.edge_ids.push(reader.read_u32()?);
        graph.edge_sources.push(reader.read_u32()?);
        graph.edge_targets.push(reader.read_u32()?);
    }

    graph.next_node_id = reader.read_u32()?;
    graph.next_port_id = reader.read_u32()?;
    graph.next_edge_id = reader.read_u32()?;

    graph.rebuild_index_maps();
    Ok(graph)
}
