//! Copy/paste payload.
//!
//! ```text
//! "KEXC" u32 version
//! CLIP { CORE {...}  i32 count, f32x2 offsets[count], f32x2 center }
//! ```
//!
//! The embedded CORE chunk uses the document layout unchanged. Offsets are
//! per node, in the embedded graph's node order, relative to `center`.

use super::chunk::{ChunkReader, ChunkWriter};
use super::document::{input_key, key_local_index, key_node_id};
use super::format::*;
use super::{read_core, read_file_header, write_core, write_file_header};
use super::{Document, PersistenceError};
use crate::math::Float2;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clipboard {
    pub document: Document,
    pub offsets: Vec<Float2>,
    pub center: Float2,
}

impl Clipboard {
    /// Capture `node_ids` (unknown ids ignored) with their ports, the edges
    /// between them, their keyed data and their keyframe tracks.
    pub fn copy(doc: &Document, node_ids: &[u32]) -> Self {
        let selected: HashSet<u32> = node_ids
            .iter()
            .copied()
            .filter(|&id| doc.graph.contains_node(id))
            .collect();

        let graph = doc.graph.retain_nodes(|id| selected.contains(&id));
        let center = if graph.node_positions.is_empty() {
            Float2::ZERO
        } else {
            let sum = graph
                .node_positions
                .iter()
                .fold(Float2::ZERO, |acc, &p| acc + p);
            sum * (1.0 / graph.node_positions.len() as f32)
        };
        let offsets = graph.node_positions.iter().map(|&p| p - center).collect();

        let owned = |key: &u64| selected.contains(&key_node_id(*key));
        let mut document = Document {
            graph,
            scalars: filter_map(&doc.scalars, owned),
            vectors: filter_map(&doc.vectors, owned),
            durations: filter_map(&doc.durations, owned),
            flags: filter_map(&doc.flags, owned),
            anchors: filter_map(&doc.anchors, owned),
            ..Document::default()
        };
        for (key, track) in doc.keyframes.tracks() {
            if owned(&key) {
                document.keyframes.set_track_by_key(key, track.to_vec());
            }
        }

        debug!(nodes = document.graph.node_count(), "copied selection");
        Self {
            document,
            offsets,
            center,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.document.graph.node_count() == 0
    }

    pub fn node_count(&self) -> usize {
        self.document.graph.node_count()
    }

    /// Insert the clipboard into `doc` centred on `at`. Every node, port and
    /// edge gets a fresh id from `doc`'s counters; keyed data and tracks follow
    /// their node. Returns the new node ids in clipboard order; if `doc` runs
    /// out of node ids the paste stops at the last node that fit.
    pub fn paste(&self, doc: &mut Document, at: Float2) -> Vec<u32> {
        let source = &self.document;
        let graph = &source.graph;

        let mut node_map = HashMap::with_capacity(graph.node_count());
        let mut pasted = Vec::with_capacity(graph.node_count());
        for i in 0..graph.node_ids.len() {
            let offset = self.offsets.get(i).copied().unwrap_or(Float2::ZERO);
            let Some(id) = doc.graph.add_node(graph.node_types[i], at + offset) else {
                warn!(pasted = pasted.len(), "node id space exhausted, paste truncated");
                break;
            };
            node_map.insert(graph.node_ids[i], id);
            pasted.push(id);
        }

        let mut port_map = HashMap::with_capacity(graph.port_count());
        for i in 0..graph.port_ids.len() {
            let Some(&owner) = node_map.get(&graph.port_owners[i]) else {
                continue;
            };
            let is_input = graph.port_is_input[i];
            if let Some(id) = doc.graph.add_port_encoded(graph.port_types[i], owner, is_input) {
                port_map.insert(graph.port_ids[i], id);
            }
        }

        for i in 0..graph.edge_ids.len() {
            if let (Some(&src), Some(&dst)) = (
                port_map.get(&graph.edge_sources[i]),
                port_map.get(&graph.edge_targets[i]),
            ) {
                doc.graph.add_edge(src, dst);
            }
        }

        let remap = |key: u64| {
            node_map
                .get(&key_node_id(key))
                .map(|&node| input_key(node, key_local_index(key)))
        };
        remap_into(&source.scalars, &mut doc.scalars, remap);
        remap_into(&source.vectors, &mut doc.vectors, remap);
        remap_into(&source.durations, &mut doc.durations, remap);
        remap_into(&source.flags, &mut doc.flags, remap);
        remap_into(&source.anchors, &mut doc.anchors, remap);
        for (key, track) in source.keyframes.tracks() {
            if let Some(new_key) = remap(key) {
                doc.keyframes.set_track_by_key(new_key, track.to_vec());
            }
        }

        debug!(nodes = pasted.len(), "pasted selection");
        pasted
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ChunkWriter::new();
        write_file_header(&mut writer, CLIPBOARD_MAGIC, CLIPBOARD_VERSION);
        writer.chunk(CHUNK_CLIP, CLIP_VERSION, |w| {
            write_core(w, &self.document);
            w.write_float2_array(&self.offsets);
            w.write_float2(self.center);
        });
        writer.into_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PersistenceError> {
        let mut reader = ChunkReader::new(data);
        read_file_header(&mut reader, CLIPBOARD_MAGIC)?;

        while let Some(header) = reader.try_read_header()? {
            if header.chunk_type != CHUNK_CLIP {
                reader.skip_chunk(&header)?;
                continue;
            }
            if header.version != CLIP_VERSION {
                return Err(PersistenceError::UnsupportedVersion {
                    chunk: "CLIP",
                    found: header.version,
                    max: CLIP_VERSION,
                });
            }

            let mut payload = reader.enter_chunk(&header)?;
            let core = payload
                .try_read_header()?
                .filter(|h| h.chunk_type == CHUNK_CORE)
                .ok_or(PersistenceError::MissingChunk("CORE"))?;
            let mut core_payload = payload.enter_chunk(&core)?;
            let document = read_core(&mut core_payload, core.version)?;

            let offsets = payload.read_float2_array()?;
            let center = payload.read_float2()?;
            if offsets.len() != document.graph.node_count() {
                return Err(PersistenceError::CorruptedData(format!(
                    "{} clipboard offsets for {} nodes",
                    offsets.len(),
                    document.graph.node_count()
                )));
            }

            return Ok(Self {
                document,
                offsets,
                center,
            });
        }

        Err(PersistenceError::MissingChunk("CLIP"))
    }
}

fn filter_map<V: Copy>(map: &HashMap<u64, V>, keep: impl Fn(&u64) -> bool) -> HashMap<u64, V> {
    map.iter()
        .filter(|(k, _)| keep(k))
        .map(|(&k, &v)| (k, v))
        .collect()
}

fn remap_into<V: Copy>(
    source: &HashMap<u64, V>,
    target: &mut HashMap<u64, V>,
    remap: impl Fn(u64) -> Option<u64>,
) {
    for (&key, &value) in source {
        if let Some(new_key) = remap(key) {
            target.insert(new_key, value);
        }
    }
}
