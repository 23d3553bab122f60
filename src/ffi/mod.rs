//! C FFI for document persistence.
//!
//! Functions:
//! - `kex_save` / `kex_save_size` - serialize a flattened document to bytes
//! - `kex_load` / `kex_load_free` - deserialize bytes to an owned document
//! - `kex_load_get_counts` / `kex_load_copy_data` - read a loaded document back out
//!
//! Keyed maps and keyframe ranges are copied out in ascending key order.
//!
//! # Error Codes
//! - `0`: Success
//! - `-1`: Null pointer
//! - `-3`: Buffer too small (resize and retry)
//! - `-5`: Invalid format

use crate::anchor::AnchorPoint;
use crate::graph::Graph;
use crate::keyframe::{Keyframe, KeyframeStore};
use crate::math::{Float2, Float3};
use crate::persistence::{self, Document, DurationType, IterationConfig, PersistenceError};
use std::collections::HashMap;
use tracing::warn;

pub const KEX_OK: i32 = 0;
pub const KEX_ERR_NULL: i32 = -1;
pub const KEX_ERR_BUFFER_TOO_SMALL: i32 = -3;
pub const KEX_ERR_INVALID_FORMAT: i32 = -5;

/// Flattened, borrowed view of a document owned by the caller.
#[repr(C)]
pub struct KexDocument {
    // Graph arrays - nodes
    pub node_ids: *const u32,
    pub node_count: usize,
    pub node_types: *const u32,
    pub node_positions: *const Float2,
    pub node_input_counts: *const i32,
    pub node_output_counts: *const i32,

    // Graph arrays - ports
    pub port_ids: *const u32,
    pub port_count: usize,
    pub port_types: *const u32,
    pub port_owners: *const u32,
    pub port_is_input: *const u8,

    // Graph arrays - edges
    pub edge_ids: *const u32,
    pub edge_count: usize,
    pub edge_sources: *const u32,
    pub edge_targets: *const u32,

    // Id counters
    pub next_node_id: u32,
    pub next_port_id: u32,
    pub next_edge_id: u32,

    // Property maps - scalars
    pub scalar_keys: *const u64,
    pub scalar_values: *const f32,
    pub scalar_count: usize,

    // Property maps - vectors
    pub vector_keys: *const u64,
    pub vector_values: *const Float3,
    pub vector_count: usize,

    // Property maps - durations
    pub duration_keys: *const u64,
    pub duration_values: *const f32,
    pub duration_types: *const i32,
    pub duration_count: usize,

    // Property maps - flags
    pub flag_keys: *const u64,
    pub flag_values: *const i32,
    pub flag_count: usize,

    // Property maps - anchors
    pub anchor_keys: *const u64,
    pub anchor_values: *const AnchorPoint,
    pub anchor_count: usize,

    // Keyframes
    pub keyframes: *const Keyframe,
    pub keyframe_count: usize,
    pub keyframe_range_keys: *const u64,
    pub keyframe_range_starts: *const i32,
    pub keyframe_range_lengths: *const i32,
    pub keyframe_range_count: usize,
}

/// Get the buffer size required to serialize a document.
///
/// # Returns
/// - Size in bytes on success
/// - `-1` on null pointer
/// - `-5` if the document is inconsistent
///
/// # Safety
/// - `doc` must be a valid pointer to an initialized `KexDocument`
/// - All array pointers in `doc` must be valid for their respective counts
#[no_mangle]
pub unsafe extern "C" fn kex_save_size(doc: *const KexDocument) -> i64 {
    if doc.is_null() {
        return KEX_ERR_NULL as i64;
    }
    match kex_document_to_owned(&*doc) {
        Ok(owned) => persistence::DocumentCodec::new().encoded_size(&owned) as i64,
        Err(_) => KEX_ERR_INVALID_FORMAT as i64,
    }
}

/// Serialize a document to a byte buffer.
///
/// # Returns
/// - `0` on success
/// - `-1` on null pointer
/// - `-3` if buffer too small (bytes_written contains required size)
/// - `-5` if the document is inconsistent
///
/// # Safety
/// - `doc` must be a valid pointer to an initialized `KexDocument`
/// - `buffer` must point to a valid buffer of at least `buffer_capacity` bytes
/// - `bytes_written` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn kex_save(
    doc: *const KexDocument,
    buffer: *mut u8,
    buffer_capacity: usize,
    bytes_written: *mut usize,
) -> i32 {
    if doc.is_null() || buffer.is_null() || bytes_written.is_null() {
        return KEX_ERR_NULL;
    }

    let owned = match kex_document_to_owned(&*doc) {
        Ok(o) => o,
        Err(_) => return KEX_ERR_INVALID_FORMAT,
    };

    let out = std::slice::from_raw_parts_mut(buffer, buffer_capacity);
    match persistence::DocumentCodec::new().serialize_into(&owned, out) {
        Ok(written) => {
            *bytes_written = written;
            KEX_OK
        }
        Err(PersistenceError::BufferTooSmall { required, .. }) => {
            *bytes_written = required;
            KEX_ERR_BUFFER_TOO_SMALL
        }
        Err(_) => KEX_ERR_INVALID_FORMAT,
    }
}

/// Opaque handle to a loaded document.
pub type KexDocumentHandle = *mut std::ffi::c_void;

/// Load a document from a byte buffer.
///
/// # Returns
/// - Valid handle on success (non-null)
/// - Null on error
///
/// # Safety
/// - `data` must point to a valid buffer of at least `data_len` bytes
#[no_mangle]
pub unsafe extern "C" fn kex_load(data: *const u8, data_len: usize) -> KexDocumentHandle {
    if data.is_null() || data_len == 0 {
        return std::ptr::null_mut();
    }

    let bytes = std::slice::from_raw_parts(data, data_len);
    match persistence::deserialize(bytes) {
        Ok(doc) => Box::into_raw(Box::new(doc)) as KexDocumentHandle,
        Err(err) => {
            warn!(%err, "kex_load failed");
            std::ptr::null_mut()
        }
    }
}

/// Free a loaded document handle.
///
/// # Safety
/// - `handle` must be a valid handle returned by `kex_load`, or null
#[no_mangle]
pub unsafe extern "C" fn kex_load_free(handle: KexDocumentHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut Document));
    }
}

/// Document counts returned by kex_load_get_counts.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KexDocumentCounts {
    pub node_count: i32,
    pub port_count: i32,
    pub edge_count: i32,
    pub scalar_count: i32,
    pub vector_count: i32,
    pub duration_count: i32,
    pub flag_count: i32,
    pub anchor_count: i32,
    pub keyframe_count: i32,
    pub keyframe_range_count: i32,
    pub next_node_id: u32,
    pub next_port_id: u32,
    pub next_edge_id: u32,
}

/// Get document counts to allocate buffers.
///
/// # Safety
/// - `handle` must be a valid handle from `kex_load`
/// - `counts` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn kex_load_get_counts(
    handle: KexDocumentHandle,
    counts: *mut KexDocumentCounts,
) -> i32 {
    if handle.is_null() || counts.is_null() {
        return KEX_ERR_NULL;
    }

    let doc = &*(handle as *const Document);
    *counts = KexDocumentCounts {
        node_count: doc.graph.node_ids.len() as i32,
        port_count: doc.graph.port_ids.len() as i32,
        edge_count: doc.graph.edge_ids.len() as i32,
        scalar_count: doc.scalars.len() as i32,
        vector_count: doc.vectors.len() as i32,
        duration_count: doc.durations.len() as i32,
        flag_count: doc.flags.len() as i32,
        anchor_count: doc.anchors.len() as i32,
        keyframe_count: doc.keyframes.keyframes.len() as i32,
        keyframe_range_count: doc.keyframes.ranges.len() as i32,
        next_node_id: doc.graph.next_node_id,
        next_port_id: doc.graph.next_port_id,
        next_edge_id: doc.graph.next_edge_id,
    };

    KEX_OK
}

/// Caller-owned output buffers for `kex_load_copy_data`, each sized from
/// `KexDocumentCounts`. Pointers for empty sections may be null.
#[repr(C)]
pub struct KexDocumentBuffers {
    // Graph - nodes
    pub node_ids: *mut u32,
    pub node_types: *mut u32,
    pub node_positions: *mut Float2,
    pub node_input_counts: *mut i32,
    pub node_output_counts: *mut i32,
    // Graph - ports
    pub port_ids: *mut u32,
    pub port_types: *mut u32,
    pub port_owners: *mut u32,
    pub port_is_input: *mut u8,
    // Graph - edges
    pub edge_ids: *mut u32,
    pub edge_sources: *mut u32,
    pub edge_targets: *mut u32,
    // Scalars
    pub scalar_keys: *mut u64,
    pub scalar_values: *mut f32,
    // Vectors
    pub vector_keys: *mut u64,
    pub vector_values: *mut Float3,
    // Durations
    pub duration_keys: *mut u64,
    pub duration_values: *mut f32,
    pub duration_types: *mut i32,
    // Flags
    pub flag_keys: *mut u64,
    pub flag_values: *mut i32,
    // Anchors
    pub anchor_keys: *mut u64,
    pub anchor_values: *mut AnchorPoint,
    // Keyframes
    pub keyframes: *mut Keyframe,
    pub keyframe_range_keys: *mut u64,
    pub keyframe_range_starts: *mut i32,
    pub keyframe_range_lengths: *mut i32,
}

/// Copy loaded document data into pre-allocated buffers.
///
/// # Safety
/// - `handle` must be a valid handle from `kex_load`
/// - `out` must be a valid pointer; every non-empty section's buffers must
///   be valid for the count reported by `kex_load_get_counts`
#[no_mangle]
pub unsafe extern "C" fn kex_load_copy_data(
    handle: KexDocumentHandle,
    out: *const KexDocumentBuffers,
) -> i32 {
    if handle.is_null() || out.is_null() {
        return KEX_ERR_NULL;
    }

    let doc = &*(handle as *const Document);
    let out = &*out;
    let graph = &doc.graph;
    let store = &doc.keyframes;

    // Every section is checked before anything is written, so a failed call
    // leaves the caller's buffers untouched.
    let sections: [(usize, &[*const u8]); 10] = [
        (
            graph.node_ids.len(),
            &[
                out.node_ids as *const u8,
                out.node_types as *const u8,
                out.node_positions as *const u8,
                out.node_input_counts as *const u8,
                out.node_output_counts as *const u8,
            ],
        ),
        (
            graph.port_ids.len(),
            &[
                out.port_ids as *const u8,
                out.port_types as *const u8,
                out.port_owners as *const u8,
                out.port_is_input as *const u8,
            ],
        ),
        (
            graph.edge_ids.len(),
            &[
                out.edge_ids as *const u8,
                out.edge_sources as *const u8,
                out.edge_targets as *const u8,
            ],
        ),
        (
            doc.scalars.len(),
            &[out.scalar_keys as *const u8, out.scalar_values as *const u8],
        ),
        (
            doc.vectors.len(),
            &[out.vector_keys as *const u8, out.vector_values as *const u8],
        ),
        (
            doc.durations.len(),
            &[
                out.duration_keys as *const u8,
                out.duration_values as *const u8,
                out.duration_types as *const u8,
            ],
        ),
        (
            doc.flags.len(),
            &[out.flag_keys as *const u8, out.flag_values as *const u8],
        ),
        (
            doc.anchors.len(),
            &[out.anchor_keys as *const u8, out.anchor_values as *const u8],
        ),
        (store.keyframes.len(), &[out.keyframes as *const u8]),
        (
            store.ranges.len(),
            &[
                out.keyframe_range_keys as *const u8,
                out.keyframe_range_starts as *const u8,
                out.keyframe_range_lengths as *const u8,
            ],
        ),
    ];
    if sections
        .iter()
        .any(|(count, ptrs)| *count > 0 && any_null(ptrs))
    {
        return KEX_ERR_NULL;
    }

    // Copy nodes
    for i in 0..graph.node_ids.len() {
        *out.node_ids.add(i) = graph.node_ids[i];
        *out.node_types.add(i) = graph.node_types[i];
        *out.node_positions.add(i) = graph.node_positions[i];
        *out.node_input_counts.add(i) = graph.node_input_count[i];
        *out.node_output_counts.add(i) = graph.node_output_count[i];
    }

    // Copy ports
    for i in 0..graph.port_ids.len() {
        *out.port_ids.add(i) = graph.port_ids[i];
        *out.port_types.add(i) = graph.port_types[i];
        *out.port_owners.add(i) = graph.port_owners[i];
        *out.port_is_input.add(i) = graph.port_is_input[i] as u8;
    }

    // Copy edges
    for i in 0..graph.edge_ids.len() {
        *out.edge_ids.add(i) = graph.edge_ids[i];
        *out.edge_sources.add(i) = graph.edge_sources[i];
        *out.edge_targets.add(i) = graph.edge_targets[i];
    }

    copy_map(&doc.scalars, out.scalar_keys, |i, v| {
        *out.scalar_values.add(i) = *v;
    });
    copy_map(&doc.vectors, out.vector_keys, |i, v| {
        *out.vector_values.add(i) = *v;
    });
    copy_map(&doc.durations, out.duration_keys, |i, d| {
        *out.duration_values.add(i) = d.duration;
        *out.duration_types.add(i) = d.duration_type as i32;
    });
    copy_map(&doc.flags, out.flag_keys, |i, v| {
        *out.flag_values.add(i) = *v;
    });
    copy_map(&doc.anchors, out.anchor_keys, |i, a| {
        *out.anchor_values.add(i) = *a;
    });

    // Copy keyframes
    if !store.keyframes.is_empty() {
        std::ptr::copy_nonoverlapping(store.keyframes.as_ptr(), out.keyframes, store.keyframes.len());
    }
    copy_map(&store.ranges, out.keyframe_range_keys, |i, &(start, length)| {
        *out.keyframe_range_starts.add(i) = start as i32;
        *out.keyframe_range_lengths.add(i) = length as i32;
    });

    KEX_OK
}

// --- Helpers ---

fn any_null(ptrs: &[*const u8]) -> bool {
    ptrs.iter().any(|p| p.is_null())
}

/// Write `map` in ascending key order: keys into `keys`, values through
/// `write_value(index, value)`. Buffers must already be checked non-null.
unsafe fn copy_map<V>(map: &HashMap<u64, V>, keys: *mut u64, mut write_value: impl FnMut(usize, &V)) {
    let mut sorted: Vec<u64> = map.keys().copied().collect();
    sorted.sort_unstable();
    for (i, key) in sorted.into_iter().enumerate() {
        *keys.add(i) = key;
        write_value(i, &map[&key]);
    }
}

unsafe fn to_vec<T: Copy>(ptr: *const T, len: usize) -> Vec<T> {
    if len == 0 || ptr.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, len).to_vec()
    }
}

unsafe fn to_map<V: Copy>(
    keys: *const u64,
    values: *const V,
    count: usize,
    what: &str,
) -> Result<HashMap<u64, V>, PersistenceError> {
    if count == 0 {
        return Ok(HashMap::new());
    }
    if keys.is_null() || values.is_null() {
        return Err(PersistenceError::CorruptedData(format!(
            "null {what} arrays for {count} entries"
        )));
    }
    Ok(std::slice::from_raw_parts(keys, count)
        .iter()
        .copied()
        .zip(std::slice::from_raw_parts(values, count).iter().copied())
        .collect())
}

unsafe fn to_durations(doc: &KexDocument) -> Result<HashMap<u64, IterationConfig>, PersistenceError> {
    let keys = to_vec(doc.duration_keys, doc.duration_count);
    let values = to_vec(doc.duration_values, doc.duration_count);
    let types = to_vec(doc.duration_types, doc.duration_count);
    if keys.len() != doc.duration_count || values.len() != keys.len() || types.len() != keys.len() {
        return Err(PersistenceError::CorruptedData("duration arrays".into()));
    }

    keys.into_iter()
        .zip(values)
        .zip(types)
        .map(|((key, duration), raw)| {
            let duration_type = DurationType::from_i32(raw).ok_or_else(|| {
                PersistenceError::CorruptedData(format!("unknown duration type {raw}"))
            })?;
            Ok((key, IterationConfig::new(duration, duration_type)))
        })
        .collect()
}

unsafe fn to_keyframe_ranges(
    doc: &KexDocument,
) -> Result<HashMap<u64, (usize, usize)>, PersistenceError> {
    let count = doc.keyframe_range_count;
    let keys = to_vec(doc.keyframe_range_keys, count);
    let starts = to_vec(doc.keyframe_range_starts, count);
    let lengths = to_vec(doc.keyframe_range_lengths, count);
    if keys.len() != count || starts.len() != count || lengths.len() != count {
        return Err(PersistenceError::CorruptedData("keyframe range arrays".into()));
    }

    let mut ranges = HashMap::with_capacity(count);
    for i in 0..count {
        if starts[i] < 0 {
            return Err(PersistenceError::NegativeLength(starts[i]));
        }
        if lengths[i] < 0 {
            return Err(PersistenceError::NegativeLength(lengths[i]));
        }
        ranges.insert(keys[i], (starts[i] as usize, lengths[i] as usize));
    }
    Ok(ranges)
}

/// Copy a flattened caller document into an owned, validated `Document`.
unsafe fn kex_document_to_owned(doc: &KexDocument) -> Result<Document, PersistenceError> {
    let port_is_input: Vec<bool> = to_vec(doc.port_is_input, doc.port_count)
        .into_iter()
        .map(|b| b != 0)
        .collect();

    let mut graph = Graph::new();
    graph.node_ids = to_vec(doc.node_ids, doc.node_count);
    graph.node_types = to_vec(doc.node_types, doc.node_count);
    graph.node_positions = if doc.node_positions.is_null() {
        vec![Float2::ZERO; graph.node_ids.len()]
    } else {
        to_vec(doc.node_positions, doc.node_count)
    };
    graph.node_input_count = to_vec(doc.node_input_counts, doc.node_count);
    graph.node_output_count = to_vec(doc.node_output_counts, doc.node_count);
    graph.port_ids = to_vec(doc.port_ids, doc.port_count);
    graph.port_types = to_vec(doc.port_types, doc.port_count);
    graph.port_owners = to_vec(doc.port_owners, doc.port_count);
    graph.port_is_input = port_is_input;
    graph.edge_ids = to_vec(doc.edge_ids, doc.edge_count);
    graph.edge_sources = to_vec(doc.edge_sources, doc.edge_count);
    graph.edge_targets = to_vec(doc.edge_targets, doc.edge_count);
    graph.next_node_id = doc.next_node_id;
    graph.next_port_id = doc.next_port_id;
    graph.next_edge_id = doc.next_edge_id;
    graph.rebuild_index_maps();

    let owned = Document {
        graph,
        scalars: to_map(doc.scalar_keys, doc.scalar_values, doc.scalar_count, "scalar")?,
        vectors: to_map(doc.vector_keys, doc.vector_values, doc.vector_count, "vector")?,
        durations: to_durations(doc)?,
        flags: to_map(doc.flag_keys, doc.flag_values, doc.flag_count, "flag")?,
        anchors: to_map(doc.anchor_keys, doc.anchor_values, doc.anchor_count, "anchor")?,
        keyframes: KeyframeStore {
            keyframes: to_vec(doc.keyframes, doc.keyframe_count),
            ranges: to_keyframe_ranges(doc)?,
        },
    };

    owned.validate()?;
    Ok(owned)
}
