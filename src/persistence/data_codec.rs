//! DATA chunk payload: keyframes, keyframe ranges and the keyed maps.
//!
//! Version 3: keyframes, ranges, scalars, vectors, durations, flags, anchors.
//! Version 2: keyframes, ranges, scalars, vectors, flags.

use super::chunk::{ChunkReader, ChunkWriter};
use super::document::{DurationType, IterationConfig};
use super::format::{DATA_VERSION, DATA_VERSION_NO_ANCHORS};
use super::{Document, PersistenceError};
use crate::anchor::AnchorPoint;
use crate::keyframe::{InterpolationType, Keyframe, KeyframeStore};
use std::collections::HashMap;

const RANGE_SIZE: usize = 8 + 4 + 4;
const DURATION_SIZE: usize = 4 + 4;
const ANCHOR_SIZE: usize = AnchorPoint::FLOAT_COUNT * 4;

/// Payload size of a DATA chunk written at the current version.
pub fn encoded_size(doc: &Document) -> usize {
    let map = |entries: usize, value_size: usize| 4 + entries * (8 + value_size);
    4 + doc.keyframes.keyframe_count() * Keyframe::ENCODED_SIZE
        + 4
        + doc.keyframes.track_count() * RANGE_SIZE
        + map(doc.scalars.len(), 4)
        + map(doc.vectors.len(), 12)
        + map(doc.durations.len(), DURATION_SIZE)
        + map(doc.flags.len(), 4)
        + map(doc.anchors.len(), ANCHOR_SIZE)
}

/// Write the document's keyed data at DATA_VERSION.
pub fn write(writer: &mut ChunkWriter, doc: &Document) {
    write_keyframes(writer, &doc.keyframes);
    writer.write_hashmap_u64_f32(&doc.scalars);
    writer.write_hashmap_u64_float3(&doc.vectors);
    writer.write_map(&doc.durations, |w, d| {
        w.write_f32(d.duration);
        w.write_i32(d.duration_type as i32);
    });
    writer.write_hashmap_u64_i32(&doc.flags);
    writer.write_map(&doc.anchors, write_anchor);
}

/// Read a DATA payload written at `version` into `doc`.
pub fn read(
    reader: &mut ChunkReader,
    version: u32,
    doc: &mut Document,
) -> Result<(), PersistenceError> {
    let has_anchors = match version {
        DATA_VERSION => true,
        DATA_VERSION_NO_ANCHORS => false,
        found => {
            return Err(PersistenceError::UnsupportedVersion {
                chunk: "DATA",
                found,
                max: DATA_VERSION,
            })
        }
    };

    doc.keyframes = read_keyframes(reader)?;
    doc.scalars = reader.read_hashmap_u64_f32()?;
    doc.vectors = reader.read_hashmap_u64_float3()?;
    doc.durations = if has_anchors {
        reader.read_map(DURATION_SIZE, read_duration)?
    } else {
        HashMap::new()
    };
    doc.flags = reader.read_hashmap_u64_i32()?;
    doc.anchors = if has_anchors {
        reader.read_map(ANCHOR_SIZE, read_anchor)?
    } else {
        HashMap::new()
    };
    Ok(())
}

fn write_keyframes(writer: &mut ChunkWriter, store: &KeyframeStore) {
    writer.write_count(store.keyframes.len());
    for kf in &store.keyframes {
        writer.write_f32(kf.time);
        writer.write_f32(kf.value);
        writer.write_byte(kf.in_interpolation.to_byte());
        writer.write_byte(kf.out_interpolation.to_byte());
        writer.write_f32(kf.in_tangent);
        writer.write_f32(kf.out_tangent);
        writer.write_f32(kf.in_weight);
        writer.write_f32(kf.out_weight);
    }

    let mut keys: Vec<u64> = store.ranges.keys().copied().collect();
    keys.sort_unstable();
    writer.write_count(keys.len());
    for key in keys {
        let (start, length) = store.ranges[&key];
        writer.write_u64(key);
        writer.write_i32(start as i32);
        writer.write_i32(length as i32);
    }
}

fn read_keyframes(reader: &mut ChunkReader) -> Result<KeyframeStore, PersistenceError> {
    let keyframe_count = reader.read_count(Keyframe::ENCODED_SIZE)?;
    let mut store = KeyframeStore::new();
    store.keyframes.reserve(keyframe_count);

    for _ in 0..keyframe_count {
        let time = reader.read_f32()?;
        let value = reader.read_f32()?;
        let in_interp = InterpolationType::from_byte(reader.read_byte()?);
        let out_interp = InterpolationType::from_byte(reader.read_byte()?);
        let in_tangent = reader.read_f32()?;
        let out_tangent = reader.read_f32()?;
        let in_weight = reader.read_f32()?;
        let out_weight = reader.read_f32()?;

        store.keyframes.push(Keyframe::new(
            time,
            value,
            in_interp,
            out_interp,
            in_tangent,
            out_tangent,
            in_weight,
            out_weight,
        ));
    }

    let range_count = reader.read_count(RANGE_SIZE)?;
    store.ranges.reserve(range_count);
    for _ in 0..range_count {
        let key = reader.read_u64()?;
        let start = read_index(reader)?;
        let length = read_index(reader)?;
        store.ranges.insert(key, (start, length));
    }

    Ok(store)
}

fn read_index(reader: &mut ChunkReader) -> Result<usize, PersistenceError> {
    let raw = reader.read_i32()?;
    if raw < 0 {
        return Err(PersistenceError::NegativeLength(raw));
    }
    Ok(raw as usize)
}

fn read_duration(reader: &mut ChunkReader) -> Result<IterationConfig, PersistenceError> {
    let duration = reader.read_f32()?;
    let raw_type = reader.read_i32()?;
    let duration_type = DurationType::from_i32(raw_type).ok_or_else(|| {
        PersistenceError::CorruptedData(format!("unknown duration type {raw_type}"))
    })?;
    Ok(IterationConfig::new(duration, duration_type))
}

fn write_anchor(writer: &mut ChunkWriter, anchor: &AnchorPoint) {
    writer.write_float3(anchor.heart_position);
    writer.write_float3(anchor.direction);
    writer.write_float3(anchor.normal);
    writer.write_float3(anchor.lateral);
    writer.write_f32(anchor.velocity);
    writer.write_f32(anchor.normal_force);
    writer.write_f32(anchor.lateral_force);
    writer.write_f32(anchor.heart_arc);
    writer.write_f32(anchor.spine_arc);
    writer.write_f32(anchor.heart_advance);
    writer.write_f32(anchor.friction_origin);
    writer.write_f32(anchor.roll_speed);
    writer.write_f32(anchor.heart_offset);
    writer.write_f32(anchor.friction);
    writer.write_f32(anchor.resistance);
}

fn read_anchor(reader: &mut ChunkReader) -> Result<AnchorPoint, PersistenceError> {
    Ok(AnchorPoint {
        heart_position: reader.read_float3()?,
        direction: reader.read_float3()?,
        normal: reader.read_float3()?,
        lateral: reader.read_float3()?,
        velocity: reader.read_f32()?,
        normal_force: reader.read_f32()?,
        lateral_force: reader.read_f32()?,
        heart_arc: reader.read_f32()?,
        spine_arc: reader.read_f32()?,
        heart_advance: reader.read_f32()?,
        friction_origin: reader.read_f32()?,
        roll_speed: reader.read_f32()?,
        heart_offset: reader.read_f32()?,
        friction: reader.read_f32()?,
        resistance: reader.read_f32()?,
    })
}
