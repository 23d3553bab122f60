//! Length-prefixed, type-tagged binary chunks.
//!
//! A chunk is `type[4] | version u32 | length u32 | payload[length]`, all
//! little-endian. Lengths are patched in when a chunk closes, so chunks nest
//! freely and any reader can step over a chunk it does not understand.

use super::format::{tag_name, CHUNK_HEADER_SIZE};
use super::PersistenceError;
use crate::math::{Float2, Float3};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: [u8; 4],
    pub version: u32,
    pub length: u32,
}

impl ChunkHeader {
    pub fn name(&self) -> String {
        tag_name(&self.chunk_type)
    }
}

pub struct ChunkReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn has_data(&self) -> bool {
        self.position < self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], PersistenceError> {
        if count > self.remaining() {
            return Err(PersistenceError::TruncatedData {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let data: &'a [u8] = self.data;
        let bytes = &data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PersistenceError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read the next chunk header. `Ok(None)` at end of data.
    pub fn try_read_header(&mut self) -> Result<Option<ChunkHeader>, PersistenceError> {
        if !self.has_data() {
            return Ok(None);
        }
        if self.remaining() < CHUNK_HEADER_SIZE {
            return Err(PersistenceError::TruncatedData {
                needed: CHUNK_HEADER_SIZE,
                remaining: self.remaining(),
            });
        }

        let chunk_type = self.take_array::<4>()?;
        let version = self.read_u32()?;
        let length = self.read_u32()?;

        Ok(Some(ChunkHeader {
            chunk_type,
            version,
            length,
        }))
    }

    /// Step over a chunk payload without interpreting it.
    pub fn skip_chunk(&mut self, header: &ChunkHeader) -> Result<(), PersistenceError> {
        self.take(header.length as usize).map(|_| ())
    }

    /// Split off the payload of `header` as its own reader and advance past
    /// it. Reads through the returned reader cannot run into sibling chunks.
    pub fn enter_chunk(&mut self, header: &ChunkHeader) -> Result<ChunkReader<'a>, PersistenceError> {
        let payload = self.take(header.length as usize)?;
        Ok(ChunkReader::new(payload))
    }

    pub fn read_byte(&mut self) -> Result<u8, PersistenceError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, PersistenceError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_tag(&mut self) -> Result<[u8; 4], PersistenceError> {
        self.take_array::<4>()
    }

    pub fn read_u32(&mut self) -> Result<u32, PersistenceError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, PersistenceError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, PersistenceError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, PersistenceError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_float2(&mut self) -> Result<Float2, PersistenceError> {
        Ok(Float2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_float3(&mut self) -> Result<Float3, PersistenceError> {
        Ok(Float3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read an i32 element count. Negative counts, and counts whose records
    /// of `record_size` bytes cannot fit in what is left, are rejected before
    /// anything is allocated.
    pub fn read_count(&mut self, record_size: usize) -> Result<usize, PersistenceError> {
        let raw = self.read_i32()?;
        if raw < 0 {
            return Err(PersistenceError::NegativeLength(raw));
        }
        let count = raw as usize;
        let needed = count.saturating_mul(record_size);
        if needed > self.remaining() {
            return Err(PersistenceError::TruncatedData {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    pub fn read_u32_array(&mut self) -> Result<Vec<u32>, PersistenceError> {
        let count = self.read_count(4)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    pub fn read_float2_array(&mut self) -> Result<Vec<Float2>, PersistenceError> {
        let count = self.read_count(8)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_float2()?);
        }
        Ok(out)
    }

    /// Read `i32 count` then `count` pairs of `u64 key` and a value of
    /// `value_size` bytes decoded by `read_value`.
    pub fn read_map<V>(
        &mut self,
        value_size: usize,
        mut read_value: impl FnMut(&mut Self) -> Result<V, PersistenceError>,
    ) -> Result<HashMap<u64, V>, PersistenceError> {
        let count = self.read_count(8 + value_size)?;
        let mut map = HashMap::with_capacity(count);
        for _ in 0..count {
            let key = self.read_u64()?;
            let value = read_value(self)?;
            map.insert(key, value);
        }
        Ok(map)
    }

    pub fn read_hashmap_u64_f32(&mut self) -> Result<HashMap<u64, f32>, PersistenceError> {
        self.read_map(4, |r| r.read_f32())
    }

    pub fn read_hashmap_u64_float3(&mut self) -> Result<HashMap<u64, Float3>, PersistenceError> {
        self.read_map(12, |r| r.read_float3())
    }

    pub fn read_hashmap_u64_i32(&mut self) -> Result<HashMap<u64, i32>, PersistenceError> {
        self.read_map(4, |r| r.read_i32())
    }
}

pub struct ChunkWriter {
    buffer: Vec<u8>,
    chunk_stack: Vec<usize>, // Start positions of open chunks
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            chunk_stack: Vec::with_capacity(8),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        debug_assert!(self.chunk_stack.is_empty(), "unclosed chunk");
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn open_chunks(&self) -> usize {
        self.chunk_stack.len()
    }

    pub fn begin_chunk(&mut self, chunk_type: [u8; 4], version: u32) {
        let start_pos = self.buffer.len();
        self.chunk_stack.push(start_pos);

        self.buffer.extend_from_slice(&chunk_type);
        self.write_u32(version);
        self.write_u32(0); // Placeholder for length
    }

    /// Close the innermost open chunk, patching its length with everything
    /// written since `begin_chunk`, nested chunks included.
    pub fn end_chunk(&mut self) {
        let Some(start_pos) = self.chunk_stack.pop() else {
            debug_assert!(false, "end_chunk without matching begin_chunk");
            return;
        };
        let content_length = self.buffer.len() - start_pos - CHUNK_HEADER_SIZE;

        // Length lives at offset +8 (after type and version)
        let length_bytes = (content_length as u32).to_le_bytes();
        self.buffer[start_pos + 8..start_pos + 12].copy_from_slice(&length_bytes);
    }

    /// Write a whole chunk; the body cannot leave it unbalanced.
    pub fn chunk(&mut self, chunk_type: [u8; 4], version: u32, body: impl FnOnce(&mut Self)) {
        self.begin_chunk(chunk_type, version);
        body(self);
        self.end_chunk();
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_float2(&mut self, value: Float2) {
        self.write_f32(value.x);
        self.write_f32(value.y);
    }

    pub fn write_float3(&mut self, value: Float3) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    pub fn write_count(&mut self, count: usize) {
        self.write_i32(count as i32);
    }

    pub fn write_u32_array(&mut self, values: &[u32]) {
        self.write_count(values.len());
        for &value in values {
            self.write_u32(value);
        }
    }

    pub fn write_float2_array(&mut self, values: &[Float2]) {
        self.write_count(values.len());
        for &value in values {
            self.write_float2(value);
        }
    }

    /// Write `i32 count` then `(u64 key, value)` pairs in ascending key order,
    /// so equal maps always produce equal bytes.
    pub fn write_map<V>(&mut self, map: &HashMap<u64, V>, mut write_value: impl FnMut(&mut Self, &V)) {
        let mut keys: Vec<u64> = map.keys().copied().collect();
        keys.sort_unstable();
        self.write_count(keys.len());
        for key in keys {
            self.write_u64(key);
            write_value(self, &map[&key]);
        }
    }

    pub fn write_hashmap_u64_f32(&mut self, map: &HashMap<u64, f32>) {
        self.write_map(map, |w, &v| w.write_f32(v));
    }

    pub fn write_hashmap_u64_float3(&mut self, map: &HashMap<u64, Float3>) {
        self.write_map(map, |w, &v| w.write_float3(v));
    }

    pub fn write_hashmap_u64_i32(&mut self, map: &HashMap<u64, i32>) {
        self.write_map(map, |w, &v| w.write_i32(v));
    }
}

impl Default for ChunkWriter {
    fn default() -> Self {
        Self::new()
    }
}
