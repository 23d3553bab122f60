//! Binary persistence for the kexd format.
//!
//! ```text
//! "KEXD" u32 fileVersion
//! CORE { GRPH {...} DATA {...} }
//! <extension chunk>*
//! ```
//!
//! The same bytes serve as file contents and as undo/redo snapshots.

mod chunk;
mod clipboard;
mod data_codec;
mod document;
mod extension;
mod format;
mod graph_codec;

pub use chunk::{ChunkHeader, ChunkReader, ChunkWriter};
pub use clipboard::Clipboard;
pub use document::{input_key, key_local_index, key_node_id, Document, DurationType, IterationConfig};
pub use extension::ChunkExtension;
pub use format::*;

use crate::graph::GraphError;
use crate::keyframe::InvalidRange;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("invalid file magic {found:?} (expected {expected:?})")]
    InvalidMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported {chunk} version {found} (newest known {max})")]
    UnsupportedVersion {
        chunk: &'static str,
        found: u32,
        max: u32,
    },
    #[error("truncated data: needed {needed} bytes, {remaining} remaining")]
    TruncatedData { needed: usize, remaining: usize },
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("missing {0} chunk")]
    MissingChunk(&'static str),
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    #[error("invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),
    #[error(transparent)]
    InvalidKeyframeRange(#[from] InvalidRange),
    #[error("buffer too small: {required} bytes required, capacity {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },
}

/// Decode-time switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Read chunks of transient extensions. When off they are skipped and
    /// those extensions keep their current state.
    pub restore_transient: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            restore_transient: true,
        }
    }
}

/// Document codec with caller-registered extension chunks.
#[derive(Default)]
pub struct DocumentCodec {
    extensions: Vec<Box<dyn ChunkExtension>>,
}

impl DocumentCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension, replacing any previous one with the same tag.
    /// Returns `false` (and registers nothing) for the reserved `CORE` tag.
    pub fn register<E: ChunkExtension>(&mut self, extension: E) -> bool {
        let tag = extension.chunk_type();
        if tag == CHUNK_CORE {
            warn!("refusing to register extension with reserved tag CORE");
            return false;
        }
        self.extensions.retain(|e| e.chunk_type() != tag);
        debug!(chunk = %tag_name(&tag), "registered extension");
        self.extensions.push(Box::new(extension));
        true
    }

    pub fn with_extension<E: ChunkExtension>(mut self, extension: E) -> Self {
        self.register(extension);
        self
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }

    pub fn extension<E: ChunkExtension>(&self) -> Option<&E> {
        self.extensions
            .iter()
            .find_map(|e| e.as_any().downcast_ref::<E>())
    }

    pub fn extension_mut<E: ChunkExtension>(&mut self) -> Option<&mut E> {
        self.extensions
            .iter_mut()
            .find_map(|e| e.as_any_mut().downcast_mut::<E>())
    }

    /// Exact size of the header plus CORE chunk. Extension chunks are not
    /// included; see [`encoded_size`](Self::encoded_size).
    pub fn estimated_size(&self, doc: &Document) -> usize {
        core_size(doc)
    }

    /// Exact size of [`serialize`](Self::serialize)'s output. Extensions are
    /// sized by writing them to a scratch buffer.
    pub fn encoded_size(&self, doc: &Document) -> usize {
        let extensions: usize = self
            .extensions
            .iter()
            .map(|extension| {
                let mut scratch = ChunkWriter::new();
                extension.write(&mut scratch);
                CHUNK_HEADER_SIZE + scratch.len()
            })
            .sum();
        core_size(doc) + extensions
    }

    pub fn serialize(&self, doc: &Document) -> Vec<u8> {
        let mut writer = ChunkWriter::with_capacity(core_size(doc) + 64 * self.extensions.len());
        write_file_header(&mut writer, MAGIC, FILE_VERSION);
        write_core(&mut writer, doc);

        for extension in &self.extensions {
            writer.chunk(extension.chunk_type(), extension.current_version(), |w| {
                extension.write(w)
            });
        }

        trace!(bytes = writer.len(), "serialized document");
        writer.into_bytes()
    }

    /// Serialize into a caller-provided buffer, returning the bytes written.
    ///
    /// The capacity is checked against [`encoded_size`](Self::encoded_size)
    /// before the document is encoded. On success the document is encoded
    /// into a temporary buffer and copied.
    pub fn serialize_into(&self, doc: &Document, buffer: &mut [u8]) -> Result<usize, PersistenceError> {
        let required = self.encoded_size(doc);
        if required > buffer.len() {
            return Err(PersistenceError::BufferTooSmall {
                required,
                capacity: buffer.len(),
            });
        }
        let bytes = self.serialize(doc);
        let Some(target) = buffer.get_mut(..bytes.len()) else {
            return Err(PersistenceError::BufferTooSmall {
                required: bytes.len(),
                capacity: buffer.len(),
            });
        };
        target.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    pub fn deserialize(&mut self, data: &[u8]) -> Result<Document, PersistenceError> {
        self.deserialize_with(data, DecodeOptions::default())
    }

    /// Decode a document. The core is fully decoded and validated before any
    /// extension state is touched. If an extension then fails to read its
    /// chunk, every extension is rolled back, so an error always leaves
    /// extensions as they were. Extension chunks at a version the extension
    /// declines are skipped with a warning.
    pub fn deserialize_with(
        &mut self,
        data: &[u8],
        options: DecodeOptions,
    ) -> Result<Document, PersistenceError> {
        let mut reader = ChunkReader::new(data);
        let file_version = read_file_header(&mut reader, MAGIC)?;
        if file_version > FILE_VERSION {
            debug!(file_version, "file written by a newer format version");
        }

        let mut doc = None;
        let mut extension_chunks = Vec::new();

        while let Some(header) = reader.try_read_header()? {
            let mut payload = reader.enter_chunk(&header)?;
            if header.chunk_type == CHUNK_CORE {
                if doc.is_some() {
                    debug!("ignoring duplicate CORE chunk");
                    continue;
                }
                doc = Some(read_core(&mut payload, header.version)?);
            } else {
                extension_chunks.push((header, payload));
            }
        }

        let doc = doc.ok_or(PersistenceError::MissingChunk("CORE"))?;

        let mut backups = Vec::new();
        for (index, extension) in self.extensions.iter_mut().enumerate() {
            if options.restore_transient || !extension.is_transient() {
                let mut backup = ChunkWriter::new();
                extension.write(&mut backup);
                backups.push((index, backup.into_bytes()));
                extension.clear();
            }
        }

        if let Err(err) = self.read_extensions(extension_chunks, options) {
            self.restore_extensions(&backups);
            return Err(err);
        }
        Ok(doc)
    }

    fn read_extensions(
        &mut self,
        chunks: Vec<(ChunkHeader, ChunkReader<'_>)>,
        options: DecodeOptions,
    ) -> Result<(), PersistenceError> {
        for (header, mut payload) in chunks {
            let Some(extension) = self
                .extensions
                .iter_mut()
                .find(|e| e.chunk_type() == header.chunk_type)
            else {
                debug!(chunk = %header.name(), length = header.length, "skipping unknown chunk");
                continue;
            };
            if extension.is_transient() && !options.restore_transient {
                trace!(chunk = %header.name(), "skipping transient chunk");
                continue;
            }
            if !extension.accepts_version(header.version) {
                warn!(
                    chunk = %header.name(),
                    found = header.version,
                    max = extension.current_version(),
                    "skipping extension chunk with unsupported version"
                );
                continue;
            }
            extension.read(&mut payload, header.version)?;
            if payload.has_data() {
                warn!(
                    chunk = %header.name(),
                    unread = payload.remaining(),
                    "extension left trailing bytes"
                );
            }
        }
        Ok(())
    }

    /// Reload extensions from the bytes captured before a failed decode.
    fn restore_extensions(&mut self, backups: &[(usize, Vec<u8>)]) {
        for (index, bytes) in backups {
            let Some(extension) = self.extensions.get_mut(*index) else {
                continue;
            };
            extension.clear();
            let version = extension.current_version();
            if let Err(err) = extension.read(&mut ChunkReader::new(bytes), version) {
                warn!(
                    chunk = %tag_name(&extension.chunk_type()),
                    %err,
                    "could not restore extension state"
                );
            }
        }
        debug!(restored = backups.len(), "rolled back extensions after failed decode");
    }
}

/// Serialize a document with no extensions.
pub fn serialize(doc: &Document) -> Vec<u8> {
    DocumentCodec::new().serialize(doc)
}

/// Deserialize a document, skipping every extension chunk.
pub fn deserialize(data: &[u8]) -> Result<Document, PersistenceError> {
    DocumentCodec::new().deserialize(data)
}

fn core_size(doc: &Document) -> usize {
    FILE_HEADER_SIZE
        + CHUNK_HEADER_SIZE
        + CHUNK_HEADER_SIZE
        + graph_codec::encoded_size(&doc.graph)
        + CHUNK_HEADER_SIZE
        + data_codec::encoded_size(doc)
}

fn write_file_header(writer: &mut ChunkWriter, magic: [u8; 4], version: u32) {
    writer.write_bytes(&magic);
    writer.write_u32(version);
}

fn read_file_header(reader: &mut ChunkReader, magic: [u8; 4]) -> Result<u32, PersistenceError> {
    if reader.remaining() < FILE_HEADER_SIZE {
        return Err(PersistenceError::TruncatedData {
            needed: FILE_HEADER_SIZE,
            remaining: reader.remaining(),
        });
    }
    let found = reader.read_tag()?;
    if found != magic {
        return Err(PersistenceError::InvalidMagic {
            expected: magic,
            found,
        });
    }
    reader.read_u32()
}

fn write_core(writer: &mut ChunkWriter, doc: &Document) {
    writer.chunk(CHUNK_CORE, CORE_VERSION, |w| {
        w.chunk(CHUNK_GRPH, GRAPH_VERSION, |w| graph_codec::write(w, &doc.graph));
        w.chunk(CHUNK_DATA, DATA_VERSION, |w| data_codec::write(w, doc));
    });
}

/// Decode a CORE payload and validate the result.
fn read_core(reader: &mut ChunkReader, version: u32) -> Result<Document, PersistenceError> {
    if version != CORE_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            chunk: "CORE",
            found: version,
            max: CORE_VERSION,
        });
    }

    let mut doc = Document::new();
    while let Some(header) = reader.try_read_header()? {
        let mut payload = reader.enter_chunk(&header)?;
        trace!(chunk = %header.name(), version = header.version, length = header.length, "core sub-chunk");
        if header.chunk_type == CHUNK_GRPH {
            doc.graph = graph_codec::read(&mut payload, header.version)?;
        } else if header.chunk_type == CHUNK_DATA {
            data_codec::read(&mut payload, header.version, &mut doc)?;
        } else {
            debug!(chunk = %header.name(), "skipping unknown core sub-chunk");
        }
    }

    doc.validate()?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorPoint;
    use crate::graph::{PortDataType, PortSpec};
    use crate::keyframe::{keyframe_key, Keyframe, PropertyId};
    use crate::math::{Float2, Float3};

    fn make_test_document() -> Document {
        let mut doc = Document::new();
        let anchor = doc.graph.add_node(5, Float2::new(0.0, 0.0)).unwrap();
        let force = doc.graph.add_node(0, Float2::new(250.0, 40.0)).unwrap();
        let out = doc
            .graph
            .add_port(PortSpec::new(PortDataType::Anchor, 0), anchor, false)
            .unwrap();
        let input = doc
            .graph
            .add_port(PortSpec::new(PortDataType::Anchor, 0), force, true)
            .unwrap();
        doc.graph
            .add_port(PortSpec::new(PortDataType::Scalar, 0), force, true)
            .unwrap();
        doc.graph
            .add_port(PortSpec::new(PortDataType::Path, 0), force, false)
            .unwrap();
        doc.graph.add_edge(out, input).unwrap();

        doc.scalars.insert(input_key(force, 0), 5.0);
        doc.vectors
            .insert(input_key(anchor, 0), Float3::new(0.0, 10.0, 0.0));
        doc.durations
            .insert(input_key(force, 0), IterationConfig::new(5.0, DurationType::Time));
        doc.flags.insert(input_key(force, 240), 1);
        doc.anchors
            .insert(input_key(anchor, 0), AnchorPoint::at(Float3::new(0.0, 10.0, 0.0)));
        doc.keyframes.set_track(
            force,
            PropertyId::RollSpeed as u8,
            vec![Keyframe::simple(0.0, 0.0), Keyframe::simple(1.0, 1.0)],
        );
        doc
    }

    struct Marker {
        value: u32,
        seen_version: Option<u32>,
    }

    impl ChunkExtension for Marker {
        fn chunk_type(&self) -> [u8; 4] {
            *b"MARK"
        }

        fn current_version(&self) -> u32 {
            3
        }

        fn write(&self, writer: &mut ChunkWriter) {
            writer.write_u32(self.value);
        }

        fn read(&mut self, reader: &mut ChunkReader, version: u32) -> Result<(), PersistenceError> {
            self.seen_version = Some(version);
            self.value = reader.read_u32()?;
            Ok(())
        }

        fn clear(&mut self) {
            self.value = 0;
            self.seen_version = None;
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn marker(value: u32) -> Marker {
        Marker {
            value,
            seen_version: None,
        }
    }

    #[test]
    fn serialize_deserialize_empty_document() {
        let doc = Document::new();
        let data = serialize(&doc);
        let loaded = deserialize(&data).unwrap();

        assert!(loaded.is_empty());
        assert_eq!(loaded, doc);
    }

    #[test]
    fn serialize_deserialize_full_document() {
        let original = make_test_document();
        let loaded = deserialize(&serialize(&original)).unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.graph.get_node_index(2), Some(1));
        assert_eq!(
            loaded.keyframes.track(2, PropertyId::RollSpeed as u8).len(),
            2
        );
    }

    #[test]
    fn serialization_is_deterministic() {
        let doc = make_test_document();
        assert_eq!(serialize(&doc), serialize(&doc.clone()));
    }

    #[test]
    fn estimated_size_is_exact_for_core() {
        let doc = make_test_document();
        let codec = DocumentCodec::new();
        assert_eq!(codec.estimated_size(&doc), codec.serialize(&doc).len());
    }

    #[test]
    fn magic_bytes_correct() {
        let data = serialize(&Document::new());
        assert_eq!(&data[0..4], b"KEXD");
        assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), FILE_VERSION);
        assert_eq!(&data[8..12], b"CORE");
    }

    #[test]
    fn invalid_magic_returns_error() {
        let mut data = serialize(&Document::new());
        data[0] = b'X';

        assert!(matches!(
            deserialize(&data),
            Err(PersistenceError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn truncated_data_returns_error() {
        let result = deserialize(&[b'K', b'E', b'X']);
        assert!(matches!(result, Err(PersistenceError::TruncatedData { .. })));
    }

    #[test]
    fn truncated_core_returns_error() {
        let mut data = serialize(&make_test_document());
        data.truncate(data.len() - 7);
        assert!(matches!(
            deserialize(&data),
            Err(PersistenceError::TruncatedData { .. })
        ));
    }

    #[test]
    fn missing_core_is_an_error() {
        let mut writer = ChunkWriter::new();
        writer.write_bytes(&MAGIC);
        writer.write_u32(FILE_VERSION);
        assert_eq!(
            deserialize(&writer.into_bytes()),
            Err(PersistenceError::MissingChunk("CORE"))
        );
    }

    #[test]
    fn unknown_top_level_chunk_is_skipped() {
        let doc = make_test_document();
        let plain = serialize(&doc);

        let mut with_junk = ChunkWriter::new();
        with_junk.write_bytes(&plain);
        with_junk.chunk(*b"ZZZZ", 7, |w| {
            w.write_u64(u64::MAX);
            w.chunk(*b"NEST", 1, |w| w.write_f32(1.0));
        });
        let with_junk = with_junk.into_bytes();

        assert_eq!(deserialize(&with_junk).unwrap(), deserialize(&plain).unwrap());
    }

    #[test]
    fn unknown_core_sub_chunk_is_skipped() {
        let doc = make_test_document();
        let mut writer = ChunkWriter::new();
        writer.write_bytes(&MAGIC);
        writer.write_u32(FILE_VERSION);
        writer.chunk(CHUNK_CORE, CORE_VERSION, |w| {
            w.chunk(*b"FUTR", 1, |w| w.write_u32(5));
            w.chunk(CHUNK_GRPH, GRAPH_VERSION, |w| graph_codec::write(w, &doc.graph));
            w.chunk(CHUNK_DATA, DATA_VERSION, |w| data_codec::write(w, &doc));
        });

        assert_eq!(deserialize(&writer.into_bytes()).unwrap(), doc);
    }

    #[test]
    fn unsupported_core_version_is_rejected() {
        let mut data = serialize(&Document::new());
        // CORE version follows the 8-byte file header and 4-byte tag.
        data[12..16].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            deserialize(&data),
            Err(PersistenceError::UnsupportedVersion { chunk: "CORE", .. })
        ));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut doc = make_test_document();
        doc.graph.edge_targets[0] = 999;
        assert!(matches!(
            deserialize(&serialize(&doc)),
            Err(PersistenceError::InvalidGraph(_))
        ));
    }

    #[test]
    fn dangling_keyframe_range_is_rejected() {
        let mut doc = make_test_document();
        doc.keyframes.ranges.insert(keyframe_key(1, 0), (1, 9));
        assert!(matches!(
            deserialize(&serialize(&doc)),
            Err(PersistenceError::InvalidKeyframeRange(_))
        ));
    }

    #[test]
    fn extension_round_trip_with_disk_version() {
        let codec = DocumentCodec::new().with_extension(marker(42));
        let data = codec.serialize(&make_test_document());

        let mut reader_codec = DocumentCodec::new().with_extension(marker(0));
        let doc = reader_codec.deserialize(&data).unwrap();
        let marker = reader_codec.extension::<Marker>().unwrap();

        assert_eq!(doc, make_test_document());
        assert_eq!(marker.value, 42);
        assert_eq!(marker.seen_version, Some(3));
    }

    #[test]
    fn extension_cleared_when_chunk_absent() {
        let data = serialize(&Document::new());
        let mut codec = DocumentCodec::new().with_extension(marker(9));
        codec.deserialize(&data).unwrap();
        assert_eq!(codec.extension::<Marker>().unwrap().value, 0);
    }

    #[test]
    fn extension_chunk_is_ignored_without_registration() {
        let codec = DocumentCodec::new().with_extension(marker(42));
        let data = codec.serialize(&make_test_document());
        assert_eq!(deserialize(&data).unwrap(), make_test_document());
    }

    #[test]
    fn corrupt_core_leaves_extension_untouched() {
        let writer_codec = DocumentCodec::new().with_extension(marker(42));
        let mut doc = make_test_document();
        doc.graph.port_owners[0] = 77;
        let data = writer_codec.serialize(&doc);

        let mut codec = DocumentCodec::new().with_extension(marker(5));
        assert!(codec.deserialize(&data).is_err());
        assert_eq!(codec.extension::<Marker>().unwrap().value, 5);
    }

    #[test]
    fn register_replaces_same_tag_and_rejects_core() {
        struct CoreImpostor;
        impl ChunkExtension for CoreImpostor {
            fn chunk_type(&self) -> [u8; 4] {
                CHUNK_CORE
            }
            fn current_version(&self) -> u32 {
                1
            }
            fn write(&self, _: &mut ChunkWriter) {}
            fn read(&mut self, _: &mut ChunkReader, _: u32) -> Result<(), PersistenceError> {
                Ok(())
            }
            fn clear(&mut self) {}
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let mut codec = DocumentCodec::new();
        assert!(codec.register(marker(1)));
        assert!(codec.register(marker(2)));
        assert!(!codec.register(CoreImpostor));
        assert_eq!(codec.extension_count(), 1);
        assert_eq!(codec.extension::<Marker>().unwrap().value, 2);

        codec.extension_mut::<Marker>().unwrap().value = 8;
        assert_eq!(codec.extension::<Marker>().unwrap().value, 8);
    }

    #[test]
    fn serialize_into_reports_small_buffer() {
        let doc = make_test_document();
        let codec = DocumentCodec::new();
        let size = codec.estimated_size(&doc);

        let mut small = vec![0u8; size - 1];
        assert_eq!(
            codec.serialize_into(&doc, &mut small),
            Err(PersistenceError::BufferTooSmall {
                required: size,
                capacity: size - 1
            })
        );

        let mut exact = vec![0u8; size];
        assert_eq!(codec.serialize_into(&doc, &mut exact), Ok(size));
        assert_eq!(deserialize(&exact).unwrap(), doc);
    }

    #[test]
    fn encoded_size_includes_extensions() {
        let doc = make_test_document();
        let codec = DocumentCodec::new().with_extension(marker(42));
        let size = codec.encoded_size(&doc);
        assert_eq!(size, codec.serialize(&doc).len());
        assert_eq!(size, codec.estimated_size(&doc) + CHUNK_HEADER_SIZE + 4);

        let mut small = vec![0u8; size - 1];
        assert_eq!(
            codec.serialize_into(&doc, &mut small),
            Err(PersistenceError::BufferTooSmall {
                required: size,
                capacity: size - 1
            })
        );
        assert!(small.iter().all(|&b| b == 0));
    }

    #[test]
    fn newer_extension_version_is_skipped() {
        let mut data = serialize(&make_test_document());
        let mut future = ChunkWriter::new();
        future.chunk(*b"MARK", 4, |w| w.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]));
        data.extend_from_slice(future.as_bytes());

        let mut codec = DocumentCodec::new().with_extension(marker(9));
        assert_eq!(codec.deserialize(&data).unwrap(), make_test_document());

        let marker = codec.extension::<Marker>().unwrap();
        assert_eq!(marker.value, 0);
        assert_eq!(marker.seen_version, None);
    }

    #[test]
    fn failed_extension_read_restores_previous_state() {
        let mut data = serialize(&make_test_document());
        let mut short = ChunkWriter::new();
        short.chunk(*b"MARK", 3, |w| w.write_bytes(&[1, 2]));
        data.extend_from_slice(short.as_bytes());

        let mut codec = DocumentCodec::new().with_extension(marker(5));
        assert!(matches!(
            codec.deserialize(&data),
            Err(PersistenceError::TruncatedData { .. })
        ));
        assert_eq!(codec.extension::<Marker>().unwrap().value, 5);
    }
}
