//! Caller-defined top-level chunks.
//!
//! The core codec writes `CORE` and then hands the writer to every registered
//! extension. On read, any non-`CORE` chunk whose tag matches an extension is
//! passed to it along with the version found on disk; anything else is
//! skipped. A failed extension read rolls every extension back to its state
//! before the decode.

use super::chunk::{ChunkReader, ChunkWriter};
use super::PersistenceError;
use std::any::Any;

pub trait ChunkExtension: Any {
    /// Four-byte tag, zero-padded. Must not be `CORE`.
    fn chunk_type(&self) -> [u8; 4];

    /// Version written with this extension's chunk.
    fn current_version(&self) -> u32;

    /// Write the chunk payload. The codec opens and closes the chunk.
    fn write(&self, writer: &mut ChunkWriter);

    /// Whether [`read`](Self::read) understands `version`. Chunks at a
    /// declined version are skipped as if absent.
    fn accepts_version(&self, version: u32) -> bool {
        version <= self.current_version()
    }

    /// Read a payload written at `version`. The reader is bounded to this
    /// chunk; unread trailing bytes are skipped.
    fn read(&mut self, reader: &mut ChunkReader, version: u32) -> Result<(), PersistenceError>;

    /// Reset to the state implied by a document without this chunk.
    fn clear(&mut self);

    /// Transient state (camera, playhead) is only restored from history on
    /// request.
    fn is_transient(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
