//! Snapshot-based undo/redo.
//!
//! Every snapshot is the full serialized document (core plus registered
//! extensions). Recording pushes the live state onto the undo stack and drops
//! the redo stack; undo and redo swap the live state with the top of the
//! opposite stack. The undo stack is bounded and evicts its oldest entry
//! first.

mod view;

pub use view::ViewState;

use crate::persistence::{DecodeOptions, Document, DocumentCodec, PersistenceError};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Default bound on the undo stack.
pub const MAX_HISTORY_DEPTH: usize = 32;

/// Owner of the live document a [`HistoryEngine`] snapshots.
pub trait DocumentHost {
    fn read_live(&self) -> &Document;

    fn apply_live(&mut self, document: Document);
}

impl DocumentHost for Document {
    fn read_live(&self) -> &Document {
        self
    }

    fn apply_live(&mut self, document: Document) {
        *self = document;
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEngine {
    undo: VecDeque<Vec<u8>>,
    redo: Vec<Vec<u8>>,
    depth: usize,
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryEngine {
    pub fn new() -> Self {
        Self::with_depth(MAX_HISTORY_DEPTH)
    }

    /// Engine keeping at most `depth` undo snapshots (at least one).
    pub fn with_depth(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            undo: VecDeque::with_capacity(depth),
            redo: Vec::new(),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Snapshot the live state before a mutation. Clears the redo stack.
    pub fn record(&mut self, host: &impl DocumentHost, codec: &DocumentCodec) {
        let snapshot = codec.serialize(host.read_live());
        if self.undo.len() == self.depth {
            self.undo.pop_front();
            trace!(depth = self.depth, "evicted oldest undo snapshot");
        }
        self.undo.push_back(snapshot);
        self.redo.clear();
        debug!(undo = self.undo.len(), "recorded snapshot");
    }

    /// Restore the most recent undo snapshot, pushing the live state onto the
    /// redo stack. Returns `Ok(false)` if there is nothing to undo. On a
    /// decode error both stacks and the live state are left untouched.
    pub fn undo(
        &mut self,
        host: &mut impl DocumentHost,
        codec: &mut DocumentCodec,
        restore_transient: bool,
    ) -> Result<bool, PersistenceError> {
        let Some(snapshot) = self.undo.back() else {
            return Ok(false);
        };
        let current = codec.serialize(host.read_live());
        let restored = codec.deserialize_with(snapshot, DecodeOptions { restore_transient })?;

        self.undo.pop_back();
        self.redo.push(current);
        host.apply_live(restored);
        debug!(undo = self.undo.len(), redo = self.redo.len(), "undo");
        Ok(true)
    }

    /// Mirror of [`undo`](Self::undo).
    pub fn redo(
        &mut self,
        host: &mut impl DocumentHost,
        codec: &mut DocumentCodec,
        restore_transient: bool,
    ) -> Result<bool, PersistenceError> {
        let Some(snapshot) = self.redo.last() else {
            return Ok(false);
        };
        let current = codec.serialize(host.read_live());
        let restored = codec.deserialize_with(snapshot, DecodeOptions { restore_transient })?;

        self.redo.pop();
        if self.undo.len() == self.depth {
            self.undo.pop_front();
        }
        self.undo.push_back(current);
        host.apply_live(restored);
        debug!(undo = self.undo.len(), redo = self.redo.len(), "redo");
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
