//! kexdoc - document persistence and history for the KEX coaster track editor.
//!
//! # Architecture
//!
//! Layered modules with strict inward-only dependencies:
//!
//! - **math**, **anchor**: Value types stored in documents (Float2, Float3, AnchorPoint)
//! - **graph**: Node/port/edge store with stable ids
//! - **keyframe**: Keyframe tracks and curve evaluation
//! - **persistence**: Chunked binary codec, extensions, clipboard
//! - **history**: Snapshot undo/redo and the view-state extension
//! - **ffi**: C FFI bindings (feature `ffi`)
//!
//! # Usage
//!
//! ```ignore
//! use kexdoc::{Document, HistoryEngine, persistence::DocumentCodec};
//! ```
//!
//! For C/C#/Unity, link the cdylib and use the `kex_*` FFI functions.

pub mod anchor;
pub mod graph;
pub mod history;
pub mod keyframe;
pub mod math;
pub mod persistence;

#[cfg(feature = "ffi")]
pub mod ffi;

// Re-export commonly used types at crate root
pub use anchor::AnchorPoint;
pub use graph::Graph;
pub use history::{DocumentHost, HistoryEngine, ViewState};
pub use keyframe::{InterpolationType, Keyframe, KeyframeStore, PropertyId};
pub use math::{Float2, Float3};
pub use persistence::{Clipboard, Document, DocumentCodec, PersistenceError};
