//! End-to-end document, extension and clipboard scenarios.

use approx::assert_relative_eq;
use kexdoc::graph::{PortDataType, PortSpec};
use kexdoc::keyframe::{evaluate_property, PropertyId};
use kexdoc::persistence::{
    deserialize, input_key, serialize, ChunkWriter, DecodeOptions, CHUNK_CORE, FILE_VERSION, MAGIC,
};
use kexdoc::{
    AnchorPoint, Clipboard, Document, DocumentCodec, Float2, Float3, HistoryEngine, Keyframe,
    PersistenceError, ViewState,
};

/// Two nodes joined by one edge; node B has a linear normal-force track.
fn two_node_document() -> (Document, u32, u32) {
    let mut doc = Document::new();
    let a = doc.graph.add_node(0, Float2::new(0.0, 0.0)).unwrap();
    let b = doc.graph.add_node(1, Float2::new(200.0, 0.0)).unwrap();
    let out = doc
        .graph
        .add_port(PortSpec::new(PortDataType::Anchor, 0), a, false)
        .unwrap();
    let input = doc
        .graph
        .add_port(PortSpec::new(PortDataType::Anchor, 0), b, true)
        .unwrap();
    doc.graph.add_edge(out, input).unwrap();

    doc.anchors
        .insert(input_key(a, 0), AnchorPoint::at(Float3::new(0.0, 3.0, 0.0)));
    doc.keyframes.set_track(
        b,
        PropertyId::NormalForce as u8,
        vec![Keyframe::linear(0.0, 0.0), Keyframe::linear(1.0, 10.0)],
    );
    (doc, a, b)
}

#[test]
fn two_node_document_survives_round_trip() {
    let (doc, a, b) = two_node_document();
    let loaded = deserialize(&serialize(&doc)).unwrap();

    assert_eq!(loaded, doc);
    assert_eq!(loaded.graph.node_count(), 2);
    assert_eq!(loaded.graph.edge_count(), 1);
    assert_eq!(
        loaded.graph.get_node_position(b),
        Some(Float2::new(200.0, 0.0))
    );
    assert!(loaded.get_anchor(a, 0).is_some());

    let value = loaded
        .keyframes
        .evaluate(b, PropertyId::NormalForce as u8, 0.5, 1.0);
    assert_relative_eq!(value, 5.0, epsilon = 1e-5);
}

#[test]
fn empty_track_falls_back_to_anchor_or_default() {
    let (doc, a, b) = two_node_document();
    let anchor = doc.get_anchor(a, 0);

    let velocity = evaluate_property(
        doc.keyframes.track(b, PropertyId::DrivenVelocity as u8),
        PropertyId::DrivenVelocity,
        0.3,
        anchor,
    );
    assert_relative_eq!(velocity, AnchorPoint::default().velocity);

    let roll = evaluate_property(
        doc.keyframes.track(b, PropertyId::RollSpeed as u8),
        PropertyId::RollSpeed,
        0.3,
        anchor,
    );
    assert_relative_eq!(roll, 0.0);
}

#[test]
fn loaded_graph_continues_id_sequence() {
    let (doc, _, b) = two_node_document();
    let mut loaded = deserialize(&serialize(&doc)).unwrap();
    assert_eq!(loaded.graph.add_node(2, Float2::ZERO), Some(b + 1));
}

#[test]
fn view_state_round_trips_through_codec() {
    let (doc, _, b) = two_node_document();
    let view = ViewState {
        playhead_time: 2.5,
        selected_nodes: vec![b],
        ..ViewState::default()
    };
    let bytes = DocumentCodec::new().with_extension(view.clone()).serialize(&doc);

    let mut codec = DocumentCodec::new().with_extension(ViewState::default());
    let loaded = codec.deserialize(&bytes).unwrap();
    assert_eq!(loaded, doc);
    assert_eq!(codec.extension::<ViewState>(), Some(&view));

    // Plain decode ignores the VIEW chunk.
    assert_eq!(deserialize(&bytes).unwrap(), doc);

    // Transient chunks can be left alone on request.
    let mut kept = DocumentCodec::new().with_extension(ViewState {
        camera_distance: 7.0,
        ..ViewState::default()
    });
    kept.deserialize_with(&bytes, DecodeOptions { restore_transient: false })
        .unwrap();
    assert_eq!(kept.extension::<ViewState>().map(|v| v.camera_distance), Some(7.0));
}

#[test]
fn malformed_inputs_are_rejected() {
    assert!(matches!(
        deserialize(b"KEX"),
        Err(PersistenceError::TruncatedData { .. })
    ));
    assert!(matches!(
        deserialize(b"NOPE\x01\x00\x00\x00"),
        Err(PersistenceError::InvalidMagic { .. })
    ));

    let mut header_only = ChunkWriter::new();
    header_only.write_bytes(&MAGIC);
    header_only.write_u32(FILE_VERSION);
    assert_eq!(
        deserialize(header_only.as_bytes()),
        Err(PersistenceError::MissingChunk("CORE"))
    );

    let mut future_core = ChunkWriter::new();
    future_core.write_bytes(&MAGIC);
    future_core.write_u32(FILE_VERSION);
    future_core.chunk(CHUNK_CORE, 99, |_| {});
    assert!(matches!(
        deserialize(future_core.as_bytes()),
        Err(PersistenceError::UnsupportedVersion { chunk: "CORE", found: 99, .. })
    ));

    let (doc, _, _) = two_node_document();
    let bytes = serialize(&doc);
    assert!(deserialize(&bytes[..bytes.len() - 3]).is_err());
}

#[test]
fn copy_paste_through_bytes() {
    let (mut doc, a, b) = two_node_document();
    let bytes = Clipboard::copy(&doc, &[a, b]).to_bytes();

    let clip = Clipboard::from_bytes(&bytes).unwrap();
    let pasted = clip.paste(&mut doc, Float2::new(0.0, 500.0));

    assert_eq!(pasted.len(), 2);
    assert_eq!(doc.graph.node_count(), 4);
    assert_eq!(doc.graph.edge_count(), 2);
    assert!(doc.get_anchor(pasted[0], 0).is_some());
    let value = doc
        .keyframes
        .evaluate(pasted[1], PropertyId::NormalForce as u8, 0.5, 1.0);
    assert_relative_eq!(value, 5.0, epsilon = 1e-5);
    assert!(doc.validate().is_ok());
}

#[test]
fn paste_is_undoable() {
    let (mut doc, a, _) = two_node_document();
    let mut history = HistoryEngine::new();
    let mut codec = DocumentCodec::new();

    history.record(&doc, &codec);
    Clipboard::copy(&doc, &[a]).paste(&mut doc, Float2::ZERO);
    assert_eq!(doc.graph.node_count(), 3);

    assert!(history.undo(&mut doc, &mut codec, true).unwrap());
    assert_eq!(doc.graph.node_count(), 2);
    assert!(history.redo(&mut doc, &mut codec, true).unwrap());
    assert_eq!(doc.graph.node_count(), 3);
}

#[test]
fn keyframe_track_on_node_one_evaluates_linearly() {
    let mut doc = Document::new();
    let node = doc.graph.add_node(0, Float2::ZERO).unwrap();
    assert_eq!(node, 1);
    doc.keyframes.set_track(
        node,
        PropertyId::RollSpeed as u8,
        vec![Keyframe::linear(0.0, 0.0), Keyframe::linear(1.0, 10.0)],
    );

    let loaded = deserialize(&serialize(&doc)).unwrap();
    let value = loaded
        .keyframes
        .evaluate(1, PropertyId::RollSpeed as u8, 0.5, 0.0);
    assert_relative_eq!(value, 5.0, epsilon = 1e-5);
}

#[test]
fn nan_keyframe_time_evaluates_after_reload() {
    let mut doc = Document::new();
    let node = doc.graph.add_node(0, Float2::ZERO).unwrap();
    doc.keyframes.set_track(
        node,
        PropertyId::RollSpeed as u8,
        vec![Keyframe::linear(f32::NAN, 4.0)],
    );

    let loaded = deserialize(&serialize(&doc)).unwrap();
    let property = PropertyId::RollSpeed as u8;
    assert_eq!(loaded.keyframes.evaluate(node, property, 0.5, 0.0), 4.0);
    assert_eq!(loaded.keyframes.evaluate(node, property, f32::NAN, 0.0), 4.0);
}

#[test]
fn exhausted_node_counter_survives_reload() {
    let mut doc = Document::new();
    doc.graph.add_node(0, Float2::ZERO).unwrap();
    doc.graph.next_node_id = u32::MAX;

    let mut loaded = deserialize(&serialize(&doc)).unwrap();
    assert_eq!(loaded.graph.next_node_id, u32::MAX);
    assert_eq!(loaded.graph.add_node(0, Float2::ZERO), None);
    assert_eq!(loaded.graph.node_count(), 1);

    let pasted = Clipboard::copy(&doc, &[1]).paste(&mut loaded, Float2::ZERO);
    assert!(pasted.is_empty());
    assert!(loaded.validate().is_ok());
}
