use crate::math::Float3;
use crate::persistence::{chunk_tag, ChunkExtension, ChunkReader, ChunkWriter, PersistenceError};
use std::any::Any;

pub const CHUNK_VIEW: [u8; 4] = chunk_tag("VIEW");
pub const VIEW_VERSION: u32 = 1;

/// Editor camera, playhead and selection. Saved with the document but
/// transient for history, so undo only moves the camera when asked to.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub camera_target: Float3,
    pub camera_distance: f32,
    pub camera_yaw: f32,
    pub camera_pitch: f32,
    pub playhead_time: f32,
    pub selected_nodes: Vec<u32>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            camera_target: Float3::ZERO,
            camera_distance: 50.0,
            camera_yaw: 0.0,
            camera_pitch: 0.0,
            playhead_time: 0.0,
            selected_nodes: Vec::new(),
        }
    }
}

impl ChunkExtension for ViewState {
    fn chunk_type(&self) -> [u8; 4] {
        CHUNK_VIEW
    }

    fn current_version(&self) -> u32 {
        VIEW_VERSION
    }

    fn write(&self, writer: &mut ChunkWriter) {
        writer.write_float3(self.camera_target);
        writer.write_f32(self.camera_distance);
        writer.write_f32(self.camera_yaw);
        writer.write_f32(self.camera_pitch);
        writer.write_f32(self.playhead_time);
        writer.write_u32_array(&self.selected_nodes);
    }

    fn read(&mut self, reader: &mut ChunkReader, version: u32) -> Result<(), PersistenceError> {
        if version != VIEW_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                chunk: "VIEW",
                found: version,
                max: VIEW_VERSION,
            });
        }
        self.camera_target = reader.read_float3()?;
        self.camera_distance = reader.read_f32()?;
        self.camera_yaw = reader.read_f32()?;
        self.camera_pitch = reader.read_f32()?;
        self.playhead_time = reader.read_f32()?;
        self.selected_nodes = reader.read_u32_array()?;
        Ok(())
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_transient(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Document, DocumentCodec};

    fn sample_view() -> ViewState {
        ViewState {
            camera_target: Float3::new(1.0, 2.0, 3.0),
            camera_distance: 12.5,
            camera_yaw: 0.25,
            camera_pitch: -0.5,
            playhead_time: 3.0,
            selected_nodes: vec![4, 9],
        }
    }

    #[test]
    fn view_chunk_round_trip() {
        let codec = DocumentCodec::new().with_extension(sample_view());
        let bytes = codec.serialize(&Document::new());

        let mut loader = DocumentCodec::new().with_extension(ViewState::default());
        loader.deserialize(&bytes).unwrap();
        assert_eq!(loader.extension::<ViewState>(), Some(&sample_view()));
    }

    #[test]
    fn missing_view_chunk_resets_to_default() {
        let bytes = DocumentCodec::new().serialize(&Document::new());
        let mut loader = DocumentCodec::new().with_extension(sample_view());
        loader.deserialize(&bytes).unwrap();
        assert_eq!(loader.extension::<ViewState>(), Some(&ViewState::default()));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut writer = ChunkWriter::new();
        sample_view().write(&mut writer);
        let data = writer.into_bytes();

        let mut view = ViewState::default();
        let mut reader = ChunkReader::new(&data);
        assert!(matches!(
            view.read(&mut reader, 2),
            Err(PersistenceError::UnsupportedVersion { chunk: "VIEW", .. })
        ));
    }

    #[test]
    fn future_view_chunk_does_not_block_the_document() {
        let mut bytes = DocumentCodec::new().serialize(&Document::new());
        let mut future = ChunkWriter::new();
        future.chunk(CHUNK_VIEW, VIEW_VERSION + 1, |w| sample_view().write(w));
        bytes.extend_from_slice(future.as_bytes());

        let mut loader = DocumentCodec::new().with_extension(sample_view());
        assert_eq!(loader.deserialize(&bytes), Ok(Document::new()));
        assert_eq!(loader.extension::<ViewState>(), Some(&ViewState::default()));
    }
}
