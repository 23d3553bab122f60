//! Binary format constants for the kexd container.

pub const MAGIC: [u8; 4] = *b"KEXD";
pub const CLIPBOARD_MAGIC: [u8; 4] = *b"KEXC";

pub const FILE_VERSION: u32 = 1;
pub const CLIPBOARD_VERSION: u32 = 1;

// Each chunk type versions independently of the file and of its siblings.
pub const CORE_VERSION: u32 = 1;
pub const GRAPH_VERSION: u32 = 2;
pub const DATA_VERSION: u32 = 3;
pub const CLIP_VERSION: u32 = 1;

/// GRPH without node positions.
pub const GRAPH_VERSION_NO_POSITIONS: u32 = 1;
/// DATA without duration and anchor maps.
pub const DATA_VERSION_NO_ANCHORS: u32 = 2;

pub const CHUNK_CORE: [u8; 4] = *b"CORE";
pub const CHUNK_GRPH: [u8; 4] = *b"GRPH";
pub const CHUNK_DATA: [u8; 4] = *b"DATA";
pub const CHUNK_CLIP: [u8; 4] = *b"CLIP";

pub const FILE_HEADER_SIZE: usize = 8; // 4 magic + 4 version
pub const CHUNK_HEADER_SIZE: usize = 12; // 4 type + 4 version + 4 length

/// Pad a short ASCII tag with zero bytes.
pub const fn chunk_tag(tag: &str) -> [u8; 4] {
    let bytes = tag.as_bytes();
    let mut out = [0u8; 4];
    let mut i = 0;
    while i < bytes.len() && i < 4 {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Printable form of a tag for errors and logs.
pub fn tag_name(tag: &[u8; 4]) -> String {
    tag.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}
