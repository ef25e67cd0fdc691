//! Audio container detection.
//!
//! Capture widgets routinely mislabel their MIME type, so the payload's magic
//! bytes are authoritative; path-based inference is a fallback for file
//! uploads with no payload in hand yet.

use std::path::Path;

use clarion_core::types::AudioContainer;

/// Identify the container from the payload's leading bytes.
pub fn sniff_container(data: &[u8]) -> Option<AudioContainer> {
    if data.len() < 12 {
        return None;
    }
    if &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
        return Some(AudioContainer::Wav);
    }
    if &data[0..4] == b"OggS" {
        return Some(AudioContainer::Ogg);
    }
    // EBML header, shared by WebM and Matroska
    if data[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(AudioContainer::Webm);
    }
    // ISO base media file: size prefix then "ftyp"
    if &data[4..8] == b"ftyp" {
        return Some(AudioContainer::M4a);
    }
    if &data[0..3] == b"ID3" {
        return Some(AudioContainer::Mp3);
    }
    // Bare MPEG audio frame sync
    if data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
        return Some(AudioContainer::Mp3);
    }
    None
}

/// Infer the container from a file path's extension/MIME type.
pub fn container_for_path(path: &Path) -> Option<AudioContainer> {
    let mime = mime_guess::from_path(path).first()?;
    AudioContainer::from_mime(mime.essence_str())
}
