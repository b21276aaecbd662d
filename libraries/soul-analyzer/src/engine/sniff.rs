//! Container name detection
//!
//! symphonia does not name the container it probed, so the short name is
//! taken from the file's magic bytes and, failing that, its extension.

use std::path::Path;

/// Bytes of file header needed by [`sniff_format_name`]
pub const SNIFF_LEN: usize = 12;

/// Short container name from the first bytes of a file
pub fn sniff_format_name(header: &[u8]) -> Option<&'static str> {
    if header.len() >= 12 {
        // RIFF/RF64 with a WAVE form type
        if (&header[0..4] == b"RIFF" || &header[0..4] == b"RF64") && &header[8..12] == b"WAVE" {
            return Some("wav");
        }
        // IFF FORM with AIFF or AIFC form type
        if &header[0..4] == b"FORM" && (&header[8..12] == b"AIFF" || &header[8..12] == b"AIFC") {
            return Some("aiff");
        }
    }

    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        return Some("mp4");
    }

    if header.len() >= 4 {
        match &header[0..4] {
            b"fLaC" => return Some("flac"),
            b"OggS" => return Some("ogg"),
            b"caff" => return Some("caf"),
            [0x1A, 0x45, 0xDF, 0xA3] => return Some("matroska"),
            _ => {}
        }
    }

    if header.len() >= 3 && &header[0..3] == b"ID3" {
        return Some("mp3");
    }

    if header.len() >= 2 && header[0] == 0xFF {
        // ADTS: 12-bit sync, layer bits zero
        if header[1] & 0xF6 == 0xF0 {
            return Some("aac");
        }
        // MPEG audio frame sync
        if header[1] & 0xE0 == 0xE0 {
            return Some("mp3");
        }
    }

    None
}

/// Container name from magic bytes, falling back to the lowercased extension
pub fn format_name_for(header: &[u8], path: &Path) -> Option<String> {
    if let Some(name) = sniff_format_name(header) {
        return Some(name.to_string());
    }

    let extension = path.extension()?.to_str()?.to_lowercase();
    let name = match extension.as_str() {
        "wave" => "wav",
        "aif" | "aifc" => "aiff",
        "m4a" | "m4b" | "mov" => "mp4",
        "oga" | "opus" => "ogg",
        "mka" | "mkv" | "webm" => "matroska",
        other => other,
    };
    Some(name.to_string())
}
