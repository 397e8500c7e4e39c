// Content-type sniffing and decoder selection
// File extensions are only used for error messages, never for dispatch.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{PlayerError, Result};

/// Content types recognised by header sniffing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Mpeg,
    Flac,
    Wav,
    Ogg,
    Aac,
    M4a,
    Mp4,
    Aiff,
    Opus,
    Ape,
    Amr,
    Midi,
    Dsf,
    /// Sniffed successfully but not an audio type we know
    Other(String),
    /// Header matched nothing
    Unknown,
}

impl ContentType {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "audio/mpeg" => Self::Mpeg,
            "audio/x-flac" | "audio/flac" => Self::Flac,
            "audio/x-wav" | "audio/wav" => Self::Wav,
            "audio/ogg" => Self::Ogg,
            "audio/aac" => Self::Aac,
            "audio/m4a" | "audio/x-m4a" => Self::M4a,
            "video/mp4" => Self::Mp4,
            "audio/x-aiff" | "audio/aiff" => Self::Aiff,
            "audio/opus" => Self::Opus,
            "audio/x-ape" => Self::Ape,
            "audio/amr" => Self::Amr,
            "audio/midi" => Self::Midi,
            "audio/x-dsf" => Self::Dsf,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Self::Mpeg => "audio/mpeg",
            Self::Flac => "audio/x-flac",
            Self::Wav => "audio/x-wav",
            Self::Ogg => "audio/ogg",
            Self::Aac => "audio/aac",
            Self::M4a => "audio/m4a",
            Self::Mp4 => "video/mp4",
            Self::Aiff => "audio/x-aiff",
            Self::Opus => "audio/opus",
            Self::Ape => "audio/x-ape",
            Self::Amr => "audio/amr",
            Self::Midi => "audio/midi",
            Self::Dsf => "audio/x-dsf",
            Self::Other(mime) => mime,
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Decoder able to open this content, if any
    pub fn decoder(&self) -> Option<DecoderKind> {
        match self {
            Self::Mpeg => Some(DecoderKind::Mpeg),
            Self::Flac => Some(DecoderKind::Flac),
            Self::Wav => Some(DecoderKind::Wav),
            Self::Ogg => Some(DecoderKind::Vorbis),
            Self::Aac => Some(DecoderKind::Adts),
            Self::M4a | Self::Mp4 => Some(DecoderKind::IsoMp4),
            Self::Aiff => Some(DecoderKind::Aiff),
            Self::Opus
            | Self::Ape
            | Self::Amr
            | Self::Midi
            | Self::Dsf
            | Self::Other(_)
            | Self::Unknown => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Decoder backends the audio layer can open a stream with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    Mpeg,
    Flac,
    Wav,
    Vorbis,
    Adts,
    IsoMp4,
    Aiff,
}

impl DecoderKind {
    /// Extension hint handed to the symphonia probe
    pub fn hint_extension(self) -> &'static str {
        match self {
            Self::Mpeg => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Vorbis => "ogg",
            Self::Adts => "aac",
            Self::IsoMp4 => "m4a",
            Self::Aiff => "aiff",
        }
    }
}

/// Sniff the content of `path`
pub fn sniff(path: &Path) -> Result<ContentType> {
    let kind = infer::get_from_path(path).map_err(|source| PlayerError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(kind
        .map(|k| ContentType::from_mime(k.mime_type()))
        .unwrap_or(ContentType::Unknown))
}

/// Pick the decoder that can open `path`
pub fn resolve(path: &Path) -> Result<DecoderKind> {
    let meta = fs::metadata(path).map_err(|source| PlayerError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if meta.is_dir() {
        return Err(PlayerError::NotAFile(path.to_path_buf()));
    }

    let content = sniff(path)?;
    debug!("Sniffed {:?} as {}", path, content);

    content.decoder().ok_or_else(|| PlayerError::UnsupportedFormat {
        extension: display_extension(path),
        content_type: content.to_string(),
    })
}

fn display_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext),
        None => "extensionless".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_audio_types_have_decoders() {
        for mime in ["audio/mpeg", "audio/x-flac", "audio/x-wav", "audio/ogg", "audio/m4a", "video/mp4"] {
            assert!(ContentType::from_mime(mime).decoder().is_some(), "{mime}");
        }
    }

    #[test]
    fn recognised_but_undecodable_types_are_rejected() {
        assert_eq!(ContentType::from_mime("audio/opus").decoder(), None);
        assert_eq!(ContentType::from_mime("image/png").decoder(), None);
        assert_eq!(ContentType::Unknown.decoder(), None);
    }

    #[test]
    fn other_mime_round_trips_for_display() {
        assert_eq!(ContentType::from_mime("image/png").to_string(), "image/png");
        assert_eq!(ContentType::Unknown.to_string(), "application/octet-stream");
    }

    #[test]
    fn extensionless_paths_still_describe_themselves() {
        assert_eq!(display_extension(Path::new("/tmp/noext")), "extensionless");
        assert_eq!(display_extension(Path::new("a/b.xyz")), ".xyz");
    }
}
