// Track tags for the "now playing" header, read with lofty
use lofty::prelude::{Accessor, TaggedFileExt};
use lofty::probe::Probe;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: Option<String>,
}

impl TrackTags {
    /// Read title and artist, falling back to the file stem
    pub fn read(path: &Path) -> Self {
        let fallback_title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let tagged = match Probe::open(path).and_then(|p| p.guess_file_type()?.read()) {
            Ok(tagged) => tagged,
            Err(e) => {
                debug!("No tags for {:?}: {}", path, e);
                return Self {
                    title: fallback_title,
                    artist: None,
                };
            }
        };

        let tag = tagged.primary_tag().or(tagged.first_tag());
        Self {
            title: tag
                .and_then(|t| t.title().map(|s| s.to_string()))
                .unwrap_or(fallback_title),
            artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
        }
    }

    /// `Artist - Title`, or just the title
    pub fn display(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}
