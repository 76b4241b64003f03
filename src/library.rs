use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{LibraryError, ParseError};
use crate::events::MergedEvent;
use crate::smf::SmfDecoder;
use crate::timing::merge_tracks;

/// A decoded track, ready to hand to the scheduler.
#[derive(Debug, Clone)]
pub struct MusicTrack {
    pub key: String,
    pub events: Arc<[MergedEvent]>,
    pub track_count: usize,
}

impl MusicTrack {
    /// Decodes `bytes`, keeping the tracks that decoded before any malformed
    /// chunk. Fails when nothing usable is left.
    pub fn from_bytes(key: &str, bytes: &[u8]) -> Result<Self, ParseError> {
        let partial = SmfDecoder::decode_partial(bytes)?;
        if let Some(err) = partial.error {
            if partial.smf.tracks.is_empty() {
                return Err(err);
            }
            warn!(
                "'{}': using {} track(s) decoded before error: {}",
                key,
                partial.smf.tracks.len(),
                err
            );
        }

        Ok(Self {
            key: key.to_string(),
            events: merge_tracks(&partial.smf).into(),
            track_count: partial.smf.tracks.len(),
        })
    }

    pub fn duration(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time_seconds)
    }
}

/// Decoded tracks keyed by name.
#[derive(Debug, Default)]
pub struct MusicLibrary {
    tracks: BTreeMap<String, MusicTrack>,
}

impl MusicLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `.mid`/`.midi` file in `dir`, keyed by file stem. Files
    /// that fail to load are logged and left out.
    pub fn load_dir(dir: &Path) -> Result<Self, LibraryError> {
        let entries = fs::read_dir(dir).map_err(|source| LibraryError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut library = Self::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_midi_file(&path) {
                continue;
            }
            if let Err(e) = library.load_file(&path) {
                warn!("skipping {}: {}", path.display(), e);
            }
        }
        info!("loaded {} track(s) from {}", library.len(), dir.display());
        Ok(library)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<&MusicTrack, LibraryError> {
        let key = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = fs::read(path).map_err(|source| LibraryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.insert_bytes(&key, &bytes)
    }

    pub fn insert_bytes(&mut self, key: &str, bytes: &[u8]) -> Result<&MusicTrack, LibraryError> {
        let track = MusicTrack::from_bytes(key, bytes).map_err(|source| LibraryError::Parse {
            key: key.to_string(),
            source,
        })?;
        self.tracks.insert(key.to_string(), track);
        Ok(&self.tracks[key])
    }

    pub fn get(&self, key: &str) -> Option<&MusicTrack> {
        self.tracks.get(key)
    }

    /// Track keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

fn is_midi_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"))
}
