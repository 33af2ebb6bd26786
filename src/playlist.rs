use crate::model::config::BoundaryPolicy;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MIDI_EXTENSIONS: &[&str] = &["mid", "midi"];

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("could not find MIDI song files at the path: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to list {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no MIDI files found at the path: {}", .0.display())]
    NoMidiFiles(PathBuf),

    #[error("none of the {0} song(s) in the playlist could be loaded")]
    NoPlayableSongs(usize),
}

/// Which way the cursor moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Ordered list of song files and a cursor into it.
#[derive(Debug, Clone)]
pub struct Playlist {
    entries: Vec<PathBuf>,
    index: usize,
    boundary: BoundaryPolicy,
}

/// The example songs shipped alongside the crate.
pub fn bundled_songs_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("songs")
}

pub fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MIDI_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

impl Playlist {
    pub fn new(entries: Vec<PathBuf>, boundary: BoundaryPolicy) -> Self {
        Self {
            entries,
            index: 0,
            boundary,
        }
    }

    /// A single file, every MIDI file directly inside a directory (sorted by name), or the
    /// bundled examples when no path is given.
    pub fn discover(path: Option<&Path>, boundary: BoundaryPolicy) -> Result<Self, PlaylistError> {
        let bundled;
        let path = match path {
            Some(path) => path,
            None => {
                bundled = bundled_songs_dir();
                info!("No path given, using the bundled songs in {}..!", bundled.display());
                &bundled
            }
        };

        if path.is_dir() {
            let listing = fs::read_dir(path).map_err(|source| PlaylistError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

            let mut entries: Vec<PathBuf> = listing
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_midi_file(p))
                .collect();
            entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

            if entries.is_empty() {
                return Err(PlaylistError::NoMidiFiles(path.to_path_buf()));
            }

            debug!("Discovered {} MIDI file(s) in {}", entries.len(), path.display());
            Ok(Self::new(entries, boundary))
        } else if path.is_file() {
            if !is_midi_file(path) {
                return Err(PlaylistError::NoMidiFiles(path.to_path_buf()));
            }
            Ok(Self::new(vec![path.to_path_buf()], boundary))
        } else {
            Err(PlaylistError::NotFound(path.to_path_buf()))
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Where the cursor would land after one step, or `None` when the boundary policy
    /// holds it. Under `Wrap` a single entry wraps onto itself.
    pub fn peek(&self, from: usize, direction: Direction) -> Option<usize> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }

        match (direction, self.boundary) {
            (Direction::Next, _) if from + 1 < len => Some(from + 1),
            (Direction::Previous, _) if from > 0 => Some(from - 1),
            (_, BoundaryPolicy::Stop) => None,
            (Direction::Next, BoundaryPolicy::Wrap) => Some(0),
            (Direction::Previous, BoundaryPolicy::Wrap) => Some(len - 1),
        }
    }

    pub fn select(&mut self, index: usize) {
        if index < self.entries.len() {
            self.index = index;
        }
    }
}
