use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single sounding pitch on one channel, already converted to wall-clock seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub start_time: f64,
    pub end_time: f64,
}

impl NoteEvent {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether `[start_time, end_time]` intersects `[from, to]`.
    pub fn overlaps(&self, from: f64, to: f64) -> bool {
        self.start_time <= to && self.end_time >= from
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Song {
    pub path: PathBuf,
    pub title: String,
    /// Sorted by `start_time`.
    pub events: Vec<NoteEvent>,
    pub total_duration: f64,
    pub tempo_bpm: f64,
}

impl Song {
    /// Builds a song from unsorted events, sorting them and deriving the duration.
    /// `min_duration` lets a trailing silence (end of track) outlast the last note.
    pub fn new(path: PathBuf, mut events: Vec<NoteEvent>, min_duration: f64, tempo_bpm: f64) -> Self {
        events.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let last_end = events
            .iter()
            .map(|event| event.end_time)
            .fold(0.0_f64, f64::max);

        let title = path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| String::from("<untitled>"));

        Self {
            path,
            title,
            events,
            total_duration: last_end.max(min_duration),
            tempo_bpm,
        }
    }
}
