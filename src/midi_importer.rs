use crate::model::song::*;
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read MIDI file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse MIDI file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("MIDI file {} contains no notes", path.display())]
    NoNotes { path: PathBuf },
}

struct NoteInterval {
    pub pitch: u8,
    pub channel: u8,
    pub velocity: u8,
    pub start_tick: u64,
    pub end_tick: u64,
}

#[derive(Debug, Clone)]
struct TempoSegment {
    pub mpqn: u32,
    pub start_tick: u64,
    pub secs_at_start: f64,
}

/// Converts absolute ticks to seconds, honouring every tempo change in the file.
#[derive(Debug, Clone)]
enum Clock {
    Metrical {
        ticks_per_quarter: f64,
        segments: Vec<TempoSegment>,
    },
    Timecode {
        secs_per_tick: f64,
    },
}

impl Clock {
    fn metrical(ticks_per_quarter: u64, mut tempo_changes: Vec<(u64, u32)>) -> Self {
        let mut last_tick: u64 = 0;
        let mut secs_accum: f64 = 0.0;
        let mut last_mpqn: u32 = DEFAULT_MPQN;
        let mut segments: Vec<TempoSegment> = vec![TempoSegment {
            mpqn: DEFAULT_MPQN,
            start_tick: 0,
            secs_at_start: 0.0,
        }];

        // stable, so of two changes on the same tick the later one in file order wins
        tempo_changes.sort_by_key(|(tick, _)| *tick);

        for (tick, mpqn) in tempo_changes.into_iter() {
            let delta_ticks = (tick - last_tick) as f64;
            secs_accum += delta_ticks * (last_mpqn as f64) / (ticks_per_quarter as f64) / 1_000_000.0;

            if let Some(last) = segments.last_mut()
                && last.start_tick == tick
            {
                last.mpqn = mpqn;
            } else {
                segments.push(TempoSegment {
                    mpqn,
                    start_tick: tick,
                    secs_at_start: secs_accum,
                });
            }

            last_tick = tick;
            last_mpqn = mpqn;
        }

        Clock::Metrical {
            ticks_per_quarter: ticks_per_quarter as f64,
            segments,
        }
    }

    fn secs(&self, tick: u64) -> f64 {
        match self {
            Clock::Timecode { secs_per_tick } => tick as f64 * secs_per_tick,
            Clock::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                let segment = match segments.iter().rfind(|seg| seg.start_tick <= tick) {
                    Some(s) => s,
                    None => &segments[0],
                };

                let delta_ticks = (tick - segment.start_tick) as f64;
                segment.secs_at_start
                    + delta_ticks * (segment.mpqn as f64) / ticks_per_quarter / 1_000_000.0
            }
        }
    }

    fn tempo_bpm(&self) -> f64 {
        match self {
            Clock::Metrical { segments, .. } => {
                MICROSECONDS_PER_MINUTE / (segments[0].mpqn.max(1) as f64)
            }
            Clock::Timecode { .. } => MICROSECONDS_PER_MINUTE / (DEFAULT_MPQN as f64),
        }
    }
}

/// Reads and parses a standard MIDI file into a [`Song`] of paired note events.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Song, LoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    midi_bytes_to_song(&bytes, path)
}

pub fn midi_bytes_to_song(bytes: &[u8], source_path: &Path) -> Result<Song, LoadError> {
    let smf = Smf::parse(bytes).map_err(|e| LoadError::Parse {
        path: source_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!(
        "MIDI format: {:?}, timing: {:?}, tracks: {}",
        smf.header.format,
        smf.header.timing,
        smf.tracks.len()
    );

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut last_tick: u64 = 0;

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        let mut open_notes: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) => {
                    let mpqn: u32 = micro.as_int();
                    tempo_changes.push((abs_tick, mpqn));
                    debug!(
                        "Tempo change at tick {} -> {} us/qn (track {})",
                        abs_tick, mpqn, track_idx
                    );
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open_notes
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push_back((abs_tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            close_note(&mut open_notes, &mut intervals, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // whatever is still held ends with its track
        for ((ch, key), queue) in open_notes.into_iter() {
            for (start_tick, velocity) in queue {
                warn!(
                    "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                    key, ch, start_tick, abs_tick
                );

                intervals.push(NoteInterval {
                    pitch: key,
                    channel: ch,
                    velocity,
                    start_tick,
                    end_tick: abs_tick,
                });
            }
        }

        last_tick = last_tick.max(abs_tick);
    }

    let clock = match smf.header.timing {
        Timing::Metrical(t) => Clock::metrical(t.as_int().max(1) as u64, tempo_changes),
        Timing::Timecode(fps, subframe) => {
            let ticks_per_second = fps.as_f32() as f64 * subframe.max(1) as f64;
            debug!("SMPTE timing: {} ticks per second", ticks_per_second);
            Clock::Timecode {
                secs_per_tick: 1.0 / ticks_per_second,
            }
        }
    };

    if intervals.is_empty() {
        return Err(LoadError::NoNotes {
            path: source_path.to_path_buf(),
        });
    }

    let events: Vec<NoteEvent> = intervals
        .into_iter()
        .map(|interval| NoteEvent {
            channel: interval.channel,
            pitch: interval.pitch,
            velocity: interval.velocity,
            start_time: clock.secs(interval.start_tick),
            end_time: clock.secs(interval.end_tick),
        })
        .collect();

    Ok(Song::new(
        source_path.to_path_buf(),
        events,
        clock.secs(last_tick),
        clock.tempo_bpm(),
    ))
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), VecDeque<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    ch: u8,
    pitch: u8,
    abs_tick: u64,
) {
    match open_notes
        .get_mut(&(ch, pitch))
        .and_then(|queue| queue.pop_front())
    {
        Some((start_tick, velocity)) => intervals.push(NoteInterval {
            pitch,
            channel: ch,
            velocity,
            start_tick,
            end_tick: abs_tick,
        }),
        None => debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            pitch, ch, abs_tick
        ),
    }
}
