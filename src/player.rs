use crate::engine::AudioEngine;
use crate::model::song::{NoteEvent, Song};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
}

/// What a single frame of playback amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Paused, or nothing loaded.
    Idle,
    Playing,
    /// Playback ran past the end of the song during this frame and has stopped.
    Finished,
}

/// Owns the active song and its playback clock, and tells the audio engine when notes
/// start and stop. Every note-on is sent at most once per pass through the song.
#[derive(Debug)]
pub struct Player<E: AudioEngine> {
    engine: E,
    song: Option<Song>,
    state: PlaybackState,
    /// Index of the first event whose note-on has not been sent yet in this pass.
    next_event: usize,
    /// Events that have been started and not yet released.
    sounding: Vec<usize>,
    /// Seconds the clock spends below zero after a load or restart.
    lead_in: f64,
}

impl<E: AudioEngine> Player<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            song: None,
            state: PlaybackState::default(),
            next_event: 0,
            sounding: Vec::new(),
            lead_in: 0.0,
        }
    }

    pub fn with_lead_in(mut self, seconds: f64) -> Self {
        self.lead_in = seconds.max(0.0);
        self.state.current_time = self.start_time();
        self
    }

    fn start_time(&self) -> f64 {
        if self.lead_in > 0.0 { -self.lead_in } else { 0.0 }
    }

    pub fn load_song(&mut self, song: Song) {
        self.release_all();
        info!(
            "Loaded song: '{}' with {} notes lasting {:.2}s..!",
            song.title,
            song.events.len(),
            song.total_duration
        );

        self.song = Some(song);
        self.state = PlaybackState {
            current_time: self.start_time(),
            is_playing: false,
        };
        self.next_event = 0;
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[cfg(test)]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_finished(&self) -> bool {
        self.song
            .as_ref()
            .is_some_and(|song| self.state.current_time > song.total_duration)
    }

    pub fn play(&mut self) {
        if self.song.is_none() {
            return;
        }
        if self.is_finished() {
            self.restart();
        }
        self.state.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.state.is_playing = false;
        self.release_all();
    }

    pub fn toggle(&mut self) {
        if self.state.is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Rewinds to the start (zero, or minus the lead-in) and forgets which notes were already
    /// played, keeping the play/pause state.
    pub fn restart(&mut self) {
        self.release_all();
        self.state.current_time = self.start_time();
        self.next_event = 0;
        debug!("Playback restarted..!");
    }

    /// Advances the clock by `dt` seconds (when playing) and dispatches the note commands
    /// for everything crossed on the way.
    pub fn tick(&mut self, dt: f64) -> Tick {
        let Self {
            engine,
            song,
            state,
            next_event,
            sounding,
            ..
        } = self;

        let Some(song) = song.as_ref() else {
            return Tick::Idle;
        };

        if !state.is_playing {
            return Tick::Idle;
        }

        state.current_time += dt.max(0.0);
        let now = state.current_time;
        let events = &song.events;

        let mut ended = Vec::new();
        sounding.retain(|&i| {
            if events[i].end_time <= now {
                ended.push(i);
                false
            } else {
                true
            }
        });
        for i in ended {
            release(engine, events, sounding, i);
        }

        while *next_event < events.len() && events[*next_event].start_time <= now {
            let i = *next_event;
            let note = &events[i];
            engine.note_on(note.channel, note.pitch, note.velocity);

            // crossed both ends in a single frame
            if note.end_time <= now {
                release(engine, events, sounding, i);
            } else {
                sounding.push(i);
            }

            *next_event += 1;
        }

        if now > song.total_duration {
            info!("Reached the end of '{}'..!", song.title);
            state.is_playing = false;
            self.release_all();
            return Tick::Finished;
        }

        Tick::Playing
    }

    /// Notes overlapping `[now - lookbehind, now + lookahead]`, in start order.
    pub fn visible_notes(&self, lookbehind: f64, lookahead: f64) -> impl Iterator<Item = &NoteEvent> {
        let now = self.state.current_time;
        let (from, to) = (now - lookbehind, now + lookahead);

        let events: &[NoteEvent] = self
            .song
            .as_ref()
            .map(|song| song.events.as_slice())
            .unwrap_or(&[]);

        let end = events.partition_point(|note| note.start_time <= to);
        events[..end]
            .iter()
            .filter(move |note| note.overlaps(from, to))
    }

    /// Notes whose note-on has been sent and whose note-off hasn't.
    pub fn sounding_notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.sounding
            .iter()
            .filter_map(|&i| self.song.as_ref().map(|song| &song.events[i]))
    }

    fn release_all(&mut self) {
        if !self.sounding.is_empty() {
            debug!("Releasing {} sounding note(s)..!", self.sounding.len());
        }
        self.sounding.clear();
        self.engine.all_notes_off();
    }
}

/// Sends the note-off for `events[i]` unless another sounding note still holds the same key.
fn release<E: AudioEngine>(engine: &mut E, events: &[NoteEvent], sounding: &[usize], i: usize) {
    let note = &events[i];
    let still_held = sounding
        .iter()
        .any(|&j| events[j].channel == note.channel && events[j].pitch == note.pitch);

    if !still_held {
        engine.note_off(note.channel, note.pitch);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::recording::{Command, RecordingEngine};
    use std::path::PathBuf;

    const FRAME: f64 = 1.0 / 60.0;

    fn note(pitch: u8, start: f64, end: f64) -> NoteEvent {
        NoteEvent {
            channel: 0,
            pitch,
            velocity: 100,
            start_time: start,
            end_time: end,
        }
    }

    fn song(events: Vec<NoteEvent>) -> Song {
        Song::new(PathBuf::from("test.mid"), events, 0.0, 120.0)
    }

    fn playing(events: Vec<NoteEvent>) -> Player<RecordingEngine> {
        let mut player = Player::new(RecordingEngine::default());
        player.load_song(song(events));
        player.play();
        player
    }

    #[test]
    fn paused_player_does_nothing() {
        let mut player = Player::new(RecordingEngine::default());
        assert_eq!(player.tick(1.0), Tick::Idle);

        player.load_song(song(vec![note(60, 0.0, 1.0)]));
        let before = player.engine().commands.len();
        assert_eq!(player.tick(0.5), Tick::Idle);
        assert_eq!(player.state().current_time, 0.0);
        assert_eq!(player.engine().commands.len(), before);
    }

    #[test]
    fn note_on_then_note_off() {
        let mut player = playing(vec![note(60, 0.0, 1.0)]);

        assert_eq!(player.tick(0.0), Tick::Playing);
        assert_eq!(player.engine().note_ons(), vec![60]);
        assert!(player.engine().note_offs().is_empty());
        assert_eq!(player.sounding_notes().count(), 1);

        player.tick(0.5);
        assert!(player.engine().note_offs().is_empty());

        player.tick(0.5);
        assert_eq!(player.engine().note_offs(), vec![60]);
        assert_eq!(player.sounding_notes().count(), 0);
    }

    #[test]
    fn dispatch_is_idempotent_without_time_advancing() {
        let mut player = playing(vec![note(60, 0.0, 1.0), note(64, 0.5, 1.0)]);

        for _ in 0..10 {
            player.tick(0.0);
        }
        assert_eq!(player.engine().note_ons(), vec![60]);

        player.tick(0.5);
        for _ in 0..10 {
            player.tick(0.0);
        }
        assert_eq!(player.engine().note_ons(), vec![60, 64]);
    }

    #[test]
    fn restart_retriggers_once() {
        let mut player = playing(vec![note(60, 0.0, 2.0), note(62, 0.0, 2.0), note(64, 1.0, 2.0)]);

        player.tick(1.2);
        assert_eq!(player.engine().note_ons(), vec![60, 62, 64]);

        player.restart();
        assert_eq!(player.state().current_time, 0.0);
        assert!(player.state().is_playing);
        assert_eq!(player.engine().commands.last(), Some(&Command::AllOff));
        assert_eq!(player.sounding_notes().count(), 0);

        player.tick(0.0);
        player.tick(0.0);
        assert_eq!(player.engine().note_ons(), vec![60, 62, 64, 60, 62]);
    }

    #[test]
    fn finishing_stops_and_goes_quiet() {
        let mut player = playing(vec![note(60, 0.0, 1.0), note(67, 0.25, 1.0)]);

        let mut frames = 0;
        let mut last = Tick::Playing;
        while last != Tick::Finished && frames < 1000 {
            last = player.tick(FRAME);
            frames += 1;
        }

        assert_eq!(last, Tick::Finished);
        assert!(!player.state().is_playing);
        assert!(player.state().current_time > 1.0);
        assert!(player.is_finished());
        assert_eq!(player.engine().note_offs(), vec![60, 67]);

        let issued = player.engine().commands.len();
        for _ in 0..30 {
            assert_eq!(player.tick(FRAME), Tick::Idle);
        }
        assert_eq!(player.engine().commands.len(), issued);
    }

    #[test]
    fn play_after_finish_starts_over() {
        let mut player = playing(vec![note(60, 0.0, 0.5)]);
        player.tick(1.0);
        assert!(player.is_finished());

        player.toggle();
        assert!(player.state().is_playing);
        assert_eq!(player.state().current_time, 0.0);

        player.tick(0.0);
        assert_eq!(player.engine().note_ons(), vec![60, 60]);
    }

    #[test]
    fn skipped_over_notes_are_started_and_stopped() {
        let mut player = playing(vec![note(60, 0.1, 0.2), note(62, 0.3, 5.0)]);

        player.tick(0.5);
        assert_eq!(player.engine().note_ons(), vec![60, 62]);
        assert_eq!(player.engine().note_offs(), vec![60]);
        assert_eq!(player.sounding_notes().map(|n| n.pitch).collect::<Vec<_>>(), vec![62]);
    }

    #[test]
    fn overlapping_same_key_keeps_later_note_held() {
        let mut player = playing(vec![note(60, 0.0, 1.0), note(60, 0.5, 2.0)]);

        player.tick(0.6);
        player.tick(0.6);
        assert!(player.engine().note_offs().is_empty());

        player.tick(1.0);
        assert_eq!(player.engine().note_offs(), vec![60]);
    }

    #[test]
    fn pause_releases_and_resume_does_not_retrigger() {
        let mut player = playing(vec![note(60, 0.0, 2.0)]);
        player.tick(0.5);

        player.toggle();
        assert!(!player.state().is_playing);
        assert_eq!(player.engine().commands.last(), Some(&Command::AllOff));

        player.toggle();
        player.tick(0.1);
        assert_eq!(player.engine().note_ons(), vec![60]);
    }

    #[test]
    fn visible_window() {
        let mut player = playing(vec![
            note(60, 0.0, 0.5),
            note(62, 1.0, 1.5),
            note(64, 2.5, 3.0),
            note(65, 4.0, 4.5),
            note(67, 4.0, 9.0),
        ]);

        let visible = |p: &Player<RecordingEngine>, behind, ahead| {
            p.visible_notes(behind, ahead).map(|n| n.pitch).collect::<Vec<_>>()
        };

        assert_eq!(visible(&player, 0.0, 2.0), vec![60, 62]);

        player.tick(2.0);
        assert_eq!(visible(&player, 0.0, 2.0), vec![64, 65, 67]);
        assert_eq!(visible(&player, 1.0, 2.0), vec![62, 64, 65, 67]);

        player.tick(3.0);
        assert_eq!(visible(&player, 0.0, 2.0), vec![67]);
    }

    #[test]
    fn lead_in_delays_the_first_notes() {
        let mut player = Player::new(RecordingEngine::default()).with_lead_in(1.0);
        player.load_song(song(vec![note(60, 0.0, 1.0)]));
        assert_eq!(player.state().current_time, -1.0);

        // already visible while it scrolls in
        assert_eq!(player.visible_notes(0.0, 2.0).count(), 1);

        player.play();
        player.tick(0.5);
        assert!(player.engine().note_ons().is_empty());

        player.tick(0.5);
        assert_eq!(player.engine().note_ons(), vec![60]);

        player.restart();
        assert_eq!(player.state().current_time, -1.0);
        player.tick(0.0);
        assert_eq!(player.engine().note_ons(), vec![60]);
    }

    #[test]
    fn loading_resets_state() {
        let mut player = playing(vec![note(60, 0.0, 2.0)]);
        player.tick(1.0);

        player.load_song(song(vec![note(72, 0.0, 1.0)]));
        assert_eq!(player.state(), PlaybackState::default());
        assert_eq!(player.sounding_notes().count(), 0);

        player.play();
        player.tick(0.0);
        assert_eq!(player.engine().note_ons(), vec![60, 72]);
    }
}
