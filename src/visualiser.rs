use crate::engine::AudioEngine;
use crate::input::{Command, poll_input};
use crate::midi_importer;
use crate::model::config::Settings;
use crate::player::{Player, Tick};
use crate::playlist::{Direction, Playlist, PlaylistError};
use crate::view::{self, Scene, layout_notes};
use log::{debug, info, warn};
use ratatui::Terminal;
use ratatui::backend::Backend;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Ties the playlist, the player and the view together and runs the frame loop.
pub struct Visualiser<E: AudioEngine> {
    settings: Settings,
    playlist: Playlist,
    player: Player<E>,
    /// Last load failure, shown in the status bar.
    message: Option<String>,
    running: bool,
    /// Set when something may have logged over the terminal since the last frame.
    needs_clear: bool,
}

impl<E: AudioEngine> Visualiser<E> {
    /// Loads the first entry of the playlist that parses, skipping the ones that don't.
    pub fn new(playlist: Playlist, engine: E, settings: Settings) -> Result<Self, PlaylistError> {
        let player = Player::new(engine).with_lead_in(settings.lead_in);
        let mut visualiser = Self {
            settings,
            playlist,
            player,
            message: None,
            running: true,
            needs_clear: false,
        };

        let len = visualiser.playlist.len();
        if !(0..len).any(|index| visualiser.try_load(index)) {
            return Err(PlaylistError::NoPlayableSongs(len));
        }

        Ok(visualiser)
    }

    pub fn player(&self) -> &Player<E> {
        &self.player
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn try_load(&mut self, index: usize) -> bool {
        let Some(path) = self.playlist.entries().get(index).cloned() else {
            return false;
        };

        // loading may log, which scribbles over the roll
        self.needs_clear = true;

        match midi_importer::load(&path) {
            Ok(song) => {
                self.player.load_song(song);
                self.playlist.select(index);
                if self.settings.autoplay {
                    self.player.play();
                }
                true
            }
            Err(why) => {
                warn!("Skipping '{}'..! why: {}", path.display(), why);
                self.message = Some(why.to_string());
                false
            }
        }
    }

    /// Steps through the playlist until an entry loads, giving up when the boundary policy
    /// stops the cursor. Coming back round to the current song reloads it.
    pub fn navigate(&mut self, direction: Direction) -> bool {
        let start = self.playlist.index();
        let mut at = start;
        self.message = None;

        while let Some(next) = self.playlist.peek(at, direction) {
            if self.try_load(next) {
                return true;
            }
            if next == start {
                break;
            }
            at = next;
        }

        debug!("No other playable song {:?} of entry {}..!", direction, start);
        false
    }

    pub fn handle(&mut self, command: Command) {
        debug!("Handling {:?}", command);
        match command {
            Command::TogglePlay => self.player.toggle(),
            Command::Restart => self.player.restart(),
            Command::Previous => {
                self.navigate(Direction::Previous);
            }
            Command::Next => {
                self.navigate(Direction::Next);
            }
            Command::Quit => self.running = false,
        }
    }

    /// Advances playback by `dt` seconds, moving on to the next song when the current one
    /// ends and `autoplay_next` is set.
    pub fn update(&mut self, dt: f64) {
        if self.player.tick(dt) == Tick::Finished
            && self.settings.autoplay_next
            && self.navigate(Direction::Next)
        {
            self.player.play();
        }
    }

    pub fn scene(&self) -> Scene {
        let Settings {
            lookahead,
            lookbehind,
            ..
        } = self.settings;
        let state = self.player.state();

        let rects = layout_notes(
            self.player.visible_notes(lookbehind, lookahead),
            state.current_time,
            lookahead,
        );
        let pressed = self
            .player
            .sounding_notes()
            .map(|note| (note.pitch, note.channel))
            .collect();
        let (title, total_duration) = self
            .player
            .song()
            .map(|song| (song.title.clone(), song.total_duration))
            .unwrap_or_default();

        Scene {
            rects,
            pressed,
            behind: lookbehind / lookahead,
            octave_dividers: self.settings.show_octave_dividers,
            show_keyboard: self.settings.show_keyboard,
            title,
            playing: state.is_playing,
            current_time: state.current_time,
            total_duration,
            position: self.playlist.index(),
            playlist_len: self.playlist.len(),
            message: self.message.clone(),
        }
    }

    /// Polls input, advances playback and draws once per frame until asked to quit.
    pub fn run<B>(&mut self, terminal: &mut Terminal<B>, quit: &AtomicBool) -> anyhow::Result<()>
    where
        B: Backend,
        B::Error: Send + Sync + 'static,
    {
        let frame_time = Duration::from_secs_f64(1.0 / self.settings.fps.max(1) as f64);
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut last = Instant::now();

        info!("Starting the render loop at {} fps..!", self.settings.fps);
        terminal.clear()?;

        while self.running {
            let started = Instant::now();

            if quit.load(Ordering::SeqCst) {
                info!("Quit requested, stopping playback..!");
                self.running = false;
                break;
            }

            for command in poll_input(Duration::ZERO)? {
                self.handle(command);
            }

            let now = Instant::now();
            self.update(now.duration_since(last).as_secs_f64());
            last = now;

            if self.needs_clear {
                terminal.clear()?;
                self.needs_clear = false;
            }

            let scene = self.scene();
            terminal.draw(|frame| view::render(frame, &scene))?;

            if let Some(rest) = frame_time.checked_sub(started.elapsed()) {
                sleeper.sleep(rest);
            }
        }

        self.player.pause();
        Ok(())
    }
}
