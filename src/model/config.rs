use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "midi_visualiser",
    about = "Play MIDI files as a scrolling piano roll in your terminal!"
)]
pub struct Args {
    /// Path to a MIDI file or a directory of MIDI files. Defaults to the bundled example songs.
    pub path: Option<PathBuf>,

    /// What Left/Right do at either end of the playlist: wrap|stop.
    #[arg(short, long)]
    pub wrap: Option<String>,

    /// Advance to the next song in the playlist when the current one finishes.
    #[arg(short = 'n', long)]
    pub autoplay_next: bool,

    /// Start playback as soon as a song is loaded.
    #[arg(short, long)]
    pub autoplay: bool,

    /// Seconds of upcoming notes visible above the hit line.
    #[arg(short, long)]
    pub lookahead: Option<f64>,

    /// Seconds of already-played notes kept on screen below the hit line.
    #[arg(long)]
    pub lookbehind: Option<f64>,

    /// Seconds of scrolling before the first note reaches the hit line.
    #[arg(long = "lead-in")]
    pub lead_in: Option<f64>,

    /// Frames per second for the render loop.
    #[arg(long)]
    pub fps: Option<u32>,

    /// Use the silent audio engine instead of the synthesiser.
    #[arg(short, long)]
    pub mute: bool,

    /// JSON file with display and playback settings. Flags given on the command line win.
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Dry run (print the playlist and the first dry_run_max events of each song, then exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum events to print per song in dry run.
    #[arg(long, default_value_t = 20)]
    pub dry_run_max: usize,

    /// Write log output to this file instead of stderr, which the piano roll draws over.
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Behaviour of Left/Right when the cursor is at either end of the playlist.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Jump to the other end of the playlist.
    #[default]
    Wrap,

    /// Stay on the current entry.
    Stop,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Seconds it takes a note to scroll from the top of the roll down to the hit line.
    pub lookahead: f64,
    pub lookbehind: f64,
    /// Playback starts this many seconds before zero, so the opening notes scroll in.
    pub lead_in: f64,
    pub fps: u32,
    pub boundary: BoundaryPolicy,
    pub autoplay_next: bool,
    pub autoplay: bool,
    pub show_octave_dividers: bool,
    pub show_keyboard: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lookahead: 2.0,
            lookbehind: 0.0,
            lead_in: 0.0,
            fps: 60,
            boundary: BoundaryPolicy::Wrap,
            autoplay_next: false,
            autoplay: false,
            show_octave_dividers: true,
            show_keyboard: true,
        }
    }
}

impl Settings {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read settings file {}", path.as_ref().display())
        })?;

        Self::from_json(&text)
            .with_context(|| format!("Invalid settings file {}", path.as_ref().display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str::<Settings>(text)?.sanitized())
    }

    /// Reads the settings file (if any) and applies command-line overrides on top of it.
    pub fn resolve(args: &Args) -> anyhow::Result<Self> {
        let mut settings = match &args.settings {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };

        if let Some(wrap) = &args.wrap {
            settings.boundary = crate::parse_boundary(wrap);
        }
        if let Some(lookahead) = args.lookahead {
            settings.lookahead = lookahead;
        }
        if let Some(lookbehind) = args.lookbehind {
            settings.lookbehind = lookbehind;
        }
        if let Some(lead_in) = args.lead_in {
            settings.lead_in = lead_in;
        }
        if let Some(fps) = args.fps {
            settings.fps = fps;
        }
        settings.autoplay_next |= args.autoplay_next;
        settings.autoplay |= args.autoplay;

        Ok(settings.sanitized())
    }

    fn sanitized(mut self) -> Self {
        if !self.lookahead.is_finite() || self.lookahead <= 0.0 {
            self.lookahead = Settings::default().lookahead;
        }
        if !self.lookbehind.is_finite() || self.lookbehind < 0.0 {
            self.lookbehind = 0.0;
        }
        if !self.lead_in.is_finite() || self.lead_in < 0.0 {
            self.lead_in = 0.0;
        }
        self.fps = self.fps.clamp(1, 240);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["midi_visualiser"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = Settings::from_json(r#"{ "boundary": "stop", "fps": 30 }"#).unwrap();

        assert_eq!(settings.boundary, BoundaryPolicy::Stop);
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.lookahead, 2.0);
        assert!(!settings.autoplay_next);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let settings = Settings::resolve(&args(&[
            "songs",
            "--wrap",
            "stop",
            "--lookahead",
            "4.5",
            "-n",
        ]))
        .unwrap();

        assert_eq!(settings.boundary, BoundaryPolicy::Stop);
        assert_eq!(settings.lookahead, 4.5);
        assert_eq!(settings.lead_in, 0.0);
        assert!(settings.autoplay_next);
        assert!(!settings.autoplay);
    }

    #[test]
    fn nonsense_values_are_sanitized() {
        let settings = Settings::from_json(
            r#"{ "lookahead": -1.0, "lookbehind": -3.0, "lead_in": -0.5, "fps": 0 }"#,
        )
        .unwrap();

        assert_eq!(settings.lookahead, 2.0);
        assert_eq!(settings.lookbehind, 0.0);
        assert_eq!(settings.lead_in, 0.0);
        assert_eq!(settings.fps, 1);
    }

    #[test]
    fn lead_in_flag() {
        let settings = Settings::resolve(&args(&["--lead-in", "1.5"])).unwrap();
        assert_eq!(settings.lead_in, 1.5);
    }

    #[test]
    fn path_is_optional() {
        assert!(args(&[]).path.is_none());
        assert_eq!(args(&["a.mid"]).path, Some(PathBuf::from("a.mid")));
    }
}
