use anyhow::{Context, Result};
use clap::Parser;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use env_logger::{Env, Target};
use log::{debug, info};
use midi_visualiser::{Args, Playlist, Settings, Visualiser, format_clock, load, note_name, open_engine};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::File;
use std::io::stdout;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let settings = Settings::resolve(&args)?;
    debug!("Resolved settings: {:?}", settings);

    let playlist = Playlist::discover(args.path.as_deref(), settings.boundary)?;
    info!("Playlist holds {} song(s)..!", playlist.len());

    if args.dry_run {
        dry_run(&playlist, args.dry_run_max);
        return Ok(());
    }

    // songs are loaded before the terminal is taken over so startup errors print normally
    let engine = open_engine(args.mute);
    let mut visualiser = Visualiser::new(playlist, engine, settings)?;

    let quit = Arc::new(AtomicBool::new(false));
    let quit_for_handler = Arc::clone(&quit);
    // stderr sits under the roll, so the handler stays silent
    ctrlc::set_handler(move || quit_for_handler.store(true, Ordering::SeqCst))
        .context("Error setting Ctrl-C handler..!")?;

    terminal::enable_raw_mode().context("Failed to enable raw mode..!")?;
    let _guard = RawModeGuard;
    execute!(stdout(), EnterAlternateScreen, cursor::Hide)?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    visualiser.run(&mut terminal, &quit)?;

    info!("Playback finished, exiting..!");
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn dry_run(playlist: &Playlist, max_events: usize) {
    println!("Previewing at most {} events per song..!", max_events);

    for (i, path) in playlist.entries().iter().enumerate() {
        let song = match load(path) {
            Ok(song) => song,
            Err(why) => {
                println!("[{}] {} (unplayable: {})", i + 1, path.display(), why);
                continue;
            }
        };

        println!(
            "[{}] {}: {} notes, {} long, {:.1} BPM",
            i + 1,
            song.title,
            song.events.len(),
            format_clock(song.total_duration),
            song.tempo_bpm
        );

        for (n, ev) in song.events.iter().take(max_events).enumerate() {
            println!(
                "    Event {}: ch={} note={} ({}) vel={} start={:.3}s dur={:.3}s",
                n,
                ev.channel,
                ev.pitch,
                note_name(ev.pitch),
                ev.velocity,
                ev.start_time,
                ev.duration()
            );
        }
    }
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), LeaveAlternateScreen, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}
