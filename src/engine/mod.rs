use log::{trace, warn};

pub mod synth;

pub use synth::SynthEngine;

/// Anything that can turn note commands into sound. Commands are fire-and-forget: the
/// frame loop never waits for them to be rendered.
pub trait AudioEngine {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, pitch: u8);

    /// Silence everything that is currently sounding.
    fn all_notes_off(&mut self);
}

impl<E: AudioEngine + ?Sized> AudioEngine for Box<E> {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        (**self).note_on(channel, pitch, velocity)
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        (**self).note_off(channel, pitch)
    }

    fn all_notes_off(&mut self) {
        (**self).all_notes_off()
    }
}

/// Drops every command. Used with `--mute` and when no output device is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentEngine;

impl AudioEngine for SilentEngine {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        trace!("(silent) note on ch{} {} vel {}", channel, pitch, velocity);
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        trace!("(silent) note off ch{} {}", channel, pitch);
    }

    fn all_notes_off(&mut self) {}
}

/// The synthesiser, or the silent engine when muted or when audio output can't be opened.
pub fn open_engine(mute: bool) -> Box<dyn AudioEngine> {
    if mute {
        return Box::new(SilentEngine);
    }

    match SynthEngine::start() {
        Ok(engine) => Box::new(engine),
        Err(why) => {
            warn!("Audio output unavailable, continuing without sound..! why: {:#}", why);
            Box::new(SilentEngine)
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::AudioEngine;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Command {
        On { channel: u8, pitch: u8 },
        Off { channel: u8, pitch: u8 },
        AllOff,
    }

    /// Remembers every command it receives so tests can assert on dispatch.
    #[derive(Debug, Default)]
    pub struct RecordingEngine {
        pub commands: Vec<Command>,
    }

    impl RecordingEngine {
        pub fn note_ons(&self) -> Vec<u8> {
            self.commands
                .iter()
                .filter_map(|cmd| match cmd {
                    Command::On { pitch, .. } => Some(*pitch),
                    _ => None,
                })
                .collect()
        }

        pub fn note_offs(&self) -> Vec<u8> {
            self.commands
                .iter()
                .filter_map(|cmd| match cmd {
                    Command::Off { pitch, .. } => Some(*pitch),
                    _ => None,
                })
                .collect()
        }
    }

    impl AudioEngine for RecordingEngine {
        fn note_on(&mut self, channel: u8, pitch: u8, _velocity: u8) {
            self.commands.push(Command::On { channel, pitch });
        }

        fn note_off(&mut self, channel: u8, pitch: u8) {
            self.commands.push(Command::Off { channel, pitch });
        }

        fn all_notes_off(&mut self) {
            self.commands.push(Command::AllOff);
        }
    }
}
