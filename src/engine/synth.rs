use crate::engine::AudioEngine;
use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::f32::consts::TAU;

const MAX_VOICES: usize = 32; // fixed pool, nothing allocates inside the audio callback
const COMMAND_QUEUE: usize = 1024;
const PERCUSSION_CHANNEL: u8 = 9;
const MASTER_GAIN: f32 = 0.18;
const ATTACK_SECS: f32 = 0.005;
const RELEASE_SECS: f32 = 0.12;
const SUSTAIN_DECAY_SECS: f32 = 3.0;
const DRUM_DECAY_SECS: f32 = 0.08;
const SILENCE: f32 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthCommand {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    AllNotesOff,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Sustain,
    Release,
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    channel: u8,
    pitch: u8,
    stage: Stage,
    phase: f32,
    phase_inc: f32,
    level: f32,
    peak: f32,
    noise: bool,
    age: u64,
}

impl Voice {
    const IDLE: Voice = Voice {
        channel: 0,
        pitch: 0,
        stage: Stage::Idle,
        phase: 0.0,
        phase_inc: 0.0,
        level: 0.0,
        peak: 0.0,
        noise: false,
        age: 0,
    };

    fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }
}

/// Equal-tempered frequency, A4 (69) = 440 Hz.
pub fn pitch_to_freq(pitch: u8) -> f32 {
    440.0 * 2.0_f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Per-sample multiplier that decays a level by 60 dB over `secs`.
fn decay_coefficient(secs: f32, sample_rate: f32) -> f32 {
    (0.001_f32).powf(1.0 / (secs * sample_rate).max(1.0))
}

/// The voice pool and mixer that runs inside the audio callback.
pub struct Mixer {
    voices: [Voice; MAX_VOICES],
    attack_step: f32,
    sustain_decay: f32,
    release_decay: f32,
    drum_decay: f32,
    sample_rate: f32,
    clock: u64,
    seed: u32,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f32;

        Self {
            voices: [Voice::IDLE; MAX_VOICES],
            attack_step: 1.0 / (ATTACK_SECS * sr).max(1.0),
            sustain_decay: decay_coefficient(SUSTAIN_DECAY_SECS, sr),
            release_decay: decay_coefficient(RELEASE_SECS, sr),
            drum_decay: decay_coefficient(DRUM_DECAY_SECS, sr),
            sample_rate: sr,
            clock: 0,
            seed: 0x9E37_79B9,
        }
    }

    pub fn handle_cmd(&mut self, cmd: SynthCommand) {
        match cmd {
            SynthCommand::NoteOn {
                channel,
                pitch,
                velocity,
            } => self.start_voice(channel, pitch, velocity),
            SynthCommand::NoteOff { channel, pitch } => {
                for voice in self.voices.iter_mut().filter(|v| {
                    !v.is_idle() && !v.noise && v.channel == channel && v.pitch == pitch
                }) {
                    voice.stage = Stage::Release;
                }
            }
            SynthCommand::AllNotesOff => {
                for voice in self.voices.iter_mut().filter(|v| !v.is_idle()) {
                    voice.stage = Stage::Release;
                }
            }
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    fn start_voice(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.clock += 1;

        // a free slot, otherwise steal the oldest voice
        let slot = self
            .voices
            .iter()
            .position(Voice::is_idle)
            .unwrap_or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            });

        self.voices[slot] = Voice {
            channel,
            pitch,
            stage: Stage::Attack,
            phase: 0.0,
            phase_inc: TAU * pitch_to_freq(pitch) / self.sample_rate,
            level: 0.0,
            peak: (velocity.min(127) as f32 / 127.0).powf(1.5),
            noise: channel == PERCUSSION_CHANNEL,
            age: self.clock,
        };
    }

    fn next_noise(&mut self) -> f32 {
        // xorshift32
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    pub fn next_sample(&mut self) -> f32 {
        let mut out = 0.0_f32;

        for i in 0..MAX_VOICES {
            if self.voices[i].is_idle() {
                continue;
            }

            let noise = if self.voices[i].noise {
                self.next_noise()
            } else {
                0.0
            };

            let v = &mut self.voices[i];
            match v.stage {
                Stage::Attack => {
                    v.level += v.peak * self.attack_step;
                    if v.level >= v.peak {
                        v.level = v.peak;
                        v.stage = Stage::Sustain;
                    }
                }
                Stage::Sustain => {
                    v.level *= if v.noise {
                        self.drum_decay
                    } else {
                        self.sustain_decay
                    };
                }
                Stage::Release => v.level *= self.release_decay,
                Stage::Idle => {}
            }

            let wave = if v.noise {
                noise
            } else {
                // mostly sine with a little triangle for some bite
                let triangle = 2.0 * (v.phase / TAU - 0.5).abs() * 2.0 - 1.0;
                0.8 * v.phase.sin() + 0.2 * triangle
            };
            out += wave * v.level;

            v.phase += v.phase_inc;
            if v.phase > TAU {
                v.phase -= TAU;
            }

            if v.stage != Stage::Attack && v.level < SILENCE {
                *v = Voice::IDLE;
            }
        }

        (out * MASTER_GAIN).tanh()
    }

    /// Fills an interleaved buffer, copying the mono mix into every channel.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = self.next_sample();
            for out in frame.iter_mut() {
                *out = sample;
            }
        }
    }
}

/// Polyphonic synthesiser playing on the default cpal output device.
pub struct SynthEngine {
    tx: Sender<SynthCommand>,
    _output_stream: cpal::Stream,
}

impl SynthEngine {
    pub fn start() -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<SynthCommand>(COMMAND_QUEUE);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no default output device")?;
        let config = device
            .default_output_config()
            .context("no default output config")?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let stream = build_output_stream_f32(&device, &config.into(), rx, sample_rate, channels)?;
                stream.play().context("failed to play output stream")?;

                info!(
                    "Opened audio output '{}' at {}Hz with {} channel(s)..!",
                    device.name().unwrap_or_else(|_| "<unknown>".into()),
                    sample_rate,
                    channels
                );

                Ok(Self {
                    tx,
                    _output_stream: stream,
                })
            }
            other => anyhow::bail!("unsupported sample format {:?} (only f32 supported)", other),
        }
    }

    fn send(&self, cmd: SynthCommand) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => warn!("Audio command queue is full, dropping {:?}..!", cmd),
            Err(TrySendError::Disconnected(_)) => debug!("Audio stream has gone away..!"),
        }
    }
}

impl AudioEngine for SynthEngine {
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.send(SynthCommand::NoteOn {
            channel,
            pitch,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        self.send(SynthCommand::NoteOff { channel, pitch });
    }

    fn all_notes_off(&mut self) {
        self.send(SynthCommand::AllNotesOff);
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<SynthCommand>,
    sample_rate: u32,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut mixer = Mixer::new(sample_rate);

    let err_fn = |err| warn!("Audio output stream error: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            while let Ok(cmd) = rx.try_recv() {
                mixer.handle_cmd(cmd);
            }
            mixer.render(data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
