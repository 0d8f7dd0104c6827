use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::{
    fmt,
    fs::File,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

use super::{
    output::{OutputParams, OutputThread, RenderSource},
    player::MidiFilePlayer,
    preset_map::DRUM_BANK,
    AudioEngine, EngineError, PresetMap, Result, SoundfontId,
};
use crate::channel_map::{DRUM_ENGINE_CHANNEL, NUM_ENGINE_CHANNELS};

const BLOCK_SIZE: usize = 64;
const DEFAULT_POLYPHONY: usize = 96;
const DEFAULT_GAIN: f32 = 0.5;

/// State touched by the audio callback.
struct SynthCore {
    synth: Option<Synthesizer>,
    player: Option<MidiFilePlayer>,
    sample_rate: u32,
}

impl RenderSource for SynthCore {
    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let Some(synth) = self.synth.as_mut() else {
            left.fill(0.0);
            right.fill(0.0);
            return;
        };
        let dt = BLOCK_SIZE as f64 / self.sample_rate.max(1) as f64;
        for (l, r) in left.chunks_mut(BLOCK_SIZE).zip(right.chunks_mut(BLOCK_SIZE)) {
            if let Some(player) = self.player.as_mut() {
                player.advance(dt * l.len() as f64 / BLOCK_SIZE as f64, |e| {
                    synth.process_midi_message(
                        e.channel as i32,
                        e.command as i32,
                        e.data1 as i32,
                        e.data2 as i32,
                    )
                });
                if player.is_finished() {
                    debug!("MIDI file finished");
                    self.player = None;
                }
            }
            synth.render(l, r);
        }
    }
}

struct Inner {
    next_id: SoundfontId,
    loaded: Option<(SoundfontId, PresetMap)>,
    polyphony: usize,
    gain: f32,
    output: Option<OutputThread>,
    released: bool,
}

/// Engine backed by a `rustysynth` synthesizer. Control calls and the audio
/// callback share the synthesizer through a mutex; `inner` is always locked
/// before `core`.
pub struct RustyEngine {
    core: Arc<Mutex<SynthCore>>,
    inner: Mutex<Inner>,
}

impl RustyEngine {
    /// Opens the default audio output. Without one the engine still accepts
    /// every call but renders nothing.
    pub fn new(params: OutputParams) -> Self {
        let engine = Self::silent(params.sample_rate);
        match OutputThread::start(Arc::clone(&engine.core), params) {
            Ok(output) => {
                info!(
                    "Audio output running at {} Hz, {} frames",
                    params.sample_rate, params.buffer_size
                );
                engine.lock_inner().output = Some(output);
            }
            Err(e) => warn!("Audio output unavailable, running silent: {e}"),
        }
        engine
    }

    pub fn silent(sample_rate: u32) -> Self {
        Self {
            core: Arc::new(Mutex::new(SynthCore {
                synth: None,
                player: None,
                sample_rate,
            })),
            inner: Mutex::new(Inner {
                next_id: 1,
                loaded: None,
                polyphony: DEFAULT_POLYPHONY,
                gain: DEFAULT_GAIN,
                output: None,
                released: false,
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_core(&self) -> MutexGuard<'_, SynthCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` on the live synthesizer.
    fn with_synth<T>(&self, f: impl FnOnce(&mut Synthesizer) -> T) -> Result<T> {
        if self.lock_inner().released {
            return Err(EngineError::Released);
        }
        let mut core = self.lock_core();
        let synth = core.synth.as_mut().ok_or(EngineError::NoSoundfont)?;
        Ok(f(synth))
    }

    fn with_channel<T>(
        &self,
        channel: u8,
        f: impl FnOnce(&mut Synthesizer, i32) -> T,
    ) -> Result<T> {
        if channel >= NUM_ENGINE_CHANNELS {
            return Err(EngineError::InvalidChannel(channel));
        }
        self.with_synth(|synth| f(synth, channel as i32))
    }
}

impl AudioEngine for RustyEngine {
    fn load_soundfont(&self, path: &Path) -> Result<SoundfontId> {
        let mut inner = self.lock_inner();
        if inner.released {
            return Err(EngineError::Released);
        }
        let mut file = File::open(path).map_err(load_failed)?;
        let sound_font = Arc::new(SoundFont::new(&mut file).map_err(load_failed)?);

        let mut core = self.lock_core();
        let mut settings = SynthesizerSettings::new(core.sample_rate as i32);
        settings.block_size = BLOCK_SIZE;
        settings.maximum_polyphony = inner.polyphony;
        let mut synth = Synthesizer::new(&sound_font, &settings).map_err(load_failed)?;
        synth.set_master_volume(inner.gain);
        core.synth = Some(synth);
        core.player = None;
        drop(core);

        let id = inner.next_id;
        inner.next_id += 1;
        inner.loaded = Some((id, PresetMap::from(sound_font.as_ref())));
        info!(
            "Loaded soundfont {id} from {path:?} ({} voices)",
            inner.polyphony
        );
        Ok(id)
    }

    fn preset_names(&self, sfont: SoundfontId) -> Option<PresetMap> {
        match &self.lock_inner().loaded {
            Some((id, presets)) if *id == sfont => Some(presets.clone()),
            _ => None,
        }
    }

    fn select_program(
        &self,
        channel: u8,
        sfont: SoundfontId,
        bank: u16,
        preset: u8,
    ) -> Result<()> {
        {
            let inner = self.lock_inner();
            let (id, presets) = inner.loaded.as_ref().ok_or(EngineError::NoSoundfont)?;
            if *id != sfont {
                return Err(EngineError::UnknownSoundfont(sfont));
            }
            if !presets.has_preset(bank, preset) {
                return Err(EngineError::PresetNotFound { bank, preset });
            }
        }
        // the percussion channel already offsets bank selects by 128
        let bank_select = if channel == DRUM_ENGINE_CHANNEL && bank >= DRUM_BANK {
            bank - DRUM_BANK
        } else {
            bank
        };
        self.with_channel(channel, |synth, ch| {
            synth.process_midi_message(ch, 0xB0, 0x00, bank_select as i32);
            synth.process_midi_message(ch, 0xC0, preset as i32, 0x00);
        })
    }

    fn change_program(&self, channel: u8, preset: u8) -> Result<()> {
        self.with_channel(channel, |synth, ch| {
            synth.process_midi_message(ch, 0xC0, preset as i32, 0x00)
        })
    }

    fn note_on(&self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.with_channel(channel, |synth, ch| {
            synth.note_on(ch, note as i32, velocity as i32)
        })
    }

    fn note_off(&self, channel: u8, note: u8) -> Result<()> {
        self.with_channel(channel, |synth, ch| synth.note_off(ch, note as i32))
    }

    fn control_change(&self, channel: u8, controller: u8, value: u8) -> Result<()> {
        self.with_channel(channel, |synth, ch| {
            synth.process_midi_message(ch, 0xB0, controller as i32, value as i32)
        })
    }

    fn pitch_bend(&self, channel: u8, value: i16) -> Result<()> {
        let raw = (value as i32 + 8192).clamp(0, 0x3FFF);
        self.with_channel(channel, |synth, ch| {
            synth.process_midi_message(ch, 0xE0, raw & 0x7F, raw >> 7)
        })
    }

    fn play_file(&self, path: &Path) -> Result<()> {
        let player = MidiFilePlayer::open(path)?;
        if self.lock_inner().released {
            return Err(EngineError::Released);
        }
        let mut core = self.lock_core();
        if core.synth.is_none() {
            return Err(EngineError::NoSoundfont);
        }
        info!("Playing {path:?} ({:.1} s)", player.duration_secs());
        core.player = Some(player);
        Ok(())
    }

    fn stop_file(&self) -> Result<()> {
        if self.lock_inner().released {
            return Err(EngineError::Released);
        }
        let mut core = self.lock_core();
        core.player = None;
        if let Some(synth) = core.synth.as_mut() {
            synth.note_off_all(true);
            synth.reset();
        }
        Ok(())
    }

    fn set_gain(&self, gain: f32) -> Result<()> {
        let gain = gain.clamp(0.0, 1.0);
        let mut inner = self.lock_inner();
        if inner.released {
            return Err(EngineError::Released);
        }
        inner.gain = gain;
        if let Some(synth) = self.lock_core().synth.as_mut() {
            synth.set_master_volume(gain);
        }
        Ok(())
    }

    fn set_polyphony(&self, voices: usize) -> Result<()> {
        let mut inner = self.lock_inner();
        if inner.released {
            return Err(EngineError::Released);
        }
        inner.polyphony = voices.max(1);
        debug!("Polyphony set to {} (applies on next load)", inner.polyphony);
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let output = {
            let mut inner = self.lock_inner();
            if inner.released {
                return Err(EngineError::Released);
            }
            inner.released = true;
            inner.loaded = None;
            inner.output.take()
        };
        if let Some(output) = output {
            output.stop();
        }
        let mut core = self.lock_core();
        core.player = None;
        core.synth = None;
        info!("Audio engine released");
        Ok(())
    }
}

fn load_failed(e: impl fmt::Display) -> EngineError {
    EngineError::LoadFailed(e.to_string())
}
