use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

use super::{EngineError, Result};

/// Tempo assumed until the file sets one (120 BPM).
const DEFAULT_TEMPO_US: u32 = 500_000;

/// A channel message ready for the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerEvent {
    pub channel: u8,
    pub command: u8,
    pub data1: u8,
    pub data2: u8,
}

#[derive(Debug, Clone, Copy)]
struct TimedEvent {
    at_secs: f64,
    event: PlayerEvent,
}

/// Standard MIDI file flattened into one time-ordered event list, played
/// back by advancing a clock in seconds.
#[derive(Debug, Clone)]
pub struct MidiFilePlayer {
    events: Vec<TimedEvent>,
    position_secs: f64,
    cursor: usize,
}

impl MidiFilePlayer {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| EngineError::PlaybackFailed(format!("{}: {e}", path.display())))?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let smf = Smf::parse(bytes).map_err(|e| EngineError::PlaybackFailed(e.to_string()))?;

        // (tick, track, index) keeps same-tick events in file order
        let mut merged = Vec::new();
        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut tick = 0u64;
            for (idx, event) in track.iter().enumerate() {
                tick += event.delta.as_int() as u64;
                merged.push((tick, track_idx, idx, event.kind));
            }
        }
        merged.sort_by_key(|(tick, track, idx, _)| (*tick, *track, *idx));

        let mut events = Vec::new();
        let mut tempo_us = DEFAULT_TEMPO_US;
        let mut last_tick = 0u64;
        let mut secs = 0.0f64;
        for (tick, _, _, kind) in merged {
            secs += (tick - last_tick) as f64 * seconds_per_tick(smf.header.timing, tempo_us);
            last_tick = tick;
            match kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => tempo_us = t.as_int(),
                TrackEventKind::Midi { channel, message } => events.push(TimedEvent {
                    at_secs: secs,
                    event: to_player_event(channel.as_int(), message),
                }),
                _ => {}
            }
        }

        Ok(Self {
            events,
            position_secs: 0.0,
            cursor: 0,
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.at_secs)
    }

    /// Moves the clock forward and hands every event now due to `f`.
    pub fn advance(&mut self, dt_secs: f64, mut f: impl FnMut(PlayerEvent)) {
        self.position_secs += dt_secs;
        while let Some(next) = self.events.get(self.cursor) {
            if next.at_secs > self.position_secs {
                break;
            }
            f(next.event);
            self.cursor += 1;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.events.len()
    }
}

fn seconds_per_tick(timing: Timing, tempo_us: u32) -> f64 {
    match timing {
        Timing::Metrical(ppq) => tempo_us as f64 / 1_000_000.0 / ppq.as_int().max(1) as f64,
        Timing::Timecode(fps, subframes) => 1.0 / (fps.as_f32() as f64 * subframes.max(1) as f64),
    }
}

fn to_player_event(channel: u8, message: MidiMessage) -> PlayerEvent {
    let (command, data1, data2) = match message {
        MidiMessage::NoteOff { key, vel } => (0x80, key.as_int(), vel.as_int()),
        MidiMessage::NoteOn { key, vel } => (0x90, key.as_int(), vel.as_int()),
        MidiMessage::Aftertouch { key, vel } => (0xA0, key.as_int(), vel.as_int()),
        MidiMessage::Controller { controller, value } => {
            (0xB0, controller.as_int(), value.as_int())
        }
        MidiMessage::ProgramChange { program } => (0xC0, program.as_int(), 0),
        MidiMessage::ChannelAftertouch { vel } => (0xD0, vel.as_int(), 0),
        MidiMessage::PitchBend { bend } => {
            let raw = bend.0.as_int();
            (0xE0, (raw & 0x7F) as u8, (raw >> 7) as u8)
        }
    };
    PlayerEvent {
        channel,
        command,
        data1,
        data2,
    }
}
