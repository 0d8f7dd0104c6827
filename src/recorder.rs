use std::{error::Error, fmt, path::Path, time::Instant};

use midly::{
    num::{u14, u15, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind,
};

use crate::midi::{Message, MessageKind};

pub const TICKS_PER_BEAT: u16 = 480;
/// Microseconds per beat used to convert wall time into ticks (120 BPM). The
/// file carries no tempo event, so players fall back to this same default.
pub const REFERENCE_TEMPO_US: u32 = 500_000;
const MAX_DELTA_TICKS: u32 = 0x0FFF_FFFF;

#[derive(Debug)]
pub enum RecorderError {
    Io(std::io::Error),
}

impl Error for RecorderError {}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecorderError::Io(e) => write!(f, "Failed to write recording: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedEvent {
    pub delta_ticks: u32,
    pub message: Message,
}

/// A sealed take, ready to be written as a single-track standard MIDI file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recording {
    pub events: Vec<RecordedEvent>,
}

impl Recording {
    pub fn to_smf(&self) -> Smf<'static> {
        let mut track: Vec<TrackEvent<'static>> = self
            .events
            .iter()
            .map(|e| TrackEvent {
                delta: u28::new(e.delta_ticks.min(MAX_DELTA_TICKS)),
                kind: TrackEventKind::Midi {
                    channel: u4::new(e.message.channel & 0x0F),
                    message: to_midly_message(e.message.kind),
                },
            })
            .collect();
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Metrical(u15::new(TICKS_PER_BEAT)),
            },
            tracks: vec![track],
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), RecorderError> {
        self.to_smf().save(path).map_err(RecorderError::Io)
    }
}

#[derive(Debug, Default)]
enum Session {
    #[default]
    Idle,
    Recording {
        events: Vec<RecordedEvent>,
        last_event: Instant,
    },
}

#[derive(Debug, Default)]
pub struct Recorder {
    session: Session,
}

impl Recorder {
    pub fn is_recording(&self) -> bool {
        matches!(self.session, Session::Recording { .. })
    }

    /// Starts a fresh take, discarding any events of a previous one.
    pub fn start(&mut self, now: Instant) {
        self.session = Session::Recording {
            events: Vec::new(),
            last_event: now,
        };
    }

    /// Appends an externally-sourced message. Returns `false` when idle.
    pub fn add_event(&mut self, message: Message, now: Instant) -> bool {
        match &mut self.session {
            Session::Idle => false,
            Session::Recording { events, last_event } => {
                let delta = now.saturating_duration_since(*last_event);
                events.push(RecordedEvent {
                    delta_ticks: seconds_to_ticks(delta.as_secs_f64()),
                    message,
                });
                *last_event = now;
                true
            }
        }
    }

    /// Seals the current take. `None` when nothing was being recorded.
    pub fn stop(&mut self) -> Option<Recording> {
        match std::mem::take(&mut self.session) {
            Session::Idle => None,
            Session::Recording { events, .. } => Some(Recording { events }),
        }
    }
}

/// Converts seconds to ticks at the fixed reference tempo, regardless of any
/// tempo the user plays along to.
pub fn seconds_to_ticks(seconds: f64) -> u32 {
    let ticks_per_second = TICKS_PER_BEAT as f64 * 1_000_000.0 / REFERENCE_TEMPO_US as f64;
    (seconds * ticks_per_second).round().clamp(0.0, u32::MAX as f64) as u32
}

fn to_midly_message(kind: MessageKind) -> MidiMessage {
    match kind {
        MessageKind::NoteOff { note, velocity } => MidiMessage::NoteOff {
            key: u7::new(note),
            vel: u7::new(velocity),
        },
        MessageKind::NoteOn { note, velocity } => MidiMessage::NoteOn {
            key: u7::new(note),
            vel: u7::new(velocity),
        },
        MessageKind::PolyphonicAftertouch { note, pressure } => MidiMessage::Aftertouch {
            key: u7::new(note),
            vel: u7::new(pressure),
        },
        MessageKind::ControlChange { controller, value } => MidiMessage::Controller {
            controller: u7::new(controller),
            value: u7::new(value),
        },
        MessageKind::ProgramChange { program } => MidiMessage::ProgramChange {
            program: u7::new(program),
        },
        MessageKind::ChannelAftertouch { pressure } => MidiMessage::ChannelAftertouch {
            vel: u7::new(pressure),
        },
        MessageKind::PitchWheel { value } => MidiMessage::PitchBend {
            bend: PitchBend(u14::new(value)),
        },
    }
}
