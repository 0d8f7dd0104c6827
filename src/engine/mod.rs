use std::{error::Error, fmt, path::Path};

pub mod output;
pub mod player;
pub mod preset_map;
pub mod rusty;

pub use preset_map::{resolve_preset_names, select_default_presets, ChannelPresets, PresetMap};
pub use rusty::RustyEngine;

pub type SoundfontId = u32;
pub type Result<T> = std::result::Result<T, EngineError>;

/// MIDI controller number for channel volume.
pub const CC_CHANNEL_VOLUME: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NoSoundfont,
    UnknownSoundfont(SoundfontId),
    PresetNotFound { bank: u16, preset: u8 },
    InvalidChannel(u8),
    LoadFailed(String),
    PlaybackFailed(String),
    Released,
}

impl Error for EngineError {}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::NoSoundfont => "No soundfont loaded.".fmt(f),
            EngineError::UnknownSoundfont(id) => write!(f, "Unknown soundfont id: {id}"),
            EngineError::PresetNotFound { bank, preset } => {
                write!(f, "Preset not found: bank {bank}, preset {preset}")
            }
            EngineError::InvalidChannel(ch) => write!(f, "Invalid channel: {ch}"),
            EngineError::LoadFailed(e) => write!(f, "Failed to load soundfont: {e}"),
            EngineError::PlaybackFailed(e) => write!(f, "Failed to play MIDI file: {e}"),
            EngineError::Released => "Audio engine already released.".fmt(f),
        }
    }
}

/// The synthesis engine as seen by the control plane. Every method takes
/// `&self` so one engine can be shared by the button handlers, the MIDI
/// callback and the metronome at the same time.
pub trait AudioEngine: Sync + Send {
    fn load_soundfont(&self, path: &Path) -> Result<SoundfontId>;
    /// Preset names of the soundfont the engine holds, if `sfont` is still it.
    fn preset_names(&self, sfont: SoundfontId) -> Option<PresetMap>;
    fn select_program(&self, channel: u8, sfont: SoundfontId, bank: u16, preset: u8)
        -> Result<()>;
    fn change_program(&self, channel: u8, preset: u8) -> Result<()>;
    fn note_on(&self, channel: u8, note: u8, velocity: u8) -> Result<()>;
    fn note_off(&self, channel: u8, note: u8) -> Result<()>;
    fn control_change(&self, channel: u8, controller: u8, value: u8) -> Result<()>;
    /// `value` is centered on zero, in `-8192..=8191`.
    fn pitch_bend(&self, channel: u8, value: i16) -> Result<()>;
    fn play_file(&self, path: &Path) -> Result<()>;
    fn stop_file(&self) -> Result<()>;
    fn set_gain(&self, gain: f32) -> Result<()>;
    fn set_polyphony(&self, voices: usize) -> Result<()>;
    fn release(&self) -> Result<()>;
}
