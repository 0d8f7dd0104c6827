use std::{
    collections::BTreeMap,
    error::Error,
    fmt, fs,
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel_map::NUM_ENGINE_CHANNELS;

pub const DEFAULT_VOLUME: u8 = 100;
pub const MAX_VOLUME: u8 = 127;
pub const VOLUME_STEP: i16 = 5;

#[derive(Debug)]
pub enum MixerError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl Error for MixerError {}

impl fmt::Display for MixerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MixerError::Io(e) => write!(f, "Mixer settings I/O error: {e}"),
            MixerError::Serialize(e) => write!(f, "Mixer settings encoding error: {e}"),
        }
    }
}

/// Per engine-channel volume. The in-memory copy is authoritative; the file
/// on disk is only rewritten when the mixer screen is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "MixerRecord", try_from = "MixerRecord")]
pub struct MixerSettings {
    volumes: [u8; NUM_ENGINE_CHANNELS as usize],
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            volumes: [DEFAULT_VOLUME; NUM_ENGINE_CHANNELS as usize],
        }
    }
}

impl MixerSettings {
    pub fn volume(&self, channel: u8) -> u8 {
        self.volumes
            .get(channel as usize)
            .copied()
            .unwrap_or(DEFAULT_VOLUME)
    }

    pub fn set_volume(&mut self, channel: u8, volume: u8) {
        if let Some(v) = self.volumes.get_mut(channel as usize) {
            *v = volume.min(MAX_VOLUME);
        }
    }

    /// Moves a channel volume by `delta`, clamped to `0..=127`, and returns the
    /// new value.
    pub fn adjust(&mut self, channel: u8, delta: i16) -> u8 {
        let volume = (self.volume(channel) as i16 + delta).clamp(0, MAX_VOLUME as i16) as u8;
        self.set_volume(channel, volume);
        volume
    }

    /// Loads the durable record. A missing or malformed record silently yields
    /// the defaults; channels absent from the record keep the default volume.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).unwrap_or_else(|| {
                info!("Ignoring malformed mixer settings at {path:?}");
                Self::default()
            }),
            Err(e) => {
                debug!("No mixer settings at {path:?} ({e}), using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), MixerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(MixerError::Io)?;
        }
        fs::write(path, self.to_json()?).map_err(MixerError::Io)
    }

    fn from_json(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    fn to_json(&self) -> Result<String, MixerError> {
        serde_json::to_string(self).map_err(MixerError::Serialize)
    }
}

/// On-disk form: engine channel number (as a string key) to volume.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct MixerRecord(BTreeMap<String, i64>);

impl From<MixerSettings> for MixerRecord {
    fn from(settings: MixerSettings) -> Self {
        MixerRecord(
            settings
                .volumes
                .iter()
                .enumerate()
                .map(|(ch, v)| (ch.to_string(), *v as i64))
                .collect(),
        )
    }
}

impl TryFrom<MixerRecord> for MixerSettings {
    type Error = String;

    fn try_from(record: MixerRecord) -> Result<Self, Self::Error> {
        let mut settings = Self::default();
        for (key, value) in record.0 {
            let channel: u8 = key
                .trim()
                .parse()
                .map_err(|_| format!("bad channel {key:?}"))?;
            if channel >= NUM_ENGINE_CHANNELS {
                return Err(format!("channel {channel} out of range"));
            }
            settings.set_volume(channel, value.clamp(0, MAX_VOLUME as i64) as u8);
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let mixer = MixerSettings::default();
        for ch in 0..NUM_ENGINE_CHANNELS {
            assert_eq!(mixer.volume(ch), 100);
        }
    }

    #[test]
    fn adjustments_stay_in_range() {
        let mut mixer = MixerSettings::default();
        for _ in 0..40 {
            mixer.adjust(3, VOLUME_STEP);
        }
        assert_eq!(mixer.volume(3), 127);
        for _ in 0..40 {
            mixer.adjust(3, -VOLUME_STEP);
        }
        assert_eq!(mixer.volume(3), 0);
        assert_eq!(mixer.adjust(3, VOLUME_STEP), 5);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer_settings.json");
        let mut mixer = MixerSettings::default();
        mixer.set_volume(0, 0);
        mixer.set_volume(9, 127);
        mixer.set_volume(15, 55);
        mixer.save(&path).unwrap();
        assert_eq!(MixerSettings::load(&path), mixer);
    }

    #[test]
    fn missing_record_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mixer = MixerSettings::load(&dir.path().join("nope.json"));
        assert_eq!(mixer, MixerSettings::default());
    }

    #[test]
    fn corrupt_record_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer_settings.json");
        for text in ["{not json", "[1,2,3]", r#"{"x": 5}"#, r#"{"0": "loud"}"#, r#"{"42": 1}"#] {
            fs::write(&path, text).unwrap();
            assert_eq!(MixerSettings::load(&path), MixerSettings::default(), "{text}");
        }
    }

    #[test]
    fn partial_record_keeps_defaults_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer_settings.json");
        fs::write(&path, r#"{"2": 30, "9": 200}"#).unwrap();
        let mixer = MixerSettings::load(&path);
        assert_eq!(mixer.volume(2), 30);
        assert_eq!(mixer.volume(9), 127);
        assert_eq!(mixer.volume(0), 100);
    }
}
