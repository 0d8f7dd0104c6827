use std::{collections::BTreeMap, fs::File, path::Path};

use rustysynth::SoundFont;
use tracing::{debug, warn};

use super::{AudioEngine, SoundfontId, CC_CHANNEL_VOLUME};
use crate::{
    channel_map::{self, DRUM_USER_CHANNEL, NUM_ENGINE_CHANNELS, NUM_USER_CHANNELS},
    mixer::MixerSettings,
};

pub const DRUM_BANK: u16 = 128;
pub const DEFAULT_DRUM_NAME: &str = "Drums";

/// Preset names of a soundfont, addressed by bank and preset number.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct PresetMap {
    banks: BTreeMap<u16, BTreeMap<u8, String>>,
}

impl PresetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_preset(&mut self, bank: u16, preset_id: u8, name: &str) {
        self.banks
            .entry(bank)
            .or_default()
            .insert(preset_id, name.to_owned());
    }

    pub fn has_preset(&self, bank: u16, preset_id: u8) -> bool {
        self.name(bank, preset_id).is_some()
    }

    pub fn name(&self, bank: u16, preset_id: u8) -> Option<&str> {
        self.banks.get(&bank)?.get(&preset_id).map(String::as_str)
    }
}

impl From<&SoundFont> for PresetMap {
    fn from(sf: &SoundFont) -> Self {
        let mut map = PresetMap::new();
        sf.get_presets().iter().for_each(|p| {
            map.add_preset(
                p.get_bank_number() as u16,
                p.get_patch_number() as u8,
                p.get_name(),
            );
        });
        map
    }
}

/// Reads the preset directory of a soundfont. Never fails: any I/O or parse
/// problem yields an empty map and `false`.
pub fn resolve_preset_names(path: &Path) -> (PresetMap, bool) {
    let parsed = File::open(path)
        .map_err(|e| e.to_string())
        .and_then(|mut file| SoundFont::new(&mut file).map_err(|e| e.to_string()));
    match parsed {
        Ok(sf) => (PresetMap::from(&sf), true),
        Err(e) => {
            warn!("Could not read presets of {path:?}: {e}");
            (PresetMap::new(), false)
        }
    }
}

/// Preset name shown for each engine channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelPresets {
    names: [Option<String>; NUM_ENGINE_CHANNELS as usize],
}

impl ChannelPresets {
    pub fn get(&self, channel: u8) -> Option<&str> {
        self.names.get(channel as usize)?.as_deref()
    }

    pub fn set(&mut self, channel: u8, name: String) {
        if let Some(slot) = self.names.get_mut(channel as usize) {
            *slot = Some(name);
        }
    }
}

pub fn melodic_fallback_name(preset: u8) -> String {
    format!("Preset {preset}")
}

/// Assigns the default instrument to every user channel: the drum kit
/// (bank 128, falling back to bank 0) on the percussion slot and presets
/// `0..=8` of bank 0 on the melodic slots. Channel volumes are pushed from the
/// mixer right after. Engine failures are logged per channel and skipped.
pub fn select_default_presets(
    engine: &dyn AudioEngine,
    sfont: SoundfontId,
    names: &PresetMap,
    names_ok: bool,
    mixer: &MixerSettings,
) -> ChannelPresets {
    let mut presets = ChannelPresets::default();

    let drum_ch = channel_map::map_user_to_engine(DRUM_USER_CHANNEL);
    if let Err(e) = engine.select_program(drum_ch, sfont, DRUM_BANK, 0) {
        debug!("Drum kit bank unavailable ({e}), falling back to bank 0");
        if let Err(e) = engine.select_program(drum_ch, sfont, 0, 0) {
            warn!("Could not select drum preset: {e}");
        }
    }
    let drum_name = names
        .name(DRUM_BANK, 0)
        .filter(|_| names_ok)
        .unwrap_or(DEFAULT_DRUM_NAME);
    presets.set(drum_ch, drum_name.to_owned());

    for user in 1..NUM_USER_CHANNELS {
        let ch = channel_map::map_user_to_engine(user);
        let preset = user - 1;
        if let Err(e) = engine.select_program(ch, sfont, 0, preset) {
            warn!("Could not select preset {preset} on channel {ch}: {e}");
        }
        let name = names
            .name(0, preset)
            .filter(|_| names_ok)
            .map(str::to_owned)
            .unwrap_or_else(|| melodic_fallback_name(preset));
        presets.set(ch, name);
    }

    for ch in 0..NUM_ENGINE_CHANNELS {
        if let Err(e) = engine.control_change(ch, CC_CHANNEL_VOLUME, mixer.volume(ch)) {
            warn!("Could not push volume of channel {ch}: {e}");
        }
    }

    presets
}
