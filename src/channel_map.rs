//! Translation between the ten user-facing channel slots and the sixteen
//! engine channels.
//!
//! User channel 0 is the percussion slot and lands on engine channel 9 (the
//! General MIDI drum channel). User channels 1..=9 are melodic and land on
//! engine channels 0..=8.

pub const NUM_USER_CHANNELS: u8 = 10;
pub const NUM_ENGINE_CHANNELS: u8 = 16;

pub const DRUM_USER_CHANNEL: u8 = 0;
pub const DRUM_ENGINE_CHANNEL: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Drum,
    Melodic,
}

impl ChannelKind {
    pub fn of_engine_channel(channel: u8) -> Self {
        if channel == DRUM_ENGINE_CHANNEL {
            ChannelKind::Drum
        } else {
            ChannelKind::Melodic
        }
    }
}

/// Panics in debug builds when `user` is outside `0..10`; callers only ever
/// pass indices that come from a bounded menu.
pub fn map_user_to_engine(user: u8) -> u8 {
    debug_assert!(user < NUM_USER_CHANNELS);
    if user == DRUM_USER_CHANNEL {
        DRUM_ENGINE_CHANNEL
    } else {
        user - 1
    }
}

/// Inverse of [`map_user_to_engine`]. Engine channels 10..=15 have no user slot.
pub fn map_engine_to_user(engine: u8) -> Option<u8> {
    match engine {
        DRUM_ENGINE_CHANNEL => Some(DRUM_USER_CHANNEL),
        0..=8 => Some(engine + 1),
        _ => None,
    }
}

/// Label used on screen for an engine channel, e.g. in the now-playing overlay.
pub fn display_channel(engine: u8) -> u8 {
    map_engine_to_user(engine).unwrap_or(engine + 1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSlot {
    pub user_channel: u8,
    pub engine_channel: u8,
    pub preset_name: String,
    pub volume: u8,
}
