use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::{
    channel_map::{self, ChannelKind, ChannelSlot, NUM_USER_CHANNELS},
    engine::{ChannelPresets, PresetMap, SoundfontId},
    menu::{MenuState, Mode, RenameEntry},
    metronome::MetronomeConfig,
    mixer::MixerSettings,
    overlay::OverlayManager,
    recorder::Recorder,
};

pub const MESSAGE_DURATION: Duration = Duration::from_secs(2);
pub const DEFAULT_GAIN_PCT: u8 = 50;
pub const GAIN_STEP_PCT: i16 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting(String),
    Connected(String),
    Failed(String),
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "MIDI: none",
            ConnectionStatus::Connecting(_) => "MIDI: connecting",
            ConnectionStatus::Connected(_) => "MIDI: connected",
            ConnectionStatus::Failed(_) => "MIDI: retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransientMessage {
    pub text: String,
    pub shown_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSoundfont {
    pub id: SoundfontId,
    pub path: PathBuf,
    pub names: PresetMap,
    pub names_ok: bool,
}

/// Everything the control plane knows. Mutated only while holding the lock
/// in [`Shared`].
#[derive(Debug)]
pub struct State {
    pub menu: MenuState,
    pub soundfont: Option<LoadedSoundfont>,
    pub presets: ChannelPresets,
    pub mixer: MixerSettings,
    pub overlays: OverlayManager,
    pub recorder: Recorder,
    pub metronome: MetronomeConfig,
    pub gain_pct: u8,
    pub low_power: bool,
    pub connection: ConnectionStatus,
    pub message: Option<TransientMessage>,
    pub last_program: Option<u8>,
}

impl State {
    pub fn new(mixer: MixerSettings) -> Self {
        Self {
            menu: MenuState::default(),
            soundfont: None,
            presets: ChannelPresets::default(),
            mixer,
            overlays: OverlayManager::default(),
            recorder: Recorder::default(),
            metronome: MetronomeConfig::default(),
            gain_pct: DEFAULT_GAIN_PCT,
            low_power: false,
            connection: ConnectionStatus::default(),
            message: None,
            last_program: None,
        }
    }

    pub fn show_message(&mut self, text: &str, now: Instant) {
        self.message = Some(TransientMessage {
            text: text.to_owned(),
            shown_at: now,
        });
    }

    pub fn message_text(&self, now: Instant) -> Option<&str> {
        self.message
            .as_ref()
            .filter(|m| now.saturating_duration_since(m.shown_at) < MESSAGE_DURATION)
            .map(|m| m.text.as_str())
    }

    pub fn adjust_gain(&mut self, delta: i16) -> u8 {
        self.gain_pct = (self.gain_pct as i16 + delta).clamp(0, 100) as u8;
        self.gain_pct
    }

    pub fn gain(&self) -> f32 {
        self.gain_pct as f32 / 100.0
    }

    pub fn channel_slot(&self, user: u8) -> ChannelSlot {
        let engine_channel = channel_map::map_user_to_engine(user);
        ChannelSlot {
            user_channel: user,
            engine_channel,
            preset_name: self
                .presets
                .get(engine_channel)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("CH {}", user + 1)),
            volume: self.mixer.volume(engine_channel),
        }
    }

    /// Name shown in a now-playing overlay. A melodic channel without a cached
    /// name falls back to the last program number seen on the input.
    pub fn overlay_name(&self, channel: u8) -> String {
        match self.presets.get(channel) {
            Some(name) => name.to_owned(),
            None => match ChannelKind::of_engine_channel(channel) {
                ChannelKind::Drum => crate::engine::preset_map::DEFAULT_DRUM_NAME.to_owned(),
                ChannelKind::Melodic => match self.last_program {
                    Some(p) => format!("Prog {p}"),
                    None => "Prog -".to_owned(),
                },
            },
        }
    }

    pub fn snapshot(&self, now: Instant) -> Snapshot {
        let overlay = |slot: Option<(crate::overlay::Overlay, u8)>| {
            slot.map(|(o, alpha)| OverlayView {
                channel: channel_map::display_channel(o.channel),
                name: self.overlay_name(o.channel),
                alpha,
            })
        };
        Snapshot {
            mode: self.menu.mode(),
            items: self.menu.items().iter().map(|i| i.label.clone()).collect(),
            selected: self.menu.selected_index(),
            adjusting: self.menu.adjusting,
            rename_text: self.menu.rename.text().to_owned(),
            rename_entry: self.menu.rename.current(),
            mixer: (0..NUM_USER_CHANNELS).map(|u| self.channel_slot(u)).collect(),
            metronome: self.metronome,
            gain_pct: self.gain_pct,
            low_power: self.low_power,
            recording: self.recorder.is_recording(),
            connection: self.connection.clone(),
            message: self.message_text(now).map(str::to_owned),
            drum_overlay: overlay(self.overlays.drum(now)),
            melodic_overlay: overlay(self.overlays.melodic(now)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayView {
    pub channel: u8,
    pub name: String,
    pub alpha: u8,
}

/// Read-only copy of what one frame needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub mode: Mode,
    pub items: Vec<String>,
    pub selected: usize,
    pub adjusting: bool,
    pub rename_text: String,
    pub rename_entry: RenameEntry,
    pub mixer: Vec<ChannelSlot>,
    pub metronome: MetronomeConfig,
    pub gain_pct: u8,
    pub low_power: bool,
    pub recording: bool,
    pub connection: ConnectionStatus,
    pub message: Option<String>,
    pub drum_overlay: Option<OverlayView>,
    pub melodic_overlay: Option<OverlayView>,
}

/// The one lock every context goes through, plus a wake-up for the render
/// loop.
pub struct Shared {
    state: Mutex<State>,
    redraw: Notify,
}

impl Shared {
    pub fn new(state: State) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            redraw: Notify::new(),
        })
    }

    pub async fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().await
    }

    pub fn request_redraw(&self) {
        self.redraw.notify_one();
    }

    pub async fn redraw_requested(&self) {
        self.redraw.notified().await
    }
}
