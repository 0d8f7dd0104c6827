use std::path::PathBuf;

pub mod machine;
pub mod rename;

pub use machine::{complete, handle, run_file_task, Context, Task};
pub use rename::{RenameBuffer, RenameEntry};

use crate::channel_map::NUM_USER_CHANNELS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Main,
    SoundfontList,
    MidiFileList,
    FileAction,
    Rename,
    MidiPortList,
    Mixer,
    Metronome,
    Volume,
    Power,
    Shutdown,
}

impl Mode {
    /// Where BACK leads to.
    pub fn parent(self) -> Mode {
        match self {
            Mode::Main => Mode::Main,
            Mode::FileAction => Mode::MidiFileList,
            Mode::Rename => Mode::FileAction,
            Mode::Shutdown => Mode::Shutdown,
            Mode::SoundfontList
            | Mode::MidiFileList
            | Mode::MidiPortList
            | Mode::Mixer
            | Mode::Metronome
            | Mode::Volume
            | Mode::Power => Mode::Main,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Mode::Main => "MAIN SCREEN",
            Mode::SoundfontList => "SOUND FONT",
            Mode::MidiFileList => "MIDI FILE",
            Mode::FileAction => "FILE ACTION",
            Mode::Rename => "RENAME",
            Mode::MidiPortList => "MIDI KEYBOARD",
            Mode::Mixer => "MIXER",
            Mode::Metronome => "METRONOME",
            Mode::Volume => "VOLUME",
            Mode::Power => "POWER",
            Mode::Shutdown => "SHUTDOWN",
        }
    }
}

/// Payload carried by a menu entry, interpreted on SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MidiKeyboard,
    SoundFont,
    MidiFile,
    Mixer,
    Record,
    Metronome,
    Volume,
    Power,
    Shutdown,
    LoadSoundfont(PathBuf),
    OpenMidiFile(PathBuf),
    ConnectPort(String),
    Play,
    Stop,
    Rename,
    Delete,
    Back,
    MixerChannel(u8),
    MetronomeStatus,
    MetronomeBpm,
    MetronomeVolume,
    EcoMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub action: Action,
}

impl MenuItem {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

pub fn main_items() -> Vec<MenuItem> {
    vec![
        MenuItem::new("MIDI KEYBOARD", Action::MidiKeyboard),
        MenuItem::new("SOUND FONT", Action::SoundFont),
        MenuItem::new("MIDI FILE", Action::MidiFile),
        MenuItem::new("MIXER", Action::Mixer),
        MenuItem::new("RECORD", Action::Record),
        MenuItem::new("METRONOME", Action::Metronome),
        MenuItem::new("VOLUME", Action::Volume),
        MenuItem::new("POWER", Action::Power),
        MenuItem::new("SHUTDOWN", Action::Shutdown),
    ]
}

pub fn file_action_items() -> Vec<MenuItem> {
    vec![
        MenuItem::new("PLAY", Action::Play),
        MenuItem::new("STOP", Action::Stop),
        MenuItem::new("RENAME", Action::Rename),
        MenuItem::new("DELETE", Action::Delete),
        MenuItem::new("BACK", Action::Back),
    ]
}

pub fn mixer_items() -> Vec<MenuItem> {
    (0..NUM_USER_CHANNELS)
        .map(|u| MenuItem::new(format!("CH {u}"), Action::MixerChannel(u)))
        .collect()
}

pub fn metronome_items() -> Vec<MenuItem> {
    vec![
        MenuItem::new("STATUS", Action::MetronomeStatus),
        MenuItem::new("SPEED", Action::MetronomeBpm),
        MenuItem::new("VOL", Action::MetronomeVolume),
    ]
}

pub fn power_items() -> Vec<MenuItem> {
    vec![MenuItem::new("ECO MODE", Action::EcoMode)]
}

/// Menu position. `selected` always indexes into `items` when there are any.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuState {
    mode: Mode,
    items: Vec<MenuItem>,
    selected: usize,
    /// MIXER / METRONOME: UP and DOWN step a value instead of moving.
    pub adjusting: bool,
    pub rename: RenameBuffer,
    /// MIDI file the FILE_ACTION and RENAME screens operate on.
    pub selected_file: Option<PathBuf>,
}

impl Default for MenuState {
    fn default() -> Self {
        Self {
            mode: Mode::Main,
            items: main_items(),
            selected: 0,
            adjusting: false,
            rename: RenameBuffer::default(),
            selected_file: None,
        }
    }
}

impl MenuState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&MenuItem> {
        self.items.get(self.selected)
    }

    pub fn enter(&mut self, mode: Mode, items: Vec<MenuItem>) {
        self.mode = mode;
        self.items = items;
        self.selected = 0;
        self.adjusting = false;
    }

    /// Replaces the items of the current screen once a scan is in.
    pub fn set_items(&mut self, items: Vec<MenuItem>) {
        self.items = items;
        self.selected = 0;
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.items.is_empty() {
            self.selected = 0;
        } else {
            let last = self.items.len() as isize - 1;
            self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_clamped() {
        let mut menu = MenuState::default();
        menu.move_selection(-1);
        assert_eq!(menu.selected_index(), 0);
        for _ in 0..20 {
            menu.move_selection(1);
        }
        assert_eq!(menu.selected_index(), main_items().len() - 1);
        assert_eq!(menu.selected_item().unwrap().action, Action::Shutdown);
    }

    #[test]
    fn empty_list_keeps_index_zero() {
        let mut menu = MenuState::default();
        menu.enter(Mode::MidiFileList, vec![]);
        menu.move_selection(1);
        assert_eq!(menu.selected_index(), 0);
        assert!(menu.selected_item().is_none());
    }

    #[test]
    fn parents() {
        assert_eq!(Mode::Rename.parent(), Mode::FileAction);
        assert_eq!(Mode::FileAction.parent(), Mode::MidiFileList);
        assert_eq!(Mode::Mixer.parent(), Mode::Main);
        assert_eq!(Mode::Shutdown.parent(), Mode::Shutdown);
    }
}
