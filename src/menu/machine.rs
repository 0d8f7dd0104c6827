use std::{fmt::Display, path::PathBuf, time::Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::{
    file_action_items, main_items, metronome_items, mixer_items, power_items, Action, MenuItem,
    Mode, RenameBuffer, RenameEntry,
};
use crate::{
    channel_map::{self, DRUM_ENGINE_CHANNEL},
    engine::{self, AudioEngine, CC_CHANNEL_VOLUME},
    input::{Button, PortLister},
    library::{FileError, Library},
    metronome::{self, ConfigSender},
    mixer::{self, MixerSettings},
    recorder::Recording,
    state::{ConnectionStatus, State, GAIN_STEP_PCT},
};

pub const ECO_POLYPHONY: usize = 48;
pub const MAX_POLYPHONY: usize = 96;

/// Work that may block. The dispatcher hands these to the task runner after
/// releasing the state lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    LoadSoundfont(PathBuf),
    PlayFile(PathBuf),
    SaveMixer(MixerSettings),
    WriteRecording { recording: Recording, path: PathBuf },
    ConnectMidi(String),
    SetLowPower(bool),
    /// Scan the folder or port list shown by a list screen.
    FillList(Mode),
    RenameFile { from: PathBuf, name: String },
    DeleteFile(PathBuf),
}

/// Finished file-system work, applied to the state under the lock.
#[derive(Debug)]
pub enum Outcome {
    Listed { mode: Mode, items: Vec<MenuItem> },
    Renamed { from: PathBuf, result: Result<PathBuf, FileError> },
    /// Carries the rescanned MIDI file list.
    Deleted(Result<Vec<MenuItem>, FileError>),
}

/// Collaborators a transition may touch. Only quick calls are made inline.
pub struct Context<'a> {
    pub engine: &'a dyn AudioEngine,
    pub library: &'a Library,
    pub metronome: &'a ConfigSender,
    pub now: Instant,
    pub local_time: DateTime<Local>,
}

/// The single transition function. Handles one button edge against the state
/// and returns the blocking work it requested.
pub fn handle(state: &mut State, ctx: &Context, button: Button) -> Vec<Task> {
    if state.menu.mode() == Mode::Shutdown {
        return vec![];
    }
    let mut tasks = vec![];
    match button {
        Button::Up => on_vertical(state, ctx, true),
        Button::Down => on_vertical(state, ctx, false),
        Button::Select => on_select(state, ctx, &mut tasks),
        Button::Back => on_back(state, &mut tasks),
    }
    tasks
}

fn on_vertical(state: &mut State, ctx: &Context, up: bool) {
    let step: i16 = if up { 1 } else { -1 };
    let movement: isize = if up { -1 } else { 1 };
    match state.menu.mode() {
        Mode::Volume => {
            state.adjust_gain(step * GAIN_STEP_PCT);
            if let Err(e) = ctx.engine.set_gain(state.gain()) {
                fail(state, ctx.now, "set gain", e);
            }
        }
        Mode::Rename => state.menu.rename.move_cursor(movement),
        Mode::Mixer if state.menu.adjusting => adjust_mixer(state, ctx, step),
        Mode::Metronome if state.menu.adjusting => adjust_metronome(state, ctx, step),
        _ => state.menu.move_selection(movement),
    }
}

fn adjust_mixer(state: &mut State, ctx: &Context, step: i16) {
    let user = state.menu.selected_index() as u8;
    let ch = channel_map::map_user_to_engine(user);
    let volume = state.mixer.adjust(ch, step * mixer::VOLUME_STEP);
    if let Err(e) = ctx.engine.control_change(ch, CC_CHANNEL_VOLUME, volume) {
        fail(state, ctx.now, "push channel volume", e);
    }
}

fn adjust_metronome(state: &mut State, ctx: &Context, step: i16) {
    let action = state.menu.selected_item().map(|i| i.action.clone());
    match action {
        Some(Action::MetronomeBpm) => {
            state.metronome.adjust_bpm(step * metronome::BPM_STEP);
        }
        Some(Action::MetronomeVolume) => {
            let volume = state
                .metronome
                .adjust_volume(step * metronome::VOLUME_STEP);
            let res = ctx
                .engine
                .control_change(DRUM_ENGINE_CHANNEL, CC_CHANNEL_VOLUME, volume);
            if let Err(e) = res {
                fail(state, ctx.now, "push metronome volume", e);
            }
        }
        _ => {}
    }
    ctx.metronome.send_replace(state.metronome);
}

fn on_select(state: &mut State, ctx: &Context, tasks: &mut Vec<Task>) {
    match state.menu.mode() {
        Mode::Mixer => state.menu.adjusting = !state.menu.adjusting,
        Mode::Metronome => {
            let action = state.menu.selected_item().map(|i| i.action.clone());
            if action == Some(Action::MetronomeStatus) {
                state.metronome.enabled = !state.metronome.enabled;
                ctx.metronome.send_replace(state.metronome);
                info!("Metronome enabled: {}", state.metronome.enabled);
            } else {
                state.menu.adjusting = !state.menu.adjusting;
            }
        }
        Mode::Rename => select_rename_entry(state, tasks),
        Mode::Volume => enter_mode(state, Mode::Main, tasks),
        _ => {
            if let Some(item) = state.menu.selected_item().cloned() {
                run_action(state, ctx, item, tasks);
            }
        }
    }
}

fn run_action(state: &mut State, ctx: &Context, item: MenuItem, tasks: &mut Vec<Task>) {
    match item.action {
        Action::MidiKeyboard => enter_mode(state, Mode::MidiPortList, tasks),
        Action::SoundFont => enter_mode(state, Mode::SoundfontList, tasks),
        Action::MidiFile => enter_mode(state, Mode::MidiFileList, tasks),
        Action::Mixer => enter_mode(state, Mode::Mixer, tasks),
        Action::Metronome => enter_mode(state, Mode::Metronome, tasks),
        Action::Volume => enter_mode(state, Mode::Volume, tasks),
        Action::Power => enter_mode(state, Mode::Power, tasks),
        Action::Record => toggle_recording(state, ctx, tasks),
        Action::Shutdown => {
            info!("Shutdown requested");
            enter_mode(state, Mode::Shutdown, tasks);
        }
        Action::LoadSoundfont(path) => {
            state.show_message("Loading...", ctx.now);
            tasks.push(Task::LoadSoundfont(path));
            enter_mode(state, Mode::Main, tasks);
        }
        Action::ConnectPort(name) => {
            state.connection = ConnectionStatus::Connecting(name.clone());
            tasks.push(Task::ConnectMidi(name));
            enter_mode(state, Mode::Main, tasks);
        }
        Action::OpenMidiFile(path) => {
            state.menu.selected_file = Some(path);
            enter_mode(state, Mode::FileAction, tasks);
        }
        Action::Play => match (&state.soundfont, &state.menu.selected_file) {
            (None, _) => state.show_message("LOAD SF2 FIRST", ctx.now),
            (Some(_), Some(path)) => tasks.push(Task::PlayFile(path.clone())),
            (Some(_), None) => {}
        },
        Action::Stop => stop_playback(state, ctx),
        Action::Rename => {
            let stem = state
                .menu
                .selected_file
                .as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            enter_mode(state, Mode::Rename, tasks);
            state.menu.rename = RenameBuffer::new(&stem);
        }
        Action::Delete => {
            if let Some(path) = state.menu.selected_file.clone() {
                tasks.push(Task::DeleteFile(path));
            }
        }
        Action::Back => on_back(state, tasks),
        Action::EcoMode => {
            state.low_power = !state.low_power;
            let voices = if state.low_power {
                ECO_POLYPHONY
            } else {
                MAX_POLYPHONY
            };
            if let Err(e) = ctx.engine.set_polyphony(voices) {
                warn!("Could not set polyphony: {e}");
            }
            let text = if state.low_power {
                "Lean: ON (ECO)"
            } else {
                "Lean: OFF (MAX)"
            };
            state.show_message(text, ctx.now);
            tasks.push(Task::SetLowPower(state.low_power));
        }
        Action::MixerChannel(_)
        | Action::MetronomeStatus
        | Action::MetronomeBpm
        | Action::MetronomeVolume => {}
    }
}

fn toggle_recording(state: &mut State, ctx: &Context, tasks: &mut Vec<Task>) {
    match state.recorder.stop() {
        Some(recording) => {
            let path = ctx.library.recording_path(ctx.local_time);
            info!(
                "Recording stopped, {} events to {path:?}",
                recording.events.len()
            );
            tasks.push(Task::WriteRecording { recording, path });
        }
        None => {
            state.recorder.start(ctx.now);
            state.show_message("Recording...", ctx.now);
            info!("Recording started");
        }
    }
}

fn stop_playback(state: &mut State, ctx: &Context) {
    if let Err(e) = ctx.engine.stop_file() {
        fail(state, ctx.now, "stop playback", e);
        return;
    }
    if let Some(sf) = &state.soundfont {
        state.presets =
            engine::select_default_presets(ctx.engine, sf.id, &sf.names, sf.names_ok, &state.mixer);
    }
    state.show_message("Stopped", ctx.now);
}

fn select_rename_entry(state: &mut State, tasks: &mut Vec<Task>) {
    match state.menu.rename.current() {
        RenameEntry::Char(c) => state.menu.rename.push(c),
        RenameEntry::Commit => {
            if let Some(from) = state.menu.selected_file.clone() {
                tasks.push(Task::RenameFile {
                    from,
                    name: state.menu.rename.text().to_owned(),
                });
            }
            enter_mode(state, Mode::FileAction, tasks);
        }
    }
}

fn on_back(state: &mut State, tasks: &mut Vec<Task>) {
    let mode = state.menu.mode();
    match mode {
        Mode::Mixer | Mode::Metronome if state.menu.adjusting => state.menu.adjusting = false,
        Mode::Rename => {
            if !state.menu.rename.pop() {
                enter_mode(state, Mode::FileAction, tasks);
            }
        }
        Mode::Mixer => {
            tasks.push(Task::SaveMixer(state.mixer));
            enter_mode(state, mode.parent(), tasks);
        }
        _ => enter_mode(state, mode.parent(), tasks),
    }
}

/// Switches mode with the selection reset. Screens listing folders or ports
/// start empty and request a [`Task::FillList`].
fn enter_mode(state: &mut State, mode: Mode, tasks: &mut Vec<Task>) {
    let items = match mode {
        Mode::Main => main_items(),
        Mode::SoundfontList | Mode::MidiFileList | Mode::MidiPortList => {
            tasks.push(Task::FillList(mode));
            vec![]
        }
        Mode::FileAction => file_action_items(),
        Mode::Mixer => mixer_items(),
        Mode::Metronome => metronome_items(),
        Mode::Power => power_items(),
        Mode::Rename | Mode::Volume | Mode::Shutdown => vec![],
    };
    debug!("Entering {mode:?} with {} items", items.len());
    state.menu.enter(mode, items);
}

/// Items of a list screen. Blocking: reads folders or the MIDI host.
fn list_items(mode: Mode, library: &Library, list_ports: &PortLister) -> Vec<MenuItem> {
    match mode {
        Mode::SoundfontList => library
            .soundfonts()
            .into_iter()
            .map(|f| MenuItem::new(f.name, Action::LoadSoundfont(f.path)))
            .collect(),
        Mode::MidiFileList => library
            .midi_files()
            .into_iter()
            .map(|f| MenuItem::new(f.name, Action::OpenMidiFile(f.path)))
            .collect(),
        Mode::MidiPortList => list_ports()
            .into_iter()
            .map(|name| MenuItem::new(name.clone(), Action::ConnectPort(name)))
            .collect(),
        _ => vec![],
    }
}

/// Does the blocking part of a file-system task. Other tasks yield `None`.
pub fn run_file_task(task: &Task, library: &Library, list_ports: &PortLister) -> Option<Outcome> {
    match task {
        Task::FillList(mode) => Some(Outcome::Listed {
            mode: *mode,
            items: list_items(*mode, library, list_ports),
        }),
        Task::RenameFile { from, name } => Some(Outcome::Renamed {
            from: from.clone(),
            result: library.rename_midi(from, name),
        }),
        Task::DeleteFile(path) => Some(Outcome::Deleted(
            library
                .delete_midi(path)
                .map(|()| list_items(Mode::MidiFileList, library, list_ports)),
        )),
        _ => None,
    }
}

/// Applies finished file-system work. A result only moves the menu if the
/// screen it belongs to is still shown.
pub fn complete(state: &mut State, outcome: Outcome, now: Instant) {
    match outcome {
        Outcome::Listed { mode, items } => {
            if state.menu.mode() == mode {
                debug!("{mode:?} filled with {} items", items.len());
                state.menu.set_items(items);
            }
        }
        Outcome::Renamed { from, result } => match result {
            Ok(to) => {
                if state.menu.selected_file.as_deref() == Some(from.as_path()) {
                    state.menu.selected_file = Some(to);
                }
                state.show_message("Renamed", now);
            }
            Err(e) => fail(state, now, "rename file", e),
        },
        Outcome::Deleted(result) => match result {
            Ok(items) => {
                state.menu.selected_file = None;
                state.show_message("Deleted", now);
                if matches!(state.menu.mode(), Mode::FileAction | Mode::MidiFileList) {
                    state.menu.enter(Mode::MidiFileList, items);
                }
            }
            Err(e) => fail(state, now, "delete file", e),
        },
    }
}

/// Contains a failed side effect: logged, shown as a transient message,
/// menu state left as it was.
fn fail(state: &mut State, now: Instant, what: &str, e: impl Display) {
    warn!("Failed to {what}: {e}");
    state.show_message("Error", now);
}
