use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    engine::{self, AudioEngine},
    input::PortLister,
    library::Library,
    menu::{self, Task},
    midi::PortConnector,
    mixer::MixerSettings,
    power::SystemPower,
    state::{ConnectionStatus, LoadedSoundfont, Shared},
};

/// Writes mixer settings in the order the saves were requested. Each save
/// takes a ticket when it is spawned; one older than the last written is
/// skipped.
#[derive(Clone)]
struct MixerWriter {
    path: PathBuf,
    issued: Arc<AtomicU64>,
    written: Arc<Mutex<u64>>,
}

impl MixerWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            issued: Arc::new(AtomicU64::new(0)),
            written: Arc::new(Mutex::new(0)),
        }
    }

    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Executes the blocking work requested by menu transitions. Each task runs
/// on its own, reports back through the shared state and requests a redraw.
#[derive(Clone)]
pub struct TaskRunner {
    shared: Arc<Shared>,
    engine: Arc<dyn AudioEngine>,
    connector: Arc<dyn PortConnector>,
    power: Arc<SystemPower>,
    library: Arc<Library>,
    list_ports: Arc<PortLister>,
    mixer: MixerWriter,
}

impl TaskRunner {
    pub fn new(
        shared: Arc<Shared>,
        engine: Arc<dyn AudioEngine>,
        connector: Arc<dyn PortConnector>,
        power: Arc<SystemPower>,
        library: Arc<Library>,
        list_ports: Arc<PortLister>,
        mixer_path: PathBuf,
    ) -> Self {
        Self {
            shared,
            engine,
            connector,
            power,
            library,
            list_ports,
            mixer: MixerWriter::new(mixer_path),
        }
    }

    /// Starts `task` in the background. Mixer saves are ordered from here.
    pub fn spawn(&self, task: Task) -> JoinHandle<()> {
        let ticket = self.ticket_for(&task);
        let runner = self.clone();
        tokio::spawn(async move {
            runner.execute(task, ticket).await;
            runner.shared.request_redraw();
        })
    }

    pub async fn run(&self, task: Task) {
        let ticket = self.ticket_for(&task);
        self.execute(task, ticket).await;
    }

    fn ticket_for(&self, task: &Task) -> u64 {
        match task {
            Task::SaveMixer(_) => self.mixer.issue(),
            _ => 0,
        }
    }

    async fn execute(&self, task: Task, ticket: u64) {
        match task {
            Task::LoadSoundfont(path) => self.load_soundfont(path).await,
            Task::PlayFile(path) => {
                let engine = Arc::clone(&self.engine);
                let res = blocking(move || engine.play_file(&path)).await;
                self.report(res.map(|r| r.map_err(|e| e.to_string())), "Playing")
                    .await;
            }
            Task::SaveMixer(settings) => self.save_mixer(settings, ticket).await,
            Task::WriteRecording { recording, path } => {
                let res = blocking(move || recording.write(&path)).await;
                self.report(res.map(|r| r.map_err(|e| e.to_string())), "Saved Rec")
                    .await;
            }
            Task::ConnectMidi(name) => self.connect_midi(name).await,
            Task::SetLowPower(on) => self.power.set_low_power(on).await,
            task @ (Task::FillList(_) | Task::RenameFile { .. } | Task::DeleteFile(_)) => {
                self.file_task(task).await
            }
        }
    }

    async fn save_mixer(&self, settings: MixerSettings, ticket: u64) {
        let mut written = self.mixer.written.lock().await;
        if *written > ticket {
            debug!("Skipping mixer save {ticket}, {} already written", *written);
            return;
        }
        let path = self.mixer.path.clone();
        let res = blocking(move || settings.save(&path)).await;
        *written = ticket;
        drop(written);
        match res {
            Some(Ok(())) => info!("Mixer settings saved to {:?}", self.mixer.path),
            Some(Err(e)) => {
                warn!("Could not save mixer settings: {e}");
                self.show("Error").await;
            }
            None => self.show("Error").await,
        }
    }

    /// Folder scans, renames and deletes run off the state lock; the result
    /// is applied once they are done.
    async fn file_task(&self, task: Task) {
        let library = Arc::clone(&self.library);
        let list_ports = Arc::clone(&self.list_ports);
        let outcome =
            blocking(move || menu::run_file_task(&task, &library, list_ports.as_ref())).await;
        match outcome.flatten() {
            Some(outcome) => {
                let mut state = self.shared.lock().await;
                menu::complete(&mut state, outcome, Instant::now());
            }
            None => self.show("Error").await,
        }
    }

    async fn load_soundfont(&self, path: PathBuf) {
        info!("Loading soundfont {path:?}");
        let engine = Arc::clone(&self.engine);
        let sf_path = path.clone();
        let res = blocking(move || -> engine::Result<_> {
            let id = engine.load_soundfont(&sf_path)?;
            // the engine already parsed the file; read it again only if it
            // cannot hand its names over
            let (names, names_ok) = match engine.preset_names(id) {
                Some(names) => (names, true),
                None => engine::resolve_preset_names(&sf_path),
            };
            Ok((id, names, names_ok))
        })
        .await;

        let mut state = self.shared.lock().await;
        match res {
            Some(Ok((id, names, names_ok))) => {
                let mixer = state.mixer;
                let presets = engine::select_default_presets(
                    self.engine.as_ref(),
                    id,
                    &names,
                    names_ok,
                    &mixer,
                );
                state.presets = presets;
                state.soundfont = Some(LoadedSoundfont {
                    id,
                    path,
                    names,
                    names_ok,
                });
                state.show_message("SF2 Loaded", Instant::now());
                info!("Soundfont loaded (id {id})");
            }
            Some(Err(e)) => {
                warn!("Could not load soundfont {path:?}: {e}");
                state.show_message("Error", Instant::now());
            }
            None => state.show_message("Error", Instant::now()),
        }
    }

    async fn connect_midi(&self, name: String) {
        let connector = Arc::clone(&self.connector);
        let port = name.clone();
        let res = blocking(move || connector.connect(&port)).await;

        let mut state = self.shared.lock().await;
        match res {
            Some(Ok(())) => {
                state.connection = ConnectionStatus::Connected(name);
                state.show_message("Connected MIDI", Instant::now());
            }
            Some(Err(e)) => {
                warn!("Could not connect MIDI port {name}: {e}");
                state.connection = ConnectionStatus::Failed(name);
            }
            None => state.connection = ConnectionStatus::Failed(name),
        }
    }

    async fn report(&self, res: Option<Result<(), String>>, success: &str) {
        match res {
            Some(Ok(())) => self.show(success).await,
            Some(Err(e)) => {
                warn!("Background task failed: {e}");
                self.show("Error").await;
            }
            None => self.show("Error").await,
        }
    }

    async fn show(&self, text: &str) {
        self.shared.lock().await.show_message(text, Instant::now());
    }
}

async fn blocking<T, F>(f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Background task panicked: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{
            testing::{EngineCall, RecordingEngine},
            PresetMap,
        },
        menu::Mode,
        midi::{Message, ReaderError},
        recorder::Recorder,
        state::State,
    };
    use std::{fs, path::Path};

    struct FakeConnector {
        ports: Vec<String>,
    }

    impl PortConnector for FakeConnector {
        fn connect(&self, port_name: &str) -> Result<(), ReaderError> {
            if self.ports.iter().any(|p| p == port_name) {
                Ok(())
            } else {
                Err(ReaderError::PortNotFound(port_name.into()))
            }
        }
    }

    fn runner(engine: Arc<RecordingEngine>, mixer_path: PathBuf) -> (TaskRunner, Arc<Shared>) {
        runner_with_library(engine, mixer_path, Path::new("media"))
    }

    fn runner_with_library(
        engine: Arc<RecordingEngine>,
        mixer_path: PathBuf,
        media: &Path,
    ) -> (TaskRunner, Arc<Shared>) {
        let shared = Shared::new(State::new(MixerSettings::default()));
        let connector = Arc::new(FakeConnector {
            ports: vec!["Keystation".into()],
        });
        let runner = TaskRunner::new(
            Arc::clone(&shared),
            engine,
            connector,
            Arc::new(SystemPower::new(true)),
            Arc::new(Library::new(media.join("sf2"), media.join("midifiles"))),
            Arc::new(|| vec!["Keystation".to_owned()]),
            mixer_path,
        );
        (runner, shared)
    }

    async fn message(shared: &Shared) -> Option<String> {
        shared
            .lock()
            .await
            .message_text(Instant::now())
            .map(str::to_owned)
    }

    #[tokio::test]
    async fn soundfont_load_selects_defaults() {
        let engine = Arc::new(RecordingEngine::default());
        let (runner, shared) = runner(Arc::clone(&engine), "mixer.json".into());
        runner.run(Task::LoadSoundfont("missing.sf2".into())).await;

        let state = shared.lock().await;
        let sf = state.soundfont.as_ref().unwrap();
        assert_eq!(sf.id, 1);
        assert!(!sf.names_ok);
        assert_eq!(state.presets.get(9), Some("Drums"));
        assert_eq!(state.presets.get(8), Some("Preset 8"));
        assert_eq!(state.message_text(Instant::now()), Some("SF2 Loaded"));
        assert_eq!(
            engine.calls()[0],
            EngineCall::LoadSoundfont("missing.sf2".into())
        );
    }

    #[tokio::test]
    async fn soundfont_load_failure_shows_error() {
        let engine = Arc::new(RecordingEngine::failing());
        let (runner, shared) = runner(engine, "mixer.json".into());
        runner.run(Task::LoadSoundfont("x.sf2".into())).await;
        assert!(shared.lock().await.soundfont.is_none());
        assert_eq!(message(&shared).await.as_deref(), Some("Error"));
    }

    #[tokio::test]
    async fn midi_connect_updates_status() {
        let engine = Arc::new(RecordingEngine::default());
        let (runner, shared) = runner(engine, "mixer.json".into());

        runner.run(Task::ConnectMidi("Keystation".into())).await;
        assert_eq!(
            shared.lock().await.connection,
            ConnectionStatus::Connected("Keystation".into())
        );
        assert_eq!(message(&shared).await.as_deref(), Some("Connected MIDI"));

        runner.run(Task::ConnectMidi("Gone".into())).await;
        let state = shared.lock().await;
        assert_eq!(state.connection, ConnectionStatus::Failed("Gone".into()));
        assert_eq!(state.connection.label(), "MIDI: retry");
    }

    #[tokio::test]
    async fn mixer_and_recording_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mixer_path = dir.path().join("mixer_settings.json");
        let engine = Arc::new(RecordingEngine::default());
        let (runner, shared) = runner(engine, mixer_path.clone());

        let mut mixer = MixerSettings::default();
        mixer.set_volume(4, 12);
        runner.spawn(Task::SaveMixer(mixer)).await.unwrap();
        assert_eq!(MixerSettings::load(&mixer_path), mixer);

        let t0 = std::time::Instant::now();
        let mut recorder = Recorder::default();
        recorder.start(t0);
        recorder.add_event(Message::decode(&[0x90, 60, 100]).unwrap(), t0);
        let recording = recorder.stop().unwrap();
        let path = dir.path().join("rec_120000.mid");
        runner
            .run(Task::WriteRecording {
                recording,
                path: path.clone(),
            })
            .await;
        assert!(fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(message(&shared).await.as_deref(), Some("Saved Rec"));
    }

    #[tokio::test]
    async fn play_file_reports() {
        let engine = Arc::new(RecordingEngine::default());
        let (runner, shared) = runner(Arc::clone(&engine), "mixer.json".into());
        runner.run(Task::PlayFile("song.mid".into())).await;
        assert_eq!(engine.calls(), vec![EngineCall::PlayFile("song.mid".into())]);
        assert_eq!(message(&shared).await.as_deref(), Some("Playing"));
    }

    #[tokio::test]
    async fn loaded_preset_names_are_reused() {
        let mut presets = PresetMap::new();
        presets.add_preset(0, 0, "Grand Piano");
        let engine = Arc::new(RecordingEngine {
            presets: Some(presets),
            ..Default::default()
        });
        let (runner, shared) = runner(Arc::clone(&engine), "mixer.json".into());
        // the path does not exist, so the names can only come from the engine
        runner.run(Task::LoadSoundfont("missing.sf2".into())).await;

        let state = shared.lock().await;
        let sf = state.soundfont.as_ref().unwrap();
        assert!(sf.names_ok);
        assert_eq!(sf.names.name(0, 0), Some("Grand Piano"));
    }

    #[tokio::test]
    async fn older_mixer_save_never_overwrites_newer() {
        let dir = tempfile::tempdir().unwrap();
        let mixer_path = dir.path().join("mixer_settings.json");
        let engine = Arc::new(RecordingEngine::default());
        let (runner, _shared) = runner(engine, mixer_path.clone());

        let mut older = MixerSettings::default();
        older.set_volume(2, 10);
        let mut newer = MixerSettings::default();
        newer.set_volume(2, 90);
        let (first, second) = (runner.mixer.issue(), runner.mixer.issue());

        // the later save reaches the disk first
        runner.execute(Task::SaveMixer(newer), second).await;
        runner.execute(Task::SaveMixer(older), first).await;
        assert_eq!(MixerSettings::load(&mixer_path), newer);

        let handles = [older, newer].map(|s| runner.spawn(Task::SaveMixer(s)));
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(MixerSettings::load(&mixer_path), newer);
    }

    #[tokio::test]
    async fn list_is_filled_after_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let midi_dir = dir.path().join("midifiles");
        fs::create_dir_all(&midi_dir).unwrap();
        fs::write(midi_dir.join("song.mid"), b"").unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let (runner, shared) = runner_with_library(engine, "mixer.json".into(), dir.path());
        shared.lock().await.menu.enter(Mode::MidiFileList, vec![]);

        runner.spawn(Task::FillList(Mode::MidiFileList)).await.unwrap();
        let state = shared.lock().await;
        assert_eq!(state.menu.items().len(), 1);
        assert_eq!(state.menu.items()[0].label, "song");
    }

    #[tokio::test]
    async fn failed_delete_shows_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let (runner, shared) = runner_with_library(engine, "mixer.json".into(), dir.path());
        let outside = dir.path().join("elsewhere.mid");
        fs::write(&outside, b"").unwrap();

        runner.run(Task::DeleteFile(outside.clone())).await;
        assert!(outside.exists());
        assert_eq!(message(&shared).await.as_deref(), Some("Error"));
    }
}
