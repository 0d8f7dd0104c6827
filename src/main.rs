use clap::Parser;
use config::{Args, Config, DisplayKind};
use engine::{output::OutputParams, AudioEngine, RustyEngine};
use midi::MidiReader;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

mod channel_map;
mod config;
mod engine;
mod input;
mod library;
mod menu;
mod metronome;
mod midi;
mod mixer;
mod overlay;
mod power;
mod recorder;
mod state;
mod tasks;
mod ui;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from(Args::parse());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting zompler > version: {}", VERSION.unwrap_or("?"));
    info!("| SoundFont directory: {:?}", config.soundfont_dir);
    info!("| MIDI file directory: {:?}", config.midi_dir);
    info!("| Mixer settings: {:?}", config.mixer_path);
    info!("| Available MIDI ports:");
    for port in MidiReader::list_ports() {
        info!("| - {port}");
    }

    let mut display: Box<dyn ui::Display> = match config.display {
        DisplayKind::Log => Box::<ui::LogDisplay>::default(),
        DisplayKind::None => Box::new(ui::NullDisplay),
    };
    if let Err(e) = display.present_frame(&ui::frame::splash_frame()) {
        warn!("{e}");
    }

    let state = state::State::new(mixer::MixerSettings::load(&config.mixer_path));
    let engine = create_engine(config.output, &state);
    let (metronome_tx, metronome_rx) = metronome::create_config_channel(state.metronome);
    let shared = state::Shared::new(state);

    let (midi_tx, midi_rx) = midi::create_channel();
    let midi_reader = Arc::new(Mutex::new(MidiReader::new(midi_tx)));
    tokio::spawn(midi::router::run(
        midi_rx,
        Arc::clone(&shared),
        Arc::clone(&engine),
    ));
    tokio::spawn(metronome::Metronome::new(Arc::clone(&engine), metronome_rx).run());

    let power = Arc::new(power::SystemPower::new(config.dry_run));
    let library = Arc::new(library::Library::new(
        config.soundfont_dir.clone(),
        config.midi_dir.clone(),
    ));
    let runner = tasks::TaskRunner::new(
        Arc::clone(&shared),
        Arc::clone(&engine),
        Arc::clone(&midi_reader) as Arc<dyn midi::PortConnector>,
        Arc::clone(&power),
        Arc::clone(&library),
        Arc::new(MidiReader::list_ports),
        config.mixer_path.clone(),
    );
    let dispatcher = input::Dispatcher::new(
        Arc::clone(&shared),
        Arc::clone(&engine),
        library,
        metronome_tx,
        runner,
    );
    let (button_tx, button_rx) = input::create_button_channel(16);
    input::spawn_console_buttons(button_tx)?;
    tokio::spawn(dispatcher.run(button_rx));

    let voltage = config
        .voltage_path
        .clone()
        .map(|path| Box::new(power::SysfsVoltage::new(path)) as Box<dyn power::VoltageSource>);
    let render_loop = ui::RenderLoop::new(Arc::clone(&shared), display, voltage);

    let halted = tokio::select! {
        _ = render_loop.run() => true,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for ctrl-c: {e}");
            }
            info!("Interrupted");
            false
        }
    };

    midi_reader.lock().await.disconnect();
    power::shut_down(engine.as_ref(), halted.then(|| power.power_off())).await;

    Ok(())
}

fn create_engine(params: OutputParams, state: &state::State) -> Arc<dyn AudioEngine> {
    let engine = RustyEngine::new(params);
    if let Err(e) = engine.set_gain(state.gain()) {
        warn!("{e}");
    }
    if let Err(e) = engine.set_polyphony(menu::machine::MAX_POLYPHONY) {
        warn!("{e}");
    }
    Arc::new(engine)
}
