use std::{
    io::{self, BufRead},
    sync::Arc,
    thread,
    time::Instant,
};

use chrono::Local;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    engine::AudioEngine,
    library::Library,
    menu::{self, Context},
    metronome::ConfigSender,
    state::Shared,
    tasks::TaskRunner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Up,
    Down,
    Select,
    Back,
}

impl Button {
    /// Console bindings for the four panel buttons.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "w" | "k" | "up" => Some(Button::Up),
            "s" | "j" | "down" => Some(Button::Down),
            "" | "e" | "enter" | "select" => Some(Button::Select),
            "q" | "b" | "back" => Some(Button::Back),
            _ => None,
        }
    }
}

pub type ButtonSender = mpsc::Sender<Button>;
pub type ButtonReceiver = mpsc::Receiver<Button>;

pub fn create_button_channel(buffer: usize) -> (ButtonSender, ButtonReceiver) {
    mpsc::channel(buffer)
}

pub type PortLister = dyn Fn() -> Vec<String> + Send + Sync;

/// Feeds button edges through the menu state machine, one at a time, then
/// hands any requested blocking work to the task runner.
pub struct Dispatcher {
    shared: Arc<Shared>,
    engine: Arc<dyn AudioEngine>,
    library: Arc<Library>,
    metronome: ConfigSender,
    runner: TaskRunner,
}

impl Dispatcher {
    pub fn new(
        shared: Arc<Shared>,
        engine: Arc<dyn AudioEngine>,
        library: Arc<Library>,
        metronome: ConfigSender,
        runner: TaskRunner,
    ) -> Self {
        Self {
            shared,
            engine,
            library,
            metronome,
            runner,
        }
    }

    pub async fn dispatch(&self, button: Button) -> Vec<JoinHandle<()>> {
        debug!("Button: {button:?}");
        let tasks = {
            let mut state = self.shared.lock().await;
            let ctx = Context {
                engine: self.engine.as_ref(),
                library: &self.library,
                metronome: &self.metronome,
                now: Instant::now(),
                local_time: Local::now(),
            };
            menu::handle(&mut state, &ctx, button)
        };
        let handles = tasks
            .into_iter()
            .map(|task| self.runner.spawn(task))
            .collect();
        self.shared.request_redraw();
        handles
    }

    pub async fn run(self, mut rx: ButtonReceiver) {
        info!("Button dispatcher started");
        while let Some(button) = rx.recv().await {
            self.dispatch(button).await;
        }
        info!("Button dispatcher stopped");
    }
}

/// Reads console lines as button presses on a plain thread. A read pending
/// on stdin never holds up runtime shutdown.
pub fn spawn_console_buttons(tx: ButtonSender) -> io::Result<()> {
    thread::Builder::new()
        .name("console-buttons".into())
        .spawn(move || read_buttons(io::stdin().lock(), &tx))?;
    Ok(())
}

/// Forwards parsed lines until the input ends or the dispatcher is gone.
fn read_buttons(input: impl BufRead, tx: &ButtonSender) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        };
        match Button::parse(&line) {
            Some(button) => {
                if tx.blocking_send(button).is_err() {
                    break;
                }
            }
            None => warn!("Unknown button {line:?} (use w/s/enter/q)"),
        }
    }
    debug!("Console buttons closed");
}
