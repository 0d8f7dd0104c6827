use std::{error::Error, fmt, time::Instant};

use midir::MidiInput;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Inbound, Message, Sender};

const CLIENT_NAME: &str = "zompler";

pub type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    InitError,
    PortNotFound(String),
    ConnectError,
}

impl Error for ReaderError {}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReaderError::InitError => "Failed to initialize MIDI input.".fmt(f),
            ReaderError::PortNotFound(name) => write!(f, "MIDI port not found: {name}"),
            ReaderError::ConnectError => "Failed to connect MIDI port.".fmt(f),
        }
    }
}

/// Opens MIDI input ports by name. Connecting may block on the host MIDI
/// stack, so callers run it off the async executor.
pub trait PortConnector: Send + Sync {
    fn connect(&self, port_name: &str) -> Result<()>;
}

/// Single-port MIDI input. Every decoded message is forwarded, timestamped,
/// into the inbound channel; the midir callback never blocks.
pub struct MidiReader {
    connection: Option<(String, midir::MidiInputConnection<()>)>,
    tx: Sender,
}

impl MidiReader {
    pub fn new(tx: Sender) -> Self {
        Self {
            connection: None,
            tx,
        }
    }

    pub fn list_ports() -> Vec<String> {
        MidiInput::new(CLIENT_NAME)
            .map(get_available_ports_of)
            .unwrap_or_else(|_| vec![])
    }

    /// Replaces the current connection, if any.
    pub fn connect_input(&mut self, port_name: &str) -> Result<()> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|_| ReaderError::InitError)?;
        let index = get_port_index(&midi_in, port_name)
            .ok_or_else(|| ReaderError::PortNotFound(port_name.into()))?;
        self.disconnect();
        let conn = connect_midi_in_to_port(midi_in, index, self.tx.clone())?;
        info!("MIDI port connected: {port_name}");
        self.connection = Some((port_name.into(), conn));
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some((name, conn)) = self.connection.take() {
            conn.close();
            debug!("MIDI port disconnected: {name}");
        }
    }
}

impl PortConnector for Mutex<MidiReader> {
    fn connect(&self, port_name: &str) -> Result<()> {
        self.blocking_lock().connect_input(port_name)
    }
}

fn get_available_ports_of(midi_in: MidiInput) -> Vec<String> {
    midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect()
}

fn get_port_index(midi_in: &MidiInput, port_name: &str) -> Option<usize> {
    midi_in.ports().iter().position(|port| {
        if let Ok(name) = midi_in.port_name(port) {
            name == port_name
        } else {
            false
        }
    })
}

fn connect_midi_in_to_port(
    midi_in: MidiInput,
    port_index: usize,
    tx: Sender,
) -> Result<midir::MidiInputConnection<()>> {
    let ports = midi_in.ports();
    let port = ports.get(port_index).ok_or(ReaderError::ConnectError)?;
    midi_in
        .connect(
            port,
            CLIENT_NAME,
            move |_, bytes, _| {
                if let Some(message) = Message::decode(bytes) {
                    _ = tx.send(Inbound {
                        message,
                        received: Instant::now(),
                    });
                }
            },
            (),
        )
        .map_err(|_| ReaderError::ConnectError)
}
