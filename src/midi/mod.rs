mod msg;
mod reader;
pub mod router;

pub use msg::Message;
pub use msg::MessageKind;
pub use reader::MidiReader;
pub use reader::PortConnector;
pub use reader::ReaderError;
use std::time::Instant;
use tokio::sync::mpsc;

/// A decoded message together with the moment it came off the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inbound {
    pub message: Message,
    pub received: Instant,
}

pub type Sender = mpsc::UnboundedSender<Inbound>;
pub type Receiver = mpsc::UnboundedReceiver<Inbound>;

/// Unbounded so the midir callback never blocks and no message is dropped
/// while the router waits for the state lock.
pub fn create_channel() -> (Sender, Receiver) {
    mpsc::unbounded_channel()
}
