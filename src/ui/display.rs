use std::{error::Error, fmt};

use tracing::debug;

use super::frame::Frame;

#[derive(Debug)]
pub enum DisplayError {
    Transfer(String),
}

impl Error for DisplayError {}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisplayError::Transfer(e) => write!(f, "Frame transfer failed: {e}"),
        }
    }
}

/// Panel transport. Presenting may fail transiently; callers keep going.
pub trait Display: Send {
    fn present_frame(&mut self, frame: &Frame) -> Result<(), DisplayError>;
}

/// Headless display that logs the text of each frame whenever it changes.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Vec<String>,
}

impl Display for LogDisplay {
    fn present_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let texts: Vec<String> = frame.texts().into_iter().map(str::to_owned).collect();
        if texts != self.last {
            debug!("[screen] {}", texts.join(" | "));
            self.last = texts;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn present_frame(&mut self, _: &Frame) -> Result<(), DisplayError> {
        Ok(())
    }
}
