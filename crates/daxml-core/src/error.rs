//! Protocol-level error taxonomy.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum DaError {
    /// Raw transport failure (USB write/read error).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Short, garbled or missing frame.
    #[error("Frame read failed while waiting for {context}")]
    FrameRead { context: &'static str },

    /// Device explicitly declined the command.
    #[error("Unsupported by device: {0}")]
    Unsupported(String),

    /// Device reported an error; the text is forwarded verbatim.
    #[error("Device error: {0}")]
    Device(String),

    /// An expected CMD:START / CMD:END did not appear.
    #[error("Sequence violation: expected {expected}, got '{got}'")]
    Sequence { expected: &'static str, got: String },

    /// A plain reply other than the one the protocol requires.
    #[error("Unexpected reply: expected '{expected}', got '{got}'")]
    UnexpectedReply { expected: &'static str, got: String },

    /// Device-to-host transfer did not start as announced.
    #[error("Error on downloading data: {0}")]
    Download(String),

    #[error("Invalid target descriptor: '{0}'")]
    BadDescriptor(String),

    #[error("Invalid packet length: '{0}'")]
    BadPacketLength(String),

    /// Expected marker or value missing in a response payload.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Image too short: need {expected} bytes, have {actual}")]
    ImageTooShort { expected: u64, actual: u64 },

    #[error("Preloader error: {0}")]
    Preloader(String),

    #[error("Loader error: {0}")]
    Loader(String),
}

impl DaError {
    /// Soft failures leave the conversation in sync and may be skipped.
    pub fn is_soft(&self) -> bool {
        matches!(self, DaError::Unsupported(_) | DaError::Extraction(_))
    }
}
