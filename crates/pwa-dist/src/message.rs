//! Closed set of messages exchanged between master and workers.

use pwa_core::{ErrorInfo, FcnFlag, PwaError};
use serde::{Deserialize, Serialize};

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Sent before every call; `true` ends the worker loop.
    Terminate(bool),
    /// Flag of the coming call.
    FcnFlag(FcnFlag),
    /// Parameter vector of the coming call.
    Params(Vec<f64>),
    /// A worker's objective share.
    FcnVal(f64),
    /// A worker's gradient share.
    Derivs(Vec<f64>),
    /// Free-form setup report from a worker.
    SetupMessage(String),
    /// Highest parameter id, sent before workers load their datasets.
    MaxParamId(u32),
}

impl Message {
    /// Variant name, for protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Terminate(_) => "terminate",
            Message::FcnFlag(_) => "fcn-flag",
            Message::Params(_) => "params",
            Message::FcnVal(_) => "fcn-val",
            Message::Derivs(_) => "derivs",
            Message::SetupMessage(_) => "setup-message",
            Message::MaxParamId(_) => "max-param-id",
        }
    }
}

/// Error for a message of the wrong kind.
pub fn unexpected(expected: &str, found: &Message) -> PwaError {
    PwaError::Protocol(
        ErrorInfo::new("unexpected-message", "received a message of the wrong kind")
            .with_context("expected", expected)
            .with_context("found", found.kind()),
    )
}

/// Encodes a message as a bincode frame payload.
pub fn encode(message: &Message) -> Result<Vec<u8>, PwaError> {
    bincode::serialize(message)
        .map_err(|err| PwaError::Serde(ErrorInfo::new("serialize-message", err.to_string())))
}

/// Decodes a frame payload.
pub fn decode(bytes: &[u8]) -> Result<Message, PwaError> {
    bincode::deserialize(bytes)
        .map_err(|err| PwaError::Serde(ErrorInfo::new("deserialize-message", err.to_string())))
}
