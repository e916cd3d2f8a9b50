//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The agent process could not be launched or its stdio attached.
    Spawn(String),
    /// A message was sent to an adapter with no attached process.
    NotRunning(String),
    /// Malformed output from the agent process (bad JSON, oversized line).
    ProcessIo(String),
    /// A control-channel call referenced a connection with no live session.
    UnknownConnection(String),
    /// The client request was rejected before any process was spawned.
    BadRequest(String),
    /// File-system, socket, or other I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::NotRunning(msg) => write!(f, "not running: {msg}"),
            Self::ProcessIo(msg) => write!(f, "process io: {msg}"),
            Self::UnknownConnection(msg) => write!(f, "unknown connection: {msg}"),
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
