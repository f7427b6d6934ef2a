//! Error types
//!
//! Per-module error enums are folded into [`Error`] so session code can use
//! `?` throughout and decide at one place whether a failure ends the session.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Underlying socket or file I/O failed
    Io(io::Error),
    /// Peer closed the connection, possibly in the middle of a message
    ConnectionClosed,
    /// Peer sent something the protocol does not allow here
    Protocol(ProtocolError),
    /// Registry invariant violated
    Registry(RegistryError),
    /// Startup configuration is incomplete or invalid
    Config(ConfigError),
    /// Video sink failed to persist a buffer
    Persistence(PersistenceError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Persistence(e) => write!(f, "Persistence error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Persistence(e) => Some(&e.source),
            _ => None,
        }
    }
}

impl Error {
    /// Whether the owning session has to stop after this error
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Protocol(e) => e.is_fatal(),
            Error::Persistence(_) => false,
            _ => true,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Error::Persistence(e)
    }
}

/// Wire-level protocol violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command is valid but not in the session's current role
    UnexpectedCommand { command: String, role: &'static str },
    /// Dimension slot did not parse as `<width>x<height>`
    InvalidDimensions(String),
    /// Motion slot did not parse as a boolean
    InvalidMotionFlag(String),
    /// Binary frame length header exceeds the configured limit
    FrameTooLarge { size: u64, max: usize },
    /// Tagged framing received an unknown type byte
    UnknownTag(u8),
    /// Expected a text slot, got binary data
    ExpectedText,
    /// Expected a binary frame, got a text slot
    ExpectedBinary,
    /// Broadcast snapshot body is truncated or inconsistent
    MalformedSnapshot,
}

impl ProtocolError {
    /// Errors after which the byte stream cannot be resynchronised
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooLarge { .. }
                | ProtocolError::UnknownTag(_)
                | ProtocolError::MalformedSnapshot
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedCommand { command, role } => {
                write!(f, "Unexpected command '{}' for {} session", command, role)
            }
            ProtocolError::InvalidDimensions(s) => write!(f, "Invalid dimensions: '{}'", s),
            ProtocolError::InvalidMotionFlag(s) => write!(f, "Invalid motion flag: '{}'", s),
            ProtocolError::FrameTooLarge { size, max } => {
                write!(f, "Frame of {} bytes exceeds limit of {} bytes", size, max)
            }
            ProtocolError::UnknownTag(tag) => write!(f, "Unknown message tag: 0x{:02x}", tag),
            ProtocolError::ExpectedText => write!(f, "Expected a text slot, got binary data"),
            ProtocolError::ExpectedBinary => write!(f, "Expected a binary frame, got a text slot"),
            ProtocolError::MalformedSnapshot => write!(f, "Malformed broadcast snapshot"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Configuration loading failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required key absent from every source
    MissingKey(&'static str),
    /// Key present but its value does not parse
    InvalidValue { key: &'static str, value: String },
    /// The env file exists but could not be read
    EnvFile { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingKey(key) => write!(f, "Missing required key {}", key),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
            ConfigError::EnvFile { path, message } => {
                write!(f, "Failed to load {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Video sink failure, carrying the target path
#[derive(Debug)]
pub struct PersistenceError {
    /// File the sink was asked to write
    pub path: PathBuf,
    /// Underlying failure
    pub source: io::Error,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to write {}: {}", self.path.display(), self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_maps_to_connection_closed() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_protocol_fatality() {
        let soft: Error = ProtocolError::InvalidDimensions("axb".into()).into();
        assert!(!soft.is_fatal());

        let hard: Error = ProtocolError::FrameTooLarge { size: 10, max: 1 }.into();
        assert!(hard.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ConfigError::MissingKey("SERVER_PORT");
        assert_eq!(err.to_string(), "Missing required key SERVER_PORT");
    }
}
