//! Registry error types

use super::frame::SessionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Identity is already registered as a camera or display
    DuplicateRegistration(SessionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateRegistration(id) => {
                write!(f, "Session already registered: {}", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
