//! Error types for Skulk Core

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    /// The request does not apply to the room's current state. Callers
    /// ignore these: they come from clients that are out of sync.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RoomNotFound(_) | Error::PlayerNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
