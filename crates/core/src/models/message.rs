//! Chat message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Player;

/// A chat line relayed to every member of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: Uuid,
    pub display_name: String,
    pub colour: String,
    /// Lets clients hide messages from eliminated players
    pub alive: bool,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_player(player: &Player, text: String) -> Self {
        Self {
            sender_id: player.connection_id,
            display_name: player.display_name.clone(),
            colour: player.colour.clone(),
            alive: player.alive,
            text,
            timestamp: Utc::now(),
        }
    }
}
