//! Room model - one game session

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Player;
use crate::election::Election;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Lobby,
    Tasks,
    Meeting,
}

/// A room with its roster, phase and (during meetings) the active vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub join_code: String,
    /// Roster order is significant: ownership falls back to the lowest index
    pub players: Vec<Player>,
    pub state: RoomState,
    pub owner_connection_id: Uuid,
    pub adversary_count: usize,
    pub active_election: Option<Election>,
}

impl Room {
    pub fn new(join_code: String, owner: Player, adversary_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            join_code,
            owner_connection_id: owner.connection_id,
            players: vec![owner],
            state: RoomState::Lobby,
            adversary_count,
            active_election: None,
        }
    }

    pub fn player(&self, connection_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.connection_id == connection_id)
    }

    pub fn player_mut(&mut self, connection_id: Uuid) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.player(connection_id).is_some()
    }

    pub fn is_owner(&self, connection_id: Uuid) -> bool {
        self.owner_connection_id == connection_id
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }

    /// True when nobody in the roster is still connected
    pub fn all_pending(&self) -> bool {
        self.players.iter().all(|p| p.disconnected_pending)
    }
}

/// Why a meeting was called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingKind {
    Emergency,
    Murder,
}

/// Announcement sent when a room enters the meeting phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub kind: MeetingKind,
    pub caller: Uuid,
    pub victim: Option<Uuid>,
    pub countdown_ms: u64,
}
