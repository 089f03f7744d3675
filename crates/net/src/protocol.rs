//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Clients send [`ClientEvent`]s; the server answers and broadcasts
//! [`ServerEvent`]s.

use serde::{Deserialize, Serialize};
use skulk_core::{ChatMessage, Election, Meeting, Player, Role, Room};
use uuid::Uuid;

/// Requests sent by a client. Closing the connection counts as a
/// disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Open a new room with the sender as owner
    CreateRoom {
        name: String,
        #[serde(default)]
        adversaries: Option<i64>,
    },

    /// Join a lobby by its code
    JoinRoom { name: String, code: String },

    /// Take back a seat after a dropped connection
    RejoinRoom { persistent_id: Uuid, room_id: Uuid },

    LeaveRoom,

    /// Owner starts the game
    ReadyRoom,

    TaskComplete { task: String },

    /// The sender reports their own death
    SelfEliminated,

    EliminateTarget { target: Uuid },

    CallMeeting {
        #[serde(default)]
        accused: Option<Uuid>,
    },

    CastVote {
        #[serde(default)]
        target: Option<Uuid>,
    },

    SendMessage { text: String },

    /// Aggregate server counts
    Status,

    /// Full snapshot of one room
    RoomStatus { room_id: Uuid },
}

/// Aggregate counts reported by the status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub connections: usize,
    pub players: usize,
    pub rooms: usize,
}

/// Messages sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First message on every connection
    Welcome { connection_id: Uuid },

    /// Sent to the player who created, joined or rejoined a room
    JoinedRoom { room: Room, player: Player },

    RoomUpdated { room: Room },

    RoomNotFound,

    UserNotFound,

    RolesAssigned { players: Vec<Player> },

    TaskProgress { percent: f64 },

    MeetingStarted { meeting: Meeting },

    VoteConcluded {
        election: Election,
        ejected: Option<Player>,
    },

    GameOver { winning_faction: Role },

    ChatMessage(ChatMessage),

    Status(StatusReport),

    RoomStatus { room: Room },

    /// Server is shutting down
    ServerShutdown,
}

impl ClientEvent {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl ServerEvent {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_shape() {
        let json = r#"{"type":"cast_vote"}"#;
        let event = ClientEvent::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(event, ClientEvent::CastVote { target: None });

        let target = Uuid::new_v4();
        let json = format!(r#"{{"type":"eliminate_target","target":"{}"}}"#, target);
        let event = ClientEvent::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(event, ClientEvent::EliminateTarget { target });
    }

    #[test]
    fn test_create_room_without_adversaries() {
        let json = r#"{"type":"create_room","name":"ana"}"#;
        let event = ClientEvent::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(
            event,
            ClientEvent::CreateRoom {
                name: "ana".into(),
                adversaries: None
            }
        );
    }

    #[test]
    fn test_server_event_roundtrip() {
        let msg = ServerEvent::GameOver {
            winning_faction: Role::Adversary,
        };

        let bytes = msg.to_bytes().unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("\"adversary\""));

        match ServerEvent::from_bytes(&bytes).unwrap() {
            ServerEvent::GameOver { winning_faction } => {
                assert_eq!(winning_faction, Role::Adversary)
            }
            _ => panic!("Wrong message type"),
        }
    }
}
