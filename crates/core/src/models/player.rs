//! Player model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task label to completion flag
pub type Checklist = BTreeMap<String, bool>;

/// The two factions. Also used to report the winning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Innocent,
    Adversary,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Innocent => "Innocent",
            Role::Adversary => "Adversary",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A seat in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Transient id of the connection currently driving this seat
    pub connection_id: Uuid,
    /// Stable id handed to the client for rejoining after a disconnect
    pub persistent_id: Uuid,
    pub display_name: String,
    pub colour: String,
    pub role: Role,
    pub alive: bool,
    pub tasks: Option<Checklist>,
    pub disconnected_pending: bool,
}

impl Player {
    pub fn new(connection_id: Uuid, display_name: String, colour: String) -> Self {
        Self {
            connection_id,
            persistent_id: Uuid::new_v4(),
            display_name,
            colour,
            role: Role::Innocent,
            alive: true,
            tasks: None,
            disconnected_pending: false,
        }
    }

    pub fn is_adversary(&self) -> bool {
        self.role == Role::Adversary
    }

    /// Number of (completed, total) tasks on this player's checklist
    pub fn task_counts(&self) -> (usize, usize) {
        self.tasks.as_ref().map_or((0, 0), |tasks| {
            (tasks.values().filter(|done| **done).count(), tasks.len())
        })
    }
}
