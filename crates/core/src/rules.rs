//! Tunable game rules

use serde::{Deserialize, Serialize};

use crate::election::DEFAULT_VOTE_TIMEOUT_MS;
use crate::tasks::{TaskCatalog, DEFAULT_LONG_TASKS, DEFAULT_SHORT_TASKS};

/// Default cap on display name length, in characters
pub const DEFAULT_MAX_NAME_LEN: usize = 16;

/// Length of generated join codes
pub const JOIN_CODE_LEN: usize = 8;

/// What happens when an elimination leaves no winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StalematePolicy {
    /// Revive everyone, clear roles and checklists, keep the phase
    #[default]
    ResetRoles,
    /// Leave the room as it is
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    pub vote_timeout_ms: u64,
    pub short_tasks: usize,
    pub long_tasks: usize,
    pub max_name_len: usize,
    pub stalemate: StalematePolicy,
    pub catalog: TaskCatalog,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            vote_timeout_ms: DEFAULT_VOTE_TIMEOUT_MS,
            short_tasks: DEFAULT_SHORT_TASKS,
            long_tasks: DEFAULT_LONG_TASKS,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            stalemate: StalematePolicy::default(),
            catalog: TaskCatalog::default(),
        }
    }
}
