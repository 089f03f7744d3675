//! Task tracker - per-player checklists and shared progress
//!
//! Only task counts and categories matter here; the labels come from a
//! [`TaskCatalog`] that can be replaced through configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Checklist, Role, Room};
use crate::random::RandomSource;

/// Default number of short tasks per player
pub const DEFAULT_SHORT_TASKS: usize = 2;
/// Default number of long tasks per player
pub const DEFAULT_LONG_TASKS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Short,
    Long,
    Common,
}

/// Labels available for each task category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskCatalog {
    pub short: Vec<String>,
    pub long: Vec<String>,
    pub common: Vec<String>,
}

impl Default for TaskCatalog {
    fn default() -> Self {
        fn labels(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            short: labels(&[
                "hash passwords",
                "exchange keys",
                "refresh tokens",
                "mask subnet",
                "open podbay doors",
                "generate indexes",
                "read docs",
            ]),
            long: labels(&[
                "hack mainframe",
                "brute force",
                "upload data",
                "restart the modem",
                "wait kettle",
            ]),
            common: labels(&[
                "decrypt keys",
                "clear console",
                "compare hash",
                "enter code",
                "download",
            ]),
        }
    }
}

impl TaskCatalog {
    pub fn labels(&self, category: TaskCategory) -> &[String] {
        match category {
            TaskCategory::Short => &self.short,
            TaskCategory::Long => &self.long,
            TaskCategory::Common => &self.common,
        }
    }

    /// Draw up to `amount` distinct labels from a category
    pub fn draw(
        &self,
        category: TaskCategory,
        amount: usize,
        rng: &mut dyn RandomSource,
    ) -> Vec<String> {
        let labels = self.labels(category);
        let amount = amount.min(labels.len());
        if amount == 0 {
            return Vec::new();
        }
        rng.sample(labels.len(), amount)
            .into_iter()
            .map(|i| labels[i].clone())
            .collect()
    }

    /// Common task for an adversary, distinct from the innocents' one when
    /// the catalog allows it
    fn decoy_common(&self, shared: Option<&str>, rng: &mut dyn RandomSource) -> Option<String> {
        let others: Vec<&String> = self
            .common
            .iter()
            .filter(|label| Some(label.as_str()) != shared)
            .collect();
        if others.is_empty() {
            return shared.map(str::to_string);
        }
        Some(others[rng.index(others.len())].clone())
    }
}

/// Shared completion across all innocent checklists
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

impl ProgressReport {
    /// Every innocent task is done
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Give every player a fresh checklist. Roles must already be assigned.
pub fn assign_tasks(
    room: &mut Room,
    catalog: &TaskCatalog,
    short: usize,
    long: usize,
    rng: &mut dyn RandomSource,
) {
    let shared = if catalog.common.is_empty() {
        None
    } else {
        Some(catalog.common[rng.index(catalog.common.len())].clone())
    };

    for player in &mut room.players {
        let common = match player.role {
            Role::Innocent => shared.clone(),
            Role::Adversary => catalog.decoy_common(shared.as_deref(), rng),
        };

        let checklist: Checklist = catalog
            .draw(TaskCategory::Short, short, rng)
            .into_iter()
            .chain(catalog.draw(TaskCategory::Long, long, rng))
            .chain(common)
            .map(|label| (label, false))
            .collect();

        player.tasks = Some(checklist);
    }
}

/// Aggregate progress over innocent players' checklists
pub fn progress(room: &Room) -> ProgressReport {
    let (completed, total) = room
        .players
        .iter()
        .filter(|p| !p.is_adversary())
        .map(|p| p.task_counts())
        .fold((0, 0), |(done, all), (d, a)| (done + d, all + a));

    let percent = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    };

    ProgressReport {
        completed,
        total,
        percent,
    }
}

/// Tick a task off the player's checklist and report shared progress
pub fn complete_task(room: &mut Room, connection_id: Uuid, label: &str) -> Result<ProgressReport> {
    let player = room
        .player_mut(connection_id)
        .ok_or_else(|| Error::PlayerNotFound(connection_id.to_string()))?;

    let done = player
        .tasks
        .as_mut()
        .and_then(|tasks| tasks.get_mut(label))
        .ok_or_else(|| Error::InvalidTransition(format!("No task named {:?}", label)))?;
    *done = true;

    Ok(progress(room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Player;
    use crate::random::testing::ScriptedSource;
    use crate::random::RngSource;

    fn make_room(size: usize) -> Room {
        let mut players = (0..size).map(|i| {
            Player::new(Uuid::new_v4(), format!("p{}", i), "rgb(0, 0, 0)".into())
        });
        let mut room = Room::new("ABCDEFGH".into(), players.next().unwrap(), 1);
        room.players.extend(players);
        room
    }

    fn checklist(labels: &[&str]) -> Checklist {
        labels.iter().map(|l| (l.to_string(), false)).collect()
    }

    #[test]
    fn test_assign_counts_and_shared_common() {
        let mut room = make_room(4);
        room.players[2].role = Role::Adversary;
        let catalog = TaskCatalog::default();
        let mut rng = RngSource::seeded(3);

        assign_tasks(&mut room, &catalog, 2, 1, &mut rng);

        let common_of = |p: &Player| -> String {
            p.tasks
                .as_ref()
                .unwrap()
                .keys()
                .find(|k| catalog.common.contains(k))
                .cloned()
                .unwrap()
        };
        for player in &room.players {
            let tasks = player.tasks.as_ref().unwrap();
            assert_eq!(tasks.len(), 4);
            assert!(tasks.values().all(|done| !done));
            let shorts = tasks.keys().filter(|k| catalog.short.contains(k)).count();
            let longs = tasks.keys().filter(|k| catalog.long.contains(k)).count();
            assert_eq!((shorts, longs), (2, 1));
        }
        let innocent_common = common_of(&room.players[0]);
        assert_eq!(common_of(&room.players[1]), innocent_common);
        assert_eq!(common_of(&room.players[3]), innocent_common);
        assert_ne!(common_of(&room.players[2]), innocent_common);
    }

    #[test]
    fn test_draw_clamps_to_catalog() {
        let catalog = TaskCatalog::default();
        let mut rng = ScriptedSource::default();
        assert_eq!(catalog.draw(TaskCategory::Long, 50, &mut rng).len(), 5);
        assert!(catalog.draw(TaskCategory::Short, 0, &mut rng).is_empty());
    }

    #[test]
    fn test_single_common_is_shared_by_adversary() {
        let catalog = TaskCatalog {
            short: Vec::new(),
            long: Vec::new(),
            common: vec!["only".into()],
        };
        let mut room = make_room(2);
        room.players[1].role = Role::Adversary;

        assign_tasks(&mut room, &catalog, 2, 1, &mut ScriptedSource::default());

        for player in &room.players {
            assert_eq!(player.tasks.as_ref().unwrap(), &checklist(&["only"]));
        }
    }

    #[test]
    fn test_full_innocent_completion_is_victory() {
        let mut room = make_room(4);
        for player in &mut room.players[..3] {
            player.tasks = Some(checklist(&["a", "b", "c"]));
        }
        room.players[3].role = Role::Adversary;
        room.players[3].tasks = Some(checklist(&["a", "x", "y"]));
        let innocents: Vec<Uuid> = room.players[..3].iter().map(|p| p.connection_id).collect();

        let mut last = None;
        for id in &innocents {
            for label in ["a", "b", "c"] {
                last = Some(complete_task(&mut room, *id, label).unwrap());
            }
        }

        let report = last.unwrap();
        assert_eq!(report.percent, 100.0);
        assert!(report.is_complete());
        assert_eq!((report.completed, report.total), (9, 9));
    }

    #[test]
    fn test_partial_progress() {
        let mut room = make_room(2);
        room.players[0].tasks = Some(checklist(&["a", "b"]));
        room.players[1].tasks = Some(checklist(&["c", "d"]));
        let id = room.players[0].connection_id;

        let report = complete_task(&mut room, id, "a").unwrap();

        assert_eq!(report.percent, 25.0);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let mut room = make_room(1);
        room.players[0].tasks = Some(checklist(&["a"]));
        let id = room.players[0].connection_id;

        assert!(matches!(
            complete_task(&mut room, id, "zzz"),
            Err(Error::InvalidTransition(_))
        ));
        assert_eq!(room.players[0].task_counts(), (0, 1));
    }

    #[test]
    fn test_no_tasks_reports_zero() {
        let room = make_room(2);
        let report = progress(&room);
        assert_eq!(report.percent, 0.0);
        assert!(!report.is_complete());
    }
}
