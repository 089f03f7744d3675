//! Victory evaluator

use tracing::info;

use crate::models::{Role, Room};
use crate::rules::StalematePolicy;

/// Alive (adversaries, innocents)
pub fn alive_counts(room: &Room) -> (usize, usize) {
    room.players
        .iter()
        .filter(|p| p.alive)
        .fold((0, 0), |(ka, ki), p| match p.role {
            Role::Adversary => (ka + 1, ki),
            Role::Innocent => (ka, ki + 1),
        })
}

/// Decide whether a faction has won. Innocents win once no adversary is
/// alive; adversaries win once they are no longer outnumbered. Otherwise
/// the stalemate policy is applied and `None` returned.
pub fn evaluate(room: &mut Room, policy: StalematePolicy) -> Option<Role> {
    let (adversaries, innocents) = alive_counts(room);

    if adversaries == 0 {
        info!(room_id = %room.id, "Innocents win");
        return Some(Role::Innocent);
    }
    if adversaries >= innocents {
        info!(room_id = %room.id, "Adversaries win");
        return Some(Role::Adversary);
    }

    info!(room_id = %room.id, adversaries, innocents, "No winner");
    if policy == StalematePolicy::ResetRoles {
        reset_players(room);
    }
    None
}

// Does not touch room.state
fn reset_players(room: &mut Room) {
    for player in &mut room.players {
        player.alive = true;
        player.role = Role::Innocent;
        player.tasks = None;
    }
}
