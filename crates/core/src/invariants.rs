//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::election::Election;
use crate::models::{Room, RoomState};

/// Validate that a Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    // Empty rooms are deleted, never kept around ownerless
    debug_assert!(
        !room.players.is_empty(),
        "Room {} has an empty roster",
        room.id
    );

    debug_assert!(
        room.contains(room.owner_connection_id),
        "Room {} owner {} is not in the roster",
        room.id,
        room.owner_connection_id
    );

    debug_assert!(
        room.adversary_count >= 1,
        "Room {} has adversary_count {}",
        room.id,
        room.adversary_count
    );

    // A seat is identified by its connection id
    for (i, player) in room.players.iter().enumerate() {
        debug_assert!(
            !room.players[i + 1..]
                .iter()
                .any(|other| other.connection_id == player.connection_id),
            "Room {} seats connection {} twice",
            room.id,
            player.connection_id
        );
    }

    match &room.active_election {
        Some(election) => {
            debug_assert!(
                room.state == RoomState::Meeting,
                "Room {} has a vote while in {:?}",
                room.id,
                room.state
            );
            assert_election_invariants(election);
        }
        None => debug_assert!(
            room.state != RoomState::Meeting,
            "Room {} is in a meeting without a vote",
            room.id
        ),
    }
}

/// Validate ballot bookkeeping: every recorded voter sits in exactly one
/// candidate's list
pub fn assert_election_invariants(election: &Election) {
    let ballots: usize = election.candidates.iter().map(|t| t.voters.len()).sum();
    debug_assert_eq!(
        ballots,
        election.voters_cast.len(),
        "Round {} has {} ballots for {} voters",
        election.round,
        ballots,
        election.voters_cast.len()
    );

    for voter in &election.voters_cast {
        let seen = election
            .candidates
            .iter()
            .filter(|t| t.voters.contains(voter))
            .count();
        debug_assert!(
            seen == 1,
            "Round {} counts voter {} {} times",
            election.round,
            voter,
            seen
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::create_vote;
    use crate::models::Player;
    use uuid::Uuid;

    fn make_room() -> Room {
        let owner = Player::new(Uuid::new_v4(), "owner".into(), "rgb(0, 0, 0)".into());
        Room::new("ABCDEFGH".into(), owner, 1)
    }

    #[test]
    fn test_valid_room() {
        assert_room_invariants(&make_room());
    }

    #[test]
    fn test_room_in_meeting() {
        let mut room = make_room();
        room.state = RoomState::Meeting;
        create_vote(&mut room, 1);
        assert_room_invariants(&room);
    }

    #[test]
    #[should_panic(expected = "not in the roster")]
    fn test_foreign_owner() {
        let mut room = make_room();
        room.owner_connection_id = Uuid::new_v4();
        assert_room_invariants(&room);
    }

    #[test]
    #[should_panic(expected = "has a vote while in")]
    fn test_vote_outside_meeting() {
        let mut room = make_room();
        create_vote(&mut room, 1);
        assert_room_invariants(&room);
    }
}
