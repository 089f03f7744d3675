//! Reconnection - rebinding a persistent identity to a new connection

use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::assert_room_invariants;
use crate::models::{Player, Room};
use crate::store::RoomStore;

impl RoomStore {
    /// Seat `new_connection_id` in place of the player holding
    /// `persistent_id`. Role, alive status, tasks and roster position are
    /// untouched; ownership and any open ballot follow the player.
    pub fn restore(
        &mut self,
        persistent_id: Uuid,
        room_id: Uuid,
        new_connection_id: Uuid,
    ) -> Result<(Player, Room)> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;
        let player = room
            .players
            .iter_mut()
            .find(|p| p.persistent_id == persistent_id)
            .ok_or_else(|| Error::PlayerNotFound(persistent_id.to_string()))?;

        let stale = player.connection_id;
        if stale != new_connection_id {
            if let Some(bound) = self.registry.lookup(new_connection_id) {
                return Err(Error::InvalidTransition(format!(
                    "{} is already seated in room {}",
                    new_connection_id, bound
                )));
            }

            self.registry.unbind(stale);
            player.connection_id = new_connection_id;
            player.disconnected_pending = false;

            if room.owner_connection_id == stale {
                room.owner_connection_id = new_connection_id;
            }
            if let Some(election) = room.active_election.as_mut() {
                election.rekey(stale, new_connection_id);
            }
        } else {
            player.disconnected_pending = false;
        }
        self.registry.bind(room_id, new_connection_id);

        info!(
            room_id = %room_id,
            from = %stale,
            to = %new_connection_id,
            "Player restored"
        );

        assert_room_invariants(room);
        let player = room
            .player(new_connection_id)
            .cloned()
            .ok_or_else(|| Error::PlayerNotFound(new_connection_id.to_string()))?;
        Ok((player, room.clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::election::Candidate;
    use crate::error::Error;
    use crate::models::RoomState;
    use crate::random::testing::ScriptedSource;
    use crate::rules::GameRules;
    use crate::store::{Disconnection, RoomStore};
    use uuid::Uuid;

    fn two_player_store() -> (RoomStore, Uuid, Uuid, Uuid) {
        let mut store = RoomStore::new(GameRules::default(), Box::new(ScriptedSource::default()));
        let owner_conn = Uuid::new_v4();
        let guest_conn = Uuid::new_v4();
        let owner = store.new_player(owner_conn, "owner");
        let room = store.create_room(owner, None).unwrap();
        let guest = store.new_player(guest_conn, "guest");
        store.join_room(&room.join_code, guest).unwrap();
        (store, room.id, owner_conn, guest_conn)
    }

    fn persistent_of(store: &RoomStore, room_id: Uuid, conn: Uuid) -> Uuid {
        store.room(room_id).unwrap().player(conn).unwrap().persistent_id
    }

    #[test]
    fn test_restore_after_disconnect() {
        let (mut store, room_id, owner, guest) = two_player_store();
        let persistent = persistent_of(&store, room_id, guest);
        assert!(matches!(
            store.disconnect(guest).unwrap(),
            Disconnection::Pending(_)
        ));

        let fresh = Uuid::new_v4();
        let (player, room) = store.restore(persistent, room_id, fresh).unwrap();

        assert_eq!(player.connection_id, fresh);
        assert!(!player.disconnected_pending);
        assert_eq!(room.players[1].connection_id, fresh);
        assert_eq!(room.owner_connection_id, owner);
        assert_eq!(store.registry().lookup(guest), None);
        assert_eq!(store.registry().lookup(fresh), Some(room_id));
    }

    #[test]
    fn test_restore_twice_leaves_one_binding() {
        let (mut store, room_id, _, guest) = two_player_store();
        let persistent = persistent_of(&store, room_id, guest);

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.restore(persistent, room_id, first).unwrap();
        store.restore(persistent, room_id, second).unwrap();

        assert_eq!(store.registry().lookup(first), None);
        assert_eq!(store.registry().lookup(second), Some(room_id));
        assert_eq!(store.player_count(), 2);
    }

    #[test]
    fn test_restore_same_connection_is_idempotent() {
        let (mut store, room_id, _, guest) = two_player_store();
        let persistent = persistent_of(&store, room_id, guest);

        store.restore(persistent, room_id, guest).unwrap();

        assert_eq!(store.registry().lookup(guest), Some(room_id));
        assert_eq!(store.player_count(), 2);
    }

    #[test]
    fn test_restore_owner_keeps_ownership() {
        let (mut store, room_id, owner, _) = two_player_store();
        let persistent = persistent_of(&store, room_id, owner);

        let fresh = Uuid::new_v4();
        let (_, room) = store.restore(persistent, room_id, fresh).unwrap();

        assert_eq!(room.owner_connection_id, fresh);
        assert!(store.ready_room(fresh).is_ok());
    }

    #[test]
    fn test_restore_preserves_game_state_and_ballot() {
        let (mut store, room_id, owner, guest) = two_player_store();
        let third = Uuid::new_v4();
        let code = store.room(room_id).unwrap().join_code.clone();
        let p = store.new_player(third, "third");
        store.join_room(&code, p).unwrap();
        store.ready_room(owner).unwrap();
        store.call_meeting(owner, None).unwrap();
        store.cast_vote(guest, Some(owner)).unwrap();
        let before = store.room(room_id).unwrap().player(guest).unwrap().clone();

        let fresh = Uuid::new_v4();
        let (player, room) = store.restore(before.persistent_id, room_id, fresh).unwrap();

        assert_eq!(player.role, before.role);
        assert_eq!(player.alive, before.alive);
        assert_eq!(player.tasks, before.tasks);
        assert_eq!(room.state, RoomState::Meeting);
        let election = room.active_election.as_ref().unwrap();
        assert!(election.is_candidate(Candidate::Player(fresh)));
        assert!(election.has_voted(fresh));
        assert!(!election.is_candidate(Candidate::Player(guest)));
        // The restored player cannot vote a second time
        assert!(matches!(
            store.cast_vote(fresh, None),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_restore_unknown_room_or_player() {
        let (mut store, room_id, _, _) = two_player_store();
        assert!(matches!(
            store.restore(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()),
            Err(Error::RoomNotFound(_))
        ));
        assert!(matches!(
            store.restore(Uuid::new_v4(), room_id, Uuid::new_v4()),
            Err(Error::PlayerNotFound(_))
        ));
    }

    #[test]
    fn test_restore_onto_seated_connection_rejected() {
        let (mut store, room_id, owner, guest) = two_player_store();
        let persistent = persistent_of(&store, room_id, guest);

        assert!(matches!(
            store.restore(persistent, room_id, owner),
            Err(Error::InvalidTransition(_))
        ));
        assert_eq!(store.registry().lookup(guest), Some(room_id));
    }
}
