//! Room store - owns every room and drives the session state machine
//!
//! All operations are synchronous and take `&mut self`; callers that share
//! the store between tasks wrap it in a single lock so each operation is
//! atomic with respect to the others, including the vote expiry path.
//!
//! Operations that return a [`Room`] hand back a snapshot taken after the
//! mutation, ready to broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::election::{self, ElectionResult};
use crate::error::{Error, Result};
use crate::invariants::assert_room_invariants;
use crate::models::{ChatMessage, Meeting, MeetingKind, Player, Role, Room, RoomState};
use crate::random::{random_colour, RandomSource, RngSource};
use crate::registry::IdentityRegistry;
use crate::rules::{GameRules, JOIN_CODE_LEN};
use crate::tasks::{self, ProgressReport};
use crate::timer::ExpiryHandle;
use crate::victory;

/// Attempts at drawing a join code that no live room uses
const MAX_CODE_ATTEMPTS: usize = 32;

/// A meeting was opened
#[derive(Debug, Clone)]
pub struct MeetingCalled {
    pub room: Room,
    pub meeting: Meeting,
    /// Round of the new vote, needed to schedule its expiry
    pub round: u64,
}

/// A vote finished and the room moved on
#[derive(Debug, Clone)]
pub struct VoteConclusion {
    pub result: ElectionResult,
    pub winner: Option<Role>,
    pub room: Room,
}

/// A player was killed
#[derive(Debug, Clone)]
pub struct Elimination {
    pub victim: Player,
    pub winner: Option<Role>,
    pub room: Room,
    /// Set when the death left every living player with a ballot in
    pub conclusion: Option<VoteConclusion>,
}

/// A player left for good
#[derive(Debug, Clone)]
pub struct Departure {
    pub player: Player,
    /// `None` when the room was deleted
    pub room: Option<Room>,
    /// Set when the departure left every living player with a ballot in
    pub conclusion: Option<VoteConclusion>,
}

/// A task was completed
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub room_id: Uuid,
    pub report: ProgressReport,
    pub winner: Option<Role>,
}

/// What a dropped connection did to its room
#[derive(Debug, Clone)]
pub enum Disconnection {
    /// The seat is kept and flagged until the player rejoins
    Pending(Room),
    /// Nobody connected was left, so the room is gone
    RoomDeleted(Uuid),
}

pub struct RoomStore {
    pub(crate) rooms: HashMap<Uuid, Room>,
    pub(crate) registry: IdentityRegistry,
    rules: GameRules,
    rng: Box<dyn RandomSource>,
    next_round: u64,
}

impl std::fmt::Debug for RoomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStore")
            .field("rooms", &self.rooms.len())
            .field("registry", &self.registry)
            .field("rules", &self.rules)
            .field("next_round", &self.next_round)
            .finish()
    }
}

impl RoomStore {
    pub fn new(rules: GameRules, rng: Box<dyn RandomSource>) -> Self {
        Self {
            rooms: HashMap::new(),
            registry: IdentityRegistry::new(),
            rules,
            rng,
            next_round: 1,
        }
    }

    /// Store with the given rules and an OS-seeded generator
    pub fn with_rules(rules: GameRules) -> Self {
        Self::new(rules, Box::new(RngSource::from_entropy()))
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn room(&self, room_id: Uuid) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Room the connection is seated in
    pub fn room_of(&self, connection_id: Uuid) -> Option<&Room> {
        self.registry
            .lookup(connection_id)
            .and_then(|id| self.rooms.get(&id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connections currently bound to a room
    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    /// Build a player for a connection: fresh persistent id, random colour,
    /// name trimmed and capped to the configured length
    pub fn new_player(&mut self, connection_id: Uuid, name: &str) -> Player {
        let name: String = name.trim().chars().take(self.rules.max_name_len).collect();
        let colour = random_colour(self.rng.as_mut());
        Player::new(connection_id, name, colour)
    }

    /// Open a new room in the lobby with `owner` as its only member
    pub fn create_room(&mut self, owner: Player, adversaries: Option<i64>) -> Result<Room> {
        self.ensure_unseated(owner.connection_id)?;

        let adversary_count = match adversaries {
            Some(n) if n >= 1 => n as usize,
            _ => 1,
        };
        let join_code = self.fresh_join_code();
        let room = Room::new(join_code, owner, adversary_count);
        let room_id = room.id;

        self.registry.bind(room_id, room.owner_connection_id);
        info!(room_id = %room_id, code = %room.join_code, "Room created");
        let created = snapshot(&room);
        self.rooms.insert(room_id, room);
        Ok(created)
    }

    /// Join a lobby by its public code (case-insensitive)
    pub fn join_room(&mut self, join_code: &str, player: Player) -> Result<Room> {
        let code = join_code.trim().to_ascii_uppercase();
        let room = self
            .rooms
            .values_mut()
            .find(|r| r.join_code == code && r.state == RoomState::Lobby)
            .ok_or_else(|| Error::RoomNotFound(code.clone()))?;

        if room.contains(player.connection_id) || self.registry.lookup(player.connection_id).is_some() {
            return Err(Error::InvalidTransition(format!(
                "{} is already seated",
                player.connection_id
            )));
        }

        let room_id = room.id;
        self.registry.bind(room_id, player.connection_id);
        info!(room_id = %room_id, connection_id = %player.connection_id, "Player joined");
        room.players.push(player);
        Ok(snapshot(room))
    }

    /// Remove a player for good. The room is absent from the result when
    /// leaving deleted it.
    pub fn leave_room(&mut self, connection_id: Uuid) -> Result<Departure> {
        let room_id = self.seat(connection_id)?;
        self.registry.unbind(connection_id);

        let room = self.room_mut(room_id)?;
        let index = room
            .players
            .iter()
            .position(|p| p.connection_id == connection_id)
            .ok_or_else(|| Error::PlayerNotFound(connection_id.to_string()))?;
        let player = room.players.remove(index);
        if let Some(election) = room.active_election.as_mut() {
            election.withdraw(connection_id);
        }

        if room.players.is_empty() || room.all_pending() {
            self.delete_room(room_id);
            return Ok(Departure {
                player,
                room: None,
                conclusion: None,
            });
        }

        // Lowest roster index inherits the room
        if room.is_owner(connection_id) {
            room.owner_connection_id = room.players[0].connection_id;
            info!(room_id = %room_id, owner = %room.owner_connection_id, "Ownership transferred");
        }

        let conclusion = self.settle_if_complete(room_id)?;
        let room = self.room_mut(room_id)?;
        Ok(Departure {
            player,
            room: Some(snapshot(room)),
            conclusion,
        })
    }

    /// Soft-remove a player whose connection dropped. The room is deleted
    /// instead when no other player is still connected.
    pub fn disconnect(&mut self, connection_id: Uuid) -> Result<Disconnection> {
        let room_id = self.seat(connection_id)?;
        let room = self.room_mut(room_id)?;

        let others_connected = room
            .players
            .iter()
            .any(|p| p.connection_id != connection_id && !p.disconnected_pending);
        if !others_connected {
            self.delete_room(room_id);
            return Ok(Disconnection::RoomDeleted(room_id));
        }

        if let Some(player) = room.player_mut(connection_id) {
            player.disconnected_pending = true;
        }
        debug!(room_id = %room_id, connection_id = %connection_id, "Player pending reconnect");
        Ok(Disconnection::Pending(snapshot(room)))
    }

    /// Remove a room and every registry entry pointing at it
    pub fn delete_room(&mut self, room_id: Uuid) -> Option<Room> {
        let mut room = self.rooms.remove(&room_id)?;
        if let Some(election) = room.active_election.as_mut() {
            election.cancel_expiry();
        }
        self.registry.purge(room_id);
        info!(room_id = %room_id, code = %room.join_code, "Room deleted");
        Some(room)
    }

    /// Owner starts the game: roles drawn, checklists handed out
    pub fn ready_room(&mut self, connection_id: Uuid) -> Result<Room> {
        let room_id = self
            .registry
            .lookup(connection_id)
            .ok_or_else(|| Error::RoomNotFound(connection_id.to_string()))?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;

        if !room.is_owner(connection_id) {
            return Err(Error::InvalidTransition("Only the owner can start".into()));
        }
        if room.state != RoomState::Lobby {
            return Err(Error::InvalidTransition(format!(
                "Cannot start a room in {:?}",
                room.state
            )));
        }

        assign_roles(room, self.rng.as_mut());
        tasks::assign_tasks(
            room,
            &self.rules.catalog,
            self.rules.short_tasks,
            self.rules.long_tasks,
            self.rng.as_mut(),
        );
        room.state = RoomState::Tasks;

        info!(room_id = %room_id, players = room.players.len(), "Game started");
        Ok(snapshot(room))
    }

    /// Open a meeting and its vote. `accused` marks a reported body.
    pub fn call_meeting(&mut self, connection_id: Uuid, accused: Option<Uuid>) -> Result<MeetingCalled> {
        let room_id = self.seat(connection_id)?;
        let round = self.next_round;
        let countdown_ms = self.rules.vote_timeout_ms;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;

        if room.state != RoomState::Tasks {
            return Err(Error::InvalidTransition(format!(
                "Cannot call a meeting in {:?}",
                room.state
            )));
        }

        election::create_vote(room, round);
        room.state = RoomState::Meeting;
        self.next_round += 1;

        let meeting = Meeting {
            kind: if accused.is_some() {
                MeetingKind::Murder
            } else {
                MeetingKind::Emergency
            },
            caller: connection_id,
            victim: accused,
            countdown_ms,
        };
        info!(room_id = %room_id, round, kind = ?meeting.kind, "Meeting called");

        Ok(MeetingCalled {
            room: snapshot(room),
            meeting,
            round,
        })
    }

    /// Attach the scheduled expiry to a vote. Returns false (and cancels
    /// the handle) when that round is no longer active.
    pub fn attach_expiry(&mut self, room_id: Uuid, round: u64, handle: Arc<dyn ExpiryHandle>) -> bool {
        let election = self
            .rooms
            .get_mut(&room_id)
            .and_then(|r| r.active_election.as_mut())
            .filter(|e| e.round == round);

        match election {
            Some(election) => {
                election.expiry = Some(handle);
                true
            }
            None => {
                handle.cancel();
                false
            }
        }
    }

    /// Cast a ballot; returns the conclusion when it was the last one
    pub fn cast_vote(&mut self, connection_id: Uuid, target: Option<Uuid>) -> Result<Option<VoteConclusion>> {
        let room_id = self.seat(connection_id)?;
        let room = self.room_mut(room_id)?;

        match election::cast_vote(room, connection_id, target)? {
            Some(result) => self.settle_vote(room_id, result).map(Some),
            None => {
                assert_room_invariants(room);
                Ok(None)
            }
        }
    }

    /// Conclude the vote now, with whatever has been cast
    pub fn conclude_vote(&mut self, room_id: Uuid) -> Result<VoteConclusion> {
        let room = self.room_mut(room_id)?;
        let result = election::conclude_vote(room)?;
        self.settle_vote(room_id, result)
    }

    /// Timer path. A no-op (`InvalidTransition`) when `round` already ended.
    pub fn expire_vote(&mut self, room_id: Uuid, round: u64) -> Result<VoteConclusion> {
        let room = self.room_mut(room_id)?;
        let result = election::expire_vote(room, round)?;
        info!(room_id = %room_id, round, "Vote expired");
        self.settle_vote(room_id, result)
    }

    pub fn complete_task(&mut self, connection_id: Uuid, label: &str) -> Result<TaskUpdate> {
        let room_id = self.seat(connection_id)?;
        let room = self.room_mut(room_id)?;
        if room.state == RoomState::Lobby {
            return Err(Error::InvalidTransition("No game in progress".into()));
        }

        let report = tasks::complete_task(room, connection_id, label)?;
        let winner = if report.is_complete() {
            info!(room_id = %room_id, "All tasks complete");
            finish_game(room);
            Some(Role::Innocent)
        } else {
            None
        };
        assert_room_invariants(room);

        Ok(TaskUpdate {
            room_id,
            report,
            winner,
        })
    }

    /// The caller reports their own death
    pub fn self_eliminate(&mut self, connection_id: Uuid) -> Result<Elimination> {
        self.eliminate(connection_id, connection_id)
    }

    /// Kill another player in the caller's room
    pub fn eliminate_target(&mut self, connection_id: Uuid, target: Uuid) -> Result<Elimination> {
        self.eliminate(connection_id, target)
    }

    fn eliminate(&mut self, connection_id: Uuid, target: Uuid) -> Result<Elimination> {
        let room_id = self.seat(connection_id)?;
        let policy = self.rules.stalemate;
        let room = self.room_mut(room_id)?;
        if room.state == RoomState::Lobby {
            return Err(Error::InvalidTransition("No game in progress".into()));
        }

        let victim = room
            .player_mut(target)
            .ok_or_else(|| Error::PlayerNotFound(target.to_string()))?;
        victim.alive = false;
        let victim = victim.clone();
        info!(room_id = %room_id, victim = %target, "Player eliminated");

        let winner = victory::evaluate(room, policy);
        let conclusion = if winner.is_some() {
            finish_game(room);
            None
        } else if room.state == RoomState::Meeting {
            self.settle_if_complete(room_id)?
        } else {
            None
        };

        let room = self.room_mut(room_id)?;
        Ok(Elimination {
            victim,
            winner,
            room: snapshot(room),
            conclusion,
        })
    }

    pub fn chat(&self, connection_id: Uuid, text: String) -> Result<(Uuid, ChatMessage)> {
        let room = self
            .room_of(connection_id)
            .ok_or_else(|| Error::PlayerNotFound(connection_id.to_string()))?;
        let player = room
            .player(connection_id)
            .ok_or_else(|| Error::PlayerNotFound(connection_id.to_string()))?;
        Ok((room.id, ChatMessage::from_player(player, text)))
    }

    /// Room id of the connection's seat
    fn seat(&self, connection_id: Uuid) -> Result<Uuid> {
        self.room_of(connection_id)
            .filter(|room| room.contains(connection_id))
            .map(|room| room.id)
            .ok_or_else(|| Error::PlayerNotFound(connection_id.to_string()))
    }

    fn ensure_unseated(&self, connection_id: Uuid) -> Result<()> {
        match self.registry.lookup(connection_id) {
            Some(room_id) => Err(Error::InvalidTransition(format!(
                "{} is already in room {}",
                connection_id, room_id
            ))),
            None => Ok(()),
        }
    }

    fn room_mut(&mut self, room_id: Uuid) -> Result<&mut Room> {
        self.rooms
            .get_mut(&room_id)
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))
    }

    fn fresh_join_code(&mut self) -> String {
        let mut code = self.rng.code(JOIN_CODE_LEN);
        for _ in 1..MAX_CODE_ATTEMPTS {
            if !self.rooms.values().any(|r| r.join_code == code) {
                break;
            }
            code = self.rng.code(JOIN_CODE_LEN);
        }
        code
    }

    /// Settle the active vote if the remaining alive players have all voted
    fn settle_if_complete(&mut self, room_id: Uuid) -> Result<Option<VoteConclusion>> {
        let room = self.room_mut(room_id)?;
        match election::conclude_if_complete(room)? {
            Some(result) => self.settle_vote(room_id, result).map(Some),
            None => Ok(None),
        }
    }

    fn settle_vote(&mut self, room_id: Uuid, result: ElectionResult) -> Result<VoteConclusion> {
        let policy = self.rules.stalemate;
        let room = self.room_mut(room_id)?;

        info!(
            room_id = %room_id,
            round = result.election.round,
            ejected = ?result.ejected.as_ref().map(|p| p.connection_id),
            "Vote concluded"
        );

        let winner = victory::evaluate(room, policy);
        match winner {
            Some(_) => finish_game(room),
            None => room.state = RoomState::Tasks,
        }

        Ok(VoteConclusion {
            result,
            winner,
            room: snapshot(room),
        })
    }
}

/// Post-mutation copy for broadcasting
fn snapshot(room: &Room) -> Room {
    assert_room_invariants(room);
    room.clone()
}

/// Draw the adversaries. A single adversary is one uniform index; more are
/// sampled without replacement. Everyone is revived.
fn assign_roles(room: &mut Room, rng: &mut dyn RandomSource) {
    let n = room.players.len();
    let count = room.adversary_count.min(n);
    let picked = if count == 1 {
        vec![rng.index(n)]
    } else {
        rng.sample(n, count)
    };

    for (index, player) in room.players.iter_mut().enumerate() {
        player.role = if picked.contains(&index) {
            Role::Adversary
        } else {
            Role::Innocent
        };
        player.alive = true;
    }
}

/// Back to the lobby; any open vote is cancelled
fn finish_game(room: &mut Room) {
    if let Some(mut election) = room.active_election.take() {
        election.cancel_expiry();
    }
    room.state = RoomState::Lobby;
    info!(room_id = %room.id, "Game over");
}
