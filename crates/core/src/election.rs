//! Election engine - the timed ballot held during a meeting
//!
//! A vote is created when a meeting is called and detached from the room
//! the moment it concludes, either because every alive player has cast a
//! ballot or because the expiry timer fired.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Player, Room};
use crate::timer::ExpiryHandle;

/// Default time a meeting stays open before the vote is forced
pub const DEFAULT_VOTE_TIMEOUT_MS: u64 = 180_000;

const ABSTAIN: &str = "abstain";

/// An option on the ballot. Serialized as `"abstain"` or the player's
/// connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Candidate {
    Abstain,
    Player(Uuid),
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Abstain => f.write_str(ABSTAIN),
            Candidate::Player(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Candidate {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == ABSTAIN {
            Ok(Candidate::Abstain)
        } else {
            Uuid::parse_str(s).map(Candidate::Player)
        }
    }
}

impl From<Candidate> for String {
    fn from(candidate: Candidate) -> Self {
        candidate.to_string()
    }
}

impl TryFrom<String> for Candidate {
    type Error = uuid::Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Ballots received by one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub candidate: Candidate,
    pub voters: Vec<Uuid>,
}

/// An active vote. Candidates are kept in ballot order: abstain first,
/// then alive players in roster order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Store-wide sequence number, lets stale timers recognise themselves
    pub round: u64,
    pub candidates: Vec<Tally>,
    pub voters_cast: Vec<Uuid>,
    #[serde(skip)]
    pub expiry: Option<Arc<dyn ExpiryHandle>>,
}

impl Election {
    /// Fresh ballot over the currently alive players
    pub fn new(round: u64, players: &[Player]) -> Self {
        let candidates = std::iter::once(Candidate::Abstain)
            .chain(
                players
                    .iter()
                    .filter(|p| p.alive)
                    .map(|p| Candidate::Player(p.connection_id)),
            )
            .map(|candidate| Tally {
                candidate,
                voters: Vec::new(),
            })
            .collect();

        Self {
            round,
            candidates,
            voters_cast: Vec::new(),
            expiry: None,
        }
    }

    pub fn is_candidate(&self, candidate: Candidate) -> bool {
        self.candidates.iter().any(|t| t.candidate == candidate)
    }

    pub fn has_voted(&self, connection_id: Uuid) -> bool {
        self.voters_cast.contains(&connection_id)
    }

    /// Ballots cast by players who are still alive
    pub fn live_ballots(&self, players: &[Player]) -> usize {
        self.voters_cast
            .iter()
            .filter(|id| players.iter().any(|p| p.connection_id == **id && p.alive))
            .count()
    }

    pub fn votes_for(&self, candidate: Candidate) -> usize {
        self.candidates
            .iter()
            .find(|t| t.candidate == candidate)
            .map_or(0, |t| t.voters.len())
    }

    /// Record a ballot. The voter must be alive (a candidate) and must not
    /// have voted this round. Unknown or missing targets count as abstain.
    pub fn record(&mut self, voter: Uuid, target: Option<Uuid>) -> Result<Candidate> {
        if !self.is_candidate(Candidate::Player(voter)) {
            return Err(Error::InvalidTransition(format!(
                "{} is not eligible to vote",
                voter
            )));
        }
        if self.has_voted(voter) {
            return Err(Error::InvalidTransition(format!(
                "{} has already voted",
                voter
            )));
        }

        let choice = target
            .map(Candidate::Player)
            .filter(|c| self.is_candidate(*c))
            .unwrap_or(Candidate::Abstain);

        self.voters_cast.push(voter);
        if let Some(tally) = self.candidates.iter_mut().find(|t| t.candidate == choice) {
            tally.voters.push(voter);
        }

        Ok(choice)
    }

    /// Current leader under the tie rule: a strictly larger count takes the
    /// lead, an equal count hands it back to abstain without lowering the
    /// bar.
    pub fn leader(&self) -> Candidate {
        let mut highest = 0;
        let mut leader = Candidate::Abstain;
        for tally in &self.candidates {
            let count = tally.voters.len();
            if count > highest {
                highest = count;
                leader = tally.candidate;
            } else if count == highest {
                leader = Candidate::Abstain;
            }
        }
        leader
    }

    /// Remove a voter's ballot, if any
    pub fn withdraw(&mut self, voter: Uuid) -> bool {
        let before = self.voters_cast.len();
        self.voters_cast.retain(|id| *id != voter);
        for tally in &mut self.candidates {
            tally.voters.retain(|id| *id != voter);
        }
        self.voters_cast.len() != before
    }

    /// Follow a player to a new connection id
    pub fn rekey(&mut self, old: Uuid, new: Uuid) {
        for tally in &mut self.candidates {
            if tally.candidate == Candidate::Player(old) {
                tally.candidate = Candidate::Player(new);
            }
            for voter in &mut tally.voters {
                if *voter == old {
                    *voter = new;
                }
            }
        }
        for voter in &mut self.voters_cast {
            if *voter == old {
                *voter = new;
            }
        }
    }

    /// Cancel the pending timer, if one is attached
    pub fn cancel_expiry(&mut self) {
        if let Some(handle) = self.expiry.take() {
            handle.cancel();
        }
    }

    /// Copy of the ballot without the timer handle
    pub fn snapshot(&self) -> Election {
        Election {
            expiry: None,
            ..self.clone()
        }
    }
}

/// Outcome of a concluded vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionResult {
    pub room_id: Uuid,
    pub election: Election,
    pub ejected: Option<Player>,
}

/// Open a new ballot on the room, replacing any previous one
pub fn create_vote(room: &mut Room, round: u64) -> &Election {
    if let Some(mut previous) = room.active_election.take() {
        previous.cancel_expiry();
    }
    room.active_election.insert(Election::new(round, &room.players))
}

/// Cast a ballot. Returns the result when this ballot completes the round.
pub fn cast_vote(
    room: &mut Room,
    voter: Uuid,
    target: Option<Uuid>,
) -> Result<Option<ElectionResult>> {
    if !room.player(voter).is_some_and(|p| p.alive) {
        return Err(Error::InvalidTransition(format!(
            "{} is not alive to vote",
            voter
        )));
    }
    let election = room
        .active_election
        .as_mut()
        .ok_or_else(|| Error::InvalidTransition("No vote in progress".into()))?;

    let choice = election.record(voter, target)?;
    debug!(room_id = %room.id, voter = %voter, choice = %choice, "Vote cast");

    conclude_if_complete(room)
}

/// Every alive player has a ballot in
pub fn is_complete(room: &Room) -> bool {
    let alive = room.alive_count();
    room.active_election
        .as_ref()
        .is_some_and(|e| alive > 0 && e.live_ballots(&room.players) >= alive)
}

/// Conclude the active vote once every alive player has voted. Used after
/// ballots land and after the roster or alive set shrinks mid-meeting.
pub fn conclude_if_complete(room: &mut Room) -> Result<Option<ElectionResult>> {
    if is_complete(room) {
        return conclude_vote(room).map(Some);
    }
    Ok(None)
}

/// Tally and detach the active vote, ejecting the leader if it is a player.
/// Cancels the expiry timer before anything else.
pub fn conclude_vote(room: &mut Room) -> Result<ElectionResult> {
    let mut election = room
        .active_election
        .take()
        .ok_or_else(|| Error::InvalidTransition("No vote to conclude".into()))?;
    election.cancel_expiry();

    let ejected = match election.leader() {
        Candidate::Abstain => None,
        Candidate::Player(id) => room.player_mut(id).map(|player| {
            player.alive = false;
            player.clone()
        }),
    };

    Ok(ElectionResult {
        room_id: room.id,
        election,
        ejected,
    })
}

/// Timer path: conclude only if the active vote is still `round`. The
/// handle is dropped rather than cancelled since it is the caller.
pub fn expire_vote(room: &mut Room, round: u64) -> Result<ElectionResult> {
    match room.active_election.as_mut() {
        Some(election) if election.round == round => {
            election.expiry = None;
            conclude_vote(room)
        }
        _ => Err(Error::InvalidTransition(format!(
            "Vote round {} already concluded",
            round
        ))),
    }
}
