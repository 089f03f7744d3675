//! TCP server hosting every room
//!
//! Each connection gets a fresh connection id. Inbound events are applied
//! to the shared [`RoomStore`] under a single write lock; the resulting
//! events are queued in an [`Outbox`] and delivered once the lock is
//! released.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skulk_core::{
    Disconnection, Elimination, Error as CoreError, ExpiryHandle, Room, RoomStore,
    VoteConclusion,
};
use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientEvent, ServerEvent, StatusReport};

/// Default cap on simultaneous connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Outbound queue depth per connection
const PEER_QUEUE: usize = 64;

/// Connected peer state
struct Peer {
    tx: mpsc::Sender<ServerEvent>,
}

/// Server state shared across tasks
struct ServerState {
    store: RoomStore,
    peers: HashMap<Uuid, Peer>,
    max_connections: usize,
}

impl ServerState {
    fn status(&self) -> StatusReport {
        StatusReport {
            connections: self.peers.len(),
            players: self.store.player_count(),
            rooms: self.store.room_count(),
        }
    }
}

/// Events queued while the state lock is held, delivered after it is
/// released
#[derive(Default)]
struct Outbox {
    deliveries: Vec<(mpsc::Sender<ServerEvent>, ServerEvent)>,
}

impl Outbox {
    fn to(&mut self, peers: &HashMap<Uuid, Peer>, connection_id: Uuid, event: ServerEvent) {
        if let Some(peer) = peers.get(&connection_id) {
            self.deliveries.push((peer.tx.clone(), event));
        }
    }

    /// Every roster member with a live connection, optionally skipping one
    fn to_room(
        &mut self,
        peers: &HashMap<Uuid, Peer>,
        room: &Room,
        event: ServerEvent,
        except: Option<Uuid>,
    ) {
        for player in &room.players {
            if except != Some(player.connection_id) {
                self.to(peers, player.connection_id, event.clone());
            }
        }
    }

    async fn flush(self) {
        for (tx, event) in self.deliveries {
            if tx.send(event).await.is_err() {
                debug!("Failed to queue event for peer");
            }
        }
    }
}

/// Tokio task handle used as the vote expiry
#[derive(Debug)]
struct VoteTimer(AbortHandle);

impl ExpiryHandle for VoteTimer {
    fn cancel(&self) {
        self.0.abort();
    }
}

/// Room server handle
pub struct Server {
    addr: SocketAddr,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Start a new server on the given port (0 picks a free one)
    pub async fn start(port: u16, store: RoomStore, max_connections: usize) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            store,
            peers: HashMap::new(),
            max_connections,
        }));

        // Spawn accept loop
        let state_clone = state.clone();
        tokio::spawn(accept_loop(listener, state_clone, shutdown_tx.clone()));

        Ok(Server {
            addr: bound_addr,
            state,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Aggregate connection, player and room counts
    pub async fn status(&self) -> StatusReport {
        self.state.read().await.status()
    }

    /// Snapshot of a room by id
    pub async fn room(&self, room_id: Uuid) -> Option<Room> {
        self.state.read().await.store.room(room_id).cloned()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        let state = state.clone();
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(handle_connection(stream, addr, state, shutdown_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RwLock<ServerState>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(PEER_QUEUE);

    if let Err(e) = register_peer(&state, connection_id, tx.clone()).await {
        warn!(addr = %addr, error = %e, "Connection refused");
        return;
    }
    info!(addr = %addr, connection_id = %connection_id, "Peer connected");

    let writer_handle = tokio::spawn(writer_task(writer, rx));
    let _ = tx.send(ServerEvent::Welcome { connection_id }).await;

    loop {
        tokio::select! {
            result = read_frame::<ClientEvent, _>(&mut reader) => {
                match result {
                    Ok(event) => handle_event(event, connection_id, &state).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = tx.send(ServerEvent::ServerShutdown).await;
                break;
            }
        }
    }

    handle_disconnect(&state, connection_id).await;
    // Let the writer drain whatever is queued, then stop
    drop(tx);
    if tokio::time::timeout(Duration::from_secs(1), writer_handle)
        .await
        .is_err()
    {
        debug!(connection_id = %connection_id, "Writer did not drain in time");
    }

    info!(connection_id = %connection_id, "Peer disconnected");
}

async fn register_peer(
    state: &Arc<RwLock<ServerState>>,
    connection_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
) -> Result<()> {
    let mut s = state.write().await;
    if s.peers.len() >= s.max_connections {
        return Err(Error::ServerFull);
    }
    s.peers.insert(connection_id, Peer { tx });
    Ok(())
}

/// Writer task - sends events to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &event).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Apply one inbound event to the store and deliver the fallout
async fn handle_event(event: ClientEvent, sender: Uuid, state: &Arc<RwLock<ServerState>>) {
    let mut outbox = Outbox::default();

    {
        let mut guard = state.write().await;
        let status = guard.status();
        let ServerState { store, peers, .. } = &mut *guard;

        match event {
            ClientEvent::CreateRoom { name, adversaries } => {
                let player = store.new_player(sender, &name);
                match store.create_room(player.clone(), adversaries) {
                    Ok(room) => outbox.to(peers, sender, ServerEvent::JoinedRoom { room, player }),
                    Err(e) => report(&mut outbox, peers, sender, e),
                }
            }
            ClientEvent::JoinRoom { name, code } => {
                let player = store.new_player(sender, &name);
                match store.join_room(&code, player.clone()) {
                    Ok(room) => {
                        outbox.to_room(
                            peers,
                            &room,
                            ServerEvent::RoomUpdated { room: room.clone() },
                            Some(sender),
                        );
                        outbox.to(peers, sender, ServerEvent::JoinedRoom { room, player });
                    }
                    Err(e) => report(&mut outbox, peers, sender, e),
                }
            }
            ClientEvent::RejoinRoom {
                persistent_id,
                room_id,
            } => match store.restore(persistent_id, room_id, sender) {
                Ok((player, room)) => {
                    outbox.to_room(
                        peers,
                        &room,
                        ServerEvent::RoomUpdated { room: room.clone() },
                        Some(sender),
                    );
                    outbox.to(peers, sender, ServerEvent::JoinedRoom { room, player });
                }
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::LeaveRoom => match store.leave_room(sender) {
                Ok(departure) => {
                    if let Some(room) = &departure.room {
                        outbox.to_room(peers, room, ServerEvent::RoomUpdated { room: room.clone() }, None);
                    }
                    if let Some(conclusion) = departure.conclusion {
                        queue_conclusion(&mut outbox, peers, conclusion);
                    }
                }
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::ReadyRoom => match store.ready_room(sender) {
                Ok(room) => outbox.to_room(
                    peers,
                    &room,
                    ServerEvent::RolesAssigned {
                        players: room.players.clone(),
                    },
                    None,
                ),
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::TaskComplete { task } => match store.complete_task(sender, &task) {
                Ok(update) => {
                    let event = match update.winner {
                        Some(winning_faction) => ServerEvent::GameOver { winning_faction },
                        None => ServerEvent::TaskProgress {
                            percent: update.report.percent,
                        },
                    };
                    if let Some(room) = store.room(update.room_id) {
                        outbox.to_room(peers, room, event, None);
                    }
                }
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::SelfEliminated => match store.self_eliminate(sender) {
                Ok(elimination) => queue_elimination(&mut outbox, peers, elimination),
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::EliminateTarget { target } => {
                match store.eliminate_target(sender, target) {
                    Ok(elimination) => queue_elimination(&mut outbox, peers, elimination),
                    Err(e) => report(&mut outbox, peers, sender, e),
                }
            }
            ClientEvent::CallMeeting { accused } => match store.call_meeting(sender, accused) {
                Ok(called) => {
                    schedule_expiry(
                        state,
                        store,
                        called.room.id,
                        called.round,
                        called.meeting.countdown_ms,
                    );
                    outbox.to_room(
                        peers,
                        &called.room,
                        ServerEvent::MeetingStarted {
                            meeting: called.meeting,
                        },
                        None,
                    );
                }
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::CastVote { target } => match store.cast_vote(sender, target) {
                Ok(Some(conclusion)) => queue_conclusion(&mut outbox, peers, conclusion),
                Ok(None) => {}
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::SendMessage { text } => match store.chat(sender, text) {
                Ok((room_id, message)) => {
                    if let Some(room) = store.room(room_id) {
                        outbox.to_room(peers, room, ServerEvent::ChatMessage(message), None);
                    }
                }
                Err(e) => report(&mut outbox, peers, sender, e),
            },
            ClientEvent::Status => outbox.to(peers, sender, ServerEvent::Status(status)),
            ClientEvent::RoomStatus { room_id } => {
                let event = match store.room(room_id) {
                    Some(room) => ServerEvent::RoomStatus { room: room.clone() },
                    None => ServerEvent::RoomNotFound,
                };
                outbox.to(peers, sender, event);
            }
        }
    }

    outbox.flush().await;
}

/// Tell the caller about missing rooms or players; transitions a client
/// got out of sync on are dropped
fn report(outbox: &mut Outbox, peers: &HashMap<Uuid, Peer>, sender: Uuid, err: CoreError) {
    match err {
        CoreError::RoomNotFound(_) => outbox.to(peers, sender, ServerEvent::RoomNotFound),
        CoreError::PlayerNotFound(_) => outbox.to(peers, sender, ServerEvent::UserNotFound),
        CoreError::InvalidTransition(reason) => {
            debug!(connection_id = %sender, reason = %reason, "Ignoring request")
        }
    }
}

fn queue_elimination(outbox: &mut Outbox, peers: &HashMap<Uuid, Peer>, elimination: Elimination) {
    let Elimination {
        winner,
        room,
        conclusion,
        ..
    } = elimination;

    let event = match winner {
        Some(winning_faction) => ServerEvent::GameOver { winning_faction },
        None => ServerEvent::RoomUpdated { room: room.clone() },
    };
    outbox.to_room(peers, &room, event, None);
    // The death may have been the last missing ballot
    if let Some(conclusion) = conclusion {
        queue_conclusion(outbox, peers, conclusion);
    }
}

fn queue_conclusion(outbox: &mut Outbox, peers: &HashMap<Uuid, Peer>, conclusion: VoteConclusion) {
    let VoteConclusion {
        result,
        winner,
        room,
    } = conclusion;

    outbox.to_room(
        peers,
        &room,
        ServerEvent::VoteConcluded {
            election: result.election,
            ejected: result.ejected,
        },
        None,
    );
    if let Some(winning_faction) = winner {
        outbox.to_room(peers, &room, ServerEvent::GameOver { winning_faction }, None);
    }
}

/// Spawn the one-shot vote timer and attach its handle to the election.
/// Runs under the state lock, so the timer cannot fire before the handle
/// is in place.
fn schedule_expiry(
    state: &Arc<RwLock<ServerState>>,
    store: &mut RoomStore,
    room_id: Uuid,
    round: u64,
    countdown_ms: u64,
) {
    let state = state.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(countdown_ms)).await;
        expire_vote(&state, room_id, round).await;
    });
    store.attach_expiry(room_id, round, Arc::new(VoteTimer(task.abort_handle())));
}

async fn expire_vote(state: &Arc<RwLock<ServerState>>, room_id: Uuid, round: u64) {
    let mut outbox = Outbox::default();
    {
        let mut guard = state.write().await;
        let ServerState { store, peers, .. } = &mut *guard;
        match store.expire_vote(room_id, round) {
            Ok(conclusion) => queue_conclusion(&mut outbox, peers, conclusion),
            Err(e) => debug!(room_id = %room_id, round, error = %e, "Stale vote timer"),
        }
    }
    outbox.flush().await;
}

/// Drop the peer and soft-remove its player
async fn handle_disconnect(state: &Arc<RwLock<ServerState>>, connection_id: Uuid) {
    let mut outbox = Outbox::default();
    {
        let mut guard = state.write().await;
        let ServerState { store, peers, .. } = &mut *guard;
        peers.remove(&connection_id);

        match store.disconnect(connection_id) {
            Ok(Disconnection::Pending(room)) => {
                outbox.to_room(peers, &room, ServerEvent::RoomUpdated { room: room.clone() }, None)
            }
            Ok(Disconnection::RoomDeleted(_)) => {}
            // Never joined a room
            Err(_) => {}
        }
    }
    outbox.flush().await;
}
