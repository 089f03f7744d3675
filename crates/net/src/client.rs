//! TCP client for talking to a room server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientEvent, ServerEvent};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Client handle for network operations
pub struct Client {
    connection_id: Uuid,
    state: Arc<RwLock<ClientState>>,
    event_rx: mpsc::Receiver<ServerEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

struct ClientState {
    connection: ConnectionState,
    /// Room and persistent id of the last seat we were given
    seat: Option<(Uuid, Uuid)>,
}

enum ClientCommand {
    Send(ClientEvent),
    Disconnect,
}

impl Client {
    /// Connect to a room server and wait for its welcome
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, writer) = tokio::io::split(stream);

        let connection_id = match read_frame(&mut reader).await? {
            ServerEvent::Welcome { connection_id } => connection_id,
            other => {
                return Err(Error::Protocol(format!(
                    "expected welcome, got {:?}",
                    other
                )))
            }
        };

        let state = Arc::new(RwLock::new(ClientState {
            connection: ConnectionState::Connected,
            seat: None,
        }));

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(
            reader,
            writer,
            state.clone(),
            event_tx,
            cmd_rx,
        ));

        debug!(connection_id = %connection_id, "Welcomed by server");
        Ok(Client {
            connection_id,
            state,
            event_rx,
            cmd_tx,
        })
    }

    /// Id the server assigned to this connection
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Get the next server event. `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(event))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    /// Get current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    /// `(room_id, persistent_id)` needed to rejoin after a drop
    pub async fn seat(&self) -> Option<(Uuid, Uuid)> {
        self.state.read().await.seat
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ClientState>>,
    event_tx: mpsc::Sender<ServerEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            // Incoming event from server
            result = read_frame::<ServerEvent, _>(&mut reader) => {
                match result {
                    Ok(event) => {
                        if let ServerEvent::JoinedRoom { room, player } = &event {
                            state.write().await.seat = Some((room.id, player.persistent_id));
                        }
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            // Outgoing command
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(event)) => {
                        if let Err(e) = write_frame(&mut writer, &event).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }
        }
    }

    state.write().await.connection = ConnectionState::Disconnected;
    info!("Disconnected from server");
}
