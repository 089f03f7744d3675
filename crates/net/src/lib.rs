//! Skulk Network Library
//!
//! Provides the TCP room server and a matching client.
//!
//! # Architecture
//!
//! - **Server**: Owns the [`RoomStore`](skulk_core::RoomStore) and every connection
//! - **Client**: Connects to a server and surfaces its events
//! - **Protocol**: Length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(DEFAULT_PORT, RoomStore::with_rules(rules), 256).await?;
//!
//! let mut client = Client::connect(addr).await?;
//! client.send(ClientEvent::CreateRoom { name: "ana".into(), adversaries: None }).await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ServerEvent::JoinedRoom { room, .. } => { /* share room.join_code */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::{Client, ConnectionState};
pub use error::{Error, Result};
pub use protocol::{ClientEvent, ServerEvent, StatusReport};
pub use server::{Server, DEFAULT_MAX_CONNECTIONS};

/// Default port for Skulk servers
pub const DEFAULT_PORT: u16 = 3000;
