//! Data models for Skulk

mod message;
mod player;
mod room;

pub use message::*;
pub use player::*;
pub use room::*;
