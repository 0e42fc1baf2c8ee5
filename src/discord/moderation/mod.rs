// Discord moderation - adapters between serenity/poise and the core engine.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call the core engine
// 3. Turn the result into Discord actions
//
// The engine itself never sees a serenity type.

pub mod collaborators;
pub mod commands;
pub mod message_handler;
pub mod rooms;

pub use rooms::{HostSettings, RoomEngines};

use std::sync::Arc;

/// Shared state handed to every command and event.
pub struct Data {
    pub rooms: Arc<RoomEngines>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
