// src/transport/mod.rs

//! Boundary with the chat service.
//!
//! The engine only talks to a [`ChatTransport`]; production uses
//! [`webex::WebexTransport`], tests provide an in-memory fake.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{ChatShellError, Result};

pub mod webex;

pub use webex::WebexTransport;

/// Boxed future returned by transport calls.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One message as listed by the chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: String,
    pub title: String,
    pub kind: RoomKind,
}

/// Identity of the account the transport is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub display_name: String,
    /// Token that prefixes the text of messages mentioning the bot.
    pub nickname: String,
    pub is_bot: bool,
}

/// Trait abstracting the chat service.
///
/// Implementations must be cheap to share (`Arc<dyn ChatTransport>`).
pub trait ChatTransport: Send + Sync {
    /// Who the transport is authenticated as.
    fn whoami(&self) -> TransportFuture<'_, BotIdentity>;

    fn get_room<'a>(&'a self, room_id: &'a str) -> TransportFuture<'a, RoomInfo>;

    /// Resolve a configured sender address to its canonical form.
    fn resolve_identity<'a>(&'a self, address: &'a str) -> TransportFuture<'a, String>;

    /// Up to `max` most recent messages created after `since`, oldest first.
    ///
    /// Delivery is at-least-once: the same message may be returned by
    /// consecutive calls.
    fn list_recent_messages<'a>(
        &'a self,
        room: &'a RoomInfo,
        since: DateTime<Utc>,
        max: usize,
    ) -> TransportFuture<'a, Vec<ChatMessage>>;

    /// Post `text` (markdown) with an optional local file attached. Returns
    /// the ID of the created message.
    fn send_message<'a>(
        &'a self,
        room_id: &'a str,
        text: &'a str,
        attachment: Option<&'a Path>,
    ) -> TransportFuture<'a, String>;
}

/// Accept either a bare room UUID or a base64 encoded room URN such as
/// `ciscospark://us/ROOM/<uuid>`, returning the UUID.
pub fn parse_room_id(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if let Ok(uuid) = Uuid::parse_str(raw) {
        return Ok(uuid.hyphenated().to_string());
    }

    let decoded = STANDARD
        .decode(raw)
        .map_err(|e| ChatShellError::ConfigError(format!("room id '{raw}' is not valid: {e}")))?;
    let urn = String::from_utf8_lossy(&decoded);

    let tail = urn.split("/ROOM/").nth(1).ok_or_else(|| {
        ChatShellError::ConfigError(format!("room id '{raw}' does not decode to a room URN"))
    })?;

    Uuid::parse_str(tail)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| {
            ChatShellError::ConfigError(format!("room id '{raw}' has an invalid UUID: {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM_UUID: &str = "0c7e3e40-1b7a-11ee-a0f4-5b1f3e9a1c2d";

    #[test]
    fn bare_uuid_is_accepted() {
        assert_eq!(parse_room_id(ROOM_UUID).unwrap(), ROOM_UUID);
    }

    #[test]
    fn base64_room_urn_is_decoded() {
        let encoded = STANDARD.encode(format!("ciscospark://us/ROOM/{ROOM_UUID}"));
        assert_eq!(parse_room_id(&encoded).unwrap(), ROOM_UUID);
    }

    #[test]
    fn garbage_is_a_config_error() {
        assert!(matches!(
            parse_room_id("not a room"),
            Err(ChatShellError::ConfigError(_))
        ));

        let wrong_kind = STANDARD.encode(format!("ciscospark://us/PEOPLE/{ROOM_UUID}"));
        assert!(parse_room_id(&wrong_kind).is_err());
    }
}
