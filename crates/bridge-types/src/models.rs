use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Key of the push-transport room (and history ring) for one bridged room.
pub fn room_key(group: &str, room: &str) -> String {
    format!("{}#{}", group, room)
}

/// A relayed chat line as it travels to clients and into the history ring.
///
/// `channel` is the room and `server` the group it belongs to; the names
/// follow the client wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub from: String,
    pub message: String,
    pub channel: String,
    pub server: String,
    pub date: String,
    /// Session token echoed by the sender. Never leaves the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ChatMessage {
    pub fn new(id: i64, from: &str, message: &str, group: &str, room: &str) -> Self {
        Self {
            id,
            from: from.to_string(),
            message: message.to_string(),
            channel: room.to_string(),
            server: group.to_string(),
            date: Utc::now().to_rfc2822(),
            token: None,
        }
    }

    /// Drop the sender's credential before the message is stored or broadcast.
    pub fn scrubbed(mut self) -> Self {
        self.token = None;
        self
    }

    pub fn room_key(&self) -> String {
        room_key(&self.server, &self.channel)
    }
}

/// A bridge between one room on the chat network and one room on this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub description: String,
    pub group: String,
    pub room: String,
    pub network: String,
    pub network_room: String,
    pub is_private: bool,
}

impl Channel {
    pub fn room_key(&self) -> String {
        room_key(&self.group, &self.room)
    }
}

/// The persisted identity a session may be linked to after login.
/// Carries no credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub is_blocked: bool,
}
