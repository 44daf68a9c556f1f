use serde::{Deserialize, Serialize};

use crate::api::{ServerInfo, WebhookObject};
use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// A chat line relayed in a room the connection is subscribed to
    Message(ChatMessage),

    /// Everyone currently typing in a room
    TypingUsers {
        names: Vec<String>,
        channel: String,
        server: String,
    },

    /// A session finished logging in
    UserJoin { username: String },

    /// An authenticated session disconnected
    UserLeave { username: String },

    /// The server ended this connection's login
    Logout { message: String },

    AuthResponse {
        username: String,
        admin: bool,
        token: String,
        message: String,
        success: bool,
    },

    JoinChannelResponse {
        message: String,
        success: bool,
        channel: String,
        server: String,
        /// Highest message id this account has requested in the room
        unread_msg_id: Option<i64>,
        channel_id: i64,
        server_id: i64,
    },

    /// Short-lived notice for the client UI. `expire` is in milliseconds.
    Alert {
        success: bool,
        message: String,
        expire: i64,
    },

    Webhooks { webhooks: Vec<WebhookObject> },

    ConnectedServerList { servers: Vec<ServerInfo> },
}

impl GatewayEvent {
    pub fn alert(message: impl Into<String>) -> Self {
        Self::Alert {
            success: false,
            message: message.into(),
            expire: 8000,
        }
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::AuthResponse {
            username: String::new(),
            admin: false,
            token: String::new(),
            message: message.into(),
            success: false,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Log in under a display name and enter a room
    Auth {
        username: String,
        password: String,
        channel: String,
        server: String,
    },

    /// Create an account
    Register {
        username: String,
        password: String,
        #[serde(default)]
        token: String,
    },

    /// Switch the active room
    JoinChannel {
        channel: String,
        server: String,
        #[serde(default)]
        password: String,
    },

    /// Typing indicator for the active room
    Typing {
        is_typing: bool,
        channel: String,
        server: String,
    },

    /// Post a chat line to the active room.
    /// `id` is the id the client expects to be assigned; the server decides.
    Message {
        #[serde(default)]
        id: i64,
        from: String,
        message: String,
        channel: String,
        server: String,
        #[serde(default)]
        token: Option<String>,
    },

    /// List the webhooks of a group
    WebhooksRequest { server_id: i64 },

    /// Create a webhook for a channel (admins only)
    NewWebhook { channel_id: i64, name: String },

    /// List groups and their channels
    ConnectedServerListRequest,
}
