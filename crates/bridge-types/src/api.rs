use serde::{Deserialize, Serialize};

// -- Webhooks --

/// Body of `POST /webhooks/{id}/{token}`. A missing `content` counts as empty.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookExecuteRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookExecuteResponse {
    pub message: String,
    /// Id assigned to a message relayed directly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Lines placed on the delivery queue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued: Option<usize>,
    /// Lines that did not fit on the delivery queue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped: Option<usize>,
}

/// Webhook as listed to clients, shaped after the Discord webhook object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookObject {
    pub id: i64,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: i32,
    pub channel_id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub application_id: Option<i64>,
}

// -- Groups and channels --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: i64,
    pub name: String,
    pub icon_url: String,
    pub banner_url: String,
    pub channels: Vec<ChannelInfo>,
}

// -- Admin --

#[derive(Debug, Deserialize)]
pub struct RequiredFlag {
    pub required: Option<bool>,
}

impl From<&crate::models::Channel> for ChannelInfo {
    fn from(channel: &crate::models::Channel) -> Self {
        Self {
            id: channel.id,
            server_id: channel.server_id,
            name: channel.name.clone(),
            description: channel.description.clone(),
        }
    }
}
