/// Database row types. These map directly to SQLite rows and stay
/// separate from the bridge-types models so the DB layer remains independent.

pub struct ServerRow {
    pub id: i64,
    pub name: String,
    pub icon_url: String,
    pub banner_url: String,
}

pub struct ChannelRow {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub description: String,
    pub group_name: String,
    pub room_name: String,
    pub network_name: String,
    pub network_room: String,
    pub is_private: bool,
}

/// Values for a channel that does not exist yet.
pub struct NewChannel<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub group_name: &'a str,
    pub room_name: &'a str,
    pub network_name: &'a str,
    pub network_room: &'a str,
    pub is_private: bool,
}

pub struct AccountRow {
    pub id: i64,
    pub username: String,
    /// Argon2 PHC string
    pub password: String,
    pub register_ip: String,
    pub login_ip: String,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRow {
    pub id: i64,
    pub account_id: i64,
    pub channel_id: i64,
    pub lowest_requested_msg_id: Option<i64>,
    pub highest_requested_msg_id: Option<i64>,
    pub unread_msg_id: Option<i64>,
    pub has_write_access: bool,
}

pub struct WebhookRow {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub server_id: i64,
    pub channel_id: i64,
    pub owner_id: Option<i64>,
    pub register_ip: String,
    pub last_use_ip: String,
}

impl From<&AccountRow> for bridge_types::models::Account {
    fn from(row: &AccountRow) -> Self {
        Self {
            id: row.id,
            username: row.username.clone(),
            is_admin: row.is_admin,
            is_blocked: row.is_blocked,
        }
    }
}

impl From<ChannelRow> for bridge_types::models::Channel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            server_id: row.server_id,
            name: row.name,
            description: row.description,
            group: row.group_name,
            room: row.room_name,
            network: row.network_name,
            network_room: row.network_room,
            is_private: row.is_private,
        }
    }
}

impl From<&WebhookRow> for bridge_types::api::WebhookObject {
    fn from(row: &WebhookRow) -> Self {
        Self {
            id: row.id,
            token: row.token.clone(),
            kind: 0,
            channel_id: row.channel_id,
            name: row.name.clone(),
            avatar: None,
            application_id: None,
        }
    }
}
