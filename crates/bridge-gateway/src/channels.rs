use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::info;

use bridge_db::Database;
use bridge_db::models::{MembershipRow, NewChannel};
use bridge_types::models::{Account, Channel};

/// Group and room of the channel created when the configured network room
/// has no mapping yet.
pub const FALLBACK_GROUP: &str = "unknown";
pub const FALLBACK_ROOM: &str = "unknown";

/// Read-mostly cache of the channel table plus membership bookkeeping.
pub struct ChannelRegistry {
    db: Arc<Database>,
    channels: RwLock<Vec<Channel>>,
}

impl ChannelRegistry {
    pub fn load(db: Arc<Database>) -> Result<Self> {
        let registry = Self {
            db,
            channels: RwLock::new(Vec::new()),
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn reload(&self) -> Result<()> {
        let rows = self.db.list_channels()?;
        let channels: Vec<Channel> = rows.into_iter().map(Channel::from).collect();
        info!("Loaded {} bridged channels", channels.len());
        *self.channels.write().expect("channel lock poisoned") = channels;
        Ok(())
    }

    /// The single channel for (group, room). Ambiguous or unknown pairs
    /// resolve to nothing.
    pub fn resolve(&self, group: &str, room: &str) -> Option<Channel> {
        let channels = self.channels.read().expect("channel lock poisoned");
        let mut matches = channels.iter().filter(|c| c.group == group && c.room == room);
        match (matches.next(), matches.next()) {
            (Some(channel), None) => Some(channel.clone()),
            _ => None,
        }
    }

    pub fn is_valid_room(&self, group: &str, room: &str) -> bool {
        self.resolve(group, room).is_some()
    }

    pub fn by_id(&self, id: i64) -> Option<Channel> {
        let channels = self.channels.read().expect("channel lock poisoned");
        channels.iter().find(|c| c.id == id).cloned()
    }

    /// Channel bridged to a room on the chat network. Room names compare
    /// case-insensitively, as IRC does.
    pub fn by_network_room(&self, network: &str, room: &str) -> Option<Channel> {
        let channels = self.channels.read().expect("channel lock poisoned");
        channels
            .iter()
            .find(|c| c.network == network && c.network_room.eq_ignore_ascii_case(room))
            .cloned()
    }

    pub fn in_group(&self, group: &str) -> Vec<Channel> {
        let channels = self.channels.read().expect("channel lock poisoned");
        channels.iter().filter(|c| c.group == group).cloned().collect()
    }

    pub fn in_server(&self, server_id: i64) -> Vec<Channel> {
        let channels = self.channels.read().expect("channel lock poisoned");
        channels.iter().filter(|c| c.server_id == server_id).cloned().collect()
    }

    pub fn create(&self, new: &NewChannel<'_>) -> Result<Channel> {
        let channel = Channel::from(self.db.create_channel(new)?);
        info!(
            "Created channel {} bridging {}/{}",
            channel.room_key(),
            channel.network,
            channel.network_room
        );
        self.channels
            .write()
            .expect("channel lock poisoned")
            .push(channel.clone());
        Ok(channel)
    }

    /// Make sure the configured network room is bridged somewhere.
    pub fn ensure_network_room(&self, network: &str, network_room: &str) -> Result<Channel> {
        if let Some(channel) = self.by_network_room(network, network_room) {
            return Ok(channel);
        }
        self.create(&NewChannel {
            name: FALLBACK_ROOM,
            description: "",
            group_name: FALLBACK_GROUP,
            room_name: FALLBACK_ROOM,
            network_name: network,
            network_room,
            is_private: false,
        })
    }

    /// Existing membership, or a new one with empty watermarks and the
    /// given write flag.
    pub fn find_or_create_membership(
        &self,
        account: &Account,
        channel: &Channel,
        default_write_access: bool,
    ) -> Result<MembershipRow> {
        if let Some(member) = self.db.find_membership(account.id, channel.id)? {
            info!("'{}' revisited {}", account.username, channel.room_key());
            return Ok(member);
        }
        info!("'{}' joined {} for the first time", account.username, channel.room_key());
        self.db.create_membership(account.id, channel.id, default_write_access)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ChannelRegistry::load(db).unwrap()
    }

    fn new_channel<'a>(group: &'a str, room: &'a str, network_room: &'a str) -> NewChannel<'a> {
        NewChannel {
            name: room,
            description: "",
            group_name: group,
            room_name: room,
            network_name: "quakenet",
            network_room,
            is_private: false,
        }
    }

    #[test]
    fn resolves_created_channels() {
        let reg = registry();
        reg.create(&new_channel("g1", "r1", "#r1")).unwrap();

        assert!(reg.is_valid_room("g1", "r1"));
        assert!(!reg.is_valid_room("g1", "r2"));
        assert_eq!(reg.by_network_room("quakenet", "#R1").unwrap().room, "r1");
        assert!(reg.by_network_room("libera", "#r1").is_none());

        // cache and table agree after a reload
        reg.reload().unwrap();
        assert!(reg.is_valid_room("g1", "r1"));
    }

    #[test]
    fn unmapped_network_room_gets_fallback_channel() {
        let reg = registry();
        let channel = reg.ensure_network_room("quakenet", "#bridge").unwrap();
        assert_eq!(channel.group, FALLBACK_GROUP);
        assert_eq!(channel.room, FALLBACK_ROOM);

        let again = reg.ensure_network_room("quakenet", "#bridge").unwrap();
        assert_eq!(again.id, channel.id);
    }

    #[test]
    fn membership_is_created_once() {
        let reg = registry();
        let channel = reg.create(&new_channel("g1", "r1", "#r1")).unwrap();
        let id = reg.db().create_account("alice", "hash", "").unwrap();
        let account = Account {
            id,
            username: "alice".into(),
            is_admin: false,
            is_blocked: false,
        };

        let first = reg.find_or_create_membership(&account, &channel, false).unwrap();
        assert!(!first.has_write_access);
        assert_eq!(first.highest_requested_msg_id, None);

        let second = reg.find_or_create_membership(&account, &channel, true).unwrap();
        assert_eq!(second.id, first.id);
        assert!(!second.has_write_access);
    }
}
