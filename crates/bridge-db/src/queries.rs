use crate::Database;
use crate::models::{AccountRow, ChannelRow, MembershipRow, NewChannel, ServerRow, WebhookRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const CHANNEL_COLUMNS: &str = "id, server_id, name, description, group_name, room_name, \
     network_name, network_room, is_private";
const ACCOUNT_COLUMNS: &str =
    "id, username, password, register_ip, login_ip, is_admin, is_blocked, created_at";
const MEMBERSHIP_COLUMNS: &str = "id, account_id, channel_id, lowest_requested_msg_id, \
     highest_requested_msg_id, unread_msg_id, has_write_access";
const WEBHOOK_COLUMNS: &str =
    "id, name, token, server_id, channel_id, owner_id, register_ip, last_use_ip";

impl Database {
    // -- Servers --

    /// Id of the server row for a group, creating it on first use.
    pub fn ensure_server(&self, name: &str) -> Result<i64> {
        self.with_conn(|conn| ensure_server(conn, name))
    }

    pub fn list_servers(&self) -> Result<Vec<ServerRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, icon_url, banner_url FROM servers ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ServerRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        icon_url: row.get(2)?,
                        banner_url: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Channels --

    /// Insert a channel under its group's server row. Fails on either
    /// uniqueness constraint.
    pub fn create_channel(&self, new: &NewChannel<'_>) -> Result<ChannelRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let server_id = ensure_server(&tx, new.group_name)?;
            tx.execute(
                "INSERT INTO channels (server_id, name, description, group_name, room_name, network_name, network_room, is_private)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    server_id,
                    new.name,
                    new.description,
                    new.group_name,
                    new.room_name,
                    new.network_name,
                    new.network_room,
                    new.is_private
                ],
            )?;
            let id = tx.last_insert_rowid();
            let row = query_channel(&tx, "id = ?1", [id])?;
            tx.commit()?;
            row.ok_or_else(|| anyhow::anyhow!("Channel {} vanished after insert", id))
        })
    }

    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM channels ORDER BY id", CHANNEL_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_channels_for_group(&self, group: &str) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM channels WHERE group_name = ?1 ORDER BY id",
                CHANNEL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([group], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_channel_by_id(&self, id: i64) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| query_channel(conn, "id = ?1", [id]))
    }

    pub fn get_channel_by_network(&self, network: &str, room: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| query_channel(conn, "network_name = ?1 AND network_room = ?2", [network, room]))
    }

    // -- Accounts --

    pub fn create_account(&self, username: &str, password_hash: &str, register_ip: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (username, password, register_ip) VALUES (?1, ?2, ?3)",
                (username, password_hash, register_ip),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "username = ?1", [username]))
    }

    pub fn get_account_by_id(&self, id: i64) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id = ?1", [id]))
    }

    pub fn record_login(&self, id: i64, login_ip: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE accounts SET login_ip = ?1 WHERE id = ?2", (login_ip, id))?;
            Ok(())
        })
    }

    pub fn set_account_flags(&self, id: i64, is_admin: bool, is_blocked: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET is_admin = ?1, is_blocked = ?2 WHERE id = ?3",
                (is_admin, is_blocked, id),
            )?;
            Ok(())
        })
    }

    // -- Memberships --

    pub fn find_membership(&self, account_id: i64, channel_id: i64) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| query_membership(conn, account_id, channel_id))
    }

    /// Insert a membership with empty watermarks. An existing row for the
    /// same (account, channel) pair is returned untouched.
    pub fn create_membership(
        &self,
        account_id: i64,
        channel_id: i64,
        has_write_access: bool,
    ) -> Result<MembershipRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO channel_members (account_id, channel_id, has_write_access) VALUES (?1, ?2, ?3)",
                (account_id, channel_id, has_write_access),
            )?;
            query_membership(conn, account_id, channel_id)?.ok_or_else(|| {
                anyhow::anyhow!("Membership ({}, {}) missing after insert", account_id, channel_id)
            })
        })
    }

    pub fn update_membership(&self, member: &MembershipRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE channel_members
                 SET lowest_requested_msg_id = ?1, highest_requested_msg_id = ?2,
                     unread_msg_id = ?3, has_write_access = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    member.lowest_requested_msg_id,
                    member.highest_requested_msg_id,
                    member.unread_msg_id,
                    member.has_write_access,
                    member.id
                ],
            )?;
            Ok(())
        })
    }

    // -- Webhooks --

    pub fn create_webhook(
        &self,
        name: &str,
        token: &str,
        server_id: i64,
        channel_id: i64,
        owner_id: Option<i64>,
        register_ip: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO webhooks (name, token, server_id, channel_id, owner_id, register_ip)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![name, token, server_id, channel_id, owner_id, register_ip],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Webhook whose id and token both match exactly.
    pub fn get_webhook_by_credentials(&self, id: i64, token: &str) -> Result<Option<WebhookRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM webhooks WHERE id = ?1 AND token = ?2", WEBHOOK_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt
                .query_row(rusqlite::params![id, token], webhook_from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_webhooks_for_channel(&self, channel_id: i64) -> Result<Vec<WebhookRow>> {
        self.with_conn(|conn| query_webhooks(conn, "channel_id = ?1", channel_id))
    }

    pub fn list_webhooks_for_server(&self, server_id: i64) -> Result<Vec<WebhookRow>> {
        self.with_conn(|conn| query_webhooks(conn, "server_id = ?1", server_id))
    }

    pub fn touch_webhook(&self, id: i64, last_use_ip: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE webhooks SET last_use_ip = ?1 WHERE id = ?2", (last_use_ip, id))?;
            Ok(())
        })
    }
}

fn ensure_server(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO servers (name) VALUES (?1)", [name])?;
    let id = conn.query_row("SELECT id FROM servers WHERE name = ?1", [name], |row| row.get(0))?;
    Ok(id)
}

// `filter` is always a fixed string from this module, never caller input.
fn query_channel<P: rusqlite::Params>(conn: &Connection, filter: &str, params: P) -> Result<Option<ChannelRow>> {
    let sql = format!("SELECT {} FROM channels WHERE {}", CHANNEL_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row(params, channel_from_row).optional()?;
    Ok(row)
}

fn query_account<P: rusqlite::Params>(conn: &Connection, filter: &str, params: P) -> Result<Option<AccountRow>> {
    let sql = format!("SELECT {} FROM accounts WHERE {}", ACCOUNT_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(params, |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                register_ip: row.get(3)?,
                login_ip: row.get(4)?,
                is_admin: row.get(5)?,
                is_blocked: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn query_membership(conn: &Connection, account_id: i64, channel_id: i64) -> Result<Option<MembershipRow>> {
    let sql = format!(
        "SELECT {} FROM channel_members WHERE account_id = ?1 AND channel_id = ?2",
        MEMBERSHIP_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row([account_id, channel_id], |row| {
            Ok(MembershipRow {
                id: row.get(0)?,
                account_id: row.get(1)?,
                channel_id: row.get(2)?,
                lowest_requested_msg_id: row.get(3)?,
                highest_requested_msg_id: row.get(4)?,
                unread_msg_id: row.get(5)?,
                has_write_access: row.get(6)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn query_webhooks(conn: &Connection, filter: &str, id: i64) -> Result<Vec<WebhookRow>> {
    let sql = format!("SELECT {} FROM webhooks WHERE {} ORDER BY id", WEBHOOK_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id], webhook_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        server_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        group_name: row.get(4)?,
        room_name: row.get(5)?,
        network_name: row.get(6)?,
        network_room: row.get(7)?,
        is_private: row.get(8)?,
    })
}

fn webhook_from_row(row: &Row<'_>) -> rusqlite::Result<WebhookRow> {
    Ok(WebhookRow {
        id: row.get(0)?,
        name: row.get(1)?,
        token: row.get(2)?,
        server_id: row.get(3)?,
        channel_id: row.get(4)?,
        owner_id: row.get(5)?,
        register_ip: row.get(6)?,
        last_use_ip: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel<'a>(group: &'a str, room: &'a str, network_room: &'a str) -> NewChannel<'a> {
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
    fn channel_pairs_are_unique() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_channel(&channel("g1", "r1", "#r1")).unwrap();
        assert_eq!(first.group_name, "g1");

        // same internal pair, different network room
        assert!(db.create_channel(&channel("g1", "r1", "#other")).is_err());
        // same network pair, different internal room
        assert!(db.create_channel(&channel("g1", "r2", "#r1")).is_err());

        let second = db.create_channel(&channel("g1", "r2", "#r2")).unwrap();
        assert_eq!(second.server_id, first.server_id);
        assert_eq!(db.list_channels_for_group("g1").unwrap().len(), 2);
        assert_eq!(db.list_servers().unwrap().len(), 1);

        let found = db.get_channel_by_network("quakenet", "#r2").unwrap().unwrap();
        assert_eq!(found.id, second.id);
        assert!(db.get_channel_by_network("efnet", "#r2").unwrap().is_none());
    }

    #[test]
    fn one_membership_per_account_and_channel() {
        let db = Database::open_in_memory().unwrap();
        let chan = db.create_channel(&channel("g1", "r1", "#r1")).unwrap();
        let account = db.create_account("alice", "hash", "127.0.0.1").unwrap();

        assert!(db.find_membership(account, chan.id).unwrap().is_none());
        let mut member = db.create_membership(account, chan.id, true).unwrap();
        assert_eq!(member.highest_requested_msg_id, None);
        assert!(member.has_write_access);

        member.highest_requested_msg_id = Some(9);
        member.lowest_requested_msg_id = Some(3);
        db.update_membership(&member).unwrap();

        // a second create returns the stored row instead of a duplicate
        let again = db.create_membership(account, chan.id, false).unwrap();
        assert_eq!(again, member);
    }

    #[test]
    fn accounts_by_name_and_flags() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_account("alice", "hash", "10.0.0.1").unwrap();
        assert!(db.create_account("alice", "other", "10.0.0.2").is_err());

        db.set_account_flags(id, true, false).unwrap();
        db.record_login(id, "10.0.0.3").unwrap();
        let row = db.get_account_by_username("alice").unwrap().unwrap();
        assert!(row.is_admin);
        assert!(!row.is_blocked);
        assert_eq!(row.login_ip, "10.0.0.3");
        assert!(db.get_account_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn webhook_credentials_match_exactly() {
        let db = Database::open_in_memory().unwrap();
        let chan = db.create_channel(&channel("g1", "r1", "#r1")).unwrap();
        let id = db
            .create_webhook("ci", "s3cret", chan.server_id, chan.id, None, "")
            .unwrap();

        assert!(db.get_webhook_by_credentials(id, "s3cret").unwrap().is_some());
        assert!(db.get_webhook_by_credentials(id, "S3CRET").unwrap().is_none());
        assert!(db.get_webhook_by_credentials(id + 1, "s3cret").unwrap().is_none());

        db.touch_webhook(id, "192.168.1.5").unwrap();
        let listed = db.list_webhooks_for_channel(chan.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].last_use_ip, "192.168.1.5");
        assert_eq!(db.list_webhooks_for_server(chan.server_id).unwrap().len(), 1);
    }
}
