use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version = current_version(conn)?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE servers (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                icon_url    TEXT NOT NULL DEFAULT '',
                banner_url  TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE channels (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id       INTEGER NOT NULL REFERENCES servers(id),
                name            TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                group_name      TEXT NOT NULL,
                room_name       TEXT NOT NULL,
                network_name    TEXT NOT NULL,
                network_room    TEXT NOT NULL,
                is_private      INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(group_name, room_name),
                UNIQUE(network_name, network_room)
            );

            CREATE TABLE accounts (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                username     TEXT NOT NULL UNIQUE,
                password     TEXT NOT NULL,
                register_ip  TEXT NOT NULL DEFAULT '',
                login_ip     TEXT NOT NULL DEFAULT '',
                is_admin     INTEGER NOT NULL DEFAULT 0,
                is_blocked   INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE channel_members (
                id                        INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id                INTEGER NOT NULL REFERENCES accounts(id),
                channel_id                INTEGER NOT NULL REFERENCES channels(id),
                lowest_requested_msg_id   INTEGER,
                highest_requested_msg_id  INTEGER,
                unread_msg_id             INTEGER,
                has_write_access          INTEGER NOT NULL DEFAULT 1,
                created_at                TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(account_id, channel_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (webhooks)");
        conn.execute_batch(
            "
            CREATE TABLE webhooks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                name         TEXT NOT NULL,
                token        TEXT NOT NULL,
                server_id    INTEGER NOT NULL REFERENCES servers(id),
                channel_id   INTEGER NOT NULL REFERENCES channels(id),
                owner_id     INTEGER REFERENCES accounts(id),
                register_ip  TEXT NOT NULL DEFAULT '',
                last_use_ip  TEXT NOT NULL DEFAULT '',
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_webhooks_channel ON webhooks(channel_id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    let version =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;
    Ok(version)
}
