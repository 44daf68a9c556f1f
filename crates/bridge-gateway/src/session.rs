use std::collections::HashMap;

use rand::Rng;
use rand::distr::Alphanumeric;
use uuid::Uuid;

use bridge_types::models::Account;

const TOKEN_LEN: usize = 32;

/// Connection-scoped state of one client. Never persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: Uuid,
    pub display_name: String,
    /// Correlates HTTP requests with this connection. Not a security boundary.
    pub token: String,
    pub logged_in: bool,
    pub active_group: String,
    pub active_room: String,
    pub is_typing: bool,
    pub last_typing_ms: i64,
    pub account: Option<Account>,
    pub remote_addr: String,
}

impl Session {
    fn new(conn_id: Uuid, remote_addr: String) -> Self {
        Self {
            conn_id,
            display_name: String::new(),
            token: random_token(),
            logged_in: false,
            active_group: String::new(),
            active_room: String::new(),
            is_typing: false,
            last_typing_ms: 0,
            account: None,
            remote_addr,
        }
    }

    pub fn is_in(&self, group: &str, room: &str) -> bool {
        self.active_group == group && self.active_room == room
    }
}

/// Live sessions keyed by connection id.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: HashMap<Uuid, Session>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, conn_id: Uuid, remote_addr: impl Into<String>) -> &Session {
        self.sessions
            .entry(conn_id)
            .insert_entry(Session::new(conn_id, remote_addr.into()))
            .into_mut()
    }

    /// Remove a session. The caller announces the departure when the returned
    /// session had logged in.
    pub fn destroy(&mut self, conn_id: Uuid) -> Option<Session> {
        self.sessions.remove(&conn_id)
    }

    pub fn get(&self, conn_id: Uuid) -> Option<&Session> {
        self.sessions.get(&conn_id)
    }

    pub fn get_mut(&mut self, conn_id: Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(&conn_id)
    }

    /// Logged-in session currently using `name`.
    pub fn find_by_display_name(&self, name: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.logged_in && s.display_name == name)
    }

    /// Logged-in session holding `token`.
    pub fn find_by_token(&self, token: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.logged_in && s.token == token)
    }

    /// End a login without dropping the connection. Returns false for
    /// unknown connections.
    pub fn logout(&mut self, conn_id: Uuid) -> bool {
        match self.sessions.get_mut(&conn_id) {
            Some(session) => {
                session.logged_in = false;
                session.account = None;
                session.is_typing = false;
                true
            }
            None => false,
        }
    }

    /// Log out every logged-in session and return their connection ids.
    pub fn logout_all(&mut self) -> Vec<Uuid> {
        let ids: Vec<Uuid> = self
            .sessions
            .values()
            .filter(|s| s.logged_in)
            .map(|s| s.conn_id)
            .collect();
        for id in &ids {
            self.logout(*id);
        }
        ids
    }

    /// Display names of logged-in sessions, sorted.
    pub fn display_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.logged_in)
            .map(|s| s.display_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// 32 random alphanumeric characters.
pub(crate) fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
