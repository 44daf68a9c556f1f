use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bridge_db::Database;
use bridge_db::models::MembershipRow;
use bridge_irc::{ChatNetwork, NetworkEvent};
use bridge_types::events::GatewayEvent;
use bridge_types::models::{Account, Channel, ChatMessage, room_key};

use crate::channels::ChannelRegistry;
use crate::dispatcher::Dispatcher;
use crate::error::{AuthError, HistoryError, IngestError, JoinError};
use crate::history::{History, HistoryQuery};
use crate::queue::{DeliveryQueue, QueuedMessage};
use crate::ratelimit::RateLimiter;
use crate::session::{Session, SessionDirectory};
use crate::{now_ms, typing};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Shared password accepted for names without an account
    pub accounts_password: String,
    /// Bearer secret of the admin endpoints
    pub admin_token: String,
    pub sign_up_token: Option<String>,
    /// Initial value of the runtime "passwords required" switch
    pub require_accounts: bool,
    /// Write flag given to memberships on first join
    pub default_write_access: bool,
}

/// Result of a message accepted on the shared path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Single line relayed, logged and broadcast under this id
    Relayed { id: i64 },
    /// Lines placed on the delivery queue; `dropped` did not fit
    Queued { queued: usize, dropped: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Idle,
    Relayed(i64),
    Dropped(i64),
}

/// Everything the handlers share: registries, history, limiter, queue and
/// the two collaborators.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    require_accounts: AtomicBool,
    db: Arc<Database>,
    network: Arc<dyn ChatNetwork>,
    dispatcher: Dispatcher,
    channels: ChannelRegistry,
    sessions: RwLock<SessionDirectory>,
    history: Mutex<History>,
    limiter: Mutex<RateLimiter>,
    queue: Mutex<DeliveryQueue>,
    /// Serializes id allocation through history append and broadcast
    relay_order: tokio::sync::Mutex<()>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        db: Arc<Database>,
        network: Arc<dyn ChatNetwork>,
        history: History,
    ) -> Result<Self> {
        let channels = ChannelRegistry::load(db.clone())?;
        Ok(Self {
            inner: Arc::new(BridgeInner {
                require_accounts: AtomicBool::new(config.require_accounts),
                config,
                db,
                network,
                dispatcher: Dispatcher::new(),
                channels,
                sessions: RwLock::new(SessionDirectory::new()),
                history: Mutex::new(history),
                limiter: Mutex::new(RateLimiter::new()),
                queue: Mutex::new(DeliveryQueue::new()),
                relay_order: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.inner.channels
    }

    pub fn require_accounts(&self) -> bool {
        self.inner.require_accounts.load(Ordering::SeqCst)
    }

    pub fn set_require_accounts(&self, required: bool) {
        info!("Accounts are now {}", if required { "required" } else { "optional" });
        self.inner.require_accounts.store(required, Ordering::SeqCst);
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.inner.history.lock().expect("history lock poisoned")
    }

    fn limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.inner.limiter.lock().expect("limiter lock poisoned")
    }

    fn queue(&self) -> MutexGuard<'_, DeliveryQueue> {
        self.inner.queue.lock().expect("queue lock poisoned")
    }

    pub fn save_history(&self, path: &Path) -> Result<(), HistoryError> {
        self.history().save(path)
    }

    pub fn latest_message_id(&self) -> i64 {
        self.history().latest_id()
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    // -- Sessions --

    /// Register a new connection and give it a fresh session.
    pub async fn connect(&self, conn_id: Uuid, remote_addr: &str) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let rx = self.inner.dispatcher.register(conn_id).await;
        self.inner.sessions.write().await.create(conn_id, remote_addr);
        debug!("Session created for {} ({})", conn_id, remote_addr);
        rx
    }

    pub async fn disconnect(&self, conn_id: Uuid) {
        let removed = self.inner.sessions.write().await.destroy(conn_id);
        self.inner.dispatcher.unregister(conn_id).await;

        let Some(session) = removed else {
            return;
        };
        if session.is_typing && !session.active_room.is_empty() {
            self.broadcast_typing(&session.active_group, &session.active_room).await;
        }
        if session.logged_in {
            info!("'{}' left", session.display_name);
            self.inner.dispatcher.broadcast(GatewayEvent::UserLeave {
                username: session.display_name,
            });
        }
    }

    pub async fn session(&self, conn_id: Uuid) -> Option<Session> {
        self.inner.sessions.read().await.get(conn_id).cloned()
    }

    pub(crate) async fn with_session_mut<T>(
        &self,
        conn_id: Uuid,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Option<T> {
        self.inner.sessions.write().await.get_mut(conn_id).map(f)
    }

    /// Claim `name` for this connection and mark it logged in. Fails when
    /// another logged-in session already uses the name.
    pub async fn sign_in(&self, conn_id: Uuid, name: &str, account: Option<Account>) -> Result<(), AuthError> {
        let mut sessions = self.inner.sessions.write().await;
        if sessions
            .find_by_display_name(name)
            .is_some_and(|other| other.conn_id != conn_id)
        {
            return Err(AuthError::AlreadyLoggedIn);
        }
        let session = sessions.get_mut(conn_id).ok_or(AuthError::Internal)?;
        session.display_name = name.to_string();
        session.logged_in = true;
        session.account = account;
        Ok(())
    }

    pub async fn logout(&self, conn_id: Uuid, reason: &str) {
        if self.inner.sessions.write().await.logout(conn_id) {
            self.inner
                .dispatcher
                .emit_to(conn_id, GatewayEvent::Logout { message: reason.to_string() })
                .await;
        }
    }

    /// Log out every session. Returns how many were logged in.
    pub async fn logout_all(&self, reason: &str) -> usize {
        let ids = self.inner.sessions.write().await.logout_all();
        for conn_id in &ids {
            self.inner
                .dispatcher
                .emit_to(*conn_id, GatewayEvent::Logout { message: reason.to_string() })
                .await;
        }
        ids.len()
    }

    pub async fn user_names(&self) -> Vec<String> {
        self.inner.sessions.read().await.display_names()
    }

    // -- Typing --

    pub async fn typers(&self, group: &str, room: &str) -> Vec<String> {
        typing::typing_names(&*self.inner.sessions.read().await, group, room, now_ms())
    }

    /// Update a session's typing flag for its active room and push the
    /// room's typing list. Other rooms are ignored.
    pub async fn set_typing(&self, conn_id: Uuid, is_typing: bool, group: &str, room: &str) {
        let require_accounts = self.require_accounts();
        let updated = self
            .with_session_mut(conn_id, |session| {
                if !session.is_in(group, room) || (require_accounts && !session.logged_in) {
                    return false;
                }
                typing::set_typing(session, is_typing, now_ms());
                true
            })
            .await;

        if updated == Some(true) {
            self.broadcast_typing(group, room).await;
        }
    }

    async fn broadcast_typing(&self, group: &str, room: &str) {
        let event = typing_event(&*self.inner.sessions.read().await, group, room);
        self.inner.dispatcher.broadcast_to_room(&room_key(group, room), event).await;
    }

    // -- Channels --

    /// Move a session into (group, room).
    ///
    /// The old room hears "not typing" from this session while the
    /// connection is still subscribed there; then the connection leaves
    /// every room but its private one and enters the room and group rooms.
    /// The session lock is held throughout, so the move is atomic for every
    /// other handler.
    pub async fn join(&self, conn_id: Uuid, group: &str, room: &str) -> Result<(Channel, MembershipRow), JoinError> {
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions.get(conn_id).ok_or(JoinError::NotAuthenticated)?;
        if !session.logged_in {
            return Err(JoinError::NotAuthenticated);
        }
        let channel = self
            .inner
            .channels
            .resolve(group, room)
            .ok_or(JoinError::ChannelNotFound)?;
        let account: Account = session.account.clone().ok_or(JoinError::NoAccount)?;

        let member = self
            .inner
            .channels
            .find_or_create_membership(&account, &channel, self.inner.config.default_write_access)
            .map_err(|e| JoinError::Database(e.to_string()))?;

        let Some(session) = sessions.get_mut(conn_id) else {
            return Err(JoinError::NotAuthenticated);
        };
        let old_group = std::mem::take(&mut session.active_group);
        let old_room = std::mem::take(&mut session.active_room);
        typing::set_typing(session, false, now_ms());

        if !old_room.is_empty() {
            let event = typing_event(&sessions, &old_group, &old_room);
            self.inner
                .dispatcher
                .broadcast_to_room(&room_key(&old_group, &old_room), event)
                .await;
        }

        if let Some(session) = sessions.get_mut(conn_id) {
            session.active_group = channel.group.clone();
            session.active_room = channel.room.clone();
        }

        self.inner
            .dispatcher
            .switch_rooms(conn_id, &[channel.room_key(), channel.group.clone()])
            .await;

        info!("'{}' is now in {}", account.username, channel.room_key());
        Ok((channel, member))
    }

    // -- Message path --

    /// Route a message body into a channel. Single lines go through the rate
    /// limiter and are relayed immediately; bodies with line breaks are split
    /// onto the delivery queue.
    pub async fn submit(
        &self,
        channel: &Channel,
        from: &str,
        body: &str,
        expected_id: Option<i64>,
    ) -> Result<IngestOutcome, IngestError> {
        if body.trim().is_empty() {
            return Err(IngestError::EmptyContent);
        }
        if body.contains('\n') {
            return self.enqueue_lines(channel, from, body).await;
        }
        let id = self.relay_direct(channel, from, body, expected_id).await?;
        Ok(IngestOutcome::Relayed { id })
    }

    async fn relay_direct(
        &self,
        channel: &Channel,
        from: &str,
        body: &str,
        expected_id: Option<i64>,
    ) -> Result<i64, IngestError> {
        let _order = self.inner.relay_order.lock().await;

        if self.limiter().is_rate_limited(body) {
            warn!("Rate limited message from '{}' to {}", from, channel.room_key());
            return Err(IngestError::RateLimited);
        }

        let id = self.history().next_id();
        if let Some(expected) = expected_id.filter(|expected| *expected != id) {
            warn!("Client expected message id {} but got {}", expected, id);
        }

        let line = format!("<{}> {}", from, body);
        if !self.inner.network.say(&channel.network, &channel.network_room, &line) {
            error!("Failed to relay message {} to {}/{}", id, channel.network, channel.network_room);
            return Err(IngestError::RelayFailed);
        }

        info!("[{}] <{}> {}", channel.room_key(), from, body);
        self.publish(channel, ChatMessage::new(id, from, body, &channel.group, &channel.room))
            .await;
        Ok(id)
    }

    async fn enqueue_lines(&self, channel: &Channel, from: &str, body: &str) -> Result<IngestOutcome, IngestError> {
        let _order = self.inner.relay_order.lock().await;

        let lines: Vec<&str> = body
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();

        let mut queue = self.queue();
        if queue.is_full() {
            warn!("Delivery queue full, refusing {} lines from '{}'", lines.len(), from);
            return Err(IngestError::QueueFull);
        }

        let mut history = self.history();
        let mut queued = 0;
        for line in &lines {
            if queue.is_full() {
                break;
            }
            let message = ChatMessage::new(history.next_id(), from, line, &channel.group, &channel.room);
            queue.enqueue(QueuedMessage {
                message,
                channel: channel.clone(),
            });
            queued += 1;
        }

        let dropped = lines.len() - queued;
        if dropped > 0 {
            warn!("Delivery queue filled up, dropped {} of {} lines from '{}'", dropped, lines.len(), from);
        }
        debug!("Queued {} lines for {}, queue length {}", queued, channel.room_key(), queue.len());
        Ok(IngestOutcome::Queued { queued, dropped })
    }

    /// Relay the oldest queued line. Called once per drain tick.
    pub async fn drain_once(&self) -> DrainOutcome {
        let _order = self.inner.relay_order.lock().await;

        let next = self.queue().pop();
        let Some(entry) = next else {
            return DrainOutcome::Idle;
        };

        let id = entry.message.id;
        let line = format!("<{}> {}", entry.message.from, entry.message.message);
        if !self
            .inner
            .network
            .say(&entry.channel.network, &entry.channel.network_room, &line)
        {
            error!("Failed to relay queued message {}, dropping it", id);
            return DrainOutcome::Dropped(id);
        }

        self.publish(&entry.channel, entry.message).await;
        DrainOutcome::Relayed(id)
    }

    /// Append to history and push to the room. Caller holds `relay_order`.
    async fn publish(&self, channel: &Channel, message: ChatMessage) {
        let message = message.scrubbed();
        self.history()
            .log_message(&channel.group, &channel.room, message.clone());
        let reached = self
            .inner
            .dispatcher
            .broadcast_to_room(&channel.room_key(), GatewayEvent::Message(message))
            .await;
        debug!("Message broadcast to {} connections in {}", reached, channel.room_key());
    }

    /// Bring a line from the chat network into its bridged room.
    pub async fn handle_network_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::Message { from, room, text } => {
                let Some(channel) = self
                    .inner
                    .channels
                    .by_network_room(self.inner.network.network(), &room)
                else {
                    debug!("Ignoring message in unbridged room {}", room);
                    return;
                };

                let _order = self.inner.relay_order.lock().await;
                let id = self.history().next_id();
                info!("[{}] {} <{}> {}", channel.room_key(), room, from, text);
                self.publish(&channel, ChatMessage::new(id, &from, &text, &channel.group, &channel.room))
                    .await;
            }
            NetworkEvent::Error(reason) => {
                error!("Chat network error: {}", reason);
            }
        }
    }

    // -- Replay --

    /// Replay from a room's ring. With a session token, an unknown token
    /// yields nothing and a known one advances the account's watermarks.
    pub async fn read_messages(
        &self,
        group: &str,
        room: &str,
        query: &HistoryQuery,
        session_token: Option<&str>,
    ) -> Vec<ChatMessage> {
        let account = match session_token.filter(|t| !t.is_empty()) {
            Some(token) => match self.inner.sessions.read().await.find_by_token(token) {
                Some(session) => session.account.clone(),
                None => return Vec::new(),
            },
            None => None,
        };

        let messages = self.history().get_messages(group, room, query);

        if let Some(account) = account {
            if let Err(e) = self.advance_watermarks(&account, group, room, &messages) {
                error!("Failed to update read position of '{}': {}", account.username, e);
            }
        }
        messages
    }

    fn advance_watermarks(&self, account: &Account, group: &str, room: &str, messages: &[ChatMessage]) -> Result<()> {
        let (Some(lowest), Some(highest)) = (
            messages.iter().map(|m| m.id).min(),
            messages.iter().map(|m| m.id).max(),
        ) else {
            return Ok(());
        };
        let Some(channel) = self.inner.channels.resolve(group, room) else {
            return Ok(());
        };
        let Some(mut member) = self.inner.db.find_membership(account.id, channel.id)? else {
            return Ok(());
        };

        let before = member.clone();
        member.lowest_requested_msg_id = Some(member.lowest_requested_msg_id.map_or(lowest, |l| l.min(lowest)));
        member.highest_requested_msg_id = Some(member.highest_requested_msg_id.map_or(highest, |h| h.max(highest)));
        if member != before {
            self.inner.db.update_membership(&member)?;
        }
        Ok(())
    }
}

fn typing_event(sessions: &SessionDirectory, group: &str, room: &str) -> GatewayEvent {
    GatewayEvent::TypingUsers {
        names: typing::typing_names(sessions, group, room, now_ms()),
        channel: room.to_string(),
        server: group.to_string(),
    }
}
