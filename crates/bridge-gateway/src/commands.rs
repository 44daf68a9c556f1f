use tracing::{info, warn};
use uuid::Uuid;

use bridge_types::api::{ChannelInfo, ServerInfo, WebhookObject};
use bridge_types::events::{GatewayCommand, GatewayEvent};
use bridge_types::models::Account;

use crate::accounts::{self, Registration};
use crate::bridge::Bridge;
use crate::error::{AuthError, JoinError};
use crate::session::random_token;

/// Handle one command from a client connection.
pub async fn handle_command(bridge: &Bridge, conn_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Auth {
            username,
            password,
            channel,
            server,
        } => {
            authenticate(bridge, conn_id, &username, &password, &server, &channel).await;
        }

        GatewayCommand::Register {
            username,
            password,
            token,
        } => {
            let event = match register(bridge, conn_id, &username, &password, &token).await {
                Ok(()) => {
                    info!("Registered account '{}'", username);
                    GatewayEvent::AuthResponse {
                        username,
                        admin: false,
                        token: String::new(),
                        message: "Successfully registered! You can now log in!".into(),
                        success: true,
                    }
                }
                Err(e) => {
                    info!("Registration of '{}' refused: {}", username, e);
                    GatewayEvent::auth_failure(e.to_string())
                }
            };
            bridge.dispatcher().emit_to(conn_id, event).await;
        }

        GatewayCommand::JoinChannel { channel, server, .. } => {
            let _ = join_channel(bridge, conn_id, &server, &channel).await;
        }

        GatewayCommand::Typing {
            is_typing,
            channel,
            server,
        } => {
            bridge.set_typing(conn_id, is_typing, &server, &channel).await;
        }

        GatewayCommand::Message {
            id,
            from,
            message,
            channel,
            server,
            token,
        } => {
            client_message(bridge, conn_id, id, &from, &message, &server, &channel, token.as_deref()).await;
        }

        GatewayCommand::WebhooksRequest { server_id } => {
            let webhooks = list_webhooks(bridge, conn_id, server_id).await;
            bridge
                .dispatcher()
                .emit_to(conn_id, GatewayEvent::Webhooks { webhooks })
                .await;
        }

        GatewayCommand::NewWebhook { channel_id, name } => {
            new_webhook(bridge, conn_id, channel_id, &name).await;
        }

        GatewayCommand::ConnectedServerListRequest => {
            if let Some(servers) = server_list(bridge, conn_id).await {
                bridge
                    .dispatcher()
                    .emit_to(conn_id, GatewayEvent::ConnectedServerList { servers })
                    .await;
            }
        }
    }
}

async fn authenticate(bridge: &Bridge, conn_id: Uuid, username: &str, password: &str, group: &str, room: &str) {
    let account = match login(bridge, conn_id, username, password).await {
        Ok(account) => account,
        Err(e) => {
            info!("Login of '{}' refused: {}", username, e);
            bridge
                .dispatcher()
                .emit_to(conn_id, GatewayEvent::auth_failure(e.to_string()))
                .await;
            return;
        }
    };

    if join_channel(bridge, conn_id, group, room).await.is_err() {
        bridge
            .with_session_mut(conn_id, |session| {
                session.logged_in = false;
                session.account = None;
            })
            .await;
        bridge
            .dispatcher()
            .emit_to(conn_id, GatewayEvent::auth_failure(AuthError::JoinFailed.to_string()))
            .await;
        return;
    }

    info!(
        "'{}' logged in {}",
        username,
        if account.is_some() { "to account" } else { "with shared password" }
    );
    bridge.dispatcher().broadcast(GatewayEvent::UserJoin {
        username: username.to_string(),
    });

    let token = bridge.session(conn_id).await.map(|s| s.token).unwrap_or_default();
    bridge
        .dispatcher()
        .emit_to(
            conn_id,
            GatewayEvent::AuthResponse {
                username: username.to_string(),
                admin: account.is_some_and(|a| a.is_admin),
                token,
                message: "logged in".into(),
                success: true,
            },
        )
        .await;
}

/// Check credentials and claim the display name.
async fn login(bridge: &Bridge, conn_id: Uuid, username: &str, password: &str) -> Result<Option<Account>, AuthError> {
    let row = bridge
        .db()
        .get_account_by_username(username)
        .map_err(|_| AuthError::Internal)?;
    let name_taken = row.is_some();
    let account = row.filter(|r| accounts::verify_password(password, &r.password));

    let valid = !bridge.require_accounts()
        || account.is_some()
        || password == bridge.config().accounts_password;
    if !valid {
        return Err(AuthError::WrongCredentials);
    }
    if account.as_ref().is_some_and(|a| a.is_blocked) {
        return Err(AuthError::Blocked);
    }
    if account.is_none() && name_taken {
        return Err(AuthError::NeedsDifferentPassword);
    }

    let linked = account.as_ref().map(Account::from);
    bridge.sign_in(conn_id, username, linked.clone()).await?;

    if let Some(row) = &account {
        let ip = bridge.session(conn_id).await.map(|s| s.remote_addr).unwrap_or_default();
        if let Err(e) = bridge.db().record_login(row.id, &ip) {
            warn!("Failed to record login of '{}': {}", username, e);
        }
    }
    Ok(linked)
}

async fn register(bridge: &Bridge, conn_id: Uuid, username: &str, password: &str, token: &str) -> Result<(), AuthError> {
    let config = bridge.config();
    let required_token = config.sign_up_token.as_deref();
    accounts::validate_registration(
        &Registration {
            username,
            password,
            sign_up_token: token,
        },
        &config.accounts_password,
        required_token,
    )?;

    if bridge
        .db()
        .get_account_by_username(username)
        .map_err(|_| AuthError::Internal)?
        .is_some()
    {
        return Err(AuthError::UsernameTaken);
    }
    accounts::check_sign_up_token(token, required_token)?;

    let hash = accounts::hash_password(password)?;
    let ip = bridge.session(conn_id).await.map(|s| s.remote_addr).unwrap_or_default();
    bridge
        .db()
        .create_account(username, &hash, &ip)
        .map_err(|_| AuthError::Internal)?;
    Ok(())
}

/// Join and report the outcome to the client.
async fn join_channel(bridge: &Bridge, conn_id: Uuid, group: &str, room: &str) -> Result<(), JoinError> {
    let event = match bridge.join(conn_id, group, room).await {
        Ok((channel, member)) => GatewayEvent::JoinChannelResponse {
            message: String::new(),
            success: true,
            channel: channel.room,
            server: channel.group,
            unread_msg_id: member.highest_requested_msg_id,
            channel_id: channel.id,
            server_id: channel.server_id,
        },
        Err(e) => {
            warn!("{} could not join {}#{}: {}", conn_id, group, room, e);
            bridge
                .dispatcher()
                .emit_to(
                    conn_id,
                    GatewayEvent::JoinChannelResponse {
                        message: e.to_string(),
                        success: false,
                        channel: room.to_string(),
                        server: group.to_string(),
                        unread_msg_id: None,
                        channel_id: 0,
                        server_id: 0,
                    },
                )
                .await;
            return Err(e);
        }
    };
    bridge.dispatcher().emit_to(conn_id, event).await;
    Ok(())
}

/// Checks a client's message against its session, then hands it to the
/// shared message path. Inconsistent requests are dropped without a reply.
#[allow(clippy::too_many_arguments)]
async fn client_message(
    bridge: &Bridge,
    conn_id: Uuid,
    expected_id: i64,
    from: &str,
    body: &str,
    group: &str,
    room: &str,
    token: Option<&str>,
) {
    let Some(session) = bridge.session(conn_id).await else {
        return;
    };

    if bridge.require_accounts() && (session.display_name != from || token != Some(session.token.as_str())) {
        warn!("Invalid token on message from '{}' ({})", from, conn_id);
        return;
    }
    if !session.logged_in {
        warn!("Connection {} sent a message without logging in", conn_id);
        return;
    }
    if !session.is_in(group, room) {
        warn!(
            "'{}' tried to send to {}#{} while in {}#{}",
            session.display_name, group, room, session.active_group, session.active_room
        );
        return;
    }
    let Some(channel) = bridge.channels().resolve(group, room) else {
        warn!("No channel maps {}#{}", group, room);
        return;
    };

    if channel.is_private && session.account.is_none() {
        alert(bridge, conn_id, "This is a private channel please login to your account").await;
        return;
    }
    if let Some(account) = &session.account {
        match bridge.db().find_membership(account.id, channel.id) {
            Ok(Some(member)) if !member.has_write_access => {
                alert(bridge, conn_id, "You do not have write access in this channel").await;
                return;
            }
            Ok(_) => {}
            Err(e) => warn!("Membership lookup for '{}' failed: {}", account.username, e),
        }
    }

    let expected = (expected_id > 0).then_some(expected_id);
    if let Err(e) = bridge.submit(&channel, &session.display_name, body, expected).await {
        alert(bridge, conn_id, &e.to_string()).await;
    }
}

async fn alert(bridge: &Bridge, conn_id: Uuid, message: &str) {
    bridge.dispatcher().emit_to(conn_id, GatewayEvent::alert(message)).await;
}

/// Current, unblocked account behind a session, re-read from the database.
async fn session_account(bridge: &Bridge, conn_id: Uuid) -> Option<Account> {
    let session = bridge.session(conn_id).await?;
    let linked = session.account?;
    let row = bridge.db().get_account_by_id(linked.id).ok().flatten()?;
    if row.is_blocked {
        warn!("Blocked account '{}' sent a request", row.username);
        return None;
    }
    Some(Account::from(&row))
}

/// Webhooks of a group. Tokens are secrets, so only admins get a list.
async fn list_webhooks(bridge: &Bridge, conn_id: Uuid, server_id: i64) -> Vec<WebhookObject> {
    match session_account(bridge, conn_id).await {
        Some(account) if account.is_admin => {}
        _ => return Vec::new(),
    }
    match bridge.db().list_webhooks_for_server(server_id) {
        Ok(rows) => rows.iter().map(WebhookObject::from).collect(),
        Err(e) => {
            warn!("Failed to list webhooks of server {}: {}", server_id, e);
            Vec::new()
        }
    }
}

async fn new_webhook(bridge: &Bridge, conn_id: Uuid, channel_id: i64, name: &str) {
    let Some(channel) = bridge.channels().by_id(channel_id) else {
        warn!("Failed to create webhook: channel {} not found", channel_id);
        return;
    };
    let Some(account) = session_account(bridge, conn_id).await else {
        warn!("Failed to create webhook: {} is not logged in to an account", conn_id);
        return;
    };
    if !account.is_admin {
        warn!("Failed to create webhook: '{}' is not an admin", account.username);
        return;
    }

    let ip = bridge.session(conn_id).await.map(|s| s.remote_addr).unwrap_or_default();
    let token = random_token();
    match bridge
        .db()
        .create_webhook(name, &token, channel.server_id, channel.id, Some(account.id), &ip)
    {
        Ok(id) => {
            info!("Created webhook {} '{}' for {}", id, name, channel.room_key());
            let webhooks = list_webhooks(bridge, conn_id, channel.server_id).await;
            bridge
                .dispatcher()
                .emit_to(conn_id, GatewayEvent::Webhooks { webhooks })
                .await;
        }
        Err(e) => warn!("Failed to create webhook '{}': {}", name, e),
    }
}

async fn server_list(bridge: &Bridge, conn_id: Uuid) -> Option<Vec<ServerInfo>> {
    session_account(bridge, conn_id).await?;
    let servers = match bridge.db().list_servers() {
        Ok(servers) => servers,
        Err(e) => {
            warn!("Failed to list servers: {}", e);
            return None;
        }
    };
    Some(
        servers
            .into_iter()
            .map(|server| ServerInfo {
                channels: bridge
                    .channels()
                    .in_server(server.id)
                    .iter()
                    .map(ChannelInfo::from)
                    .collect(),
                id: server.id,
                name: server.name,
                icon_url: server.icon_url,
                banner_url: server.banner_url,
            })
            .collect(),
    )
}
