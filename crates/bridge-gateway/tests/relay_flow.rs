use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use bridge_db::Database;
use bridge_db::models::NewChannel;
use bridge_gateway::accounts::hash_password;
use bridge_gateway::commands::handle_command;
use bridge_gateway::error::IngestError;
use bridge_gateway::history::{History, HistoryQuery};
use bridge_gateway::{Bridge, BridgeConfig, DrainOutcome, IngestOutcome};
use bridge_irc::{DryNetwork, NetworkEvent};
use bridge_types::events::{GatewayCommand, GatewayEvent};
use bridge_types::models::{Account, Channel, ChatMessage};

struct Fixture {
    bridge: Bridge,
    net: Arc<DryNetwork>,
    r1: Channel,
    r2: Channel,
}

fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let net = Arc::new(DryNetwork::new("quakenet"));
    let config = BridgeConfig {
        accounts_password: "shared".into(),
        admin_token: "admin-secret".into(),
        sign_up_token: None,
        require_accounts: true,
        default_write_access: true,
    };
    let bridge = Bridge::new(config, db, net.clone(), History::new(100)).unwrap();
    let r1 = bridge.channels().create(&room("r1", "#r1")).unwrap();
    let r2 = bridge.channels().create(&room("r2", "#r2")).unwrap();
    Fixture { bridge, net, r1, r2 }
}

fn room<'a>(name: &'a str, network_room: &'a str) -> NewChannel<'a> {
    NewChannel {
        name,
        description: "",
        group_name: "g1",
        room_name: name,
        network_name: "quakenet",
        network_room,
        is_private: false,
    }
}

/// Connect, sign in with a fresh account and join g1/r1.
async fn member(bridge: &Bridge, name: &str) -> (Uuid, UnboundedReceiver<GatewayEvent>) {
    let id = bridge.db().create_account(name, "unused", "127.0.0.1").unwrap();
    let account = Account {
        id,
        username: name.to_string(),
        is_admin: false,
        is_blocked: false,
    };
    let conn = Uuid::new_v4();
    let rx = bridge.connect(conn, "127.0.0.1").await;
    bridge.sign_in(conn, name, Some(account)).await.unwrap();
    bridge.join(conn, "g1", "r1").await.unwrap();
    (conn, rx)
}

fn drain(rx: &mut UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn messages(events: &[GatewayEvent]) -> Vec<ChatMessage> {
    events
        .iter()
        .filter_map(|e| match e {
            GatewayEvent::Message(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

fn all() -> HistoryQuery {
    HistoryQuery::default()
}

#[tokio::test]
async fn single_line_is_relayed_logged_and_pushed_to_the_room() {
    let f = fixture();
    let (_alice, mut rx) = member(&f.bridge, "alice").await;

    let outcome = f.bridge.submit(&f.r1, "alice", "hello", Some(1)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Relayed { id: 1 });

    assert_eq!(f.net.sent(), vec![("#r1".to_string(), "<alice> hello".to_string())]);

    let pushed = messages(&drain(&mut rx));
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].id, 1);
    assert_eq!(pushed[0].from, "alice");
    assert_eq!(pushed[0].server, "g1");
    assert_eq!(pushed[0].channel, "r1");
    assert!(pushed[0].token.is_none());

    let logged = f.bridge.read_messages("g1", "r1", &all(), None).await;
    assert_eq!(logged, pushed);
}

#[tokio::test]
async fn multi_line_body_is_queued_then_drained_in_order() {
    let f = fixture();
    let (_alice, mut rx) = member(&f.bridge, "alice").await;
    f.bridge.submit(&f.r1, "alice", "hello", None).await.unwrap();
    drain(&mut rx);

    let outcome = f.bridge.submit(&f.r1, "bob", "hi\nthere", None).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Queued { queued: 2, dropped: 0 });
    assert_eq!(f.bridge.queue_len(), 2);
    assert!(messages(&drain(&mut rx)).is_empty());

    assert_eq!(f.bridge.drain_once().await, DrainOutcome::Relayed(2));
    assert_eq!(f.bridge.drain_once().await, DrainOutcome::Relayed(3));
    assert_eq!(f.bridge.drain_once().await, DrainOutcome::Idle);

    let bodies: Vec<String> = messages(&drain(&mut rx)).into_iter().map(|m| m.message).collect();
    assert_eq!(bodies, vec!["hi", "there"]);
    assert_eq!(
        f.net.sent().last(),
        Some(&("#r1".to_string(), "<bob> there".to_string()))
    );
}

#[tokio::test]
async fn sixth_rapid_message_is_rate_limited() {
    let f = fixture();
    for i in 1..=5 {
        let outcome = f.bridge.submit(&f.r1, "alice", &format!("m{}", i), None).await;
        assert_eq!(outcome, Ok(IngestOutcome::Relayed { id: i }));
    }

    let sixth = f.bridge.submit(&f.r1, "alice", "m6", None).await;
    assert_eq!(sixth, Err(IngestError::RateLimited));
    assert_eq!(f.bridge.read_messages("g1", "r1", &all(), None).await.len(), 5);
    assert_eq!(f.net.sent().len(), 5);
}

#[tokio::test]
async fn empty_bodies_are_rejected() {
    let f = fixture();
    assert_eq!(
        f.bridge.submit(&f.r1, "alice", "   ", None).await,
        Err(IngestError::EmptyContent)
    );
    assert_eq!(f.bridge.latest_message_id(), 0);
}

#[tokio::test]
async fn queue_takes_what_fits_and_then_refuses() {
    let f = fixture();
    let body: Vec<String> = (0..55).map(|i| format!("line {}", i)).collect();

    let outcome = f.bridge.submit(&f.r1, "alice", &body.join("\n"), None).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Queued { queued: 50, dropped: 5 });

    let again = f.bridge.submit(&f.r1, "alice", "a\nb", None).await;
    assert_eq!(again, Err(IngestError::QueueFull));

    assert_eq!(f.bridge.drain_once().await, DrainOutcome::Relayed(1));
    assert_eq!(f.bridge.queue_len(), 49);
}

#[tokio::test]
async fn relay_failure_leaves_history_untouched() {
    let f = fixture();
    f.net.set_failing(true);

    assert_eq!(
        f.bridge.submit(&f.r1, "alice", "lost", None).await,
        Err(IngestError::RelayFailed)
    );
    f.bridge.submit(&f.r1, "alice", "a\nb", None).await.unwrap();
    assert_eq!(f.bridge.drain_once().await, DrainOutcome::Dropped(2));

    assert!(f.bridge.read_messages("g1", "r1", &all(), None).await.is_empty());
}

#[tokio::test]
async fn webhook_credentials_must_match_exactly() {
    let f = fixture();
    let hook = f
        .bridge
        .db()
        .create_webhook("ci", "s3cret", f.r1.server_id, f.r1.id, None, "10.0.0.1")
        .unwrap();
    let id = hook.to_string();

    assert_eq!(
        f.bridge.execute_webhook(&id, "wrong", "build ok", "10.0.0.2").await,
        Err(IngestError::NotFound)
    );
    assert_eq!(
        f.bridge.execute_webhook("nope", "s3cret", "build ok", "10.0.0.2").await,
        Err(IngestError::NotFound)
    );

    let outcome = f.bridge.execute_webhook(&id, "s3cret", "build ok", "10.0.0.2").await;
    assert_eq!(outcome, Ok(IngestOutcome::Relayed { id: 1 }));
    assert_eq!(f.net.sent(), vec![("#r1".to_string(), "<ci> build ok".to_string())]);

    let logged = f.bridge.read_messages("g1", "r1", &all(), None).await;
    assert_eq!(logged[0].from, "ci");
}

#[tokio::test]
async fn network_lines_reach_the_bridged_room() {
    let f = fixture();
    let (_alice, mut rx) = member(&f.bridge, "alice").await;

    f.bridge
        .handle_network_event(NetworkEvent::Message {
            from: "carol".into(),
            room: "#R1".into(),
            text: "yo".into(),
        })
        .await;
    f.bridge
        .handle_network_event(NetworkEvent::Message {
            from: "dave".into(),
            room: "#elsewhere".into(),
            text: "ignored".into(),
        })
        .await;

    let pushed = messages(&drain(&mut rx));
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].from, "carol");
    assert_eq!(pushed[0].id, 1);
    assert!(f.net.sent().is_empty());
}

#[tokio::test]
async fn join_tells_the_old_room_before_leaving_it() {
    let f = fixture();
    let (alice, mut alice_rx) = member(&f.bridge, "alice").await;
    let (_bob, mut bob_rx) = member(&f.bridge, "bob").await;

    f.bridge.set_typing(alice, true, "g1", "r1").await;
    assert_eq!(f.bridge.typers("g1", "r1").await, vec!["alice"]);
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    f.bridge.join(alice, "g1", "r2").await.unwrap();

    let cleared = GatewayEvent::TypingUsers {
        names: vec![],
        channel: "r1".into(),
        server: "g1".into(),
    };
    assert_eq!(drain(&mut alice_rx), vec![cleared.clone()]);
    assert_eq!(drain(&mut bob_rx), vec![cleared]);

    let rooms = f.bridge.dispatcher().rooms_of(alice).await;
    assert_eq!(rooms, {
        let mut expected = vec![alice.to_string(), "g1".to_string(), f.r2.room_key()];
        expected.sort();
        expected
    });

    // the old room no longer reaches alice
    f.bridge.submit(&f.r1, "bob", "still here?", None).await.unwrap();
    assert!(messages(&drain(&mut alice_rx)).is_empty());
    assert_eq!(messages(&drain(&mut bob_rx)).len(), 1);
}

#[tokio::test]
async fn reading_with_a_session_token_moves_watermarks() {
    let f = fixture();
    let (alice, _rx) = member(&f.bridge, "alice").await;
    for body in ["one", "two", "three"] {
        f.bridge.submit(&f.r1, "bob", body, None).await.unwrap();
    }
    let token = f.bridge.session(alice).await.unwrap().token;
    let account = f.bridge.session(alice).await.unwrap().account.unwrap();

    let query = HistoryQuery {
        from_id: 2,
        count: 1,
        ..Default::default()
    };
    let read = f.bridge.read_messages("g1", "r1", &query, Some(&token)).await;
    assert_eq!(read.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2]);

    let member = f.bridge.db().find_membership(account.id, f.r1.id).unwrap().unwrap();
    assert_eq!(member.lowest_requested_msg_id, Some(2));
    assert_eq!(member.highest_requested_msg_id, Some(2));

    f.bridge.read_messages("g1", "r1", &all(), Some(&token)).await;
    let member = f.bridge.db().find_membership(account.id, f.r1.id).unwrap().unwrap();
    assert_eq!(member.lowest_requested_msg_id, Some(1));
    assert_eq!(member.highest_requested_msg_id, Some(3));

    assert!(
        f.bridge
            .read_messages("g1", "r1", &all(), Some("not-a-token"))
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn register_then_log_in_over_commands() {
    let f = fixture();
    let conn = Uuid::new_v4();
    let mut rx = f.bridge.connect(conn, "10.0.0.9").await;
    let mut everyone = f.bridge.dispatcher().subscribe();

    handle_command(
        &f.bridge,
        conn,
        GatewayCommand::Register {
            username: "alice".into(),
            password: "pw123".into(),
            token: String::new(),
        },
    )
    .await;
    match drain(&mut rx).as_slice() {
        [GatewayEvent::AuthResponse { success: true, message, .. }] => {
            assert_eq!(message, "Successfully registered! You can now log in!")
        }
        other => panic!("unexpected events: {:?}", other),
    }

    handle_command(
        &f.bridge,
        conn,
        GatewayCommand::Auth {
            username: "alice".into(),
            password: "pw123".into(),
            channel: "r1".into(),
            server: "g1".into(),
        },
    )
    .await;

    let events = drain(&mut rx);
    assert!(matches!(events[0], GatewayEvent::JoinChannelResponse { success: true, .. }));
    match &events[1] {
        GatewayEvent::AuthResponse { success, token, .. } => {
            assert!(*success);
            assert_eq!(token, &f.bridge.session(conn).await.unwrap().token);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(
        everyone.try_recv().unwrap(),
        GatewayEvent::UserJoin { username: "alice".into() }
    );
    assert_eq!(f.bridge.user_names().await, vec!["alice"]);

    // same name from a second connection
    let other = Uuid::new_v4();
    let mut other_rx = f.bridge.connect(other, "10.0.0.10").await;
    handle_command(
        &f.bridge,
        other,
        GatewayCommand::Auth {
            username: "alice".into(),
            password: "pw123".into(),
            channel: "r1".into(),
            server: "g1".into(),
        },
    )
    .await;
    assert_eq!(
        drain(&mut other_rx),
        vec![GatewayEvent::auth_failure("this username is already logged in")]
    );
}

#[tokio::test]
async fn client_messages_must_match_the_session() {
    let f = fixture();
    let hash = hash_password("pw123").unwrap();
    f.bridge.db().create_account("alice", &hash, "").unwrap();

    let conn = Uuid::new_v4();
    let mut rx = f.bridge.connect(conn, "10.0.0.9").await;
    handle_command(
        &f.bridge,
        conn,
        GatewayCommand::Auth {
            username: "alice".into(),
            password: "pw123".into(),
            channel: "r1".into(),
            server: "g1".into(),
        },
    )
    .await;
    drain(&mut rx);
    let token = f.bridge.session(conn).await.unwrap().token;

    let send = |room: &str, token: Option<String>| GatewayCommand::Message {
        id: 0,
        from: "alice".into(),
        message: "hey".into(),
        channel: room.to_string(),
        server: "g1".into(),
        token,
    };

    // wrong token and wrong room are dropped silently
    handle_command(&f.bridge, conn, send("r1", Some("bogus".into()))).await;
    handle_command(&f.bridge, conn, send("r2", Some(token.clone()))).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(f.bridge.latest_message_id(), 0);

    handle_command(&f.bridge, conn, send("r1", Some(token))).await;
    let pushed = messages(&drain(&mut rx));
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].message, "hey");
}

#[tokio::test]
async fn shared_password_login_without_account_cannot_join() {
    let f = fixture();
    let conn = Uuid::new_v4();
    let mut rx = f.bridge.connect(conn, "10.0.0.9").await;

    handle_command(
        &f.bridge,
        conn,
        GatewayCommand::Auth {
            username: "guest".into(),
            password: "shared".into(),
            channel: "r1".into(),
            server: "g1".into(),
        },
    )
    .await;

    let events = drain(&mut rx);
    assert!(matches!(events[0], GatewayEvent::JoinChannelResponse { success: false, .. }));
    assert_eq!(events[1], GatewayEvent::auth_failure("failed to join channel"));
    assert!(!f.bridge.session(conn).await.unwrap().logged_in);
}

#[tokio::test]
async fn logout_all_notifies_logged_in_sessions() {
    let f = fixture();
    let (alice, mut alice_rx) = member(&f.bridge, "alice").await;
    let idle = Uuid::new_v4();
    let mut idle_rx = f.bridge.connect(idle, "10.0.0.3").await;

    assert_eq!(f.bridge.logout_all("server maintenance").await, 1);
    assert_eq!(
        drain(&mut alice_rx),
        vec![GatewayEvent::Logout { message: "server maintenance".into() }]
    );
    assert!(drain(&mut idle_rx).is_empty());
    assert!(!f.bridge.session(alice).await.unwrap().logged_in);

}

#[tokio::test]
async fn admins_manage_webhooks_over_commands() {
    let f = fixture();
    let hash = hash_password("pw123").unwrap();
    let admin_id = f.bridge.db().create_account("root", &hash, "").unwrap();
    f.bridge.db().set_account_flags(admin_id, true, false).unwrap();
    f.bridge.db().create_account("alice", &hash, "").unwrap();

    let mut sessions = Vec::new();
    for name in ["root", "alice"] {
        let conn = Uuid::new_v4();
        let mut rx = f.bridge.connect(conn, "10.0.0.9").await;
        handle_command(
            &f.bridge,
            conn,
            GatewayCommand::Auth {
                username: name.into(),
                password: "pw123".into(),
                channel: "r1".into(),
                server: "g1".into(),
            },
        )
        .await;
        drain(&mut rx);
        sessions.push((conn, rx));
    }
    let (root, root_rx) = &mut sessions[0];
    let root = *root;

    handle_command(
        &f.bridge,
        root,
        GatewayCommand::NewWebhook {
            channel_id: f.r1.id,
            name: "deploys".into(),
        },
    )
    .await;
    let hooks = match drain(root_rx).as_slice() {
        [GatewayEvent::Webhooks { webhooks }] => webhooks.clone(),
        other => panic!("unexpected events: {:?}", other),
    };
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].name, "deploys");
    assert_eq!(hooks[0].channel_id, f.r1.id);
    assert_eq!(hooks[0].token.len(), 32);

    // the listed credentials work on the ingestion gate
    let outcome = f
        .bridge
        .execute_webhook(&hooks[0].id.to_string(), &hooks[0].token, "shipped", "")
        .await;
    assert_eq!(outcome, Ok(IngestOutcome::Relayed { id: 1 }));

    let (alice, alice_rx) = &mut sessions[1];
    let alice = *alice;
    handle_command(&f.bridge, alice, GatewayCommand::NewWebhook { channel_id: f.r1.id, name: "x".into() }).await;
    handle_command(&f.bridge, alice, GatewayCommand::WebhooksRequest { server_id: f.r1.server_id }).await;
    let events = drain(alice_rx);
    let listed: Vec<&GatewayEvent> = events
        .iter()
        .filter(|e| matches!(e, GatewayEvent::Webhooks { .. }))
        .collect();
    assert_eq!(listed, vec![&GatewayEvent::Webhooks { webhooks: vec![] }]);

    handle_command(&f.bridge, alice, GatewayCommand::ConnectedServerListRequest).await;
    match drain(alice_rx).as_slice() {
        [GatewayEvent::ConnectedServerList { servers }] => {
            assert_eq!(servers.len(), 1);
            assert_eq!(servers[0].name, "g1");
            let names: Vec<&str> = servers[0].channels.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["r1", "r2"]);
        }
        other => panic!("unexpected events: {:?}", other),
    }
}
