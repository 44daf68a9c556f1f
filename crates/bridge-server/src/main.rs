mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use bridge_db::Database;
use bridge_gateway::history::History;
use bridge_gateway::{Bridge, DrainOutcome, connection};
use bridge_irc::{ChatNetwork, DryNetwork, IrcClient, NetworkEvent};

use crate::config::Config;

/// Queued lines are relayed one per tick.
const DRAIN_INTERVAL: Duration = Duration::from_millis(1000);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bridge=debug,bridge_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    let history = match History::load(&config.history_path, config.backlog_size) {
        Ok(history) => history,
        Err(e) => {
            eprintln!("FATAL: {}: {}", config.history_path.display(), e);
            std::process::exit(1);
        }
    };

    let rooms = bridged_rooms(&db, &config.irc_network, &config.irc_channel)?;

    let (network, network_rx): (Arc<dyn ChatNetwork>, Option<mpsc::Receiver<NetworkEvent>>) = if config.dry_irc {
        info!("DRY_IRC set, lines for {} are only logged", config.irc_network);
        (Arc::new(DryNetwork::new(config.irc_network.clone())), None)
    } else {
        let (client, rx) = IrcClient::connect(config.irc(rooms)).await?;
        (Arc::new(client), Some(rx))
    };

    let bridge = Bridge::new(config.bridge.clone(), db, network, history)?;
    bridge
        .channels()
        .ensure_network_room(&config.irc_network, &config.irc_channel)?;

    let drain_bridge = bridge.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
        loop {
            ticker.tick().await;
            match drain_bridge.drain_once().await {
                DrainOutcome::Idle => {}
                DrainOutcome::Relayed(id) => debug!("Relayed queued message {}", id),
                DrainOutcome::Dropped(id) => warn!("Dropped queued message {}", id),
            }
        }
    });

    if let Some(mut rx) = network_rx {
        let network_bridge = bridge.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                network_bridge.handle_network_event(event).await;
            }
            error!("Chat network event stream ended");
        });
    }

    let app = bridge_api::routes()
        .route("/gateway", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(bridge.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Bridge listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Err(e) = bridge.save_history(&config.history_path) {
        error!("Failed to save message snapshot: {}", e);
    }
    Ok(())
}

/// Rooms the relay sits in: those already bridged on `network`, plus the
/// configured one.
fn bridged_rooms(db: &Database, network: &str, configured: &str) -> anyhow::Result<Vec<String>> {
    let mut rooms: Vec<String> = db
        .list_channels()?
        .into_iter()
        .filter(|c| c.network_name == network)
        .map(|c| c.network_room)
        .collect();
    if !rooms.iter().any(|r| r.eq_ignore_ascii_case(configured)) {
        rooms.push(configured.to_string());
    }
    Ok(rooms)
}

async fn ws_upgrade(
    State(bridge): State<Bridge>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, bridge, addr.ip().to_string()))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
