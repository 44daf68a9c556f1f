pub mod accounts;
pub mod bridge;
pub mod channels;
pub mod commands;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod ingest;
pub mod queue;
pub mod ratelimit;
pub mod session;
pub mod typing;

pub use bridge::{Bridge, BridgeConfig, DrainOutcome, IngestOutcome};

/// Wall clock in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
