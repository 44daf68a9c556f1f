//! Chat-network side of the bridge: the [`ChatNetwork`] seam the gateway
//! relays through, a line-based IRC client behind it, and a dry-run
//! stand-in that only logs.

pub mod client;
pub mod dry;
pub mod message;

pub use client::{IrcClient, IrcConfig};
pub use dry::DryNetwork;

/// Outbound half of the chat network.
///
/// `say` never blocks: it hands the line to the connection task and
/// reports whether that was possible. Calls naming a network other than
/// the one this client is connected to are rejected.
pub trait ChatNetwork: Send + Sync {
    /// Name of the single backing network, e.g. `quakenet`.
    fn network(&self) -> &str;

    fn say(&self, network: &str, room: &str, text: &str) -> bool;
}

/// Inbound events from the chat network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Message {
        from: String,
        room: String,
        text: String,
    },
    Error(String),
}
