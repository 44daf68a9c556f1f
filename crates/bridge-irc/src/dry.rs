use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::ChatNetwork;

/// Network stand-in for `DRY_IRC` runs. Logs and remembers every line it
/// would have sent instead of talking to a server.
pub struct DryNetwork {
    network: String,
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl DryNetwork {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following `say` report failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// (room, text) pairs accepted so far, oldest first.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent log lock poisoned").clone()
    }
}

impl ChatNetwork for DryNetwork {
    fn network(&self) -> &str {
        &self.network
    }

    fn say(&self, network: &str, room: &str, text: &str) -> bool {
        if network != self.network {
            warn!("Refusing to relay to unknown network '{}'", network);
            return false;
        }
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        info!("[dry] {} -> {}: {}", network, room, text);
        self.sent.lock().expect("sent log lock poisoned").push((room.to_string(), text.to_string()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_configured_network_is_accepted() {
        let net = DryNetwork::new("quakenet");
        assert!(net.say("quakenet", "#a", "hi"));
        assert!(!net.say("libera", "#a", "hi"));

        net.set_failing(true);
        assert!(!net.say("quakenet", "#a", "again"));

        assert_eq!(net.sent(), vec![("#a".to_string(), "hi".to_string())]);
    }
}
