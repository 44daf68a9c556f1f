use std::collections::VecDeque;

use crate::now_ms;

/// Rolling window the burst log covers.
pub const WINDOW_MS: i64 = 8000;
/// Rapid sends the window may hold before every send is refused.
pub const BURST: usize = 5;
/// Sends closer together than this count as rapid.
pub const SPACING_MS: i64 = 3000;

/// One process-wide send window shared by every session and webhook.
///
/// Only rapid sends are logged, but a full log refuses everything until its
/// oldest entries age out. The previous-send time starts at construction, so
/// a send right after startup already counts as rapid.
///
/// Bodies with embedded line breaks are always refused here; those take the
/// delivery queue instead.
#[derive(Debug)]
pub struct RateLimiter {
    log: VecDeque<i64>,
    last_sent_ms: i64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::starting_at(now_ms())
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: i64) -> Self {
        Self {
            log: VecDeque::new(),
            last_sent_ms: now,
        }
    }

    pub fn is_rate_limited(&mut self, body: &str) -> bool {
        self.check_at(body, now_ms())
    }

    /// Decide for a send at `now`, updating the window on acceptance.
    pub fn check_at(&mut self, body: &str, now: i64) -> bool {
        if body.contains('\n') {
            return true;
        }

        while self.log.front().is_some_and(|t| now - t > WINDOW_MS) {
            self.log.pop_front();
        }
        if self.log.len() >= BURST {
            return true;
        }

        let gap = now - self.last_sent_ms;
        self.last_sent_ms = now;
        if gap < SPACING_MS {
            self.log.push_back(now);
        }
        false
    }
}
