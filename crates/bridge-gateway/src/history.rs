use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use bridge_types::models::{ChatMessage, room_key};

use crate::error::HistoryError;

/// Replay options for [`History::get_messages`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// 0 means "the most recent messages"
    pub from_id: i64,
    /// 0 means unbounded
    pub count: usize,
    /// Substring matched against body or sender
    pub search: Option<String>,
    /// Regex matched against body or sender; ignored when `search` is set
    pub pattern: Option<String>,
}

/// Message sequencer plus one bounded ring per room.
pub struct History {
    backlog_size: usize,
    rooms: HashMap<String, VecDeque<ChatMessage>>,
    latest_id: i64,
}

impl History {
    pub fn new(backlog_size: usize) -> Self {
        Self {
            backlog_size,
            rooms: HashMap::new(),
            latest_id: 0,
        }
    }

    /// Restore rings from a snapshot. A missing file yields empty history;
    /// any record lacking a required field is an error.
    pub fn load(path: &Path, backlog_size: usize) -> Result<Self, HistoryError> {
        let mut history = Self::new(backlog_size);
        if !path.exists() {
            info!("No message snapshot at {}, starting empty", path.display());
            return Ok(history);
        }

        let raw = fs::read_to_string(path)?;
        let rooms: HashMap<String, Vec<ChatMessage>> = serde_json::from_str(&raw)?;

        let mut total = 0;
        for (key, messages) in rooms {
            total += messages.len();
            let mut ring: VecDeque<ChatMessage> = messages.into();
            while ring.len() > backlog_size {
                ring.pop_front();
            }
            history.rooms.insert(key, ring);
        }
        history.latest_id = history
            .rooms
            .values()
            .flat_map(|ring| ring.iter().map(|m| m.id))
            .max()
            .unwrap_or(0);

        info!("Loaded {} messages, continuing at id {}", total, history.latest_id);
        Ok(history)
    }

    /// Write every ring to `path` in one piece.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        let rooms: HashMap<&String, Vec<&ChatMessage>> = self
            .rooms
            .iter()
            .map(|(key, ring)| (key, ring.iter().collect()))
            .collect();
        let json = serde_json::to_string(&rooms)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        info!("Saved message snapshot to {}", path.display());
        Ok(())
    }

    pub fn next_id(&mut self) -> i64 {
        self.latest_id += 1;
        self.latest_id
    }

    pub fn latest_id(&self) -> i64 {
        self.latest_id
    }

    pub fn log_message(&mut self, group: &str, room: &str, message: ChatMessage) {
        let ring = self.rooms.entry(room_key(group, room)).or_default();
        ring.push_back(message);
        while ring.len() > self.backlog_size {
            ring.pop_front();
        }
    }

    pub fn get_messages(&self, group: &str, room: &str, query: &HistoryQuery) -> Vec<ChatMessage> {
        let Some(ring) = self.rooms.get(&room_key(group, room)) else {
            return Vec::new();
        };

        let filter = MessageFilter::new(query);
        let matching = ring.iter().filter(|m| filter.matches(m));

        if query.from_id <= 0 {
            let matching: Vec<&ChatMessage> = matching.collect();
            let skip = match query.count {
                0 => 0,
                count => matching.len().saturating_sub(count),
            };
            return matching.into_iter().skip(skip).cloned().collect();
        }

        let limit = if query.count == 0 { usize::MAX } else { query.count };
        matching
            .filter(|m| m.id >= query.from_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

enum MessageFilter {
    All,
    Substring(String),
    Pattern(Regex),
}

impl MessageFilter {
    fn new(query: &HistoryQuery) -> Self {
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            return Self::Substring(search.to_string());
        }
        match query.pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => Self::Pattern(re),
                Err(e) => {
                    debug!("Ignoring invalid history pattern '{}': {}", pattern, e);
                    Self::All
                }
            },
            None => Self::All,
        }
    }

    fn matches(&self, message: &ChatMessage) -> bool {
        match self {
            Self::All => true,
            Self::Substring(s) => message.message.contains(s.as_str()) || message.from.contains(s.as_str()),
            Self::Pattern(re) => re.is_match(&message.message) || re.is_match(&message.from),
        }
    }
}
