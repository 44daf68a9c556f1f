use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use bridge_gateway::Bridge;
use bridge_gateway::history::HistoryQuery;
use bridge_types::models::ChatMessage;

const DEFAULT_COUNT: usize = 10;

/// Query string of the replay endpoint. Everything arrives as text and is
/// parsed leniently: a bad `from` means "latest", a bad `count` the default.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub from: Option<String>,
    pub count: Option<String>,
    pub search: Option<String>,
    pub pattern: Option<String>,
    #[serde(rename = "sessionToken")]
    pub session_token: Option<String>,
}

impl MessageQuery {
    fn to_history_query(&self) -> HistoryQuery {
        let from_id = self
            .from
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(0);
        let count = self
            .count
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_COUNT);
        HistoryQuery {
            from_id,
            count,
            search: self.search.clone().filter(|s| !s.is_empty()),
            pattern: self.pattern.clone().filter(|s| !s.is_empty()),
        }
    }
}

pub async fn get_messages(
    State(bridge): State<Bridge>,
    Path((group, room)): Path<(String, String)>,
    Query(query): Query<MessageQuery>,
) -> Json<Vec<ChatMessage>> {
    let messages = bridge
        .read_messages(&group, &room, &query.to_history_query(), query.session_token.as_deref())
        .await;
    Json(messages)
}

pub async fn get_typers(
    State(bridge): State<Bridge>,
    Path((group, room)): Path<(String, String)>,
) -> Json<Vec<String>> {
    Json(bridge.typers(&group, &room).await)
}
