use axum::{
    Json,
    extract::{Path, State},
};

use bridge_gateway::Bridge;
use bridge_types::api::ChannelInfo;

/// Channels of one group.
pub async fn group_channels(State(bridge): State<Bridge>, Path(group): Path<String>) -> Json<Vec<ChannelInfo>> {
    let channels = bridge.channels().in_group(&group);
    Json(channels.iter().map(ChannelInfo::from).collect())
}

/// Display names of everyone logged in.
pub async fn users(State(bridge): State<Bridge>) -> Json<Vec<String>> {
    Json(bridge.user_names().await)
}
