use axum::{
    Json,
    extract::{Path, State},
};
use tracing::warn;

use bridge_gateway::{Bridge, IngestOutcome};
use bridge_types::api::{WebhookExecuteRequest, WebhookExecuteResponse, WebhookObject};

use crate::error::ApiError;
use crate::extract::{BearerHeader, RemoteIp, require_admin};

/// `POST /webhooks/{id}/{token}`. A request without a JSON body counts as
/// empty content.
pub async fn execute(
    State(bridge): State<Bridge>,
    Path((webhook_id, token)): Path<(String, String)>,
    RemoteIp(ip): RemoteIp,
    body: Option<Json<WebhookExecuteRequest>>,
) -> Result<Json<WebhookExecuteResponse>, ApiError> {
    let content = body.map(|Json(req)| req.content).unwrap_or_default();
    let outcome = bridge.execute_webhook(&webhook_id, &token, &content, &ip).await?;

    let response = match outcome {
        IngestOutcome::Relayed { id } => WebhookExecuteResponse {
            message: "OK".into(),
            id: Some(id),
            queued: None,
            dropped: None,
        },
        IngestOutcome::Queued { queued, dropped } => WebhookExecuteResponse {
            message: if dropped > 0 {
                format!("Message queue is full, dropped {} lines", dropped)
            } else {
                "OK".into()
            },
            id: None,
            queued: Some(queued),
            dropped: Some(dropped),
        },
    };
    Ok(Json(response))
}

/// `GET /channels/{id}/webhooks`, admin bearer required.
pub async fn list_for_channel(
    State(bridge): State<Bridge>,
    Path(channel_id): Path<i64>,
    auth: BearerHeader,
) -> Result<Json<Vec<WebhookObject>>, ApiError> {
    require_admin(&bridge, &auth)?;
    let channel = bridge
        .channels()
        .by_id(channel_id)
        .ok_or_else(|| ApiError::NotFound("Unknown Channel".into()))?;
    let rows = bridge.db().list_webhooks_for_channel(channel.id).map_err(|e| {
        warn!("Failed to list webhooks of channel {}: {}", channel.id, e);
        ApiError::Internal(e.to_string())
    })?;
    Ok(Json(rows.iter().map(WebhookObject::from).collect()))
}
