use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use bridge_gateway::Bridge;
use bridge_types::api::RequiredFlag;

use crate::error::ApiError;
use crate::extract::{BearerHeader, require_admin};

pub async fn logout_all(State(bridge): State<Bridge>, auth: BearerHeader) -> Result<Json<Value>, ApiError> {
    require_admin(&bridge, &auth)?;
    let count = bridge.logout_all("logged out by admin").await;
    info!("Admin logged out {} sessions", count);
    Ok(Json(json!({ "message": "OK" })))
}

/// Switch whether logins need a password.
pub async fn set_password_required(
    State(bridge): State<Bridge>,
    auth: BearerHeader,
    body: Option<Json<RequiredFlag>>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&bridge, &auth)?;
    let Some(required) = body.and_then(|Json(flag)| flag.required) else {
        return Err(ApiError::BadRequest("missing key 'required'".into()));
    };
    bridge.set_require_accounts(required);
    Ok(Json(json!({ "message": "OK" })))
}
