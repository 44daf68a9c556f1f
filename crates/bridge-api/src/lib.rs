//! HTTP surface of the bridge: history replay, typing and directory
//! lookups, admin switches, and the webhook endpoints.

pub mod admin;
pub mod directory;
pub mod error;
pub mod extract;
pub mod messages;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use bridge_gateway::Bridge;

pub use error::ApiError;

/// HTTP routes. Static prefixes win over a group of the same name.
pub fn routes() -> Router<Bridge> {
    Router::new()
        .route("/users", get(directory::users))
        .route("/admin/logout_all", post(admin::logout_all))
        .route("/admin/password", post(admin::set_password_required))
        .route("/webhooks/{webhook_id}/{token}", post(webhooks::execute))
        .route("/channels/{channel_id}/webhooks", get(webhooks::list_for_channel))
        .route("/{group}/channels", get(directory::group_channels))
        .route("/{group}/{room}/messages", get(messages::get_messages))
        .route("/{group}/{room}/typers", get(messages::get_typers))
}
