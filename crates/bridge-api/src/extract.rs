use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use bridge_gateway::Bridge;

use crate::error::ApiError;

/// Peer IP of the request, empty when the server was not started with
/// connect info (as in tests).
pub struct RemoteIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for RemoteIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();
        Ok(RemoteIp(ip))
    }
}

pub type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

/// Compare the bearer token against the configured admin secret.
pub fn require_admin(bridge: &Bridge, header: &BearerHeader) -> Result<(), ApiError> {
    let Some(TypedHeader(auth)) = header else {
        return Err(ApiError::Unauthorized(
            "Authentication is required please set the bearer authorization header.".into(),
        ));
    };
    if auth.token() != bridge.config().admin_token {
        return Err(ApiError::Unauthorized("Invalid API key provided".into()));
    }
    Ok(())
}
