//! Trusted identity headers for the AI gateway proxy.
//!
//! The proxy authenticates with a shared secret and names a user it has
//! already authenticated. Only registered when a secret is configured.

use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::api::AppState;

pub const HEADER_GATEWAY_SECRET: HeaderName = HeaderName::from_static("x-gateway-secret");
pub const HEADER_GATEWAY_USER: HeaderName = HeaderName::from_static("x-gateway-user");

#[instrument(skip_all)]
pub async fn gateway_headers(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let Some(expected) = state.config().gateway_secret() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let provided = headers
        .get(HEADER_GATEWAY_SECRET)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !secret_matches(provided, expected.expose_secret()) {
        warn!("Rejected gateway request with missing or invalid secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let subject = headers
        .get(HEADER_GATEWAY_USER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok());
    let Some(subject) = subject else {
        debug!("Gateway request without a valid subject");
        return StatusCode::NO_CONTENT.into_response();
    };

    let trusted = state.injector().augment(HeaderMap::new(), subject).await;
    (StatusCode::NO_CONTENT, trusted).into_response()
}

fn secret_matches(provided: &str, expected: &str) -> bool {
    !provided.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}
