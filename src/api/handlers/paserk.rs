use axum::{
    Json,
    extract::Extension,
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::{api::AppState, sso::PaserkKeySet};

/// Public keys for verifying identity assertions offline.
#[utoipa::path(
    get,
    path = "/paserk.json",
    responses(
        (status = 200, description = "PASERK keyset for assertion verification", body = PaserkKeySet)
    ),
    tag = "sso"
)]
pub async fn paserk_keyset(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CACHE_CONTROL, HeaderValue::from_static("public, max-age=300"))],
        Json(state.signer().keyset()),
    )
}
