use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::{
    api::AppState,
    sso::{AssertionClaims, assertion::now_unix_seconds},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub assertion: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyError {
    pub error: String,
}

/// Server-to-server check of an identity assertion.
#[utoipa::path(
    post,
    path = "/v1/assertions/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Assertion is valid", body = AssertionClaims),
        (status = 401, description = "Assertion is invalid or expired", body = VerifyError)
    ),
    tag = "sso"
)]
#[instrument(skip_all)]
pub async fn verify_assertion(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Response {
    let settings = state.settings().get().await;
    let audience = settings
        .webui_origin()
        .unwrap_or_else(|| settings.webui_url.clone());

    match state
        .signer()
        .verify(&request.assertion, &audience, now_unix_seconds())
    {
        Ok(claims) => (StatusCode::OK, Json(claims)).into_response(),
        Err(err) => {
            debug!("Assertion rejected: {err}");
            (
                StatusCode::UNAUTHORIZED,
                Json(VerifyError {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}
