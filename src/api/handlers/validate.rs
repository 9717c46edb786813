//! `cryptolabs_validate_session`: tells WebUI who the site thinks the caller is.

use async_trait::async_trait;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{
    ajax::{AjaxAction, AjaxError, SessionState},
    cors_headers,
};
use crate::{
    api::AppState,
    sso::{SsoError, injector::lookup_credential},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionData {
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionValidated {
    pub success: bool,
    pub data: SessionData,
}

pub struct ValidateSession;

#[async_trait]
impl AjaxAction for ValidateSession {
    async fn call(&self, state: &AppState, session: SessionState) -> Response {
        let settings = state.settings().get().await;
        let cors = cors_headers(&settings);

        let identity = match session {
            SessionState::Authenticated(identity) => identity,
            SessionState::Anonymous => {
                return (
                    StatusCode::UNAUTHORIZED,
                    cors,
                    Json(AjaxError::new("Not authenticated")),
                )
                    .into_response();
            }
            SessionState::LookupFailed => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    cors,
                    Json(AjaxError::new("Session lookup failed")),
                )
                    .into_response();
            }
        };

        let credential = match lookup_credential(
            state.store(),
            state.settings(),
            state.config().credential_policy(),
            identity.subject_id,
        )
        .await
        {
            Ok(credential) => credential,
            Err(SsoError::CredentialMissing) => {
                warn!(subject = %identity.subject_id, "No credential provisioned");
                return (
                    StatusCode::FORBIDDEN,
                    cors,
                    Json(AjaxError::new("No credential provisioned")),
                )
                    .into_response();
            }
            Err(err) => {
                error!(subject = %identity.subject_id, "Credential lookup failed: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    cors,
                    Json(AjaxError::new("Session lookup failed")),
                )
                    .into_response();
            }
        };

        info!(
            subject = %identity.subject_id,
            credential_source = credential.source().as_str(),
            "Session validated"
        );

        let body = SessionValidated {
            success: true,
            data: SessionData {
                email: identity.email.clone(),
                name: identity.display_name.clone(),
                roles: identity.roles().to_vec(),
                api_key: credential.expose().to_string(),
            },
        };
        (StatusCode::OK, cors, Json(body)).into_response()
    }
}
