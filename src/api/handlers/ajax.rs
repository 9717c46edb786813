//! `admin-ajax` style dispatcher.
//!
//! Actions are registered once at startup for the privileged (logged in) entry
//! point, the unprivileged (anonymous) one, or both. The caller's session is
//! resolved here and handed to the action, so actions never re-read cookies.

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Query, rejection::QueryRejection},
    http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, instrument};
use url::form_urlencoded;
use utoipa::{IntoParams, ToSchema};

use super::{cors_headers, validate::ValidateSession};
use crate::{
    api::AppState,
    sso::{Identity, Settings, session},
};

pub const VALIDATE_SESSION_ACTION: &str = "cryptolabs_validate_session";

/// Session as seen by the dispatcher.
#[derive(Debug, Clone)]
pub enum SessionState {
    Authenticated(Identity),
    Anonymous,
    /// The store could not answer; treated as anonymous for routing.
    LookupFailed,
}

impl SessionState {
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[async_trait]
pub trait AjaxAction: Send + Sync {
    async fn call(&self, state: &AppState, session: SessionState) -> Response;
}

struct Registration {
    action: Arc<dyn AjaxAction>,
    privileged: bool,
    unprivileged: bool,
}

pub struct ActionRegistry {
    actions: HashMap<&'static str, Registration>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(VALIDATE_SESSION_ACTION, ValidateSession, true, true);
        registry
    }

    pub fn register(
        &mut self,
        name: &'static str,
        action: impl AjaxAction + 'static,
        privileged: bool,
        unprivileged: bool,
    ) {
        self.actions.insert(
            name,
            Registration {
                action: Arc::new(action),
                privileged,
                unprivileged,
            },
        );
    }

    fn lookup(&self, name: &str, logged_in: bool) -> Option<Arc<dyn AjaxAction>> {
        let registration = self.actions.get(name)?;
        let allowed = if logged_in {
            registration.privileged
        } else {
            registration.unprivileged
        };
        allowed.then(|| registration.action.clone())
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AjaxQuery {
    /// Registered action name, e.g. `cryptolabs_validate_session`.
    pub action: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AjaxError {
    pub success: bool,
    pub data: String,
}

impl AjaxError {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            success: false,
            data: message.to_string(),
        }
    }
}

fn unknown_action(settings: &Settings) -> Response {
    (
        StatusCode::BAD_REQUEST,
        cors_headers(settings),
        Json(AjaxError::new("0")),
    )
        .into_response()
}

/// Action name from a form-encoded POST body, falling back to the query.
fn action_name(headers: &HeaderMap, query: AjaxQuery, body: &Bytes) -> Option<String> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    let from_body = if is_form {
        form_urlencoded::parse(body)
            .find(|(key, _)| key == "action")
            .map(|(_, value)| value.into_owned())
    } else {
        None
    };

    from_body
        .or(query.action)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[utoipa::path(
    get,
    path = "/admin-ajax",
    params(AjaxQuery),
    request_body(
        content = String,
        content_type = "application/x-www-form-urlencoded",
        description = "Optional form body carrying `action`"
    ),
    responses(
        (status = 200, description = "Action handled"),
        (status = 400, description = "Unknown or unregistered action", body = AjaxError),
        (status = 401, description = "Action requires a session", body = AjaxError)
    ),
    tag = "sso"
)]
#[instrument(skip_all, fields(method = %method))]
pub async fn admin_ajax(
    method: Method,
    headers: HeaderMap,
    query: Result<Query<AjaxQuery>, QueryRejection>,
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let settings = state.settings().get().await;
    if method == Method::OPTIONS {
        return (StatusCode::NO_CONTENT, cors_headers(&settings)).into_response();
    }

    let query = query.map_or_else(
        |rejection| {
            debug!("Ignoring malformed query: {rejection}");
            AjaxQuery::default()
        },
        |Query(query)| query,
    );

    let Some(name) = action_name(&headers, query, &body) else {
        debug!("No action given");
        return unknown_action(&settings);
    };

    let session = match session::authenticate(&headers, state.config().session_cookie(), state.store())
        .await
    {
        Ok(Some(identity)) => SessionState::Authenticated(identity),
        Ok(None) => SessionState::Anonymous,
        Err(_) => SessionState::LookupFailed,
    };

    let Some(action) = state.actions().lookup(&name, session.is_logged_in()) else {
        debug!(action = %name, "Action not registered for this entry point");
        return unknown_action(&settings);
    };

    debug!(action = %name, logged_in = session.is_logged_in(), "Dispatching action");
    action.call(&state, session).await
}
