//! Admin settings page.
//!
//! Every route here is gated on a session whose identity carries the admin
//! role. The backend key is only ever used server-side.

use axum::{
    Form, Json,
    extract::{Extension, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use super::escape_html;
use crate::{
    api::AppState,
    sso::{Identity, Settings, SettingsForm, SsoError, session},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TestConnectionResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<usize>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

enum Notice {
    Saved,
    Invalid(String),
    Failed,
}

/// Resolve the caller and require the admin role.
async fn require_admin(headers: &HeaderMap, state: &AppState) -> Result<Identity, Response> {
    let identity = session::authenticate(headers, state.config().session_cookie(), state.store())
        .await
        .ok()
        .flatten()
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                SsoError::AuthenticationMissing.to_string(),
            )
                .into_response()
        })?;

    if !identity.has_role(state.config().admin_role()) {
        warn!(subject = %identity.subject_id, "Settings access denied");
        return Err((
            StatusCode::FORBIDDEN,
            SsoError::AuthorizationMissing.to_string(),
        )
            .into_response());
    }

    Ok(identity)
}

#[instrument(skip_all)]
pub async fn settings_page(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }
    let settings = state.settings().get().await;
    page_response(StatusCode::OK, &settings, None)
}

#[instrument(skip_all)]
pub async fn save_settings(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    form: Result<Form<SettingsForm>, FormRejection>,
) -> Response {
    let identity = match require_admin(&headers, &state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!("Malformed settings form: {rejection}");
            let previous = state.settings().get().await;
            let notice = Notice::Invalid("malformed form submission".to_string());
            return page_response(StatusCode::UNPROCESSABLE_ENTITY, &previous, Some(&notice));
        }
    };

    match state.settings().set(&form).await {
        Ok(settings) => {
            info!(subject = %identity.subject_id, "Settings saved");
            page_response(StatusCode::OK, &settings, Some(&Notice::Saved))
        }
        Err(err @ SsoError::ConfigurationInvalid { .. }) => {
            debug!("Rejected settings: {err}");
            let previous = state.settings().get().await;
            page_response(err.status(), &previous, Some(&Notice::Invalid(err.to_string())))
        }
        Err(err) => {
            error!("Failed to save settings: {err}");
            let previous = state.settings().get().await;
            page_response(err.status(), &previous, Some(&Notice::Failed))
        }
    }
}

#[utoipa::path(
    post,
    path = "/settings/test-connection",
    responses(
        (status = 200, description = "Result of calling the backend models endpoint", body = TestConnectionResult),
        (status = 401, description = "No session"),
        (status = 403, description = "Not an administrator")
    ),
    tag = "settings"
)]
#[instrument(skip_all)]
pub async fn test_connection(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }
    let settings = state.settings().get().await;
    let result = probe_models(state.http(), &settings).await;
    (StatusCode::OK, Json(result)).into_response()
}

/// `GET {api_url}/models` with the configured key.
async fn probe_models(client: &reqwest::Client, settings: &Settings) -> TestConnectionResult {
    let url = format!("{}/models", settings.api_url.trim_end_matches('/'));
    let response = match client.get(&url).bearer_auth(&settings.api_key).send().await {
        Ok(response) => response,
        Err(err) => {
            let err = SsoError::DownstreamUnreachable(err.without_url().to_string());
            warn!("{err}");
            return TestConnectionResult {
                ok: false,
                models: None,
                message: format!("Connection failed: {err}"),
            };
        }
    };

    let status = response.status();
    if !status.is_success() {
        return TestConnectionResult {
            ok: false,
            models: None,
            message: format!("Connection failed: {status}"),
        };
    }

    match response.json::<ModelList>().await {
        Ok(list) => TestConnectionResult {
            ok: true,
            models: Some(list.data.len()),
            message: format!("Connection successful! Found {} models.", list.data.len()),
        },
        Err(err) => TestConnectionResult {
            ok: false,
            models: None,
            message: format!("Connection failed: unexpected response ({})", err.without_url()),
        },
    }
}

fn page_response(status: StatusCode, settings: &Settings, notice: Option<&Notice>) -> Response {
    (
        status,
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Html(render_page(settings, notice)),
    )
        .into_response()
}

fn render_page(settings: &Settings, notice: Option<&Notice>) -> String {
    let notice = match notice {
        Some(Notice::Saved) => {
            r#"<div class="notice notice-success"><p>Settings saved!</p></div>"#.to_string()
        }
        Some(Notice::Invalid(reason)) => format!(
            r#"<div class="notice notice-error"><p>Settings not saved: {}</p></div>"#,
            escape_html(reason)
        ),
        Some(Notice::Failed) => {
            r#"<div class="notice notice-error"><p>Settings could not be saved. Please try again.</p></div>"#
                .to_string()
        }
        None => String::new(),
    };
    let webui_url = escape_html(&settings.webui_url);
    let api_url = escape_html(&settings.api_url);
    let api_key = escape_html(&settings.api_key);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Cryptolabs SSO Settings</title>
</head>
<body>
<div class="wrap">
<h1>Cryptolabs SSO Settings</h1>
{notice}
<form method="post" action="/settings">
<table class="form-table">
<tr>
<th scope="row"><label for="webui_url">WebUI URL</label></th>
<td><input type="url" id="webui_url" name="webui_url" value="{webui_url}" class="regular-text"></td>
</tr>
<tr>
<th scope="row"><label for="api_url">API URL</label></th>
<td><input type="url" id="api_url" name="api_url" value="{api_url}" class="regular-text"></td>
</tr>
<tr>
<th scope="row"><label for="api_key">API Key</label></th>
<td><input type="text" id="api_key" name="api_key" value="{api_key}" class="regular-text"></td>
</tr>
</table>
<p class="submit"><input type="submit" name="submit" class="button button-primary" value="Save Changes"></p>
</form>
<h2>Test Connection</h2>
<button type="button" class="button" id="test-connection">Test API Connection</button>
<div id="test-result"></div>
<script>
document.getElementById('test-connection').addEventListener('click', function () {{
  var out = document.getElementById('test-result');
  out.textContent = 'Testing...';
  fetch('/settings/test-connection', {{ method: 'POST', credentials: 'same-origin' }})
    .then(function (r) {{ return r.json(); }})
    .then(function (res) {{
      out.style.color = res.ok ? 'green' : 'red';
      out.textContent = (res.ok ? '✓ ' : '✗ ') + res.message;
    }})
    .catch(function (e) {{
      out.style.color = 'red';
      out.textContent = '✗ Connection failed: ' + e;
    }});
}});
</script>
</div>
</body>
</html>
"#
    )
}
