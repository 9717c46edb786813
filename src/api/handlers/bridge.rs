//! Protected chat route: hands a logged-in user over to WebUI.
//!
//! Anonymous callers get a plain redirect to the login page. Logged-in callers
//! get a tiny page that stores the identity in `sessionStorage` and replaces
//! the location with WebUI, carrying a signed assertion in the URL fragment.

use axum::{
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, LOCATION},
    },
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use url::{Url, form_urlencoded};

use super::escape_html;
use crate::{
    api::{AppState, state::SsoConfig},
    sso::{Identity, Settings, assertion::now_unix_seconds, session},
};

pub const SSO_STORAGE_KEY: &str = "cryptolabs_sso_data";
pub const ASSERTION_FRAGMENT_PARAM: &str = "sso_assertion";

#[instrument(skip_all)]
pub async fn protected_route(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let settings = state.settings().get().await;
    let config = state.config();

    let identity =
        match session::authenticate(&headers, config.session_cookie(), state.store()).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!("No session, redirecting to login");
                return login_redirect(config, &settings);
            }
            Err(err) => {
                error!("Session lookup failed, redirecting to login: {err}");
                return login_redirect(config, &settings);
            }
        };

    let audience = settings
        .webui_origin()
        .unwrap_or_else(|| settings.webui_url.clone());
    let token = match state.signer().sign(&identity, &audience, now_unix_seconds()) {
        Ok(token) => token,
        Err(err) => {
            error!(subject = %identity.subject_id, "Failed to sign assertion: {err}");
            return error_page();
        }
    };

    info!(subject = %identity.subject_id, "Handing session over to WebUI");
    let page = handoff_page(&identity, &settings.webui_url, &token);
    (
        StatusCode::OK,
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Html(page),
    )
        .into_response()
}

/// Login URL with the return-to parameter pointing at WebUI.
#[must_use]
pub fn login_redirect_url(login_url: &str, return_param: &str, return_to: &str) -> String {
    if let Ok(mut url) = Url::parse(login_url) {
        url.query_pairs_mut().append_pair(return_param, return_to);
        return url.into();
    }

    let encoded = form_urlencoded::Serializer::new(String::new())
        .append_pair(return_param, return_to)
        .finish();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{login_url}{separator}{encoded}")
}

fn login_redirect(config: &SsoConfig, settings: &Settings) -> Response {
    let target = login_redirect_url(
        config.login_url(),
        config.login_return_param(),
        &settings.webui_url,
    );
    match HeaderValue::from_str(&target) {
        Ok(location) => (
            StatusCode::FOUND,
            [
                (LOCATION, location),
                (CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
        )
            .into_response(),
        Err(err) => {
            error!("Login redirect is not a valid header value: {err}");
            error_page()
        }
    }
}

/// WebUI URL with the assertion in the fragment. Any existing fragment is replaced.
#[must_use]
pub fn handoff_target(webui_url: &str, token: &str) -> String {
    let fragment = format!("{ASSERTION_FRAGMENT_PARAM}={token}");
    match Url::parse(webui_url) {
        Ok(mut url) => {
            url.set_fragment(Some(&fragment));
            url.into()
        }
        Err(_) => {
            let base = webui_url.split('#').next().unwrap_or(webui_url);
            format!("{base}#{fragment}")
        }
    }
}

/// Serialize for embedding inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn handoff_page(identity: &Identity, webui_url: &str, token: &str) -> String {
    let payload = script_json(&json!({
        "email": identity.email,
        "name": identity.display_name,
        "roles": identity.groups(),
        "assertion": token,
    }));
    let target = script_json(&json!(handoff_target(webui_url, token)));
    let storage_key = script_json(&json!(SSO_STORAGE_KEY));
    let fallback = escape_html(webui_url);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="referrer" content="no-referrer">
<title>Redirecting to AI Chat...</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f5f5f5; }}
.loading {{ text-align: center; }}
.spinner {{ border: 3px solid #f3f3f3; border-top: 3px solid #3498db; border-radius: 50%; width: 40px; height: 40px; animation: spin 1s linear infinite; margin: 0 auto 20px; }}
@keyframes spin {{ 0% {{ transform: rotate(0deg); }} 100% {{ transform: rotate(360deg); }} }}
</style>
</head>
<body>
<div class="loading">
<div class="spinner"></div>
<p>Redirecting to AI Chat...</p>
<noscript><p><a href="{fallback}">Continue to AI Chat</a></p></noscript>
</div>
<script>
(function () {{
  var data = {payload};
  data.timestamp = Date.now();
  try {{
    sessionStorage.setItem({storage_key}, JSON.stringify(data));
  }} catch (e) {{}}
  window.location.replace({target});
}})();
</script>
</body>
</html>
"#
    )
}

fn error_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Html("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>AI Chat unavailable</title></head><body><p>AI Chat is temporarily unavailable. Please try again later.</p></body></html>"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn login_url_absolute() {
        let url = login_redirect_url(
            "https://site.example/wp-login.php",
            "redirect_to",
            "https://webui.example/",
        );
        assert_eq!(
            url,
            "https://site.example/wp-login.php?redirect_to=https%3A%2F%2Fwebui.example%2F"
        );
    }

    #[test]
    fn login_url_relative_keeps_existing_query() {
        let url = login_redirect_url("/login?lang=en", "next", "https://webui.example/");
        assert_eq!(url, "/login?lang=en&next=https%3A%2F%2Fwebui.example%2F");
    }

    #[test]
    fn target_replaces_fragment() {
        assert_eq!(
            handoff_target("https://webui.example/#old", "v4.public.abc"),
            "https://webui.example/#sso_assertion=v4.public.abc"
        );
    }

    #[test]
    fn script_json_cannot_close_script() {
        let out = script_json(&json!("</script><script>alert(1)</script>"));
        assert!(!out.contains("</script>"));
        assert!(out.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn page_escapes_identity() {
        let identity = Identity::new(
            Uuid::nil(),
            "eve@example.com".to_string(),
            "</script><img src=x>".to_string(),
            ["subscriber"],
        );
        let page = handoff_page(&identity, "https://webui.example/\"><x", "v4.public.tok");
        assert!(!page.contains("</script><img"));
        assert!(page.contains("&quot;&gt;&lt;x"));
        assert!(page.contains(SSO_STORAGE_KEY));
        assert!(page.contains("v4.public.tok"));
    }
}
