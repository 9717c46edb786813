//! Route handlers and the small helpers they share.

pub mod ajax;
pub mod bridge;
pub mod gateway;
pub mod health;
pub mod paserk;
pub mod settings;
pub mod validate;
pub mod verify;

use axum::http::{
    HeaderMap, HeaderValue,
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, VARY,
    },
};
use tracing::warn;

use crate::sso::Settings;

/// CORS headers for the configured WebUI origin.
///
/// The allowed origin always comes from settings, never from the request.
#[must_use]
pub fn cors_headers(settings: &Settings) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match settings
        .webui_origin()
        .and_then(|origin| HeaderValue::from_str(&origin).ok())
    {
        Some(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        None => warn!("WebUI URL has no usable origin; omitting Access-Control-Allow-Origin"),
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
    headers
}

/// Escape text for HTML element content and quoted attributes.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
