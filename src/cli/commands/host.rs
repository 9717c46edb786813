//! How the service sits inside the host site: where the protected route
//! lives, where anonymous users are sent and how sessions are recognised.

use anyhow::{Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::{
    api::{DEFAULT_ADMIN_ROLE, DEFAULT_CHAT_PATH, DEFAULT_LOGIN_RETURN_PARAM, DEFAULT_LOGIN_URL},
    sso::session::DEFAULT_SESSION_COOKIE,
};

pub const ARG_CHAT_PATH: &str = "chat-path";
pub const ARG_LOGIN_URL: &str = "login-url";
pub const ARG_LOGIN_RETURN_PARAM: &str = "login-return-param";
pub const ARG_SESSION_COOKIE: &str = "session-cookie";
pub const ARG_ADMIN_ROLE: &str = "admin-role";
pub const ARG_ENSURE_PAGE: &str = "ensure-page";

/// First path segments owned by other routes.
const RESERVED_SEGMENTS: &[&str] = &[
    "admin-ajax",
    "health",
    "internal",
    "paserk.json",
    "settings",
    "v1",
    "wp-admin",
];

#[derive(Debug, Clone)]
pub struct Options {
    pub chat_path: String,
    pub login_url: String,
    pub login_return_param: String,
    pub session_cookie: String,
    pub admin_role: String,
    pub ensure_page: bool,
}

impl Options {
    /// Parse host arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the chat path is unusable as a route.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_or = |id: &str, default: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            chat_path: validate_chat_path(&get_or(ARG_CHAT_PATH, DEFAULT_CHAT_PATH))?,
            login_url: get_or(ARG_LOGIN_URL, DEFAULT_LOGIN_URL),
            login_return_param: get_or(ARG_LOGIN_RETURN_PARAM, DEFAULT_LOGIN_RETURN_PARAM),
            session_cookie: get_or(ARG_SESSION_COOKIE, DEFAULT_SESSION_COOKIE),
            admin_role: get_or(ARG_ADMIN_ROLE, DEFAULT_ADMIN_ROLE),
            ensure_page: matches.get_one::<bool>(ARG_ENSURE_PAGE).copied().unwrap_or(true),
        })
    }
}

/// Normalize the chat path and reject anything that would clash with another
/// route or could not be registered with the router.
///
/// # Errors
/// Returns an error describing why the path was rejected.
pub fn validate_chat_path(path: &str) -> Result<String> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        bail!("invalid --{ARG_CHAT_PATH}: must not be empty");
    }

    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        bail!("invalid --{ARG_CHAT_PATH}: empty or relative segment in '{trimmed}'");
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
    {
        bail!("invalid --{ARG_CHAT_PATH}: only letters, digits, '-', '_' and '/' are allowed");
    }

    let first = trimmed.split('/').next().unwrap_or_default();
    if RESERVED_SEGMENTS.contains(&first) {
        bail!("invalid --{ARG_CHAT_PATH}: '/{first}' is reserved");
    }

    Ok(trimmed.to_string())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CHAT_PATH)
                .long(ARG_CHAT_PATH)
                .help("Path of the protected chat route")
                .default_value(DEFAULT_CHAT_PATH)
                .env("WEBUI_SSO_CHAT_PATH")
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_URL)
                .long(ARG_LOGIN_URL)
                .help("Host login page anonymous visitors are redirected to")
                .default_value(DEFAULT_LOGIN_URL)
                .env("WEBUI_SSO_LOGIN_URL"),
        )
        .arg(
            Arg::new(ARG_LOGIN_RETURN_PARAM)
                .long(ARG_LOGIN_RETURN_PARAM)
                .help("Query parameter carrying the return URL on the login redirect")
                .default_value(DEFAULT_LOGIN_RETURN_PARAM)
                .env("WEBUI_SSO_LOGIN_RETURN_PARAM"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE)
                .long(ARG_SESSION_COOKIE)
                .help("Name of the host session cookie")
                .default_value(DEFAULT_SESSION_COOKIE)
                .env("WEBUI_SSO_SESSION_COOKIE"),
        )
        .arg(
            Arg::new(ARG_ADMIN_ROLE)
                .long(ARG_ADMIN_ROLE)
                .help("Role required to manage settings")
                .default_value(DEFAULT_ADMIN_ROLE)
                .env("WEBUI_SSO_ADMIN_ROLE"),
        )
        .arg(
            Arg::new(ARG_ENSURE_PAGE)
                .long(ARG_ENSURE_PAGE)
                .help("Ensure the chat page record exists at startup")
                .default_value("true")
                .env("WEBUI_SSO_ENSURE_PAGE")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
}
