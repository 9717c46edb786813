//! Startup defaults for the WebUI and backend settings. Values saved through
//! the settings page take precedence over these.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, builder::ValueParser};
use secrecy::SecretString;

use crate::sso::{
    CredentialPolicy,
    settings::{DEFAULT_API_URL, DEFAULT_WEBUI_URL, validate_url},
};

pub const ARG_WEBUI_URL: &str = "webui-url";
pub const ARG_API_URL: &str = "api-url";
pub const ARG_API_KEY: &str = "api-key";
pub const ARG_CREDENTIAL_POLICY: &str = "credential-policy";

#[derive(Debug, Clone)]
pub struct Options {
    pub webui_url: String,
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub credential_policy: CredentialPolicy,
}

impl Options {
    /// # Errors
    /// Returns an error if `--webui-url` or `--api-url` is not an absolute
    /// http(s) URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let webui_url = get_non_empty(ARG_WEBUI_URL).unwrap_or_else(|| DEFAULT_WEBUI_URL.to_string());
        validate_url("webui_url", &webui_url)
            .with_context(|| format!("invalid --{ARG_WEBUI_URL}"))?;

        let api_url = get_non_empty(ARG_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        validate_url("api_url", &api_url)
            .with_context(|| format!("invalid --{ARG_API_URL}"))?;

        Ok(Self {
            webui_url,
            api_url,
            api_key: get_non_empty(ARG_API_KEY).map(SecretString::from),
            credential_policy: matches
                .get_one::<CredentialPolicy>(ARG_CREDENTIAL_POLICY)
                .copied()
                .unwrap_or_default(),
        })
    }
}

fn validator_credential_policy() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<CredentialPolicy, String> {
        value.parse::<CredentialPolicy>()
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_WEBUI_URL)
                .long(ARG_WEBUI_URL)
                .help("WebUI base URL used until one is saved in settings")
                .default_value(DEFAULT_WEBUI_URL)
                .env("WEBUI_SSO_WEBUI_URL"),
        )
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Backend API base URL used until one is saved in settings")
                .default_value(DEFAULT_API_URL)
                .env("WEBUI_SSO_API_URL"),
        )
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("Shared backend API key used until one is saved in settings")
                .env("WEBUI_SSO_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CREDENTIAL_POLICY)
                .long(ARG_CREDENTIAL_POLICY)
                .help("What to do when a user has no API key: shared or required")
                .long_help(
                    "What to do when a user has no API key of their own.\n\n`shared` falls back to the configured backend key, `required` refuses the session.",
                )
                .default_value("shared")
                .env("WEBUI_SSO_CREDENTIAL_POLICY")
                .value_parser(validator_credential_policy()),
        )
}
