use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::sso::assertion::{DEFAULT_TTL_SECONDS, MAX_TTL_SECONDS, MIN_TTL_SECONDS};

pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_ASSERTION_TTL_SECONDS: &str = "assertion-ttl-seconds";
pub const ARG_ASSERTION_SIGNING_SEED: &str = "assertion-signing-seed";

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct Options {
    /// Also the assertion issuer.
    pub public_url: String,
    pub ttl_seconds: i64,
    pub signing_seed: Option<SecretString>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let public_url = matches
            .get_one::<String>(ARG_PUBLIC_URL)
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());

        Self {
            public_url,
            ttl_seconds: matches
                .get_one::<i64>(ARG_ASSERTION_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_TTL_SECONDS),
            signing_seed: matches
                .get_one::<String>(ARG_ASSERTION_SIGNING_SEED)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.trim().to_string())),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public base URL of this service, used as assertion issuer")
                .default_value(DEFAULT_PUBLIC_URL)
                .env("WEBUI_SSO_PUBLIC_URL"),
        )
        .arg(
            Arg::new(ARG_ASSERTION_TTL_SECONDS)
                .long(ARG_ASSERTION_TTL_SECONDS)
                .help("Lifetime of identity assertions in seconds")
                .default_value("120")
                .env("WEBUI_SSO_ASSERTION_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(MIN_TTL_SECONDS..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_ASSERTION_SIGNING_SEED)
                .long(ARG_ASSERTION_SIGNING_SEED)
                .help("Base64 Ed25519 seed (32 bytes) for signing assertions")
                .long_help(
                    "Base64 Ed25519 seed (32 bytes) for signing assertions.\n\nWhen absent a key is generated at startup and assertions stop verifying after a restart.",
                )
                .env("WEBUI_SSO_ASSERTION_SIGNING_SEED")
                .hide_env_values(true),
        )
}
