use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_GATEWAY_SECRET: &str = "gateway-secret";

/// Shared secret for the proxy; `None` leaves the gateway route unmounted.
#[must_use]
pub fn parse(matches: &ArgMatches) -> Option<SecretString> {
    matches
        .get_one::<String>(ARG_GATEWAY_SECRET)
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::from(v.trim().to_string()))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_GATEWAY_SECRET)
            .long(ARG_GATEWAY_SECRET)
            .help("Shared secret the reverse proxy presents to /internal/gateway-headers")
            .env("WEBUI_SSO_GATEWAY_SECRET")
            .hide_env_values(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn blank_secret_is_none() {
        temp_env::with_vars([("WEBUI_SSO_GATEWAY_SECRET", Some("  "))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["webui-sso"]);
            assert!(parse(&matches).is_none());
        });
    }

    #[test]
    fn secret_from_env() {
        temp_env::with_vars([("WEBUI_SSO_GATEWAY_SECRET", Some("proxy-secret"))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["webui-sso"]);
            let secret = parse(&matches).expect("secret");
            assert_eq!(secret.expose_secret(), "proxy-secret");
        });
    }
}
