//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run: the server by default, or
//! the one-shot `install` step.

use crate::cli::actions::{Action, install, server};
use crate::cli::commands::{ARG_DSN, ARG_PORT, CMD_INSTALL, assertion, backend, gateway, host};
use anyhow::{Context, Result};
use clap::ArgMatches;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_INSTALL, sub_matches)) => install_args(sub_matches),
        _ => server_args(matches),
    }
}

fn dsn(matches: &ArgMatches) -> Option<String> {
    matches
        .get_one::<String>(ARG_DSN)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn install_args(matches: &ArgMatches) -> Result<Action> {
    let dsn = dsn(matches).context("missing required argument: --dsn")?;
    let chat_path = host::validate_chat_path(
        matches
            .get_one::<String>(host::ARG_CHAT_PATH)
            .map_or(crate::api::DEFAULT_CHAT_PATH, String::as_str),
    )?;

    Ok(Action::Install(install::Args { dsn, chat_path }))
}

fn server_args(matches: &ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let host_opts = host::Options::parse(matches)?;
    let backend_opts = backend::Options::parse(matches)?;
    let assertion_opts = assertion::Options::parse(matches);

    Ok(Action::Server(server::Args {
        port,
        dsn: dsn(matches),
        public_url: assertion_opts.public_url,
        chat_path: host_opts.chat_path,
        login_url: host_opts.login_url,
        login_return_param: host_opts.login_return_param,
        session_cookie: host_opts.session_cookie,
        admin_role: host_opts.admin_role,
        ensure_page: host_opts.ensure_page,
        webui_url: backend_opts.webui_url,
        api_url: backend_opts.api_url,
        api_key: backend_opts.api_key,
        credential_policy: backend_opts.credential_policy,
        assertion_ttl_seconds: assertion_opts.ttl_seconds,
        assertion_signing_seed: assertion_opts.signing_seed,
        gateway_secret: gateway::parse(matches),
    }))
}
