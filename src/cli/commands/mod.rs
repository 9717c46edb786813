pub mod assertion;
pub mod backend;
pub mod gateway;
pub mod host;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const CMD_INSTALL: &str = "install";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("webui-sso")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("WEBUI_SSO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Host database connection string")
                .long_help(
                    "Host database connection string (Postgres).\n\nWithout it the server runs against an empty in-memory store, which is only useful for local development.",
                )
                .env("WEBUI_SSO_DSN")
                .hide_env_values(true)
                .global(true),
        )
        .subcommand(
            Command::new(CMD_INSTALL)
                .about("Ensure the chat page record exists in the host database and exit"),
        );

    let command = host::with_args(command);
    let command = backend::with_args(command);
    let command = assertion::with_args(command);
    let command = gateway::with_args(command);
    logging::with_args(command)
}
