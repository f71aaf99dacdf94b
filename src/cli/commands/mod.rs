pub mod account;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_AUTH_URL: &str = "url";
pub const ARG_ANON_KEY: &str = "anon-key";
pub const ARG_SESSION_FILE: &str = "session-file";

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

    let command = Command::new("scriptracula")
        .about("Sign in to Scriptracula")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_AUTH_URL)
                .short('u')
                .long("url")
                .help("Auth service URL, example: https://<project>.supabase.co")
                .env("SCRIPTRACULA_AUTH_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ANON_KEY)
                .short('k')
                .long("anon-key")
                .help("Public (anon) API key of the auth service")
                .env("SCRIPTRACULA_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_FILE)
                .long("session-file")
                .help("Keep the session in this file between runs")
                .env("SCRIPTRACULA_SESSION_FILE")
                .global(true)
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        );

    let command = account::with_subcommands(command);
    logging::with_args(command)
}
