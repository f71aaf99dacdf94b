//! Maps validated CLI matches to the account action to run.

use crate::cli::{
    actions::{
        Action,
        account::{SignInArgs, SignUpArgs},
    },
    commands::{
        ARG_ANON_KEY, ARG_AUTH_URL, ARG_SESSION_FILE,
        account::{
            ARG_EMAIL, ARG_FIRST_NAME, ARG_LAST_NAME, ARG_PASSWORD, ARG_PASSWORD_CONFIRM,
            CMD_SIGN_IN, CMD_SIGN_OUT, CMD_SIGN_UP, CMD_WHOAMI,
        },
    },
    globals::GlobalArgs,
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn globals(matches: &ArgMatches) -> Result<GlobalArgs> {
    let url = required(matches, ARG_AUTH_URL)?;
    let auth_url = Url::parse(&url).context("invalid SCRIPTRACULA_AUTH_URL")?;
    let anon_key = SecretString::from(required(matches, ARG_ANON_KEY)?);
    let session_file = matches.get_one::<PathBuf>(ARG_SESSION_FILE).cloned();

    Ok(GlobalArgs::new(auth_url, anon_key).with_session_file(session_file))
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or the URL is invalid.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;

    match matches.subcommand() {
        Some((CMD_SIGN_IN, sub)) => Ok(Action::SignIn(SignInArgs {
            globals,
            email: required(sub, ARG_EMAIL)?,
            password: SecretString::from(required(sub, ARG_PASSWORD)?),
        })),
        Some((CMD_SIGN_UP, sub)) => Ok(Action::SignUp(SignUpArgs {
            globals,
            email: required(sub, ARG_EMAIL)?,
            first_name: required(sub, ARG_FIRST_NAME)?,
            last_name: required(sub, ARG_LAST_NAME)?,
            password: SecretString::from(required(sub, ARG_PASSWORD)?),
            password_confirm: SecretString::from(required(sub, ARG_PASSWORD_CONFIRM)?),
        })),
        Some((CMD_WHOAMI, _)) => Ok(Action::WhoAmI(globals)),
        Some((CMD_SIGN_OUT, _)) => Ok(Action::SignOut(globals)),
        Some((other, _)) => Err(anyhow!("unknown command: {other}")),
        None => Err(anyhow!("missing command")),
    }
}
