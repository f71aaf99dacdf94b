use clap::{Arg, Command, builder::ValueParser};
use regex::Regex;

pub const CMD_SIGN_IN: &str = "signin";
pub const CMD_SIGN_UP: &str = "signup";
pub const CMD_WHOAMI: &str = "whoami";
pub const CMD_SIGN_OUT: &str = "signout";

pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_PASSWORD_CONFIRM: &str = "password-confirm";
pub const ARG_FIRST_NAME: &str = "first-name";
pub const ARG_LAST_NAME: &str = "last-name";

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[must_use]
pub fn validator_email() -> ValueParser {
    ValueParser::from(move |email: &str| -> std::result::Result<String, String> {
        let email = email.trim();
        if valid_email(email) {
            Ok(email.to_string())
        } else {
            Err("invalid email address".to_string())
        }
    })
}

fn arg_email() -> Arg {
    Arg::new(ARG_EMAIL)
        .short('e')
        .long("email")
        .help("Account email address")
        .env("SCRIPTRACULA_EMAIL")
        .required(true)
        .value_parser(validator_email())
}

fn arg_password() -> Arg {
    Arg::new(ARG_PASSWORD)
        .long("password")
        .help("Account password")
        .env("SCRIPTRACULA_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

#[must_use]
pub fn with_subcommands(command: Command) -> Command {
    command
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new(CMD_SIGN_IN)
                .about("Sign in with email and password")
                .arg(arg_email())
                .arg(arg_password()),
        )
        .subcommand(
            Command::new(CMD_SIGN_UP)
                .about("Create an account")
                .long_about(
                    "Create an account. The password needs at least 8 characters, an uppercase \
                     letter, a lowercase letter, a number and one of !@#$%^&*",
                )
                .arg(arg_email())
                .arg(
                    Arg::new(ARG_FIRST_NAME)
                        .long("first-name")
                        .help("First name")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_LAST_NAME)
                        .long("last-name")
                        .help("Last name")
                        .required(true),
                )
                .arg(arg_password())
                .arg(
                    Arg::new(ARG_PASSWORD_CONFIRM)
                        .long("password-confirm")
                        .help("Password, again")
                        .env("SCRIPTRACULA_PASSWORD_CONFIRM")
                        .hide_env_values(true)
                        .required(true),
                ),
        )
        .subcommand(Command::new(CMD_WHOAMI).about("Show the signed-in user"))
        .subcommand(Command::new(CMD_SIGN_OUT).about("Sign out and forget the session"))
}
