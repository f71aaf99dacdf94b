//! # Scriptracula (auth client)
//!
//! `scriptracula` authenticates a writer against a GoTrue-compatible identity
//! service and gates access to the dashboard. The crate holds the client-side
//! session lifecycle and the credential workflow; the identity service itself
//! is an external collaborator reached through [`identity::IdentityProvider`].
//!
//! ## Session lifecycle
//!
//! [`session::SessionController`] owns the single answer to "is a user
//! authenticated". It asks the provider once at startup and afterwards follows
//! the provider's change notifications. Until the first answer arrives the
//! state is `Unknown` and the shell renders [`app::Surface::Pending`], never
//! the dashboard.
//!
//! ## Credential workflow
//!
//! [`credentials::CredentialWorkflow`] collects sign-in or sign-up input,
//! evaluates the password policy on every change, and dispatches at most one
//! remote call per form. Sign-up input that fails the policy or the
//! confirmation check is rejected locally and never reaches the provider.
//!
//! ## Secrets
//!
//! Passwords, access tokens and refresh tokens are held in `SecretString` and
//! must never be logged or printed.

pub mod app;
pub mod cli;
pub mod credentials;
pub mod dashboard;
pub mod identity;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
