//! Sign-in / sign-up form state machine and the sign-up password policy.
//!
//! Flow Overview: the form collects input and keeps live password feedback
//! while signing up. `submit` runs the local guard (policy, then
//! confirmation), and only when it passes dispatches exactly one remote call.
//! A successful call does not touch the session: the provider announces it and
//! the session controller follows.

mod form;
pub mod policy;
mod workflow;

pub use form::{CredentialForm, Mode, PasswordFeedback};
pub use policy::{PolicyResult, PolicyRule};
pub use workflow::{CredentialWorkflow, WELCOME_BACK, WorkflowState, welcome_new_user};

use crate::identity::AuthError;
use thiserror::Error;

/// Sign-up input rejected before reaching the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("password requirements not met")]
    PolicyUnmet,
    #[error("passwords do not match")]
    Mismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] AuthError),
    #[error("a submission is already in flight")]
    InFlight,
    #[error("the form has already been submitted")]
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_messages_are_exact() {
        assert_eq!(
            ValidationError::PolicyUnmet.to_string(),
            "password requirements not met"
        );
        assert_eq!(ValidationError::Mismatch.to_string(), "passwords do not match");
    }

    #[test]
    fn remote_errors_stay_verbatim() {
        let err = SubmitError::from(AuthError::rejected(400, "Invalid login credentials"));
        assert_eq!(err.to_string(), "Invalid login credentials");
    }
}
