use super::{
    ValidationError,
    policy::{PolicyResult, passwords_match},
};
use crate::identity::UserMetadata;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    SignIn,
    SignUp,
}

impl Mode {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::SignIn => Self::SignUp,
            Self::SignUp => Self::SignIn,
        }
    }
}

/// Live password feedback shown while signing up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasswordFeedback {
    pub policy: PolicyResult,
    pub passwords_match: bool,
}

impl PasswordFeedback {
    fn evaluate(password: &str, confirm: &str) -> Self {
        Self {
            policy: PolicyResult::evaluate(password),
            passwords_match: passwords_match(password, confirm),
        }
    }
}

#[derive(Clone)]
pub struct CredentialForm {
    mode: Mode,
    email: String,
    password: SecretString,
    password_confirm: SecretString,
    first_name: String,
    last_name: String,
    feedback: Option<PasswordFeedback>,
}

impl Default for CredentialForm {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl CredentialForm {
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self::with_email(mode, String::new())
    }

    fn with_email(mode: Mode, email: String) -> Self {
        let mut form = Self {
            mode,
            email,
            password: empty_secret(),
            password_confirm: empty_secret(),
            first_name: String::new(),
            last_name: String::new(),
            feedback: None,
        };
        form.refresh_feedback();
        form
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    #[must_use]
    pub fn password_confirm(&self) -> &SecretString {
        &self.password_confirm
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// `None` in sign-in mode, which has no policy.
    #[must_use]
    pub const fn feedback(&self) -> Option<PasswordFeedback> {
        self.feedback
    }

    pub fn set_email(&mut self, email: &str) {
        email.clone_into(&mut self.email);
    }

    pub fn set_password(&mut self, password: &str) {
        self.password = SecretString::from(password.to_string());
        self.refresh_feedback();
    }

    pub fn set_password_confirm(&mut self, confirm: &str) {
        self.password_confirm = SecretString::from(confirm.to_string());
        self.refresh_feedback();
    }

    pub fn set_first_name(&mut self, first_name: &str) {
        first_name.clone_into(&mut self.first_name);
    }

    pub fn set_last_name(&mut self, last_name: &str) {
        last_name.clone_into(&mut self.last_name);
    }

    /// Switches to `mode`, clearing everything but the email.
    pub fn reset_for(&mut self, mode: Mode) {
        let email = std::mem::take(&mut self.email);
        *self = Self::with_email(mode, email);
    }

    /// Local guard run before any sign-up call: the policy first, then an
    /// exact comparison with the confirmation. Sign-in is never checked.
    ///
    /// # Errors
    /// Returns the first failed check.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.mode == Mode::SignIn {
            return Ok(());
        }
        let password = self.password.expose_secret();
        if !PolicyResult::evaluate(password).is_satisfied() {
            return Err(ValidationError::PolicyUnmet);
        }
        if password != self.password_confirm.expose_secret() {
            return Err(ValidationError::Mismatch);
        }
        Ok(())
    }

    #[must_use]
    pub fn metadata(&self) -> UserMetadata {
        UserMetadata::with_names(&self.first_name, &self.last_name)
    }

    fn refresh_feedback(&mut self) {
        self.feedback = match self.mode {
            Mode::SignIn => None,
            Mode::SignUp => Some(PasswordFeedback::evaluate(
                self.password.expose_secret(),
                self.password_confirm.expose_secret(),
            )),
        };
    }
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl fmt::Debug for CredentialForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialForm")
            .field("mode", &self.mode)
            .field("email", &self.email)
            .field("password", &"***")
            .field("password_confirm", &"***")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("feedback", &self.feedback)
            .finish()
    }
}
