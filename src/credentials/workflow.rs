use super::{CredentialForm, Mode, PasswordFeedback, SubmitError};
use crate::identity::{IdentityProvider, UserMetadata};
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

pub const WELCOME_BACK: &str = "Welcome back!";

#[must_use]
pub fn welcome_new_user(first_name: &str) -> String {
    format!("Welcome to Scriptracula, {first_name}!")
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Idle,
    /// Running the local sign-up guard.
    Validating,
    /// One remote call is in flight.
    Submitting,
    /// Terminal for this form. `session_issued` is `false` when the provider
    /// holds the new account until its email address is confirmed.
    Succeeded {
        message: String,
        session_issued: bool,
    },
    /// The local guard refused the form.
    Failed,
}

impl WorkflowState {
    /// Whether a submit or a mode toggle may start.
    #[must_use]
    pub const fn accepts_input(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

struct Inner {
    form: CredentialForm,
    state: WorkflowState,
    last_error: Option<String>,
}

/// Everything the remote call needs, captured before the lock is released.
struct Request {
    mode: Mode,
    email: String,
    password: SecretString,
    first_name: String,
    metadata: UserMetadata,
}

pub struct CredentialWorkflow<P> {
    provider: Arc<P>,
    inner: Mutex<Inner>,
}

impl<P: IdentityProvider> CredentialWorkflow<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_mode(provider, Mode::SignIn)
    }

    #[must_use]
    pub fn with_mode(provider: Arc<P>, mode: Mode) -> Self {
        Self {
            provider,
            inner: Mutex::new(Inner {
                form: CredentialForm::new(mode),
                state: WorkflowState::Idle,
                last_error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.lock().form.mode()
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    #[must_use]
    pub fn feedback(&self) -> Option<PasswordFeedback> {
        self.lock().form.feedback()
    }

    /// Snapshot of the form.
    #[must_use]
    pub fn form(&self) -> CredentialForm {
        self.lock().form.clone()
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.lock().state == WorkflowState::Submitting
    }

    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.lock().state.accepts_input()
    }

    /// Whether the form succeeded without the provider issuing a session.
    #[must_use]
    pub fn awaiting_confirmation(&self) -> bool {
        matches!(
            self.lock().state,
            WorkflowState::Succeeded {
                session_issued: false,
                ..
            }
        )
    }

    /// Applies a field edit. Returns `false` once the form has succeeded.
    fn edit(&self, apply: impl FnOnce(&mut CredentialForm)) -> bool {
        let mut inner = self.lock();
        if matches!(inner.state, WorkflowState::Succeeded { .. }) {
            return false;
        }
        apply(&mut inner.form);
        if inner.state == WorkflowState::Failed {
            inner.state = WorkflowState::Idle;
        }
        true
    }

    pub fn set_email(&self, email: &str) -> bool {
        self.edit(|form| form.set_email(email))
    }

    pub fn set_password(&self, password: &str) -> bool {
        self.edit(|form| form.set_password(password))
    }

    pub fn set_password_confirm(&self, confirm: &str) -> bool {
        self.edit(|form| form.set_password_confirm(confirm))
    }

    pub fn set_first_name(&self, first_name: &str) -> bool {
        self.edit(|form| form.set_first_name(first_name))
    }

    pub fn set_last_name(&self, last_name: &str) -> bool {
        self.edit(|form| form.set_last_name(last_name))
    }

    /// Switches between sign-in and sign-up, keeping only the email.
    ///
    /// # Errors
    /// Returns `InFlight` while a submission runs and `Completed` after success.
    pub fn toggle_mode(&self) -> Result<Mode, SubmitError> {
        let mut inner = self.lock();
        match inner.state {
            WorkflowState::Idle | WorkflowState::Failed => {}
            WorkflowState::Validating | WorkflowState::Submitting => {
                return Err(SubmitError::InFlight);
            }
            WorkflowState::Succeeded { .. } => return Err(SubmitError::Completed),
        }

        let mode = inner.form.mode().toggled();
        inner.form.reset_for(mode);
        inner.state = WorkflowState::Idle;
        inner.last_error = None;
        debug!(?mode, "credential form mode toggled");
        Ok(mode)
    }

    /// Validates the form and performs the sign-in or sign-up call. Returns
    /// the confirmation message on success. Dropping the future before the
    /// provider answers puts the form back to `Idle`.
    ///
    /// # Errors
    /// `Invalid` when the local guard fails, `Remote` with the provider's
    /// message verbatim, `InFlight` if another submission is running and
    /// `Completed` once the form has succeeded.
    #[instrument(skip_all)]
    pub async fn submit(&self) -> Result<String, SubmitError> {
        let request = self.begin()?;
        let pending = PendingSubmit::new(&self.inner);

        let result = match request.mode {
            Mode::SignIn => self
                .provider
                .sign_in(&request.email, &request.password)
                .await
                .map(|_| (WELCOME_BACK.to_string(), true)),
            Mode::SignUp => self
                .provider
                .sign_up(&request.email, &request.password, request.metadata)
                .await
                .map(|session| (welcome_new_user(&request.first_name), session.is_some())),
        };
        pending.settle();

        let mut inner = self.lock();
        match result {
            Ok((message, session_issued)) => {
                info!(mode = ?request.mode, session_issued, "credentials accepted");
                inner.state = WorkflowState::Succeeded {
                    message: message.clone(),
                    session_issued,
                };
                Ok(message)
            }
            Err(e) => {
                warn!(mode = ?request.mode, "credentials rejected: {e}");
                inner.state = WorkflowState::Idle;
                inner.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn begin(&self) -> Result<Request, SubmitError> {
        let mut inner = self.lock();
        match inner.state {
            WorkflowState::Idle | WorkflowState::Failed => {}
            WorkflowState::Validating | WorkflowState::Submitting => {
                debug!("submit ignored, a submission is in flight");
                return Err(SubmitError::InFlight);
            }
            WorkflowState::Succeeded { .. } => return Err(SubmitError::Completed),
        }

        inner.last_error = None;
        inner.state = WorkflowState::Validating;
        if let Err(e) = inner.form.validate() {
            debug!("sign-up rejected locally: {e}");
            inner.state = WorkflowState::Failed;
            inner.last_error = Some(e.to_string());
            return Err(e.into());
        }

        inner.state = WorkflowState::Submitting;
        let form = &inner.form;
        Ok(Request {
            mode: form.mode(),
            email: form.email().to_string(),
            password: form.password().clone(),
            first_name: form.first_name().to_string(),
            metadata: form.metadata(),
        })
    }
}

/// Puts the form back to `Idle` if the submit future is dropped while the
/// remote call is outstanding.
struct PendingSubmit<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl<'a> PendingSubmit<'a> {
    const fn new(inner: &'a Mutex<Inner>) -> Self {
        Self { inner, armed: true }
    }

    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSubmit<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state == WorkflowState::Submitting {
            debug!("submission dropped before the provider answered");
            inner.state = WorkflowState::Idle;
        }
    }
}
