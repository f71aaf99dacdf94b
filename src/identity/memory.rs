//! In-process identity provider. Accounts live in a map, sessions are minted
//! locally and every call is recorded, which makes it the provider of choice
//! for tests and offline runs. Like the remote provider it yields before
//! answering and announces transitions after the call resolves.

use super::{
    AuthChangeEvent, AuthError, IdentityProvider, ListenerRegistry, Notification, Session,
    SessionChange, SessionHandler, Subscription, User, UserMetadata,
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::debug;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "Invalid login credentials";
const ALREADY_REGISTERED: &str = "User already registered";

/// A provider call as recorded by [`MemoryProvider`].
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderCall {
    CurrentSession,
    SignIn { email: String },
    SignUp { email: String, metadata: UserMetadata },
    SignOut,
    CurrentUser,
}

struct Account {
    password: SecretString,
    user: User,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    calls: Vec<ProviderCall>,
    current_session_error: Option<AuthError>,
    next_failure: Option<AuthError>,
    stall_next: bool,
    require_confirmation: bool,
}

#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    listeners: ListenerRegistry,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registered account.
    #[must_use]
    pub fn with_account(self, email: &str, password: &str, metadata: UserMetadata) -> Self {
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                password: SecretString::from(password.to_string()),
                user: User::new(Uuid::new_v4(), Some(email.to_string()), metadata),
            },
        );
        self
    }

    /// Starts with `session` already active, as if restored from storage.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        self.lock().session = Some(session);
        self
    }

    /// Sign-up creates the account but issues no session until the email
    /// address is confirmed.
    #[must_use]
    pub fn requiring_confirmation(self) -> Self {
        self.lock().require_confirmation = true;
        self
    }

    /// Makes every `current_session` call fail with `err`.
    pub fn fail_current_session(&self, err: AuthError) {
        self.lock().current_session_error = Some(err);
    }

    /// Makes the next sign-in, sign-up or sign-out fail with `err`.
    pub fn fail_next(&self, err: AuthError) {
        self.lock().next_failure = Some(err);
    }

    /// Makes the next sign-in or sign-up hang without ever answering.
    pub fn stall_next(&self) {
        self.lock().stall_next = true;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Pushes `notification` to the registered handlers as if the provider
    /// had observed a transition on its own.
    pub fn emit(&self, notification: Notification) {
        if let Ok(change) = &notification {
            self.lock().session.clone_from(&change.session);
        }
        self.listeners.notify(notification);
    }

    /// Drops the active session and announces the expiry.
    pub fn expire_session(&self) {
        self.emit(Ok(SessionChange::new(AuthChangeEvent::Expired, None)));
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn password_matches(&self, email: &str, password: &str) -> bool {
        self.lock()
            .accounts
            .get(email)
            .is_some_and(|account| account.password.expose_secret() == password)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ProviderCall) -> Option<AuthError> {
        let mut state = self.lock();
        state.calls.push(call);
        state.next_failure.take()
    }

    async fn stall_if_requested(&self) {
        let stall = std::mem::take(&mut self.lock().stall_next);
        if stall {
            debug!("memory provider stalling");
            std::future::pending::<()>().await;
        }
    }

    fn start_session(&self, user: User) -> Session {
        let session = Session::new(
            SecretString::from(format!("memory-access-{}", Uuid::new_v4())),
            SecretString::from(format!("memory-refresh-{}", Uuid::new_v4())),
            user,
        );
        self.lock().session = Some(session.clone());
        debug!(user_id = %session.user.id, "memory session started");
        self.listeners.notify(Ok(SessionChange::new(
            AuthChangeEvent::SignedIn,
            Some(session.clone()),
        )));
        session
    }
}

impl fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryProvider")
            .field("accounts", &state.accounts.len())
            .field("authenticated", &state.session.is_some())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl IdentityProvider for MemoryProvider {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.push(ProviderCall::CurrentSession);
        match &state.current_session_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.session.clone()),
        }
    }

    fn on_session_change(&self, handler: SessionHandler) -> Subscription {
        self.listeners.register(handler)
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
        tokio::task::yield_now().await;
        if let Some(err) = self.record(ProviderCall::SignIn {
            email: email.to_string(),
        }) {
            return Err(err);
        }
        self.stall_if_requested().await;

        let user = {
            let state = self.lock();
            state
                .accounts
                .get(email)
                .filter(|account| account.password.expose_secret() == password.expose_secret())
                .map(|account| account.user.clone())
        };

        match user {
            Some(user) => Ok(self.start_session(user)),
            None => Err(AuthError::rejected(400, INVALID_CREDENTIALS)),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        metadata: UserMetadata,
    ) -> Result<Option<Session>, AuthError> {
        tokio::task::yield_now().await;
        if let Some(err) = self.record(ProviderCall::SignUp {
            email: email.to_string(),
            metadata: metadata.clone(),
        }) {
            return Err(err);
        }
        self.stall_if_requested().await;

        let (user, require_confirmation) = {
            let mut state = self.lock();
            if state.accounts.contains_key(email) {
                return Err(AuthError::rejected(422, ALREADY_REGISTERED));
            }
            let user = User::new(Uuid::new_v4(), Some(email.to_string()), metadata);
            state.accounts.insert(
                email.to_string(),
                Account {
                    password: password.clone(),
                    user: user.clone(),
                },
            );
            (user, state.require_confirmation)
        };

        if require_confirmation {
            debug!(user_id = %user.id, "memory account awaiting confirmation");
            return Ok(None);
        }
        Ok(Some(self.start_session(user)))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        tokio::task::yield_now().await;
        if let Some(err) = self.record(ProviderCall::SignOut) {
            return Err(err);
        }

        self.lock().session = None;
        self.listeners
            .notify(Ok(SessionChange::new(AuthChangeEvent::SignedOut, None)));
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>, AuthError> {
        tokio::task::yield_now().await;
        if let Some(err) = self.record(ProviderCall::CurrentUser) {
            return Err(err);
        }
        Ok(self.lock().session.as_ref().map(|session| session.user.clone()))
    }
}
