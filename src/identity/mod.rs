//! Identity-provider capability surface consumed by the session controller and
//! the credential workflow. The provider is the sole source of truth for the
//! session; this crate never polls it and never mints sessions on its own.
//!
//! Flow Overview: `current_session` is asked once at startup. Afterwards every
//! transition (sign-in, sign-out, token refresh, expiry) is pushed to the
//! handlers registered through `on_session_change`. Notifications are
//! delivered after the triggering call has resolved, never inline.

mod gotrue;
mod memory;
mod store;
mod subscription;
mod types;

pub use gotrue::{GoTrueConfig, GoTrueProvider};
pub use memory::{MemoryProvider, ProviderCall};
pub use store::SessionStore;
pub use subscription::{ListenerRegistry, SessionHandler, Subscription};
pub use types::{FIRST_NAME_KEY, LAST_NAME_KEY, Session, User, UserMetadata};

use secrecy::SecretString;
use std::future::Future;
use thiserror::Error;

/// Errors reported by an identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The provider answered and refused; `message` is its text verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("{0}")]
    Network(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("session storage failed: {0}")]
    Storage(String),
    #[error("no active session")]
    NoSession,
}

impl AuthError {
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Why the session changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    Expired,
}

/// A session transition pushed by the provider.
#[derive(Clone, Debug)]
pub struct SessionChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

impl SessionChange {
    #[must_use]
    pub fn new(event: AuthChangeEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }
}

/// What a change handler receives: the new session, or an error the provider
/// hit while tracking it.
pub type Notification = Result<SessionChange, AuthError>;

/// Remote identity service as seen by the client.
///
/// Implementations must deliver change notifications asynchronously, after
/// the call that caused them has resolved, and must look handlers up at
/// delivery time so a released handler is never invoked.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Returns the current session, or `None` when nobody is signed in.
    fn current_session(&self) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send;

    /// Registers `handler` for every future session transition. The returned
    /// subscription unregisters it on release or drop.
    fn on_session_change(&self, handler: SessionHandler) -> Subscription;

    fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;

    /// Creates an account. Returns `None` when the provider wants the email
    /// address confirmed before it issues a session.
    fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        metadata: UserMetadata,
    ) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Reads the signed-in user's profile, used by the dashboard.
    fn current_user(&self) -> impl Future<Output = Result<Option<User>, AuthError>> + Send;
}
