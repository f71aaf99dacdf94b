//! Single source of truth for "is a user authenticated".
//!
//! The controller asks the provider once at startup and afterwards only
//! follows the transitions the provider pushes. State is published through a
//! `watch` channel so any task can await the next flip.

use crate::identity::{AuthError, IdentityProvider, Notification, Session, Subscription};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Debug, Default)]
pub enum SessionState {
    /// The initial query has not resolved yet.
    #[default]
    Unknown,
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unknown | Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl From<Option<Session>> for SessionState {
    fn from(session: Option<Session>) -> Self {
        session.map_or(Self::Unauthenticated, Self::Authenticated)
    }
}

pub struct SessionController<P> {
    provider: Arc<P>,
    state: Arc<watch::Sender<SessionState>>,
    init_error: Mutex<Option<AuthError>>,
}

impl<P: IdentityProvider> SessionController<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            provider,
            state: Arc::new(state),
            init_error: Mutex::new(None),
        }
    }

    /// Queries the provider for the current session. A failed query leaves
    /// the user signed out and is kept for [`Self::initialization_error`].
    /// If a change notification already settled the state, that state wins.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> SessionState {
        let initial = match self.provider.current_session().await {
            Ok(session) => {
                *self.init_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
                SessionState::from(session)
            }
            Err(e) => {
                warn!("Initial session query failed, continuing signed out: {e}");
                *self.init_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                SessionState::Unauthenticated
            }
        };

        let applied = self.state.send_if_modified(|state| {
            if state.is_known() {
                return false;
            }
            *state = initial.clone();
            true
        });

        if applied {
            info!(authenticated = initial.is_authenticated(), "session initialized");
        } else {
            debug!("session settled by a notification before the initial query resolved");
        }
        self.state()
    }

    /// Registers `on_change` for every future session transition. Error
    /// notifications are dropped and the last known session is kept.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let state = Arc::clone(&self.state);
        self.provider
            .on_session_change(Arc::new(move |notification: &Notification| {
                match notification {
                    Ok(change) => {
                        let next = SessionState::from(change.session.clone());
                        info!(
                            event = ?change.event,
                            authenticated = next.is_authenticated(),
                            "session changed"
                        );
                        state.send_replace(next.clone());
                        on_change(&next);
                    }
                    Err(e) => {
                        warn!("Dropping session notification carrying an error: {e}");
                    }
                }
            }))
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver that observes every state change from now on.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Error of the initial session query, kept for diagnostics only.
    #[must_use]
    pub fn initialization_error(&self) -> Option<AuthError> {
        self.init_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}
