//! Application shell: decides which surface is visible from the session state
//! and hands out the view models for it.

use crate::{
    credentials::CredentialWorkflow,
    dashboard::Dashboard,
    identity::{IdentityProvider, Session, Subscription},
    session::{SessionController, SessionState},
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub enum Surface {
    /// Startup, before the provider has answered. Nothing definitive is shown.
    Pending,
    SignIn,
    Dashboard(Session),
}

impl From<&SessionState> for Surface {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Unknown => Self::Pending,
            SessionState::Unauthenticated => Self::SignIn,
            SessionState::Authenticated(session) => Self::Dashboard(session.clone()),
        }
    }
}

pub struct App<P> {
    controller: SessionController<P>,
    subscription: Subscription,
}

impl<P: IdentityProvider> App<P> {
    /// Initializes the session, then follows the provider's notifications
    /// until [`Self::shutdown`].
    pub async fn start(provider: Arc<P>) -> Self {
        let controller = SessionController::new(provider);
        let state = controller.initialize().await;
        debug!(surface = ?Surface::from(&state), "initial surface");

        let subscription = controller.subscribe(|state| {
            debug!(surface = ?Surface::from(state), "surface changed");
        });

        Self {
            controller,
            subscription,
        }
    }

    #[must_use]
    pub fn surface(&self) -> Surface {
        Surface::from(&self.controller.state())
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.controller.session()
    }

    #[must_use]
    pub fn controller(&self) -> &SessionController<P> {
        &self.controller
    }

    /// A fresh form, available only while the sign-in surface is shown.
    #[must_use]
    pub fn credential_workflow(&self) -> Option<CredentialWorkflow<P>> {
        matches!(self.surface(), Surface::SignIn)
            .then(|| CredentialWorkflow::new(Arc::clone(self.controller.provider())))
    }

    /// The dashboard, available only while a session is present.
    #[must_use]
    pub fn dashboard(&self) -> Option<Dashboard<P>> {
        matches!(self.surface(), Surface::Dashboard(_))
            .then(|| Dashboard::new(Arc::clone(self.controller.provider())))
    }

    /// Waits for the switch to the dashboard. Returns `None` on timeout.
    pub async fn wait_for_dashboard(&self, limit: Duration) -> Option<Session> {
        let mut rx = self.controller.watch();
        match timeout(limit, rx.wait_for(SessionState::is_authenticated)).await {
            Ok(Ok(state)) => state.session().cloned(),
            _ => None,
        }
    }

    /// Waits for the switch back to the sign-in surface. Returns `false` on
    /// timeout.
    pub async fn wait_for_sign_in(&self, limit: Duration) -> bool {
        let mut rx = self.controller.watch();
        matches!(
            timeout(
                limit,
                rx.wait_for(|state| matches!(state, SessionState::Unauthenticated))
            )
            .await,
            Ok(Ok(_))
        )
    }

    /// Stops following the provider.
    pub fn shutdown(self) {
        self.subscription.release();
        info!("session subscription released");
    }
}
