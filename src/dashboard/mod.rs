//! Authenticated view model. Writing statistics are not tracked here.

use crate::identity::{AuthError, IdentityProvider, User};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Profile {
    /// First name when known, otherwise the email address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("writer")
    }
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.metadata.first_name().map(str::to_string),
            last_name: user.metadata.last_name().map(str::to_string),
            email: user.email,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DashboardState {
    #[default]
    Loading,
    Ready(Option<Profile>),
}

pub struct Dashboard<P> {
    provider: Arc<P>,
    state: DashboardState,
}

impl<P: IdentityProvider> Dashboard<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            state: DashboardState::Loading,
        }
    }

    #[must_use]
    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        match &self.state {
            DashboardState::Ready(profile) => profile.as_ref(),
            DashboardState::Loading => None,
        }
    }

    /// Reads the current user. A failed read leaves the dashboard without a
    /// profile.
    #[instrument(skip_all)]
    pub async fn load(&mut self) -> &DashboardState {
        let profile = match self.provider.current_user().await {
            Ok(user) => user.map(Profile::from),
            Err(e) => {
                warn!("Failed to load the current user: {e}");
                None
            }
        };
        self.state = DashboardState::Ready(profile);
        &self.state
    }

    /// Signs out. The session controller learns about it from the provider.
    ///
    /// # Errors
    /// Returns the provider's error.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await
    }
}
