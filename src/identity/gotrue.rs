//! GoTrue (Supabase auth) REST provider. Requests carry the project's anon key
//! in `apikey` and either the anon key or the user's access token as bearer.
//! Passwords and tokens are never logged.
//!
//! Flow Overview: sign-in and token refresh hit `/token`, sign-up hits
//! `/signup`, sign-out hits `/logout`, the profile comes from `/user`. Every
//! accepted session is kept in memory, optionally mirrored to a session file,
//! and announced to the registered listeners.

use super::{
    AuthChangeEvent, AuthError, IdentityProvider, ListenerRegistry, Session, SessionChange,
    SessionHandler, SessionStore, Subscription, User, UserMetadata, types::unix_now,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    fmt,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info, instrument, warn};
use url::Url;

const AUTH_PATH: &str = "auth/v1/";
const ERROR_MESSAGE_FIELDS: [&str; 4] = ["msg", "error_description", "message", "error"];

#[derive(Clone)]
pub struct GoTrueConfig {
    pub url: Url,
    pub api_key: SecretString,
    pub session_file: Option<PathBuf>,
}

impl fmt::Debug for GoTrueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoTrueConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &"***")
            .field("session_file", &self.session_file)
            .finish()
    }
}

/// Token endpoint payload.
#[derive(Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    expires_at: Option<u64>,
    user: User,
}

impl From<SessionResponse> for Session {
    fn from(response: SessionResponse) -> Self {
        let mut session = Session::new(
            SecretString::from(response.access_token),
            SecretString::from(response.refresh_token),
            response.user,
        );
        if let Some(token_type) = response.token_type {
            session = session.with_token_type(token_type);
        }
        match response
            .expires_at
            .or_else(|| response.expires_in.map(|secs| unix_now() + secs))
        {
            Some(expires_at) => session.with_expires_at(expires_at),
            None => session,
        }
    }
}

pub struct GoTrueProvider {
    client: Client,
    base: Url,
    api_key: SecretString,
    session: Mutex<Option<Session>>,
    store: Option<SessionStore>,
    listeners: ListenerRegistry,
}

impl GoTrueProvider {
    /// Builds the provider and restores a persisted session when a session
    /// file is configured. An unreadable session file is ignored.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the URL cannot
    /// serve as a base.
    pub fn new(config: GoTrueConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()?;

        let base = auth_base(&config.url)?;
        let store = config.session_file.map(SessionStore::new);

        let session = match store.as_ref().map(SessionStore::load) {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                warn!("Ignoring unreadable session file: {e}");
                None
            }
            None => None,
        };

        Ok(Self {
            client,
            base,
            api_key: config.api_key,
            session: Mutex::new(session),
            store,
            listeners: ListenerRegistry::new(),
        })
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base
            .join(path)
            .map_err(|e| AuthError::InvalidResponse(format!("invalid endpoint {path}: {e}")))
    }

    /// Attaches the anon key and the bearer token (anon key when `token` is `None`).
    fn authorized(&self, request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.api_key);
        request
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(bearer.expose_secret())
    }

    /// Stores the new session, mirrors it to disk and schedules the
    /// notification.
    fn transition(&self, event: AuthChangeEvent, session: Option<Session>) {
        *self.lock_session() = session.clone();

        if let Some(store) = &self.store {
            let persisted = match &session {
                Some(session) => store.save(session),
                None => store.clear(),
            };
            if let Err(e) = persisted {
                warn!("Failed to persist session: {e}");
            }
        }

        debug!(?event, authenticated = session.is_some(), "session transition");
        self.listeners.notify(Ok(SessionChange::new(event, session)));
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<Session, AuthError> {
        let url = self.endpoint("token?grant_type=refresh_token")?;
        let response = self
            .authorized(self.client.post(url), None)
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session: SessionResponse = response.json().await?;
        Ok(session.into())
    }
}

impl fmt::Debug for GoTrueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoTrueProvider")
            .field("base", &self.base.as_str())
            .field("api_key", &"***")
            .field("store", &self.store)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl IdentityProvider for GoTrueProvider {
    #[instrument(skip_all)]
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.snapshot() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!("stored session expired, refreshing");
        match self.refresh(session.refresh_token()).await {
            Ok(refreshed) => {
                info!(user_id = %refreshed.user.id, "session refreshed");
                self.transition(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) => {
                warn!("Session refresh failed: {e}");
                self.transition(AuthChangeEvent::Expired, None);
                Err(e)
            }
        }
    }

    fn on_session_change(&self, handler: SessionHandler) -> Subscription {
        self.listeners.register(handler)
    }

    #[instrument(skip_all)]
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
        let url = self.endpoint("token?grant_type=password")?;
        let response = self
            .authorized(self.client.post(url), None)
            .json(&json!({
                "email": email,
                "password": password.expose_secret(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session: Session = response.json::<SessionResponse>().await?.into();
        info!(user_id = %session.user.id, "signed in");
        self.transition(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    #[instrument(skip_all)]
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        metadata: UserMetadata,
    ) -> Result<Option<Session>, AuthError> {
        let url = self.endpoint("signup")?;
        let response = self
            .authorized(self.client.post(url), None)
            .json(&json!({
                "email": email,
                "password": password.expose_secret(),
                "data": metadata,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        // Autoconfirming projects answer with a session, the others with the
        // bare user awaiting email confirmation.
        let body: Value = response.json().await?;
        if body.get("access_token").is_none() {
            let user: User = serde_json::from_value(body)
                .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
            info!(user_id = %user.id, "signed up, awaiting email confirmation");
            return Ok(None);
        }

        let session: Session = serde_json::from_value::<SessionResponse>(body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?
            .into();
        info!(user_id = %session.user.id, "signed up");
        self.transition(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(Some(session))
    }

    #[instrument(skip_all)]
    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.snapshot() {
            let url = self.endpoint("logout")?;
            let response = self
                .authorized(self.client.post(url), Some(session.access_token()))
                .send()
                .await?;

            let status = response.status();
            // A token the server no longer knows is as good as signed out.
            if !status.is_success()
                && !matches!(
                    status,
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
                )
            {
                return Err(error_from_response(response).await);
            }
        }

        info!("signed out");
        self.transition(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn current_user(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.snapshot() else {
            return Ok(None);
        };

        let url = self.endpoint("user")?;
        let response = self
            .authorized(self.client.get(url), Some(session.access_token()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(Some(response.json().await?))
    }
}

/// Resolves `{url}/auth/v1/`, keeping any path prefix the URL already has.
fn auth_base(url: &Url) -> Result<Url, AuthError> {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(AUTH_PATH)
        .map_err(|e| AuthError::InvalidResponse(format!("invalid auth URL {url}: {e}")))
}

async fn error_from_response(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| error_message(&json))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    debug!(status = status.as_u16(), "provider rejected request");
    AuthError::Rejected {
        status: status.as_u16(),
        message,
    }
}

fn error_message(json: &Value) -> Option<String> {
    ERROR_MESSAGE_FIELDS
        .iter()
        .find_map(|field| json.get(field).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::Notification;
    use anyhow::Result;
    use std::{
        net::TcpListener,
        sync::{Arc, Mutex},
    };
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER_ID: &str = "5f1d1c58-3d4e-4a3c-9a43-2b0c6f1d2a10";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn config(server: &MockServer, session_file: Option<PathBuf>) -> GoTrueConfig {
        GoTrueConfig {
            url: Url::parse(&server.uri()).unwrap(),
            api_key: SecretString::from("anon-key".to_string()),
            session_file,
        }
    }

    fn user_json() -> Value {
        json!({
            "id": USER_ID,
            "email": "a@b.com",
            "user_metadata": { "first_name": "Ada", "last_name": "Lovelace" }
        })
    }

    fn session_json(access_token: &str) -> Value {
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-token",
            "user": user_json()
        })
    }

    fn recorded(provider: &GoTrueProvider) -> (Arc<Mutex<Vec<Notification>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = provider.on_session_change(Arc::new(move |n: &Notification| {
            sink.lock().unwrap().push(n.clone());
        }));
        (events, subscription)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn auth_base_keeps_prefix() {
        let base = auth_base(&Url::parse("https://project.supabase.co").unwrap()).unwrap();
        assert_eq!(base.as_str(), "https://project.supabase.co/auth/v1/");

        let base = auth_base(&Url::parse("https://gateway.tld/tenant").unwrap()).unwrap();
        assert_eq!(base.as_str(), "https://gateway.tld/tenant/auth/v1/");
    }

    #[test]
    fn error_message_field_priority() {
        assert_eq!(
            error_message(&json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
            Some("Invalid login credentials".to_string())
        );
        assert_eq!(
            error_message(&json!({ "code": 422, "msg": "User already registered" })),
            Some("User already registered".to_string())
        );
        assert_eq!(error_message(&json!({ "code": 500 })), None);
    }

    #[tokio::test]
    async fn sign_in_stores_session_and_notifies() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon-key"))
            .and(body_partial_json(json!({ "email": "a@b.com", "password": "Abcdef1!" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("access-1")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, None))?;
        let (events, _subscription) = recorded(&provider);

        let session = provider
            .sign_in("a@b.com", &SecretString::from("Abcdef1!".to_string()))
            .await?;
        assert_eq!(session.access_token().expose_secret(), "access-1");
        assert_eq!(session.user.metadata.first_name(), Some("Ada"));
        assert!(session.expires_at.is_some());

        settle().await;
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let change = events[0].as_ref().unwrap();
        assert_eq!(change.event, AuthChangeEvent::SignedIn);
        assert!(change.session.is_some());
        assert!(provider.current_session().await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_rejection_is_verbatim_and_silent() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, None))?;
        let (events, _subscription) = recorded(&provider);

        let result = provider
            .sign_in("a@b.com", &SecretString::from("wrong".to_string()))
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(matches!(err, AuthError::Rejected { status: 400, .. }));

        settle().await;
        assert!(events.lock().unwrap().is_empty());
        assert!(provider.current_session().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_sends_metadata_and_handles_confirmation() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(body_partial_json(json!({
                "email": "a@b.com",
                "data": { "first_name": "Ada", "last_name": "Lovelace" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, None))?;
        let (events, _subscription) = recorded(&provider);

        let session = provider
            .sign_up(
                "a@b.com",
                &SecretString::from("Abcdef1!".to_string()),
                UserMetadata::with_names("Ada", "Lovelace"),
            )
            .await?;
        assert!(session.is_none());

        settle().await;
        assert!(events.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_with_autoconfirm_signs_in() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("access-2")))
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, None))?;
        let session = provider
            .sign_up(
                "a@b.com",
                &SecretString::from("Abcdef1!".to_string()),
                UserMetadata::with_names("Ada", "Lovelace"),
            )
            .await?;
        assert_eq!(
            session.map(|s| s.access_token().expose_secret().to_string()),
            Some("access-2".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_duplicate_account_is_verbatim() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "error_code": "user_already_exists",
                "msg": "User already registered"
            })))
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, None))?;
        let err = provider
            .sign_up(
                "a@b.com",
                &SecretString::from("Abcdef1!".to_string()),
                UserMetadata::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_uses_access_token_and_clears_file() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let dir = TempDir::new()?;
        let session_file = dir.path().join("session.json");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("access-3")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer access-3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, Some(session_file.clone())))?;
        provider
            .sign_in("a@b.com", &SecretString::from("Abcdef1!".to_string()))
            .await?;
        assert!(session_file.exists());

        provider.sign_out().await?;
        assert!(!session_file.exists());
        assert!(provider.current_session().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn persisted_session_is_restored() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let dir = TempDir::new()?;
        let session_file = dir.path().join("session.json");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("access-4")))
            .mount(&server)
            .await;

        let first = GoTrueProvider::new(config(&server, Some(session_file.clone())))?;
        first
            .sign_in("a@b.com", &SecretString::from("Abcdef1!".to_string()))
            .await?;

        let second = GoTrueProvider::new(config(&server, Some(session_file)))?;
        let restored = second.current_session().await?.unwrap();
        assert_eq!(restored.access_token().expose_secret(), "access-4");
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_is_refreshed() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let dir = TempDir::new()?;
        let store = SessionStore::new(dir.path().join("session.json"));
        let user: User = serde_json::from_value(user_json())?;
        store.save(
            &Session::new(
                SecretString::from("stale".to_string()),
                SecretString::from("refresh-token".to_string()),
                user,
            )
            .with_expires_at(1),
        )?;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_partial_json(json!({ "refresh_token": "refresh-token" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            GoTrueProvider::new(config(&server, Some(store.path().to_path_buf())))?;
        let (events, _subscription) = recorded(&provider);

        let session = provider.current_session().await?.unwrap();
        assert_eq!(session.access_token().expose_secret(), "fresh");

        settle().await;
        let events = events.lock().unwrap();
        assert_eq!(
            events[0].as_ref().map(|change| change.event).ok(),
            Some(AuthChangeEvent::TokenRefreshed)
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_expires_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let dir = TempDir::new()?;
        let store = SessionStore::new(dir.path().join("session.json"));
        let user: User = serde_json::from_value(user_json())?;
        store.save(
            &Session::new(
                SecretString::from("stale".to_string()),
                SecretString::from("revoked".to_string()),
                user,
            )
            .with_expires_at(1),
        )?;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "msg": "Invalid Refresh Token: Refresh Token Not Found"
            })))
            .mount(&server)
            .await;

        let provider =
            GoTrueProvider::new(config(&server, Some(store.path().to_path_buf())))?;
        let err = provider.current_session().await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid Refresh Token: Refresh Token Not Found");
        assert!(!store.path().exists());
        assert!(provider.current_session().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn current_user_reads_profile() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("access-5")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer access-5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;

        let provider = GoTrueProvider::new(config(&server, None))?;
        assert!(provider.current_user().await?.is_none());

        provider
            .sign_in("a@b.com", &SecretString::from("Abcdef1!".to_string()))
            .await?;
        let user = provider.current_user().await?.unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(user.metadata.last_name(), Some("Lovelace"));
        Ok(())
    }
}
