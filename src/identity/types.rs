//! Session and user types issued by the identity provider. Token material is
//! kept in `SecretString` so it never shows up in `Debug` output or logs.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

pub const FIRST_NAME_KEY: &str = "first_name";
pub const LAST_NAME_KEY: &str = "last_name";

const DEFAULT_TOKEN_TYPE: &str = "bearer";

/// Free-form user metadata stored by the provider. Sign-up writes the first
/// and last name here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserMetadata(Map<String, Value>);

impl UserMetadata {
    #[must_use]
    pub fn with_names(first_name: &str, last_name: &str) -> Self {
        let mut metadata = Self::default();
        metadata.insert(FIRST_NAME_KEY, Value::String(first_name.to_string()));
        metadata.insert(LAST_NAME_KEY, Value::String(last_name.to_string()));
        metadata
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.get_str(FIRST_NAME_KEY)
    }

    #[must_use]
    pub fn last_name(&self) -> Option<&str> {
        self.get_str(LAST_NAME_KEY)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "user_metadata")]
    pub metadata: UserMetadata,
}

impl User {
    #[must_use]
    pub fn new(id: Uuid, email: Option<String>, metadata: UserMetadata) -> Self {
        Self {
            id,
            email,
            metadata,
        }
    }
}

/// Authenticated credential bundle. Valid until sign-out or provider-side
/// expiry.
#[derive(Clone)]
pub struct Session {
    access_token: SecretString,
    refresh_token: SecretString,
    pub token_type: String,
    /// Unix seconds; `None` when the provider did not say.
    pub expires_at: Option<u64>,
    pub user: User,
}

impl Session {
    #[must_use]
    pub fn new(access_token: SecretString, refresh_token: SecretString, user: User) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            expires_at: None,
            user,
        }
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: String) -> Self {
        self.token_type = token_type;
        self
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn user() -> User {
        User::new(
            Uuid::new_v4(),
            Some("a@b.com".to_string()),
            UserMetadata::with_names("Ada", "Lovelace"),
        )
    }

    #[test]
    fn metadata_exposes_names() {
        let metadata = UserMetadata::with_names("Ada", "Lovelace");
        assert_eq!(metadata.first_name(), Some("Ada"));
        assert_eq!(metadata.last_name(), Some("Lovelace"));
        assert_eq!(metadata.as_map().len(), 2);
    }

    #[test]
    fn user_deserializes_provider_shape() {
        let raw = json!({
            "id": "5f1d1c58-3d4e-4a3c-9a43-2b0c6f1d2a10",
            "aud": "authenticated",
            "email": "a@b.com",
            "user_metadata": { "first_name": "Ada", "last_name": "Lovelace" },
            "app_metadata": { "provider": "email" }
        });
        let user: User = serde_json::from_value(raw).unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(user.metadata.first_name(), Some("Ada"));
    }

    #[test]
    fn user_without_metadata_defaults_to_empty() {
        let raw = json!({ "id": "5f1d1c58-3d4e-4a3c-9a43-2b0c6f1d2a10" });
        let user: User = serde_json::from_value(raw).unwrap();
        assert!(user.email.is_none());
        assert!(user.metadata.as_map().is_empty());
    }

    #[test]
    fn session_expiry() {
        let session = Session::new(secret("a"), secret("r"), user());
        assert!(!session.is_expired_at(100));

        let session = session.with_expires_at(100);
        assert!(!session.is_expired_at(99));
        assert!(session.is_expired_at(100));
        assert!(session.is_expired_at(101));
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session = Session::new(secret("access-secret"), secret("refresh-secret"), user());
        let debug = format!("{session:?}");
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("a@b.com"));
    }
}
