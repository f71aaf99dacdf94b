//! On-disk session persistence, the terminal counterpart of a browser's local
//! storage. The file holds live tokens, so it is written owner-only.

use super::{AuthError, Session, User};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    refresh_token: String,
    token_type: String,
    #[serde(default)]
    expires_at: Option<u64>,
    user: User,
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            access_token: session.access_token().expose_secret().to_string(),
            refresh_token: session.refresh_token().expose_secret().to_string(),
            token_type: session.token_type.clone(),
            expires_at: session.expires_at,
            user: session.user.clone(),
        }
    }
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        let session = Session::new(
            SecretString::from(stored.access_token),
            SecretString::from(stored.refresh_token),
            stored.user,
        )
        .with_token_type(stored.token_type);
        match stored.expires_at {
            Some(expires_at) => session.with_expires_at(expires_at),
            None => session,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    /// Returns `AuthError::Storage` if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Session>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| storage_error(&self.path, &e))?;
        let stored: StoredSession =
            serde_json::from_str(&raw).map_err(|e| storage_error(&self.path, &e))?;

        debug!(path = %self.path.display(), "session restored from disk");
        Ok(Some(stored.into()))
    }

    /// # Errors
    /// Returns `AuthError::Storage` if the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<(), AuthError> {
        let json = serde_json::to_string(&StoredSession::from(session))
            .map_err(|e| storage_error(&self.path, &e))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| storage_error(&self.path, &e))?;
        }

        fs::write(&self.path, json).map_err(|e| storage_error(&self.path, &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms).map_err(|e| storage_error(&self.path, &e))?;
        }

        Ok(())
    }

    /// # Errors
    /// Returns `AuthError::Storage` if the file exists and cannot be removed.
    pub fn clear(&self) -> Result<(), AuthError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| storage_error(&self.path, &e))?;
        }
        Ok(())
    }
}

fn storage_error(path: &Path, err: &dyn std::error::Error) -> AuthError {
    AuthError::Storage(format!("{}: {err}", path.display()))
}
