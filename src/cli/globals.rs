use crate::identity::GoTrueConfig;
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

#[derive(Clone)]
pub struct GlobalArgs {
    pub auth_url: Url,
    pub anon_key: SecretString,
    pub session_file: Option<PathBuf>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(auth_url: Url, anon_key: SecretString) -> Self {
        Self {
            auth_url,
            anon_key,
            session_file: None,
        }
    }

    #[must_use]
    pub fn with_session_file(mut self, session_file: Option<PathBuf>) -> Self {
        self.session_file = session_file;
        self
    }

    #[must_use]
    pub fn provider_config(&self) -> GoTrueConfig {
        GoTrueConfig {
            url: self.auth_url.clone(),
            api_key: self.anon_key.clone(),
            session_file: self.session_file.clone(),
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("auth_url", &self.auth_url.as_str())
            .field("anon_key", &"***")
            .field("session_file", &self.session_file)
            .finish()
    }
}
