mod store;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use store::KeyValueStore;

pub const TOKEN_KEY: &str = "tryon.token";
pub const USER_KEY: &str = "tryon.user";
pub const CREDENTIAL_KEY: &str = "tryon.api_key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.email.as_str())
    }
}

/// Whether the stored API key outlives a logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPolicy {
    #[default]
    KeepOnLogout,
    ClearOnLogout,
}

impl CredentialPolicy {
    pub fn from_flag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "keep" => Some(Self::KeepOnLogout),
            "0" | "false" | "no" | "clear" => Some(Self::ClearOnLogout),
            _ => None,
        }
    }
}

/// Who is signed in and which API key they use. Passed around explicitly;
/// there is no process-wide session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub auth_token: Option<String>,
    pub user: Option<UserProfile>,
    pub credential: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.auth_token
            .as_deref()
            .map(|token| !token.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn sign_in(&mut self, token: String, user: Option<UserProfile>) {
        self.auth_token = Some(token);
        self.user = user;
    }

    pub fn logout(&mut self, policy: CredentialPolicy) {
        self.auth_token = None;
        self.user = None;
        if policy == CredentialPolicy::ClearOnLogout {
            self.credential = None;
        }
    }

    pub fn set_credential(&mut self, credential: Option<String>) {
        self.credential = credential
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    store: KeyValueStore,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: KeyValueStore::new(path),
        }
    }

    /// Hydrates the session. A user entry that no longer parses is removed
    /// and treated as absent; the token and key still load.
    pub fn load(&self) -> anyhow::Result<SessionState> {
        let auth_token = self.store.get(TOKEN_KEY).filter(|value| !value.is_empty());
        let credential = self
            .store
            .get(CREDENTIAL_KEY)
            .filter(|value| !value.is_empty());
        let user = match self.store.get(USER_KEY) {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(_) => {
                    self.store.remove(USER_KEY)?;
                    None
                }
            },
            None => None,
        };
        Ok(SessionState {
            auth_token,
            user,
            credential,
        })
    }

    pub fn save(&self, state: &SessionState) -> anyhow::Result<()> {
        self.put(TOKEN_KEY, state.auth_token.as_deref())?;
        let user = state
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.put(USER_KEY, user.as_deref())?;
        self.put(CREDENTIAL_KEY, state.credential.as_deref())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        for key in [TOKEN_KEY, USER_KEY, CREDENTIAL_KEY] {
            self.store.remove(key)?;
        }
        Ok(())
    }

    fn put(&self, key: &str, value: Option<&str>) -> anyhow::Result<()> {
        match value {
            Some(value) => self.store.set(key, value),
            None => self.store.remove(key),
        }
    }
}
