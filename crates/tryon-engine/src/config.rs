use std::env;
use std::path::PathBuf;

use tryon_contracts::session::CredentialPolicy;

pub const DEFAULT_AUTH_BASE_URL: &str = "https://tryon-auth.onrender.com";
pub const DEFAULT_NANOBANANA_ENDPOINT: &str = "https://api.nanobanana.ai/v1/try-on";
pub const DEFAULT_DEEPAI_ENDPOINT: &str = "https://api.deepai.org/api/image-editor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryOnConfig {
    pub auth_base_url: String,
    pub nanobanana_endpoint: String,
    pub deepai_endpoint: String,
    pub state_dir: PathBuf,
    pub credential_policy: CredentialPolicy,
}

impl TryOnConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`TryOnConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let url = |key: &str, default: &str| {
            read(key)
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            auth_base_url: url("TRYON_AUTH_BASE_URL", DEFAULT_AUTH_BASE_URL),
            nanobanana_endpoint: url("TRYON_NANOBANANA_ENDPOINT", DEFAULT_NANOBANANA_ENDPOINT),
            deepai_endpoint: url("TRYON_DEEPAI_ENDPOINT", DEFAULT_DEEPAI_ENDPOINT),
            state_dir: read("TRYON_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_state_dir),
            credential_policy: read("TRYON_KEEP_API_KEY_ON_LOGOUT")
                .and_then(|value| CredentialPolicy::from_flag(&value))
                .unwrap_or_default(),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.state_dir.join("events.jsonl")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tryon")
}
