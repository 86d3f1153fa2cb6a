mod deepai;
mod nanobanana;

use std::collections::HashMap;
use std::fmt;

use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;
use tryon_contracts::generation::SourceTag;
use tryon_contracts::images::EncodedImage;
use tryon_contracts::models::Backend;

use crate::config::TryOnConfig;
use crate::http::{error_chain_text, truncate_text};

pub use deepai::{DeepAiAdapter, DEEPAI_INSTRUCTION};
pub use nanobanana::NanoBananaAdapter;

/// One image reported by a remote provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterImage {
    pub url: String,
    pub label: String,
    pub source: SourceTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    pub provider: String,
    pub http_status: Option<u16>,
    pub message: String,
}

impl AdapterError {
    pub fn new(provider: &str, http_status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            http_status,
            message: message.into(),
        }
    }

    pub(crate) fn transport(provider: &str, err: reqwest::Error) -> Self {
        let status = err.status().map(|status| status.as_u16());
        Self::new(
            provider,
            status,
            error_chain_text(&anyhow::Error::new(err), 512),
        )
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(code) => write!(f, "{} request failed ({code}): {}", self.provider, self.message),
            None => write!(f, "{} request failed: {}", self.provider, self.message),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Translator between the common try-on call and one provider's wire
/// format. Exactly one round trip per call; retries belong to the caller.
pub trait TryOnAdapter: Send + Sync {
    fn backend(&self) -> Backend;

    fn invoke(
        &self,
        subject: &EncodedImage,
        garment: &EncodedImage,
        credential: &str,
    ) -> Result<Vec<AdapterImage>, AdapterError>;
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Backend, Box<dyn TryOnAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TryOnConfig) -> Self {
        let mut adapters = Self::new();
        adapters.register(NanoBananaAdapter::new(config.nanobanana_endpoint.clone()));
        adapters.register(DeepAiAdapter::new(config.deepai_endpoint.clone()));
        adapters
    }

    pub fn register<A: TryOnAdapter + 'static>(&mut self, adapter: A) {
        self.adapters.insert(adapter.backend(), Box::new(adapter));
    }

    pub fn get(&self, backend: Backend) -> Option<&dyn TryOnAdapter> {
        self.adapters.get(&backend).map(|adapter| adapter.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .keys()
            .map(|backend| backend.provider_name().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Reads the body once; non-2xx and non-JSON bodies become [`AdapterError`].
pub(crate) fn response_json_or_error(
    provider: &str,
    response: HttpResponse,
) -> Result<Value, AdapterError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| AdapterError::transport(provider, err))?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|payload| {
                ["message", "error", "detail", "err"]
                    .iter()
                    .find_map(|key| payload.get(*key).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| truncate_text(body.trim(), 512));
        return Err(AdapterError::new(provider, Some(code), message));
    }
    serde_json::from_str(&body).map_err(|err| {
        AdapterError::new(
            provider,
            Some(code),
            format!("returned invalid JSON payload: {err}"),
        )
    })
}

/// First non-empty string among `fields`, in order.
pub(crate) fn first_url(payload: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        payload
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}
