use reqwest::blocking::Client as HttpClient;
use serde_json::json;
use tryon_contracts::images::EncodedImage;
use tryon_contracts::models::Backend;

use super::{first_url, response_json_or_error, AdapterError, AdapterImage, TryOnAdapter};

const PROVIDER: &str = "DeepAI";

pub const DEEPAI_INSTRUCTION: &str = "Dress the person in this photo in the selected garment. \
Keep their face, pose, body shape and background unchanged.";

/// JSON body with the subject embedded as a data URL; the garment is
/// described by the instruction text only.
pub struct DeepAiAdapter {
    endpoint: String,
    http: HttpClient,
}

impl DeepAiAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(),
        }
    }
}

impl TryOnAdapter for DeepAiAdapter {
    fn backend(&self) -> Backend {
        Backend::DeepAi
    }

    fn invoke(
        &self,
        subject: &EncodedImage,
        _garment: &EncodedImage,
        credential: &str,
    ) -> Result<Vec<AdapterImage>, AdapterError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("api-key", credential)
            .json(&json!({
                "image": subject.to_data_url(),
                "text": DEEPAI_INSTRUCTION,
            }))
            .send()
            .map_err(|err| AdapterError::transport(PROVIDER, err))?;
        let status = response.status().as_u16();
        let payload = response_json_or_error(PROVIDER, response)?;
        let url = first_url(&payload, &["output_url"]).ok_or_else(|| {
            AdapterError::new(PROVIDER, Some(status), "response missing output_url")
        })?;
        Ok(vec![AdapterImage {
            url,
            label: PROVIDER.to_string(),
            source: Backend::DeepAi.source_tag(),
        }])
    }
}
