use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use tryon_contracts::images::EncodedImage;
use tryon_contracts::models::Backend;

use super::{first_url, response_json_or_error, AdapterError, AdapterImage, TryOnAdapter};

const PROVIDER: &str = "NanoBanana";

/// Multipart upload of both photos, bearer-authenticated.
pub struct NanoBananaAdapter {
    endpoint: String,
    http: HttpClient,
}

impl NanoBananaAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(),
        }
    }

    fn image_part(image: &EncodedImage, stem: &str) -> Result<MultipartPart, AdapterError> {
        MultipartPart::bytes(image.bytes().to_vec())
            .file_name(format!("{stem}.{}", image.extension()))
            .mime_str(image.mime_type())
            .map_err(|err| AdapterError::transport(PROVIDER, err))
    }
}

impl TryOnAdapter for NanoBananaAdapter {
    fn backend(&self) -> Backend {
        Backend::NanoBanana
    }

    fn invoke(
        &self,
        subject: &EncodedImage,
        garment: &EncodedImage,
        credential: &str,
    ) -> Result<Vec<AdapterImage>, AdapterError> {
        let form = MultipartForm::new()
            .part("person_image", Self::image_part(subject, "person")?)
            .part("garment_image", Self::image_part(garment, "garment")?);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(credential)
            .multipart(form)
            .send()
            .map_err(|err| AdapterError::transport(PROVIDER, err))?;
        let status = response.status().as_u16();
        let payload = response_json_or_error(PROVIDER, response)?;
        let url = first_url(&payload, &["output_url", "image_url"]).ok_or_else(|| {
            AdapterError::new(
                PROVIDER,
                Some(status),
                "response missing output_url/image_url",
            )
        })?;
        Ok(vec![AdapterImage {
            url,
            label: PROVIDER.to_string(),
            source: Backend::NanoBanana.source_tag(),
        }])
    }
}
