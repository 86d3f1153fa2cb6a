use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use tryon_contracts::generation::ResultImage;
use tryon_contracts::images::EncodedImage;

use crate::ingest::read_dimensions;

/// Materialises a result for saving: encoded results pass through, data
/// URLs decode locally and remote URLs cost one GET.
pub fn fetch_result_image(http: &HttpClient, image: &ResultImage) -> Result<EncodedImage> {
    let url = match image {
        ResultImage::Encoded(encoded) => return Ok(encoded.clone()),
        ResultImage::Url(url) => url.trim(),
    };
    if url.starts_with("data:") {
        let decoded = EncodedImage::from_data_url(url)?;
        let dimensions = read_dimensions(decoded.bytes());
        return Ok(EncodedImage::new(
            decoded.bytes().to_vec(),
            decoded.mime_type(),
            dimensions,
        ));
    }
    let response = http
        .get(url)
        .send()
        .with_context(|| format!("failed downloading result image ({url})"))?;
    if !response.status().is_success() {
        let code = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        bail!(
            "result image download failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| value.starts_with("image/"))
        .unwrap_or_else(|| "image/png".to_string());
    let bytes = response
        .bytes()
        .context("failed reading result image bytes")?
        .to_vec();
    let dimensions = read_dimensions(&bytes);
    Ok(EncodedImage::new(bytes, mime_type, dimensions))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}
