use std::fmt;

use serde::{Deserialize, Serialize};

use crate::images::EncodedImage;

/// Where a result image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Canvas,
    NanoBanana,
    DeepAi,
    /// One of the inputs handed back untouched.
    Original,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Canvas => "canvas",
            SourceTag::NanoBanana => "nanobanana",
            SourceTag::DeepAi => "deepai",
            SourceTag::Original => "original",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultImage {
    Encoded(EncodedImage),
    Url(String),
}

impl ResultImage {
    pub fn as_encoded(&self) -> Option<&EncodedImage> {
        match self {
            ResultImage::Encoded(image) => Some(image),
            ResultImage::Url(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            ResultImage::Encoded(_) => None,
            ResultImage::Url(url) => Some(url.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image: ResultImage,
    pub label: String,
    pub source: SourceTag,
}

impl GenerationResult {
    pub fn original(image: EncodedImage) -> Self {
        Self {
            image: ResultImage::Encoded(image),
            label: "Original".to_string(),
            source: SourceTag::Original,
        }
    }
}

/// One press of "generate".
///
/// The images are optional so an incomplete form can still be submitted and
/// rejected by the dispatcher with a proper error.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub subject: Option<EncodedImage>,
    pub garment: Option<EncodedImage>,
    pub model_id: String,
    pub credential: Option<String>,
}

impl GenerationRequest {
    pub fn new(subject: EncodedImage, garment: EncodedImage, model_id: impl Into<String>) -> Self {
        Self {
            subject: Some(subject),
            garment: Some(garment),
            model_id: model_id.into(),
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    /// The credential, or `None` when it is missing or blank.
    pub fn credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
