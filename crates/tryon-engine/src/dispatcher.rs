use std::time::Instant;

use serde_json::json;
use tryon_contracts::events::{payload, EventWriter};
use tryon_contracts::generation::{GenerationRequest, GenerationResult, ResultImage};
use tryon_contracts::images::EncodedImage;
use tryon_contracts::models::{Backend, ModelDescriptor, ModelRegistry, ModelSelector};
use uuid::Uuid;

use crate::adapters::{AdapterError, AdapterRegistry};
use crate::compositor::compose;
use crate::config::TryOnConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    MissingImage,
    MissingCredential,
    GenerationFailed,
    EventLog,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Please provide both a face photo and a garment photo.")]
    MissingImage,
    #[error("'{model_id}' requires an API key.")]
    MissingCredential { model_id: String },
    #[error("Generation failed: {cause}")]
    GenerationFailed {
        cause: String,
        /// The remote failure that led to the failed fallback, if any.
        advisory: Option<String>,
    },
    #[error(transparent)]
    EventLog(#[from] anyhow::Error),
}

impl GenerationError {
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            GenerationError::MissingImage => GenerationErrorKind::MissingImage,
            GenerationError::MissingCredential { .. } => GenerationErrorKind::MissingCredential,
            GenerationError::GenerationFailed { .. } => GenerationErrorKind::GenerationFailed,
            GenerationError::EventLog(_) => GenerationErrorKind::EventLog,
        }
    }
}

/// A finished generation plus anything the user should be told about it.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub request_id: String,
    pub model: ModelDescriptor,
    pub result: GenerationResult,
    /// Set when a remote provider failed and the compositor stood in.
    pub adapter_error: Option<AdapterError>,
    pub warnings: Vec<String>,
}

impl GenerationOutcome {
    pub fn fell_back(&self) -> bool {
        self.adapter_error.is_some()
    }
}

/// Resolves the model once, then makes at most one remote attempt and at
/// most one local fallback. No retries, no racing.
pub struct TryOnEngine {
    events: EventWriter,
    model_selector: ModelSelector,
    adapters: AdapterRegistry,
}

impl TryOnEngine {
    pub fn new(events: EventWriter, adapters: AdapterRegistry) -> Self {
        Self {
            events,
            model_selector: ModelSelector::new(None),
            adapters,
        }
    }

    pub fn from_config(config: &TryOnConfig, events: EventWriter) -> Self {
        Self::new(events, AdapterRegistry::from_config(config))
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.model_selector = ModelSelector::new(Some(registry));
        self
    }

    pub fn models(&self) -> Vec<&ModelDescriptor> {
        self.model_selector.registry.list()
    }

    pub fn resolve(&self, model_id: &str) -> &ModelDescriptor {
        self.model_selector.registry.resolve(model_id)
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome, GenerationError> {
        let request_id = Uuid::new_v4().to_string();
        let selection = self.model_selector.select(Some(&request.model_id));
        let model = selection.descriptor;
        let mut warnings = Vec::new();
        if let Some(reason) = selection.fallback_reason {
            self.events.emit(
                "model_fallback",
                payload(json!({
                    "request_id": request_id,
                    "requested": selection.requested,
                    "model_id": model.id,
                    "reason": reason,
                })),
            )?;
            warnings.push(reason);
        }

        let (subject, garment) = match (&request.subject, &request.garment) {
            (Some(subject), Some(garment)) if !subject.is_empty() && !garment.is_empty() => {
                (subject, garment)
            }
            _ => {
                let err = GenerationError::MissingImage;
                self.emit_failed(&request_id, &model, &err)?;
                return Err(err);
            }
        };
        let credential = request.credential();
        if model.requires_credential && credential.is_none() {
            let err = GenerationError::MissingCredential {
                model_id: model.id.clone(),
            };
            self.emit_failed(&request_id, &model, &err)?;
            return Err(err);
        }

        self.events.emit(
            "generation_started",
            payload(json!({
                "request_id": request_id,
                "model_id": model.id,
                "backend": model.backend.provider_name(),
                "subject": image_summary(subject),
                "garment": image_summary(garment),
            })),
        )?;
        let started = Instant::now();

        let remote = match (model.backend, credential) {
            (Backend::Canvas, _) => None,
            (backend, Some(credential)) => Some(self.invoke_remote(backend, subject, garment, credential)),
            (backend, None) => Some(Err(AdapterError::new(
                backend.provider_name(),
                None,
                "no API key supplied",
            ))),
        };

        let (result, adapter_error) = match remote {
            Some(Ok(result)) => (result, None),
            Some(Err(adapter_error)) => {
                self.emit_or_warn(
                    "adapter_failed",
                    json!({
                        "request_id": request_id,
                        "provider": adapter_error.provider,
                        "http_status": adapter_error.http_status,
                        "error": adapter_error.message,
                    }),
                    &mut warnings,
                );
                warnings.push(adapter_error.to_string());
                let result = match compose(subject, garment) {
                    Ok(result) => result,
                    Err(err) => {
                        let err = GenerationError::GenerationFailed {
                            cause: err.to_string(),
                            advisory: Some(adapter_error.to_string()),
                        };
                        self.emit_failed(&request_id, &model, &err)?;
                        return Err(err);
                    }
                };
                self.emit_or_warn(
                    "generation_fallback",
                    json!({
                        "request_id": request_id,
                        "provider": adapter_error.provider,
                        "source": result.source.as_str(),
                    }),
                    &mut warnings,
                );
                (result, Some(adapter_error))
            }
            None => match compose(subject, garment) {
                Ok(result) => (result, None),
                Err(err) => {
                    let err = GenerationError::GenerationFailed {
                        cause: err.to_string(),
                        advisory: None,
                    };
                    self.emit_failed(&request_id, &model, &err)?;
                    return Err(err);
                }
            },
        };

        self.emit_or_warn(
            "generation_completed",
            json!({
                "request_id": request_id,
                "model_id": model.id,
                "source": result.source.as_str(),
                "label": result.label,
                "fell_back": adapter_error.is_some(),
                "latency_s": started.elapsed().as_secs_f64(),
            }),
            &mut warnings,
        );

        Ok(GenerationOutcome {
            request_id,
            model,
            result,
            adapter_error,
            warnings,
        })
    }

    fn invoke_remote(
        &self,
        backend: Backend,
        subject: &EncodedImage,
        garment: &EncodedImage,
        credential: &str,
    ) -> Result<GenerationResult, AdapterError> {
        let Some(adapter) = self.adapters.get(backend) else {
            return Err(AdapterError::new(
                backend.provider_name(),
                None,
                format!(
                    "provider not registered (available: [{}])",
                    self.adapters.names().join(", ")
                ),
            ));
        };
        let images = adapter.invoke(subject, garment, credential)?;
        let Some(first) = images.into_iter().next() else {
            return Err(AdapterError::new(
                backend.provider_name(),
                None,
                "provider returned no images",
            ));
        };
        Ok(GenerationResult {
            image: ResultImage::Url(first.url),
            label: first.label,
            source: first.source,
        })
    }

    /// For events written after a provider was called or a result exists: a
    /// log write failure becomes a warning and the result is kept.
    fn emit_or_warn(
        &self,
        event_type: &str,
        fields: serde_json::Value,
        warnings: &mut Vec<String>,
    ) {
        if let Err(err) = self.events.emit(event_type, payload(fields)) {
            warnings.push(format!("Could not record {event_type} event: {err:#}"));
        }
    }

    fn emit_failed(
        &self,
        request_id: &str,
        model: &ModelDescriptor,
        err: &GenerationError,
    ) -> Result<(), GenerationError> {
        self.events.emit(
            "generation_failed",
            payload(json!({
                "request_id": request_id,
                "model_id": model.id,
                "error": err.to_string(),
            })),
        )?;
        Ok(())
    }
}

fn image_summary(image: &EncodedImage) -> serde_json::Value {
    json!({
        "mime_type": image.mime_type(),
        "bytes": image.len(),
        "dimensions": image.dimensions().map(|(width, height)| format!("{width}x{height}")),
        "sha256": image.digest(),
    })
}
