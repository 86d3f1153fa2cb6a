use super::registry::{ModelDescriptor, ModelRegistry};

#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub descriptor: ModelDescriptor,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves `requested` once per request, explaining any fallback.
    pub fn select(&self, requested: Option<&str>) -> ModelSelection {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let Some(requested_value) = requested else {
            return ModelSelection {
                descriptor: self.registry.default_descriptor().clone(),
                requested: None,
                fallback_reason: None,
            };
        };
        if let Some(descriptor) = self.registry.get(requested_value) {
            return ModelSelection {
                descriptor: descriptor.clone(),
                requested: Some(requested_value.to_string()),
                fallback_reason: None,
            };
        }
        let descriptor = self.registry.resolve(requested_value).clone();
        ModelSelection {
            fallback_reason: Some(format!(
                "Requested model '{requested_value}' is not available; using '{}'.",
                descriptor.id
            )),
            descriptor,
            requested: Some(requested_value.to_string()),
        }
    }
}
