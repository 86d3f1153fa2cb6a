use indexmap::IndexMap;

use crate::generation::SourceTag;

/// The concrete generation path a model id resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Canvas,
    NanoBanana,
    DeepAi,
}

impl Backend {
    pub fn source_tag(self) -> SourceTag {
        match self {
            Backend::Canvas => SourceTag::Canvas,
            Backend::NanoBanana => SourceTag::NanoBanana,
            Backend::DeepAi => SourceTag::DeepAi,
        }
    }

    pub fn provider_name(self) -> &'static str {
        match self {
            Backend::Canvas => "Canvas",
            Backend::NanoBanana => "NanoBanana",
            Backend::DeepAi => "DeepAI",
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, Backend::Canvas)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub requires_credential: bool,
    pub tier: Tier,
    pub backend: Backend,
}

impl ModelDescriptor {
    pub fn new(
        id: &str,
        display_name: &str,
        requires_credential: bool,
        tier: Tier,
        backend: Backend,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            requires_credential,
            tier,
            backend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate model id '{0}'")]
    DuplicateId(String),
    #[error("registry needs a canvas model that does not require a credential")]
    MissingDefault,
}

/// Static catalog of generation backends. Resolution never fails: unknown
/// ids land on the credential-free canvas entry.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelDescriptor>,
    default_id: String,
}

impl ModelRegistry {
    pub fn new(models: Option<Vec<ModelDescriptor>>) -> Result<Self, RegistryError> {
        let descriptors = models.unwrap_or_else(default_models);
        let mut map = IndexMap::new();
        for descriptor in descriptors {
            if map.contains_key(&descriptor.id) {
                return Err(RegistryError::DuplicateId(descriptor.id));
            }
            map.insert(descriptor.id.clone(), descriptor);
        }
        let default_id = map
            .values()
            .find(|model| model.backend == Backend::Canvas && !model.requires_credential)
            .map(|model| model.id.clone())
            .ok_or(RegistryError::MissingDefault)?;
        Ok(Self {
            models: map,
            default_id,
        })
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id.trim())
    }

    pub fn resolve(&self, id: &str) -> &ModelDescriptor {
        self.get(id).unwrap_or_else(|| self.default_descriptor())
    }

    pub fn default_descriptor(&self) -> &ModelDescriptor {
        &self.models[self.default_id.as_str()]
    }

    /// Free models first, then paid; declaration order within a tier.
    pub fn list(&self) -> Vec<&ModelDescriptor> {
        let mut models: Vec<&ModelDescriptor> = self.models.values().collect();
        models.sort_by_key(|model| model.tier);
        models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let models = default_models();
        let default_id = models
            .iter()
            .find(|model| model.backend == Backend::Canvas)
            .map(|model| model.id.clone())
            .unwrap_or_default();
        Self {
            models: models
                .into_iter()
                .map(|model| (model.id.clone(), model))
                .collect(),
            default_id,
        }
    }
}

pub const CANVAS_MODEL_ID: &str = "canvas";
pub const NANOBANANA_MODEL_ID: &str = "nanobanana";
pub const DEEPAI_MODEL_ID: &str = "deepai";

fn default_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new(
            NANOBANANA_MODEL_ID,
            "NanoBanana Try-On",
            true,
            Tier::Paid,
            Backend::NanoBanana,
        ),
        ModelDescriptor::new(
            CANVAS_MODEL_ID,
            "Canvas Merge (offline)",
            false,
            Tier::Free,
            Backend::Canvas,
        ),
        ModelDescriptor::new(
            DEEPAI_MODEL_ID,
            "DeepAI Image Editor",
            true,
            Tier::Free,
            Backend::DeepAi,
        ),
    ]
}
