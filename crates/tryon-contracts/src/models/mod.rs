mod registry;
mod selectors;

pub use registry::{
    Backend, ModelDescriptor, ModelRegistry, RegistryError, Tier, CANVAS_MODEL_ID,
    DEEPAI_MODEL_ID, NANOBANANA_MODEL_ID,
};
pub use selectors::{ModelSelection, ModelSelector};
