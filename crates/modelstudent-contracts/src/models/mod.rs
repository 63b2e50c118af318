mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelVariant};
pub use selectors::{ModelSelector, DEFAULT_VARIANTS};
