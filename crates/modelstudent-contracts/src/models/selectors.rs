use super::registry::{ModelRegistry, ModelVariant};

/// Titles run when nothing is requested explicitly.
pub const DEFAULT_VARIANTS: &[&str] = &["GPT4V", "GPT4O"];

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolve requested variants in order.
    ///
    /// Each entry is either a registered title / model id or an ad-hoc
    /// `TITLE=model-id` pair. Duplicates (by title) are dropped.
    pub fn select(&self, requested: &[String]) -> Result<Vec<ModelVariant>, String> {
        let mut selected: Vec<ModelVariant> = Vec::new();
        let defaults: Vec<String>;
        let requested = if requested.is_empty() {
            defaults = DEFAULT_VARIANTS.iter().map(|title| title.to_string()).collect();
            defaults.as_slice()
        } else {
            requested
        };

        for raw in requested {
            let key = raw.trim();
            if key.is_empty() {
                continue;
            }
            let variant = if let Some((title, model)) = key.split_once('=') {
                let (title, model) = (title.trim(), model.trim());
                if title.is_empty() || model.is_empty() {
                    return Err(format!("Invalid model variant '{key}'; expected TITLE=model-id."));
                }
                ModelVariant::new(title, model)
            } else {
                self.registry
                    .find(key)
                    .cloned()
                    .ok_or_else(|| format!("Unknown model variant '{key}'."))?
            };
            if selected.iter().any(|existing| existing.title == variant.title) {
                continue;
            }
            selected.push(variant);
        }

        if selected.is_empty() {
            return Err("No model variants selected.".to_string());
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::models::{ModelRegistry, ModelVariant};

    fn titles(variants: &[ModelVariant]) -> Vec<&str> {
        variants.iter().map(|variant| variant.title.as_str()).collect()
    }

    #[test]
    fn empty_request_uses_default_variants() {
        let selected = ModelSelector::new(None).select(&[]).unwrap();
        assert_eq!(titles(&selected), vec!["GPT4V", "GPT4O"]);
        assert_eq!(selected[1].model, "gpt-4o-2024-05-13");
    }

    #[test]
    fn lookup_by_title_model_id_or_adhoc_pair() {
        let selected = ModelSelector::new(None)
            .select(&[
                "gpt4o".to_string(),
                "gpt-4-turbo-2024-04-09".to_string(),
                "NEXT=gpt-next".to_string(),
                "GPT4O".to_string(),
            ])
            .unwrap();
        assert_eq!(titles(&selected), vec!["GPT4O", "GPT4V", "NEXT"]);
        assert_eq!(selected[2].model, "gpt-next");
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let err = ModelSelector::new(None)
            .select(&["missing".to_string()])
            .err()
            .unwrap_or_default();
        assert_eq!(err, "Unknown model variant 'missing'.");
    }

    #[test]
    fn custom_registry_keeps_insertion_order() {
        let mut variants = IndexMap::new();
        variants.insert("Z".to_string(), ModelVariant::new("Z", "z-1"));
        variants.insert("A".to_string(), ModelVariant::new("A", "a-1"));
        let registry = ModelRegistry::new(Some(variants));
        let listed: Vec<&str> = registry.list().map(|variant| variant.title.as_str()).collect();
        assert_eq!(listed, vec!["Z", "A"]);
        assert_eq!(registry.get("A").map(|variant| variant.model.as_str()), Some("a-1"));
    }
}
