use indexmap::IndexMap;

/// A named model configuration; the title keys transcript file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVariant {
    pub title: String,
    pub model: String,
}

impl ModelVariant {
    pub fn new(title: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    variants: IndexMap<String, ModelVariant>,
}

impl ModelRegistry {
    pub fn new(variants: Option<IndexMap<String, ModelVariant>>) -> Self {
        Self {
            variants: variants.unwrap_or_else(default_variants),
        }
    }

    pub fn get(&self, title: &str) -> Option<&ModelVariant> {
        self.variants.get(title)
    }

    /// Case-insensitive lookup by title, then by exact model id.
    pub fn find(&self, key: &str) -> Option<&ModelVariant> {
        self.variants
            .values()
            .find(|variant| variant.title.eq_ignore_ascii_case(key))
            .or_else(|| self.variants.values().find(|variant| variant.model == key))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelVariant> {
        self.variants.values()
    }
}

fn default_variants() -> IndexMap<String, ModelVariant> {
    let mut map = IndexMap::new();
    let mut insert = |title: &str, model: &str| {
        map.insert(title.to_string(), ModelVariant::new(title, model));
    };

    insert("GPT4V", "gpt-4-turbo-2024-04-09");
    insert("GPT4O", "gpt-4o-2024-05-13");
    insert("GPT4OMINI", "gpt-4o-mini");

    map
}
