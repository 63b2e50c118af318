use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Where an image part's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Absolute http(s) URL, passed through as given.
    Remote(String),
    /// Base64 payload read from a local file.
    Inline { mime: String, data: String },
}

impl ImageSource {
    pub fn url(&self) -> String {
        match self {
            ImageSource::Remote(url) => url.clone(),
            ImageSource::Inline { mime, data } => format!("data:{mime};base64,{data}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text { text: String },
    Image(ImageSource),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    fn to_wire(&self) -> Value {
        match self {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::Image(source) => json!({
                "type": "image_url",
                "image_url": {"url": source.url()},
            }),
        }
    }
}

/// Message content is either a bare string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    pub fn image_count(&self) -> usize {
        match self {
            Content::Text(_) => 0,
            Content::Parts(parts) => parts
                .iter()
                .filter(|part| matches!(part, ContentPart::Image(_)))
                .count(),
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            Content::Text(text) => Value::String(text.clone()),
            Content::Parts(parts) => Value::Array(parts.iter().map(ContentPart::to_wire).collect()),
        }
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Chat-completions wire object for this turn.
    pub fn to_wire(&self) -> Value {
        json!({
            "role": self.role.as_str(),
            "content": self.content.to_wire(),
        })
    }
}
