use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;
use tracing::{debug, info};

use super::message::{Content, ContentPart, ImageSource};

/// Lines starting with this prefix reference an image: `![path-or-url]`.
pub const IMAGE_MARKER: &str = "![";

const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Image file not found: {}", path.display())]
    ImageNotFound { path: PathBuf },

    #[error("Image file must be in JPEG format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed reading image {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("question {index}")]
    Question {
        index: usize,
        #[source]
        source: Box<ContentError>,
    },
}

/// Turn raw question text into message content.
///
/// Text without any image marker comes back untouched as [`Content::Text`].
/// Otherwise marker lines become image parts (remote URLs as given, local
/// files under `io_dir` inlined as base64 JPEG) and the remaining lines form
/// one leading text part.
pub fn process_content(text: &str, io_dir: &Path) -> Result<Content, ContentError> {
    if !text.contains(IMAGE_MARKER) {
        return Ok(Content::Text(text.to_string()));
    }

    let mut body = String::new();
    let mut images = Vec::new();
    for line in text.split_inclusive('\n') {
        let Some(rest) = line.strip_prefix(IMAGE_MARKER) else {
            body.push_str(line);
            continue;
        };
        let location = rest
            .split(IMAGE_MARKER)
            .next()
            .unwrap_or_default()
            .trim_end()
            .trim_end_matches(']');
        images.push(ContentPart::Image(resolve_image(location, io_dir)?));
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        parts.push(ContentPart::text(trimmed));
    }
    parts.extend(images);
    Ok(Content::Parts(parts))
}

/// Preprocess every question up front so bad image references stop the run
/// before anything is sent.
pub fn validate_questions(questions: &[String], io_dir: &Path) -> Result<usize, ContentError> {
    let mut images = 0;
    for (idx, question) in questions.iter().enumerate() {
        let content = process_content(question, io_dir).map_err(|err| ContentError::Question {
            index: idx + 1,
            source: Box::new(err),
        })?;
        let count = content.image_count();
        if count == 0 {
            debug!(question = idx + 1, "no images in question");
        } else {
            debug!(question = idx + 1, images = count, "question images resolved");
        }
        images += count;
    }
    Ok(images)
}

fn resolve_image(location: &str, io_dir: &Path) -> Result<ImageSource, ContentError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        info!(image = location, "using remote image");
        return Ok(ImageSource::Remote(location.to_string()));
    }

    let path = io_dir.join(location);
    if !path.is_file() {
        return Err(ContentError::ImageNotFound { path });
    }
    if !is_jpeg_path(&path) {
        return Err(ContentError::UnsupportedFormat { path });
    }
    let bytes = std::fs::read(&path).map_err(|source| ContentError::Read {
        path: path.clone(),
        source,
    })?;
    info!(image = %path.display(), "using local image");
    Ok(ImageSource::Inline {
        mime: JPEG_MIME.to_string(),
        data: BASE64.encode(bytes),
    })
}

fn is_jpeg_path(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    matches!(ext.as_str(), "jpg" | "jpeg")
}
