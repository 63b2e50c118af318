use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Separator between questions in a `<course_id>_questions.txt` file.
pub const QUESTION_SEPARATOR: &str = "-&-";

/// Course metadata for one exam, read from its settings JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSettings {
    pub course_id: String,
    pub course_name: String,
    pub course_level: String,
    #[serde(default)]
    pub extra_details: String,
}

impl ExamSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading exam settings {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid exam settings {}", path.display()))?;
        if settings.course_id.trim().is_empty() {
            bail!("exam settings {} have an empty course_id", path.display());
        }
        Ok(settings)
    }

    pub fn questions_path(&self, io_dir: &Path) -> PathBuf {
        io_dir.join(format!("{}_questions.txt", self.course_id))
    }

    pub fn transcript_path(&self, out_dir: &Path, model_title: &str) -> PathBuf {
        out_dir.join(format!("{}_out_{}.txt", self.course_id, model_title))
    }
}

pub fn load_questions(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        bail!("Questions file not found: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading questions {}", path.display()))?;
    Ok(split_questions(&raw))
}

/// Each non-blank segment becomes one question, trimmed and newline-terminated.
pub fn split_questions(raw: &str) -> Vec<String> {
    raw.split(QUESTION_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("{segment}\n"))
        .collect()
}
