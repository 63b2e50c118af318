use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use crate::chat::{Content, ContentPart, Conversation, Message, QueryResult};

const HEADER_BAR: &str = " ----- ";
const IMAGE_PLACEHOLDER: &str = "    [Image]";
const MAX_CONTEXT_WINDOW: &str = "NO-LIMIT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHeader {
    pub script_version: String,
    pub chat_url: String,
    pub model: String,
}

/// Human-readable record of one model's conversation.
///
/// Every write is flushed before returning so a crash or an aborted run
/// still leaves everything up to that point on disk. `close` consumes the
/// reporter; dropping it without closing also releases the file.
#[derive(Debug)]
pub struct TranscriptReporter {
    path: PathBuf,
    file: File,
    echo: bool,
}

impl TranscriptReporter {
    /// Truncate/create `path`, write the header block and replay `initial`.
    pub fn create(
        path: impl Into<PathBuf>,
        header: &TranscriptHeader,
        initial: &Conversation,
        echo: bool,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed opening transcript {}", path.display()))?;
        let mut reporter = Self { path, file, echo };
        reporter.write_block(&format_header(header, &performed_now()))?;
        for message in initial.messages() {
            reporter.report(message)?;
        }
        Ok(reporter)
    }

    pub fn report(&mut self, message: &Message) -> Result<()> {
        let block = format_message(message);
        self.write_block(&block)?;
        if self.echo {
            println!("{block}");
        }
        Ok(())
    }

    pub fn add_details(&mut self, result: &QueryResult) -> Result<()> {
        self.write_block(&format_details(result))
    }

    pub fn close(mut self) -> Result<()> {
        self.file
            .flush()
            .with_context(|| format!("failed closing transcript {}", self.path.display()))?;
        Ok(())
    }

    fn write_block(&mut self, block: &str) -> Result<()> {
        self.file
            .write_all(block.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("failed writing transcript {}", self.path.display()))
    }
}

pub fn format_header(header: &TranscriptHeader, performed: &str) -> String {
    let mut out = String::from("Conversation Details:\n");
    out.push_str(&format!("    Script Version: {}\n", header.script_version));
    out.push_str(&format!("    Performed: {performed}\n"));
    out.push_str(&format!("    Chat URL: {}\n", header.chat_url));
    out.push_str(&format!("    Model: {}\n", header.model));
    out.push_str(&format!("    Max Context Window: {MAX_CONTEXT_WINDOW}\n"));
    out.push('\n');
    out
}

pub fn format_message(message: &Message) -> String {
    let mut out = format!("{HEADER_BAR}{}{HEADER_BAR}\n", message.role.as_str());
    match &message.content {
        Content::Text(text) => {
            out.push_str(text.trim_end());
            out.push_str("\n\n");
        }
        Content::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => out.push_str(text.trim_end()),
                    ContentPart::Image(_) => out.push_str(IMAGE_PLACEHOLDER),
                }
                out.push_str("\n\n");
            }
        }
    }
    out
}

pub fn format_details(result: &QueryResult) -> String {
    let mut out = String::from("Details:\n");
    for (key, value) in result.detail_rows() {
        out.push_str(&format!("    {}: {value}\n", title_case(key)));
    }
    out.push('\n');
    out.push_str("Usage:\n");
    for (key, value) in result.usage_rows() {
        out.push_str(&format!("    {}: {value}\n", title_case(key)));
    }
    out.push('\n');
    out
}

/// `finish_reason` -> `Finish_Reason`.
fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut word_start = true;
    for ch in key.chars() {
        if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = true;
        }
    }
    out
}

fn performed_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}
