use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use modelstudent_contracts::chat::{
    process_content, seed_history, validate_questions, Content, ContentPart, Conversation,
    Message, QueryResult, ResponseDetails, Role, TokenUsage,
};
use modelstudent_contracts::exam::ExamSettings;
use modelstudent_contracts::models::ModelVariant;
use modelstudent_contracts::runs::{TranscriptHeader, TranscriptReporter};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const SCRIPT_VERSION: &str = concat!("modelstudent ", env!("CARGO_PKG_VERSION"));

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// A chat-completions backend.
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    /// URL recorded in transcript headers.
    fn endpoint(&self) -> String;
    /// Send the whole history and return the next assistant turn.
    fn query(&self, history: &Conversation, model: &str) -> Result<QueryResult>;
}

type ProviderFactory = fn(&ProviderOptions) -> Result<Box<dyn ChatProvider>>;

/// Named provider constructors; only the chosen provider is ever built.
#[derive(Default)]
pub struct ChatProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ChatProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: ProviderFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn build(&self, name: &str, options: &ProviderOptions) -> Result<Box<dyn ChatProvider>> {
        let Some(factory) = self.factories.get(name) else {
            bail!(
                "unknown provider '{name}' (available: {})",
                self.names().join(", ")
            );
        };
        factory(options)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    /// `None` waits as long as the endpoint takes.
    pub timeout: Option<Duration>,
}

pub fn default_provider_registry() -> ChatProviderRegistry {
    let mut providers = ChatProviderRegistry::new();
    providers.register("dryrun", build_dryrun);
    providers.register("openai", build_openai);
    providers
}

fn build_dryrun(_options: &ProviderOptions) -> Result<Box<dyn ChatProvider>> {
    Ok(Box::new(DryrunProvider))
}

fn build_openai(options: &ProviderOptions) -> Result<Box<dyn ChatProvider>> {
    Ok(Box::new(OpenAiChatProvider::new(options)?))
}

pub struct OpenAiChatProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl OpenAiChatProvider {
    /// Fails without an API key so a misconfigured run never touches a transcript.
    pub fn new(options: &ProviderOptions) -> Result<Self> {
        let Some(api_key) = options
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            bail!("OpenAI API key missing (key file, OPENAI_API_KEY or OPENAI_API_KEY_BACKUP)");
        };
        let http = HttpClient::builder()
            .timeout(options.timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            api_base: normalize_api_base(
                options
                    .api_base
                    .clone()
                    .or_else(|| first_non_empty_env(&["OPENAI_API_BASE", "OPENAI_BASE_URL"])),
            ),
            api_key: api_key.to_string(),
            http,
        })
    }
}

impl ChatProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn query(&self, history: &Conversation, model: &str) -> Result<QueryResult> {
        let endpoint = self.endpoint();
        let payload = json!({
            "model": model,
            "messages": history.to_wire(),
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let parsed = response_json_or_error("OpenAI", response)?;
        Ok(QueryResult::from_chat_completion(&parsed))
    }
}

/// Offline provider with deterministic answers, for rehearsing a run.
pub struct DryrunProvider;

impl ChatProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn endpoint(&self) -> String {
        "dryrun://chat/completions".to_string()
    }

    fn query(&self, history: &Conversation, model: &str) -> Result<QueryResult> {
        let wire = history.to_wire();
        let asked = history
            .messages()
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
            .saturating_sub(1);
        let headline = history
            .last()
            .map(first_text_line)
            .unwrap_or_default();
        let response = format!("Dry-run answer {asked}: {headline}");
        let prompt_tokens = estimate_tokens(&wire.to_string());
        let completion_tokens = estimate_tokens(&response);

        Ok(QueryResult {
            response,
            finish_reason: "stop".to_string(),
            answered: true,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            details: ResponseDetails {
                created: Some(chrono::Utc::now().timestamp()),
                id: Some(format!("dryrun-{}", &stable_hash(&wire)[..12])),
                model: Some(model.to_string()),
                object: Some("chat.completion".to_string()),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Questions files and local images are resolved here.
    pub io_dir: PathBuf,
    pub out_dir: PathBuf,
    pub models: Vec<ModelVariant>,
    /// 1-based; earlier questions are skipped.
    pub start_at: usize,
    pub confirm_continue: bool,
    pub echo: bool,
}

impl RunConfig {
    pub fn new(io_dir: impl Into<PathBuf>, models: Vec<ModelVariant>) -> Self {
        let io_dir = io_dir.into();
        Self {
            out_dir: io_dir.clone(),
            io_dir,
            models,
            start_at: 1,
            confirm_continue: false,
            echo: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// The endpoint returned no usable answer; nothing after it was sent.
    /// The transcript's last `Details:` block carries its finish reason.
    NoResponse,
    /// The operator declined to continue.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRunReport {
    pub title: String,
    pub model: String,
    pub transcript: PathBuf,
    pub answered: usize,
    pub status: RunStatus,
}

/// Pause point between questions when `confirm_continue` is set.
pub trait ContinueGate {
    /// Return `false` to stop before `next_question` (1-based).
    fn confirm(&mut self, next_question: usize) -> Result<bool>;
}

pub struct AlwaysContinue;

impl ContinueGate for AlwaysContinue {
    fn confirm(&mut self, _next_question: usize) -> Result<bool> {
        Ok(true)
    }
}

pub struct ExamRunner<'a> {
    config: &'a RunConfig,
    provider: &'a dyn ChatProvider,
}

impl<'a> ExamRunner<'a> {
    pub fn new(config: &'a RunConfig, provider: &'a dyn ChatProvider) -> Self {
        Self { config, provider }
    }

    /// Run every configured model over `questions`, one after another.
    ///
    /// Image references are checked for all questions before anything is
    /// sent. A model pass that ends early stops the remaining passes too.
    pub fn run(
        &self,
        exam: &ExamSettings,
        questions: &[String],
        gate: &mut dyn ContinueGate,
    ) -> Result<Vec<ModelRunReport>> {
        if self.config.models.is_empty() {
            bail!("no model variants configured");
        }
        let images = validate_questions(questions, &self.config.io_dir)?;
        info!(
            exam = %exam.course_id,
            questions = questions.len(),
            images,
            provider = self.provider.name(),
            "question image locations verified"
        );

        let mut reports = Vec::new();
        for variant in &self.config.models {
            let report = self.run_model(exam, questions, variant, gate)?;
            let completed = report.status == RunStatus::Completed;
            reports.push(report);
            if !completed {
                warn!(model = %variant.model, "run ended early; skipping remaining models");
                break;
            }
        }
        Ok(reports)
    }

    fn run_model(
        &self,
        exam: &ExamSettings,
        questions: &[String],
        variant: &ModelVariant,
        gate: &mut dyn ContinueGate,
    ) -> Result<ModelRunReport> {
        let seeded = seed_history(exam);
        let transcript = exam.transcript_path(&self.config.out_dir, &variant.title);
        let header = TranscriptHeader {
            script_version: SCRIPT_VERSION.to_string(),
            chat_url: self.provider.endpoint(),
            model: variant.model.clone(),
        };
        let mut reporter =
            TranscriptReporter::create(&transcript, &header, &seeded, self.config.echo)?;

        let mut history = seeded;
        let mut answered = 0;
        let mut status = RunStatus::Completed;
        for (idx, question) in questions.iter().enumerate() {
            let number = idx + 1;
            if number < self.config.start_at {
                info!(question = number, "skipping prompt");
                continue;
            }
            info!(model = %variant.model, question = number, "sending prompt");

            let content = process_content(question, &self.config.io_dir)?;
            let asked_turn = Message::new(Role::User, content);
            reporter.report(&asked_turn)?;
            let asked = history.append(asked_turn.role, asked_turn.content);

            let result = self.provider.query(&asked, &variant.model)?;
            info!(
                finish_reason = %result.finish_reason,
                tokens = %result.usage.summary(),
                "query complete"
            );
            let answer_turn = Message::new(Role::Assistant, result.response.clone());
            reporter.report(&answer_turn)?;
            reporter.add_details(&result)?;
            if result.is_no_response() {
                warn!(
                    question = number,
                    finish_reason = %result.finish_reason,
                    "no response from endpoint; ending run"
                );
                status = RunStatus::NoResponse;
                break;
            }
            history = asked.append(answer_turn.role, answer_turn.content);
            answered += 1;

            if self.config.confirm_continue
                && number < questions.len()
                && !gate.confirm(number + 1)?
            {
                status = RunStatus::Stopped;
                break;
            }
        }
        reporter.close()?;
        info!(
            model = %variant.model,
            exam = %exam.course_id,
            answered,
            transcript = %transcript.display(),
            "completed assessment"
        );

        Ok(ModelRunReport {
            title: variant.title.clone(),
            model: variant.model.clone(),
            transcript,
            answered,
            status,
        })
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn normalize_api_base(raw: Option<String>) -> String {
    let raw = raw.unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string());
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base
}

fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        env::var(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn first_text_line(message: &Message) -> String {
    let text = match &message.content {
        Content::Text(text) => text.as_str(),
        Content::Parts(parts) => parts
            .iter()
            .find_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image(_) => None,
            })
            .unwrap_or("[image]"),
    };
    truncate_text(text.lines().next().unwrap_or_default().trim(), 80)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    ((text.chars().count() as f64) / 4.0).ceil() as u64
}

fn stable_hash(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
