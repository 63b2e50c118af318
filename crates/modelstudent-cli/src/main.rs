use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modelstudent_contracts::chat::validate_questions;
use modelstudent_contracts::exam::{load_questions, ExamSettings};
use modelstudent_contracts::models::{ModelRegistry, ModelSelector, DEFAULT_VARIANTS};
use modelstudent_engine::{
    default_provider_registry, ContinueGate, ExamRunner, ProviderOptions, RunConfig, RunStatus,
};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const EXIT_ENDED_EARLY: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "modelstudent",
    version,
    about = "Query chat models with exam questions and record transcripts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send every question to each model variant and write transcripts.
    Run(RunArgs),
    /// Load exams and verify question image references without querying.
    Check(CheckArgs),
    /// List known model variants.
    Models,
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Exam settings JSON; relative names are looked up in --io-dir first.
    #[arg(long, required = true)]
    exam: Vec<PathBuf>,
    #[arg(long, default_value = ".")]
    io_dir: PathBuf,
    /// Transcript directory (defaults to --io-dir).
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Variant title, model id, or TITLE=model-id; repeatable.
    #[arg(long)]
    model: Vec<String>,
    #[arg(long, default_value = "openai")]
    provider: String,
    /// 1-based index of the first question to send.
    #[arg(long, default_value_t = 1)]
    start_at: usize,
    /// Ask before each following question.
    #[arg(long)]
    confirm: bool,
    /// Do not mirror transcript blocks to stdout.
    #[arg(long)]
    quiet: bool,
    #[arg(long, default_value = "API_KEY.txt")]
    api_key_file: PathBuf,
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Parser)]
struct CheckArgs {
    #[arg(long, required = true)]
    exam: Vec<PathBuf>,
    #[arg(long, default_value = ".")]
    io_dir: PathBuf,
}

fn main() {
    init_logging();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("modelstudent error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_exams(args, &mut StdinGate),
        Command::Check(args) => run_check(args),
        Command::Models => {
            list_models();
            Ok(0)
        }
    }
}

fn run_exams(args: RunArgs, gate: &mut dyn ContinueGate) -> Result<i32> {
    let models = ModelSelector::new(None)
        .select(&args.model)
        .map_err(anyhow::Error::msg)?;
    let api_key = if args.provider == "openai" {
        resolve_api_key(&args.api_key_file)?
    } else {
        None
    };
    let options = ProviderOptions {
        api_key,
        api_base: None,
        timeout: args.timeout_secs.map(Duration::from_secs),
    };
    let provider = default_provider_registry()
        .build(&args.provider, &options)
        .with_context(|| {
            format!(
                "provider '{}' unavailable (key file: {})",
                args.provider,
                args.api_key_file.display()
            )
        })?;

    let config = RunConfig {
        out_dir: args.out_dir.clone().unwrap_or_else(|| args.io_dir.clone()),
        io_dir: args.io_dir.clone(),
        models,
        start_at: args.start_at.max(1),
        confirm_continue: args.confirm,
        echo: !args.quiet,
    };
    let runner = ExamRunner::new(&config, provider.as_ref());

    for exam_arg in &args.exam {
        let exam_file = resolve_exam_path(&config.io_dir, exam_arg);
        info!(file = %exam_file.display(), "beginning exam");
        let exam = ExamSettings::load(&exam_file)?;
        let questions = load_questions(&exam.questions_path(&config.io_dir))?;

        let reports = runner.run(&exam, &questions, gate)?;
        for report in &reports {
            println!(
                "{} ({}) answered {} of {} -> {}",
                report.title,
                report.model,
                report.answered,
                questions.len(),
                report.transcript.display()
            );
        }
        if reports
            .iter()
            .any(|report| report.status != RunStatus::Completed)
        {
            eprintln!("Run ended early; exiting.");
            return Ok(EXIT_ENDED_EARLY);
        }
    }

    println!("Done.");
    Ok(0)
}

fn run_check(args: CheckArgs) -> Result<i32> {
    for exam_arg in &args.exam {
        let exam_file = resolve_exam_path(&args.io_dir, exam_arg);
        let exam = ExamSettings::load(&exam_file)?;
        let questions = load_questions(&exam.questions_path(&args.io_dir))?;
        let images = validate_questions(&questions, &args.io_dir)
            .with_context(|| format!("exam {} failed image checks", exam.course_id))?;
        println!(
            "{}: {} questions, {} images OK",
            exam.course_id,
            questions.len(),
            images
        );
    }
    Ok(0)
}

fn list_models() {
    let registry = ModelRegistry::new(None);
    for variant in registry.list() {
        let marker = if DEFAULT_VARIANTS.contains(&variant.title.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<12} {}", variant.title, variant.model);
    }
}

fn resolve_exam_path(io_dir: &Path, exam: &Path) -> PathBuf {
    if exam.is_absolute() || exam.is_file() {
        return exam.to_path_buf();
    }
    io_dir.join(exam)
}

/// Key file first, then the environment, then a prompt when attached to a terminal.
fn resolve_api_key(key_file: &Path) -> Result<Option<String>> {
    if let Some(key) = read_api_key_file(key_file)? {
        return Ok(Some(key));
    }
    if let Some(key) = first_non_empty_env(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"]) {
        return Ok(Some(key));
    }
    if !io::stdin().is_terminal() {
        return Ok(None);
    }

    println!("\nEnter API Key:");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let key = line.trim().to_string();
    Ok((!key.is_empty()).then_some(key))
}

fn read_api_key_file(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading API key file {}", path.display()))?;
    let key = raw.trim().to_string();
    Ok((!key.is_empty()).then_some(key))
}

fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        std::env::var(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

struct StdinGate;

impl ContinueGate for StdinGate {
    fn confirm(&mut self, next_question: usize) -> Result<bool> {
        print!("\nContinue with question {next_question}? [Y/n] ");
        io::stdout().flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(false);
        }
        Ok(accepts_continue(&line))
    }
}

fn accepts_continue(answer: &str) -> bool {
    !matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "n" | "no" | "q" | "quit"
    )
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use clap::Parser;
    use modelstudent_engine::AlwaysContinue;

    use super::{
        accepts_continue, read_api_key_file, resolve_exam_path, run_exams, Cli, Command, RunArgs,
    };

    fn run_args(io_dir: &Path) -> RunArgs {
        RunArgs {
            exam: vec![PathBuf::from("Adv_Vir_settings.json")],
            io_dir: io_dir.to_path_buf(),
            out_dir: Some(io_dir.join("out")),
            model: vec!["GPT4O".to_string()],
            provider: "dryrun".to_string(),
            start_at: 1,
            confirm: false,
            quiet: true,
            api_key_file: io_dir.join("API_KEY.txt"),
            timeout_secs: None,
        }
    }

    #[test]
    fn run_subcommand_parses_repeatable_flags() {
        let cli = Cli::try_parse_from([
            "modelstudent",
            "run",
            "--exam",
            "a.json",
            "--exam",
            "b.json",
            "--model",
            "GPT4V",
            "--model",
            "X=gpt-x",
            "--start-at",
            "3",
            "--confirm",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.exam.len(), 2);
        assert_eq!(args.model, vec!["GPT4V", "X=gpt-x"]);
        assert_eq!(args.start_at, 3);
        assert!(args.confirm);
        assert_eq!(args.provider, "openai");
    }

    #[test]
    fn dryrun_exam_writes_one_transcript_per_model() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(
            temp.path().join("Adv_Vir_settings.json"),
            r#"{"course_id": "Adv_Vir", "course_name": "Advanced Virology",
                "course_level": "graduate", "extra_details": ""}"#,
        )?;
        fs::write(
            temp.path().join("Adv_Vir_questions.txt"),
            "1. Define viremia.\n-&-\n2. Name a DNA virus.\n",
        )?;

        let code = run_exams(run_args(temp.path()), &mut AlwaysContinue)?;

        assert_eq!(code, 0);
        let transcript = fs::read_to_string(temp.path().join("out/Adv_Vir_out_GPT4O.txt"))?;
        assert!(transcript.contains("Chat URL: dryrun://chat/completions"));
        assert!(transcript.contains("Dry-run answer 2: 2. Name a DNA virus."));
        Ok(())
    }

    #[test]
    fn missing_questions_file_is_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(
            temp.path().join("Adv_Vir_settings.json"),
            r#"{"course_id": "Adv_Vir", "course_name": "V", "course_level": "graduate"}"#,
        )?;
        let err = run_exams(run_args(temp.path()), &mut AlwaysContinue).unwrap_err();
        assert!(err.to_string().contains("Questions file not found"));
        Ok(())
    }

    #[test]
    fn exam_path_falls_back_to_io_dir() {
        let io_dir = Path::new("/data/exams");
        assert_eq!(
            resolve_exam_path(io_dir, Path::new("missing_settings.json")),
            Path::new("/data/exams/missing_settings.json")
        );
        assert_eq!(
            resolve_exam_path(io_dir, Path::new("/abs/exam.json")),
            Path::new("/abs/exam.json")
        );
    }

    #[test]
    fn api_key_file_is_trimmed_and_optional() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("API_KEY.txt");
        assert_eq!(read_api_key_file(&path)?, None);
        fs::write(&path, "  sk-test-123\n")?;
        assert_eq!(read_api_key_file(&path)?.as_deref(), Some("sk-test-123"));
        Ok(())
    }

    #[test]
    fn continue_answers() {
        assert!(accepts_continue("\n"));
        assert!(accepts_continue("y\n"));
        assert!(!accepts_continue("N\n"));
        assert!(!accepts_continue("quit"));
    }
}
