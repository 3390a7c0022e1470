/*!
 * Shared command-line surface for the provider binaries.
 *
 * Every binary has the same shape: a positional input file, provider
 * credentials, an optional output path and target language, project
 * persistence flags and scheduling options. The binaries differ only in
 * which client they construct.
 */

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde_json::Value;

use crate::batcher::BatcherOptions;
use crate::project::SubtitleProject;
use crate::providers::TranslationClient;
use crate::translation::instructions::load_instructions;
use crate::translation::{
    SceneScope, SceneTranslator, SceneTranslatorOptions, TranslationEvent, TranslationScope,
};

/// How the project file is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProjectMode {
    /// Resume from an existing project file
    Read,
    /// Create or update a project file
    Write,
    /// Use the project file but reload subtitles from the source
    Reload,
}

/// Arguments shared by every provider binary
#[derive(Parser, Debug)]
pub struct TranslateArgs {
    /// Subtitle or project file to translate
    #[arg(value_name = "INPUT", required_unless_present = "completions")]
    pub input: Option<PathBuf>,

    /// Generate shell completions and exit
    #[arg(long, value_enum, exclusive = true)]
    pub completions: Option<Shell>,

    /// Provider API key; falls back to the provider's environment variable
    #[arg(short = 'k', long)]
    pub apikey: Option<String>,

    /// Model to use for translation
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Output path for the translated subtitles
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Target language (code or name)
    #[arg(short = 'l', long)]
    pub target_language: Option<String>,

    /// Use a project file to make the translation resumable
    #[arg(long, value_enum)]
    pub project: Option<ProjectMode>,

    /// Restrict translation to these scenes, e.g. "1,3-5"
    #[arg(long)]
    pub scenes: Option<String>,

    /// Translate batches concurrently (refused for rate-limited providers)
    #[arg(long)]
    pub fast: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Name of the movie, used for context
    #[arg(long)]
    pub movie_name: Option<String>,

    /// Description of the source material, used for context
    #[arg(long)]
    pub description: Option<String>,

    /// Names to preserve, comma separated (may repeat)
    #[arg(long)]
    pub names: Vec<String>,

    /// Instruction file to load prompt and instructions from
    #[arg(long)]
    pub instruction_file: Option<String>,

    /// Minimum lines per batch
    #[arg(long, default_value_t = 10)]
    pub min_batch_size: usize,

    /// Maximum lines per batch
    #[arg(long, default_value_t = 100)]
    pub max_batch_size: usize,

    /// Gap in seconds that starts a new scene
    #[arg(long, default_value_t = 30.0)]
    pub scene_threshold: f64,

    /// Gap in seconds that may start a new batch
    #[arg(long, default_value_t = 7.0)]
    pub batch_threshold: f64,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Proxy URL for provider requests
    #[arg(long)]
    pub proxy: Option<String>,

    /// Minimum seconds between provider requests
    #[arg(long)]
    pub rate_limit: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,
}

impl TranslateArgs {
    /// Resolve the API key from the argument or an environment variable
    pub fn resolve_api_key(&self, env_var: &str) -> Result<String> {
        self.apikey
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("No API key provided; use --apikey or set {}", env_var))
    }

    /// Resolve the model from the argument, an environment variable or the
    /// provider default
    pub fn resolve_model(&self, env_var: &str, default_model: &str) -> String {
        self.model
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| default_model.to_string())
    }

    /// The rate limit as a duration, when configured
    pub fn rate_limit_interval(&self) -> Option<Duration> {
        self.rate_limit.filter(|seconds| *seconds > 0.0).map(Duration::from_secs_f64)
    }

    /// The request timeout as a duration, when configured
    pub fn timeout_interval(&self) -> Option<Duration> {
        self.timeout.filter(|seconds| *seconds > 0.0).map(Duration::from_secs_f64)
    }
}

/// Parse a scene selection like "1,3-5" into a translation scope
pub fn parse_scene_selection(selection: &str) -> Result<TranslationScope> {
    let mut scope = TranslationScope::new();

    for part in selection.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().context("Invalid scene range")?;
                let end: usize = end.trim().parse().context("Invalid scene range")?;
                if start == 0 || end < start {
                    return Err(anyhow!("Invalid scene range: {}", part));
                }
                for scene in start..=end {
                    scope.insert(scene, SceneScope::default());
                }
            }
            None => {
                let scene: usize = part.parse().context("Invalid scene number")?;
                if scene == 0 {
                    return Err(anyhow!("Scene numbers start at 1"));
                }
                scope.insert(scene, SceneScope::default());
            }
        }
    }

    if scope.is_empty() {
        return Err(anyhow!("No scenes selected in '{}'", selection));
    }
    Ok(scope)
}

/// Build the settings map for the project from the command line
pub fn build_settings(args: &TranslateArgs, provider: &str, model: &str) -> Result<BTreeMap<String, Value>> {
    let mut settings = BTreeMap::new();

    settings.insert("provider".to_string(), Value::String(provider.to_string()));
    settings.insert("model".to_string(), Value::String(model.to_string()));

    if let Some(language) = &args.target_language {
        settings.insert("target_language".to_string(), Value::String(language.clone()));
    }
    if let Some(movie_name) = &args.movie_name {
        settings.insert("movie_name".to_string(), Value::String(movie_name.clone()));
    }
    if let Some(description) = &args.description {
        settings.insert("description".to_string(), Value::String(description.clone()));
    }
    if !args.names.is_empty() {
        settings.insert(
            "names".to_string(),
            Value::Array(args.names.iter().cloned().map(Value::String).collect()),
        );
    }

    if let Some(instruction_file) = &args.instruction_file {
        let instructions = load_instructions(instruction_file)
            .with_context(|| format!("Failed to load instruction file {}", instruction_file))?;

        settings.insert("prompt".to_string(), Value::String(instructions.prompt));
        settings.insert("instructions".to_string(), Value::String(instructions.instructions));
        settings.insert(
            "retry_instructions".to_string(),
            Value::String(instructions.retry_instructions),
        );
        settings.insert("task_type".to_string(), Value::String(instructions.task_type));
        if let Some(language) = instructions.target_language {
            settings.entry("target_language".to_string()).or_insert(Value::String(language));
        }
        if let Some(file) = instructions.instruction_file {
            settings.insert("instruction_file".to_string(), Value::String(file));
        }
    }

    Ok(settings)
}

/// Build the scheduler options from the command line
pub fn build_translator_options(args: &TranslateArgs) -> Result<SceneTranslatorOptions> {
    let mut options = SceneTranslatorOptions::default();

    options.parallel = args.fast;
    options.batcher = BatcherOptions {
        min_batch_size: args.min_batch_size,
        max_batch_size: args.max_batch_size,
        scene_threshold: Duration::from_secs_f64(args.scene_threshold),
        batch_threshold: Duration::from_secs_f64(args.batch_threshold),
    };
    options.translator.temperature = args.temperature;

    if let Some(selection) = &args.scenes {
        options.scope = Some(parse_scene_selection(selection)?);
    }

    Ok(options)
}

/// Run a translation end to end: initialise the project, apply settings,
/// translate, and save. Returns an error (and thus a non-zero exit) when
/// any batch failed fatally.
pub async fn run_translation(
    args: &TranslateArgs,
    client: Arc<dyn TranslationClient>,
    settings: BTreeMap<String, Value>,
) -> Result<()> {
    let input = args.input.as_deref().ok_or_else(|| anyhow!("No input file provided"))?;
    let persistent = args.project.is_some();
    let reload = args.project == Some(ProjectMode::Reload);

    let mut project = SubtitleProject::new(persistent);
    project
        .initialise_project(input, args.output.as_deref(), reload)
        .with_context(|| format!("Failed to initialise project from {}", input.display()))?;

    project.update_project_settings(settings);
    if args.output.is_none() {
        project.update_output_path(None, None)?;
    }

    let options = build_translator_options(args)?;
    let translator = SceneTranslator::new(client, options);
    translator.events.connect_default_loggers();

    // Ctrl-C requests a cooperative abort; in-flight batches finish and
    // their results are kept
    let abort = translator.abort_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.store(true, Ordering::SeqCst);
        }
    });

    let progress = attach_progress_bar(&translator);

    let outcome = project.translate_subtitles(&translator).await;
    progress.finish_and_clear();

    match outcome {
        Ok(()) => {
            log::info!(
                "Translation complete: {} lines across {} scenes",
                project.subtitles().lock().linecount(),
                project.subtitles().lock().scenecount()
            );
            Ok(())
        }
        Err(error) => Err(anyhow!(error)).context("Translation did not complete"),
    }
}

fn attach_progress_bar(translator: &SceneTranslator) -> ProgressBar {
    let progress = ProgressBar::hidden();
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} batches {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let bar = progress.clone();
    translator.events.subscribe(move |event| match event {
        TranslationEvent::Preprocessed { batches, .. } => {
            bar.set_length(*batches as u64);
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
        TranslationEvent::BatchTranslated(batch) => {
            bar.inc(1);
            bar.set_message(format!("scene {}", batch.scene));
        }
        _ => {}
    });

    progress
}

/// Logger writing timestamped coloured lines to stderr
struct CliLogger {
    level: LevelFilter,
}

impl CliLogger {
    /// Install the logger; `debug` raises the level filter
    pub fn init(debug: bool) -> Result<(), SetLoggerError> {
        let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
        log::set_boxed_logger(Box::new(CliLogger { level }))?;
        log::set_max_level(level);
        Ok(())
    }

    fn colour_code(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                Self::colour_code(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Write shell completions to stdout when requested.
/// Returns true when completions were generated and the binary should exit.
pub fn maybe_generate_completions(args: &TranslateArgs, binary_name: &str) -> bool {
    match args.completions {
        Some(shell) => {
            let mut command = TranslateArgs::command().bin_name(binary_name);
            generate(shell, &mut command, binary_name, &mut std::io::stdout());
            true
        }
        None => false,
    }
}

/// Install the CLI logger, once
pub fn init_logging(debug: bool) {
    if CliLogger::init(debug).is_err() {
        // A logger is already installed (tests); just adjust the level
        log::set_max_level(if debug { LevelFilter::Debug } else { LevelFilter::Info });
    }
}
