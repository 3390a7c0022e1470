//! Translate subtitles with a Claude model.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use llm_subtrans::cli::{self, TranslateArgs};
use llm_subtrans::providers::ClaudeClient;

const PROVIDER: &str = "Claude";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";

#[tokio::main]
async fn main() -> Result<()> {
    let args = TranslateArgs::parse();
    if cli::maybe_generate_completions(&args, "claude-subtrans") {
        return Ok(());
    }
    cli::init_logging(args.debug);

    let api_key = args.resolve_api_key("CLAUDE_API_KEY")?;
    let model = args.resolve_model("CLAUDE_MODEL", DEFAULT_MODEL);

    let client = ClaudeClient::with_config(
        api_key,
        DEFAULT_ENDPOINT,
        model.as_str(),
        args.rate_limit_interval(),
        args.proxy.as_deref(),
        args.timeout_interval(),
    )?;

    let settings = cli::build_settings(&args, PROVIDER, &model)?;
    cli::run_translation(&args, Arc::new(client), settings).await
}
