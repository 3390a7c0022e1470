//! Translate subtitles with an OpenAI model.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use llm_subtrans::cli::{self, TranslateArgs};
use llm_subtrans::providers::OpenAIClient;

const PROVIDER: &str = "OpenAI";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

#[tokio::main]
async fn main() -> Result<()> {
    let args = TranslateArgs::parse();
    if cli::maybe_generate_completions(&args, "gpt-subtrans") {
        return Ok(());
    }
    cli::init_logging(args.debug);

    let api_key = args.resolve_api_key("OPENAI_API_KEY")?;
    let model = args.resolve_model("OPENAI_MODEL", DEFAULT_MODEL);

    let client = OpenAIClient::with_config(
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
