use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use content_engine::analytics::AnalyticsClient;
use content_engine::config;
use content_engine::fetch::HttpPageFetcher;
use content_engine::llm::LlmClient;
use content_engine::repl;
use content_engine::session::Session;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    // Secrets from the environment win over the config file.
    let analytics_token = std::env::var("ANALYTICS_BEARER_TOKEN")
        .unwrap_or_else(|_| cfg.analytics.token.clone());
    let llm_api_key = std::env::var("LLM_API_KEY").unwrap_or_else(|_| cfg.llm.api_key.clone());

    let analytics = AnalyticsClient::new(analytics_token, cfg.analytics.identity.clone());
    let llm = LlmClient::new(llm_api_key, cfg.llm.version.clone(), cfg.llm.model.clone());
    let fetcher = HttpPageFetcher::new();
    let mut session = Session::new();

    info!("starting content engine");
    repl::run(&cfg, &mut session, &analytics, &llm, &fetcher).await
}
