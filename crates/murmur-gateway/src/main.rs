use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use murmur_agent::ollama::OllamaProvider;
use murmur_agent::{GenerationGate, ResponsePipeline};
use murmur_core::config::{BotConfig, ConfigHandle, DEFAULT_CONFIG_PATH};
use murmur_discord::DiscordAdapter;

/// Discord chat bot backed by a local Ollama model.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML, or JSON when the extension is .json)
    #[arg(long, env = "MURMUR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "murmur_gateway=info,murmur_agent=info,murmur_discord=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    let config = match ConfigHandle::load(&args.config) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            ConfigHandle::new(BotConfig::default(), &args.config)
        }
    };
    let config = Arc::new(config);
    let snapshot = config.snapshot();
    info!(
        path = %config.path().display(),
        model = %snapshot.model,
        ollama = %snapshot.ollama_url,
        "configuration loaded"
    );

    // One gate for the whole process; every generate-validate cycle goes through it.
    let gate = Arc::new(GenerationGate::new());
    let provider = Arc::new(OllamaProvider::new(Some(snapshot.ollama_url.clone())));
    let pipeline = ResponsePipeline::new(provider, gate);

    DiscordAdapter::new(config, pipeline).run().await?;
    Ok(())
}
