use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use murmur_agent::ResponsePipeline;
use murmur_core::config::ConfigHandle;

use crate::error::DiscordError;
use crate::handler::MurmurHandler;

/// Discord channel adapter.
///
/// Wraps a serenity `Client` and drives the event loop until the process exits.
/// Reconnects whenever the gateway drops.
pub struct DiscordAdapter {
    config: Arc<ConfigHandle>,
    pipeline: ResponsePipeline,
}

impl DiscordAdapter {
    pub fn new(config: Arc<ConfigHandle>, pipeline: ResponsePipeline) -> Self {
        Self { config, pipeline }
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Only returns when no token is configured. The token is re-read from the
    /// current config snapshot on every reconnect.
    pub async fn run(self) -> Result<(), DiscordError> {
        if self.config.snapshot().token.is_empty() {
            return Err(DiscordError::NoToken);
        }

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::GUILD_EMOJIS_AND_STICKERS
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        loop {
            let mut client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("Discord: connect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };

            info!("Discord: gateway connecting");
            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }

            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    /// Build a fresh serenity `Client` with our event handler.
    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, serenity::Error> {
        let shards = Arc::new(OnceLock::new());
        let handler = MurmurHandler::new(
            Arc::clone(&self.config),
            self.pipeline.clone(),
            Arc::clone(&shards),
        );

        let token = self.config.snapshot().token.clone();
        let client = Client::builder(&token, intents)
            .event_handler(handler)
            .await?;
        shards.set(Arc::clone(&client.shard_manager)).ok();
        Ok(client)
    }
}
