use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::gateway::ShardManager;
use serenity::model::channel::{Channel, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info, warn};

use murmur_agent::{ResponsePipeline, Trigger};
use murmur_core::config::{BotConfig, ConfigHandle};
use murmur_core::types::{ChannelContext, UserIdentity};

use crate::commands;
use crate::history::{to_raw, DiscordHistory};
use crate::identity::DiscordIdentity;
use crate::send;

/// Serenity event handler wired to the response pipeline.
pub struct MurmurHandler {
    pub config: Arc<ConfigHandle>,
    pub pipeline: ResponsePipeline,
    pub bot_id: OnceLock<UserId>,
    pub agent: OnceLock<UserIdentity>,
    /// Owners from the application info, filled in `ready`.
    pub owners: OnceLock<HashSet<u64>>,
    /// Set by the adapter once the client exists; used for latency reports.
    pub shards: Arc<OnceLock<Arc<ShardManager>>>,
}

impl MurmurHandler {
    pub fn new(
        config: Arc<ConfigHandle>,
        pipeline: ResponsePipeline,
        shards: Arc<OnceLock<Arc<ShardManager>>>,
    ) -> Self {
        Self {
            config,
            pipeline,
            bot_id: OnceLock::new(),
            agent: OnceLock::new(),
            owners: OnceLock::new(),
            shards,
        }
    }
}

#[async_trait]
impl EventHandler for MurmurHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        self.agent
            .set(UserIdentity {
                display_name: ready.user.display_name().to_string(),
                handle: ready.user.name.clone(),
            })
            .ok();

        match ctx.http.get_current_application_info().await {
            Ok(app) => {
                let mut owners: HashSet<u64> = HashSet::new();
                if let Some(owner) = &app.owner {
                    owners.insert(owner.id.get());
                }
                if let Some(team) = &app.team {
                    owners.extend(team.members.iter().map(|m| m.user.id.get()));
                }
                debug!(owners = owners.len(), "application owners resolved");
                self.owners.set(owners).ok();
            }
            Err(e) => warn!(error = %e, "application info unavailable, only configured owners apply"),
        }

        info!(name = %ready.user.name, guilds = ready.guilds.len(), "Discord bot connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(bot_id) = self.bot_id.get().copied() else {
            return;
        };
        if msg.author.id == bot_id {
            return;
        }

        let config = self.config.snapshot();

        if let Some(command) = commands::parse_command(&msg.content, &config.command_prefix) {
            commands::dispatch(self, &ctx, &msg, command).await;
            return;
        }

        let mentioned = msg.mentions_user_id(bot_id);
        if !should_respond(&msg.content, mentioned, msg.channel_id.get(), &config) {
            return;
        }

        let agent = self.agent.get().cloned().unwrap_or_else(|| UserIdentity {
            display_name: String::new(),
            handle: String::new(),
        });
        let trigger = Trigger {
            message: to_raw(&msg, bot_id, 0),
            agent,
            channel: channel_context(&ctx, &msg).await,
        };

        let pipeline = self.pipeline.clone();
        let history = DiscordHistory::new(Arc::clone(&ctx.http), bot_id);
        let identity = DiscordIdentity::new(Arc::clone(&ctx.http), Arc::clone(&ctx.cache));
        let http = Arc::clone(&ctx.http);

        tokio::spawn(async move {
            let typing = msg.channel_id.start_typing(&http);
            let reply = pipeline.respond(&config, &history, &identity, &trigger).await;
            typing.stop();

            if let Err(e) = send::deliver_reply(&http, &msg, &reply).await {
                warn!(error = %e, channel = %msg.channel_id, "Discord send failed");
            }
        });
    }
}

/// Whether a non-command message from someone other than the agent gets a reply.
pub fn should_respond(content: &str, mentions_agent: bool, channel_id: u64, config: &BotConfig) -> bool {
    if mentions_agent {
        return true;
    }
    if config.always_respond_channel_id == Some(channel_id) {
        return true;
    }
    let name = config.trigger_name.trim();
    !name.is_empty() && content.to_lowercase().contains(&name.to_lowercase())
}

/// Channel, category and guild names for the persona directive.
async fn channel_context(ctx: &Context, msg: &Message) -> ChannelContext {
    let guild_name = msg
        .guild_id
        .and_then(|id| ctx.cache.guild(id).map(|g| g.name.clone()));

    match msg.channel(ctx).await {
        Ok(Channel::Guild(channel)) => {
            let category_name = channel
                .parent_id
                .and_then(|id| ctx.cache.channel(id).map(|c| c.name.clone()));
            ChannelContext {
                channel_name: channel.name,
                category_name,
                guild_name,
            }
        }
        Ok(_) => ChannelContext {
            channel_name: "direct messages".to_string(),
            category_name: None,
            guild_name: None,
        },
        Err(e) => {
            debug!(error = %e, channel = %msg.channel_id, "channel lookup failed");
            ChannelContext {
                channel_name: msg.channel_id.to_string(),
                category_name: None,
                guild_name,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BotConfig {
        BotConfig {
            trigger_name: "Murmur".to_string(),
            always_respond_channel_id: Some(77),
            ..BotConfig::default()
        }
    }

    #[test]
    fn mention_triggers() {
        assert!(should_respond("hey you", true, 1, &config()));
    }

    #[test]
    fn name_match_is_case_insensitive() {
        assert!(should_respond("what do you think, MURMUR?", false, 1, &config()));
        assert!(!should_respond("nothing to see", false, 1, &config()));
    }

    #[test]
    fn always_respond_channel() {
        assert!(should_respond("anything", false, 77, &config()));
        assert!(!should_respond("anything", false, 78, &config()));
    }

    #[test]
    fn empty_trigger_name_matches_nothing() {
        let cfg = BotConfig {
            trigger_name: String::new(),
            ..BotConfig::default()
        };
        assert!(!should_respond("hello", false, 1, &cfg));
    }
}
