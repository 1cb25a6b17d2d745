use std::sync::Arc;

use async_trait::async_trait;
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::guild::Emoji;
use serenity::model::id::{GuildId, UserId};
use tracing::debug;

use murmur_agent::IdentityLookup;
use murmur_core::error::FetchError;
use murmur_core::types::{Member, Symbol, UserIdentity};

use crate::error::bounded;

/// Discord's page size for the member list endpoint.
const MEMBER_PAGE: u64 = 1000;

/// User, member and custom emoji lookups backed by the serenity cache and REST API.
#[derive(Clone)]
pub struct DiscordIdentity {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordIdentity {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

fn symbol(emoji: &Emoji) -> Symbol {
    Symbol {
        name: emoji.name.clone(),
        id: emoji.id.get(),
        animated: emoji.animated,
    }
}

#[async_trait]
impl IdentityLookup for DiscordIdentity {
    async fn resolve_user(&self, user_id: u64) -> Result<UserIdentity, FetchError> {
        if user_id == 0 {
            return Err(FetchError::NotFound);
        }
        let user = bounded(UserId::new(user_id).to_user(&self.http)).await?;
        Ok(UserIdentity {
            display_name: user.display_name().to_string(),
            handle: user.name,
        })
    }

    async fn list_members(&self, guild_id: u64) -> Result<Vec<Member>, FetchError> {
        if guild_id == 0 {
            return Err(FetchError::NotFound);
        }
        let guild = GuildId::new(guild_id);
        let mut out = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let batch = bounded(guild.members(&self.http, Some(MEMBER_PAGE), after)).await?;
            out.extend(batch.iter().map(|m| Member {
                id: m.user.id.get(),
                name: m.user.name.clone(),
                display_name: m.display_name().to_string(),
            }));
            if (batch.len() as u64) < MEMBER_PAGE {
                break;
            }
            after = batch.last().map(|m| m.user.id);
        }

        debug!(guild = guild_id, members = out.len(), "member list fetched");
        Ok(out)
    }

    async fn list_symbols(&self) -> Result<Vec<Symbol>, FetchError> {
        let mut out = Vec::new();
        for guild_id in self.cache.guilds() {
            let cached: Option<Vec<Symbol>> = self
                .cache
                .guild(guild_id)
                .map(|g| g.emojis.values().map(symbol).collect());
            match cached {
                Some(symbols) => out.extend(symbols),
                None => {
                    let emojis = bounded(guild_id.emojis(&self.http)).await?;
                    out.extend(emojis.iter().map(symbol));
                }
            }
        }
        Ok(out)
    }
}
