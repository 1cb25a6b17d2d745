use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::GetMessages;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId, UserId};

use murmur_agent::HistorySource;
use murmur_core::error::FetchError;
use murmur_core::types::{Author, RawMessage};

use crate::error::bounded;

/// Discord caps a single history request at 100 messages.
const PAGE_MAX: usize = 100;

/// Channel history over the Discord REST API.
#[derive(Clone)]
pub struct DiscordHistory {
    http: Arc<Http>,
    bot_id: UserId,
}

impl DiscordHistory {
    pub fn new(http: Arc<Http>, bot_id: UserId) -> Self {
        Self { http, bot_id }
    }

    fn raw(&self, msg: &Message, position: usize) -> RawMessage {
        to_raw(msg, self.bot_id, position)
    }
}

/// Convert a serenity message into the pipeline's platform-neutral form.
pub fn to_raw(msg: &Message, bot_id: UserId, position: usize) -> RawMessage {
    let display_name = msg
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .unwrap_or_else(|| msg.author.display_name().to_string());

    RawMessage {
        id: msg.id.get(),
        author: Author {
            id: msg.author.id.get(),
            display_name,
            handle: msg.author.name.clone(),
            is_bot: msg.author.bot,
            is_self: msg.author.id == bot_id,
        },
        content: msg.content.clone(),
        position,
        reply_to: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.get()),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
    }
}

/// Serenity ids are non-zero; a zero id can only come from operator input.
fn channel(id: u64) -> Result<ChannelId, FetchError> {
    if id == 0 {
        return Err(FetchError::NotFound);
    }
    Ok(ChannelId::new(id))
}

#[async_trait]
impl HistorySource for DiscordHistory {
    async fn fetch_history(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> Result<Vec<RawMessage>, FetchError> {
        let channel = channel(channel_id)?;
        let mut out: Vec<RawMessage> = Vec::with_capacity(limit);
        let mut before: Option<MessageId> = None;

        while out.len() < limit {
            let page = (limit - out.len()).min(PAGE_MAX);
            let mut request = GetMessages::new().limit(page as u8);
            if let Some(id) = before {
                request = request.before(id);
            }

            let batch = bounded(channel.messages(&self.http, request)).await?;
            let exhausted = batch.len() < page;
            before = batch.last().map(|m| m.id);
            let start = out.len();
            out.extend(batch.iter().enumerate().map(|(i, m)| self.raw(m, start + i)));

            if exhausted || before.is_none() {
                break;
            }
        }

        Ok(out)
    }

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<RawMessage, FetchError> {
        if message_id == 0 {
            return Err(FetchError::NotFound);
        }
        let msg = bounded(channel(channel_id)?.message(&self.http, MessageId::new(message_id))).await?;
        Ok(self.raw(&msg, 0))
    }
}
