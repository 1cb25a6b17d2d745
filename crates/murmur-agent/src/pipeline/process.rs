//! End-to-end response production for one triggering message.
//!
//! fetch history → aggregate turns → build symbol catalog → assemble directives
//! → gated generate/validate loop → desanitize.
//!
//! Lookup failures degrade to empty values. Generation failures become an
//! operator-tagged diagnostic reply. Nothing here returns an error to the adapter.

use std::sync::Arc;

use tracing::{error, info, warn};

use murmur_core::config::BotConfig;
use murmur_core::types::{ChannelContext, RawMessage, UserIdentity};

use crate::conversation::{
    aggregate_history, assemble, build_symbol_catalog, desanitize, persona_directive,
    sanitize, Conversation, PersonaContext, ReplyCache, WindowRules,
};
use crate::gate::GenerationGate;
use crate::provider::{LlmProvider, ProviderError};
use crate::validate::{generate_validated, GenerationSettings};

use super::context::{HistorySource, IdentityLookup};

/// The message that triggered a response, with the context needed to answer it.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub message: RawMessage,
    /// The agent's own identity.
    pub agent: UserIdentity,
    pub channel: ChannelContext,
}

/// Shared response pipeline. Cheap to clone.
#[derive(Clone)]
pub struct ResponsePipeline {
    provider: Arc<dyn LlmProvider>,
    gate: Arc<GenerationGate>,
}

impl ResponsePipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, gate: Arc<GenerationGate>) -> Self {
        Self { provider, gate }
    }

    pub fn gate(&self) -> &GenerationGate {
        &self.gate
    }

    /// Produce the reply text for `trigger`. Always returns something to send.
    pub async fn respond(
        &self,
        config: &BotConfig,
        history: &dyn HistorySource,
        identity: &dyn IdentityLookup,
        trigger: &Trigger,
    ) -> String {
        match self.try_respond(config, history, identity, trigger).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    error = %e,
                    provider = %self.provider.name(),
                    channel = trigger.message.channel_id,
                    "response generation failed"
                );
                operator_diagnostic(&e)
            }
        }
    }

    async fn try_respond(
        &self,
        config: &BotConfig,
        history: &dyn HistorySource,
        identity: &dyn IdentityLookup,
        trigger: &Trigger,
    ) -> Result<String, ProviderError> {
        let msg = &trigger.message;
        // The trigger's parent is resolved once and shared with aggregation.
        let mut replies = ReplyCache::new();
        let reply = replies.resolve(history, identity, msg).await;
        let mut conversation =
            collect_conversation(config, history, identity, msg.channel_id, &mut replies).await;
        let catalog = build_symbol_catalog(identity).await;

        let persona = if config.append_persona_directive {
            let content = sanitize(&msg.content, identity).await;
            let ctx = PersonaContext {
                agent: &trigger.agent,
                author: &msg.author,
                content: &content,
                reply: reply.as_ref().and_then(|r| r.resolved.as_ref()),
                channel: &trigger.channel,
            };
            Some(persona_directive(&ctx, &catalog))
        } else {
            None
        };
        assemble(&mut conversation, persona, &config.system_directive);

        let settings = GenerationSettings {
            model: config.model.clone(),
            temperature: config.temperature,
            stream: config.stream,
        };
        let generated =
            generate_validated(&*self.provider, &self.gate, &settings, &conversation).await?;

        let members = match msg.guild_id {
            Some(guild_id) => identity.list_members(guild_id).await.unwrap_or_else(|e| {
                warn!(guild = guild_id, error = %e, "member listing failed, handles stay plain");
                Vec::new()
            }),
            None => Vec::new(),
        };

        info!(
            channel = msg.channel_id,
            turns = conversation.len(),
            attempts = generated.attempts,
            accepted = generated.accepted,
            "response ready"
        );

        Ok(desanitize(&generated.content, &catalog, &members))
    }
}

/// Aggregate the recent history of `channel_id` into a conversation.
///
/// A failed history fetch gives an empty conversation.
pub async fn build_conversation(
    config: &BotConfig,
    history: &dyn HistorySource,
    identity: &dyn IdentityLookup,
    channel_id: u64,
) -> Conversation {
    collect_conversation(config, history, identity, channel_id, &mut ReplyCache::new()).await
}

async fn collect_conversation(
    config: &BotConfig,
    history: &dyn HistorySource,
    identity: &dyn IdentityLookup,
    channel_id: u64,
    replies: &mut ReplyCache,
) -> Conversation {
    let messages = match history.fetch_history(channel_id, config.history_limit).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(channel = channel_id, error = %e, "history fetch failed, starting empty");
            Vec::new()
        }
    };
    aggregate_history(&messages, &WindowRules::from(config), history, identity, replies).await
}

/// Literal reply used when generation itself fails.
pub fn operator_diagnostic(err: &ProviderError) -> String {
    format!("[operator] response generation failed: {err}")
}
