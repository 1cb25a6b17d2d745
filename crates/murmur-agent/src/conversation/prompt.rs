//! System directive assembly.
//!
//! Directives go in at one offset, just before the final turn. The persona
//! directive is inserted first and the static operator directive second at the
//! same index, so the static one ends up in front.

use tracing::warn;

use murmur_core::types::{Author, ChannelContext, ResolvedReply, UserIdentity};

use crate::pipeline::context::IdentityLookup;

use super::sanitize::SymbolCatalog;
use super::Conversation;

/// Everything the persona directive describes about the current request.
#[derive(Debug, Clone, Copy)]
pub struct PersonaContext<'a> {
    pub agent: &'a UserIdentity,
    pub author: &'a Author,
    /// Sanitized content of the triggering message.
    pub content: &'a str,
    pub reply: Option<&'a ResolvedReply>,
    pub channel: &'a ChannelContext,
}

/// Fetch the symbol catalog for this request. An unavailable lookup gives an empty catalog.
pub async fn build_symbol_catalog(identity: &dyn IdentityLookup) -> SymbolCatalog {
    match identity.list_symbols().await {
        Ok(symbols) => SymbolCatalog::new(symbols),
        Err(e) => {
            warn!(error = %e, "symbol listing failed, continuing without symbols");
            SymbolCatalog::default()
        }
    }
}

/// Render the persona directive.
pub fn persona_directive(ctx: &PersonaContext<'_>, catalog: &SymbolCatalog) -> String {
    let mut out = format!(
        "you are a discord bot. your current display name is {}, and your username is @{}. \
         you can use markdown to format your messages. only reply to the latest message in \
         the conversation unless strictly necessary. try to keep responses short.\n",
        ctx.agent.display_name, ctx.agent.handle
    );

    out.push_str(&format!(
        "you are currently replying to {} (@{}) saying \"{}\"",
        ctx.author.display_name, ctx.author.handle, ctx.content
    ));
    match ctx.reply {
        Some(parent) => out.push_str(&format!(
            " in response to {} (@{}) saying \"{}\".\n",
            parent.author_display_name, parent.author_handle, parent.content
        )),
        None => out.push_str(".\n"),
    }

    out.push_str(&format!("you are currently in \"#{}\"", ctx.channel.channel_name));
    if let Some(category) = &ctx.channel.category_name {
        out.push_str(&format!(", which is in the \"{}\" category", category));
    }
    if let Some(guild) = &ctx.channel.guild_name {
        out.push_str(&format!(", within the server \"{}\"", guild));
    }
    out.push_str(".\n");

    out.push_str(
        "to mention someone, write @ followed by their username, like @name. \
         to use a custom emoji, write its name between colons, like :name:.\n",
    );
    out.push_str("NEVER copy the user's message, always give a unique response.\n");

    let names = catalog.names();
    if names.is_empty() {
        out.push_str("there are no custom emojis available.");
    } else {
        out.push_str("available custom emojis: ");
        out.push_str(
            &names
                .iter()
                .map(|n| format!(":{n}:"))
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    out
}

/// Insert the enabled directives immediately before the final turn
/// (index `len - 1`, or 0 for an empty conversation).
pub fn assemble(conversation: &mut Conversation, persona: Option<String>, static_directive: &str) {
    let at = conversation.len().saturating_sub(1);
    if let Some(persona) = persona {
        conversation.insert_system(at, persona);
    }
    if !static_directive.is_empty() {
        conversation.insert_system(at, static_directive);
    }
}
