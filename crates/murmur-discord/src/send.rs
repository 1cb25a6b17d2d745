use serenity::builder::{CreateAllowedMentions, CreateMessage};
use serenity::http::Http;
use serenity::model::channel::Message;

use crate::error::DiscordError;

/// Discord's hard per-message character limit.
pub const MESSAGE_MAX: usize = 2000;

/// Break `@everyone` and `@here` with a zero-width space so they never ping.
pub fn neutralize_mass_mentions(text: &str) -> String {
    text.replace("@everyone", "@\u{200b}everyone")
        .replace("@here", "@\u{200b}here")
}

/// Keep at most [`MESSAGE_MAX`] characters.
pub fn truncate(text: &str) -> String {
    text.chars().take(MESSAGE_MAX).collect()
}

/// Final outbound form of a generated reply.
pub fn prepare_reply(text: &str) -> String {
    truncate(&neutralize_mass_mentions(text))
}

/// Reply to `msg` with `text`, referencing it and mentioning its author.
pub async fn deliver_reply(http: &Http, msg: &Message, text: &str) -> Result<(), DiscordError> {
    let body = prepare_reply(text);
    if body.trim().is_empty() {
        return Err(DiscordError::EmptyReply);
    }

    let builder = CreateMessage::new()
        .content(body)
        .reference_message(msg)
        .allowed_mentions(
            CreateAllowedMentions::new()
                .all_users(true)
                .replied_user(true),
        );
    msg.channel_id.send_message(http, builder).await?;
    Ok(())
}
