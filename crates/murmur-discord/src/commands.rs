//! Owner-only prefix commands: `ping`, `history [channel]`, `reload`.
//!
//! Parsed from ordinary messages that start with the configured command
//! prefix. Messages from anyone but an owner are ignored.

use std::collections::HashSet;
use std::time::Duration;

use serenity::builder::{CreateAttachment, CreateMessage};
use serenity::model::channel::Message;
use serenity::prelude::Context;
use tracing::{debug, info, warn};

use murmur_agent::pipeline::build_conversation;
use murmur_core::config::BotConfig;

use crate::handler::MurmurHandler;
use crate::history::DiscordHistory;
use crate::identity::DiscordIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    /// Dump the aggregated conversation of a channel (default: the current one).
    History(Option<u64>),
    Reload,
    Unknown(String),
}

/// Parse `content` as a command. `None` when it does not carry the prefix.
pub fn parse_command(content: &str, prefix: &str) -> Option<Command> {
    if prefix.is_empty() {
        return None;
    }
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();

    let command = match name {
        "ping" => Command::Ping,
        "reload" | "reload_config" => Command::Reload,
        "history" | "get_history" => match words.next() {
            None => Command::History(None),
            Some(arg) => match parse_channel_arg(arg) {
                Some(id) => Command::History(Some(id)),
                None => Command::Unknown(rest.trim().to_string()),
            },
        },
        _ => Command::Unknown(rest.trim().to_string()),
    };
    Some(command)
}

/// Accept a raw id or a `<#id>` channel mention.
fn parse_channel_arg(arg: &str) -> Option<u64> {
    let digits = arg
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(arg);
    digits.parse::<u64>().ok().filter(|id| *id != 0)
}

pub fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(d) => format!("pong but {:.2}ms late", d.as_secs_f64() * 1000.0),
        None => "pong, latency not measured yet".to_string(),
    }
}

/// Owners come from the application info plus the configured extra ids.
pub fn is_owner(user_id: u64, app_owners: Option<&HashSet<u64>>, config: &BotConfig) -> bool {
    app_owners.is_some_and(|owners| owners.contains(&user_id)) || config.owner_ids.contains(&user_id)
}

/// Execute `command` on behalf of `msg`'s author.
pub async fn dispatch(handler: &MurmurHandler, ctx: &Context, msg: &Message, command: Command) {
    let config = handler.config.snapshot();
    if !is_owner(msg.author.id.get(), handler.owners.get(), &config) {
        debug!(user = %msg.author.id, ?command, "ignoring command from non-owner");
        return;
    }

    let result = match command {
        Command::Ping => {
            let latency = shard_latency(handler, ctx).await;
            msg.reply(&ctx.http, format_latency(latency)).await.map(|_| ())
        }
        Command::History(channel) => {
            let channel_id = channel.unwrap_or_else(|| msg.channel_id.get());
            send_history(handler, ctx, msg, &config, channel_id).await
        }
        Command::Reload => {
            let text = match handler.config.reload() {
                Ok(_) => "config reloaded".to_string(),
                Err(e) => {
                    warn!(error = %e, "config reload failed");
                    format!("config reload failed: {e}")
                }
            };
            msg.reply(&ctx.http, text).await.map(|_| ())
        }
        Command::Unknown(text) => {
            debug!(command = %text, "unknown command");
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(error = %e, "command reply failed");
    }
}

async fn shard_latency(handler: &MurmurHandler, ctx: &Context) -> Option<Duration> {
    let manager = handler.shards.get()?;
    let runners = manager.runners.lock().await;
    runners.get(&ctx.shard_id).and_then(|runner| runner.latency)
}

async fn send_history(
    handler: &MurmurHandler,
    ctx: &Context,
    msg: &Message,
    config: &BotConfig,
    channel_id: u64,
) -> Result<(), serenity::Error> {
    let Some(bot_id) = handler.bot_id.get().copied() else {
        msg.reply(&ctx.http, "failed to fetch history").await?;
        return Ok(());
    };
    let history = DiscordHistory::new(ctx.http.clone(), bot_id);
    let identity = DiscordIdentity::new(ctx.http.clone(), ctx.cache.clone());
    let conversation = build_conversation(config, &history, &identity, channel_id).await;

    let json = match serde_json::to_vec_pretty(&conversation) {
        Ok(json) if !conversation.is_empty() => json,
        Ok(_) => {
            msg.reply(&ctx.http, "failed to fetch history").await?;
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "history serialization failed");
            msg.reply(&ctx.http, "failed to fetch history").await?;
            return Ok(());
        }
    };

    info!(channel = channel_id, turns = conversation.len(), "history exported");
    let file = CreateAttachment::bytes(json, format!("history_{channel_id}.json"));
    let builder = CreateMessage::new()
        .content("history fetched")
        .add_file(file)
        .reference_message(msg);
    msg.channel_id.send_message(&ctx.http, builder).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_are_not_commands() {
        assert_eq!(parse_command("hello murmur", "!"), None);
        assert_eq!(parse_command("!ping", ""), None);
    }

    #[test]
    fn known_commands() {
        assert_eq!(parse_command("!ping", "!"), Some(Command::Ping));
        assert_eq!(parse_command("!reload", "!"), Some(Command::Reload));
        assert_eq!(parse_command("!reload_config", "!"), Some(Command::Reload));
        assert_eq!(parse_command("!history", "!"), Some(Command::History(None)));
    }

    #[test]
    fn history_accepts_id_or_channel_mention() {
        assert_eq!(
            parse_command("!history 123", "!"),
            Some(Command::History(Some(123)))
        );
        assert_eq!(
            parse_command("!get_history <#456>", "!"),
            Some(Command::History(Some(456)))
        );
        assert_eq!(
            parse_command("!history general", "!"),
            Some(Command::Unknown("history general".to_string()))
        );
        assert_eq!(
            parse_command("!history 0", "!"),
            Some(Command::Unknown("history 0".to_string()))
        );
    }

    #[test]
    fn multi_char_prefix() {
        assert_eq!(parse_command("m!ping", "m!"), Some(Command::Ping));
        assert_eq!(parse_command("!ping", "m!"), None);
    }

    #[test]
    fn latency_formatting() {
        assert_eq!(
            format_latency(Some(Duration::from_micros(42_347))),
            "pong but 42.35ms late"
        );
        assert_eq!(format_latency(None), "pong, latency not measured yet");
    }

    #[test]
    fn owners_from_app_info_or_config() {
        let app: HashSet<u64> = [1].into_iter().collect();
        let config = BotConfig {
            owner_ids: vec![2],
            ..BotConfig::default()
        };
        assert!(is_owner(1, Some(&app), &config));
        assert!(is_owner(2, Some(&app), &config));
        assert!(is_owner(2, None, &config));
        assert!(!is_owner(3, Some(&app), &config));
    }
}
