//! Turn aggregation: newest-first channel history → oldest-first conversation.
//!
//! Window selection and the fold are pure. Only line rendering touches
//! collaborators (reply lookup, mention resolution).

use tracing::debug;

use murmur_core::config::BotConfig;
use murmur_core::types::RawMessage;

use crate::pipeline::context::{HistorySource, IdentityLookup};
use crate::provider::Role;

use super::reply::{render_user_line, ReplyCache};
use super::sanitize::sanitize;
use super::{Conversation, ConversationTurn};

/// Filters applied while scanning history.
#[derive(Debug, Clone)]
pub struct WindowRules {
    /// Exact content that stops the scan. Nothing older is considered.
    pub boundary_marker: String,
    pub command_prefix: String,
    pub hidden_prefix: String,
}

impl From<&BotConfig> for WindowRules {
    fn from(config: &BotConfig) -> Self {
        Self {
            boundary_marker: config.boundary_marker.clone(),
            command_prefix: config.command_prefix.clone(),
            hidden_prefix: config.hidden_prefix.clone(),
        }
    }
}

impl WindowRules {
    fn is_boundary(&self, msg: &RawMessage) -> bool {
        msg.content == self.boundary_marker
    }

    fn is_hidden(&self, msg: &RawMessage) -> bool {
        let starts = |prefix: &str| !prefix.is_empty() && msg.content.starts_with(prefix);
        starts(&self.command_prefix) || starts(&self.hidden_prefix)
    }
}

/// One message's contribution to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub role: Role,
    pub text: String,
    pub message_id: u64,
}

/// Role a message contributes under: the agent's own messages are assistant turns.
pub fn role_of(msg: &RawMessage) -> Role {
    if msg.author.is_self {
        Role::Assistant
    } else {
        Role::User
    }
}

/// Messages that take part in aggregation, still newest-first.
///
/// Stops at the first boundary marker and skips command / hidden messages
/// without treating them as a role change.
pub fn select_window<'m>(history: &'m [RawMessage], rules: &WindowRules) -> Vec<&'m RawMessage> {
    history
        .iter()
        .take_while(|m| !rules.is_boundary(m))
        .filter(|m| !rules.is_hidden(m))
        .collect()
}

/// Fold newest-first contributions into an oldest-first conversation.
///
/// Consecutive contributions under the same role merge into one turn, lines in
/// chronological order joined by `\n`. The oldest finished turn is always
/// dropped: it is treated as cut off by the window edge.
pub fn fold_turns<I>(contributions: I) -> Conversation
where
    I: IntoIterator<Item = Contribution>,
{
    let mut finished: Vec<ConversationTurn> = Vec::new();
    let mut current: Option<Role> = None;
    let mut chunk: Vec<Contribution> = Vec::new();

    for c in contributions {
        if current != Some(c.role) {
            flush(&mut finished, current, &mut chunk);
            current = Some(c.role);
        }
        chunk.push(c);
    }
    flush(&mut finished, current, &mut chunk);

    finished.reverse();
    if !finished.is_empty() {
        let dropped = finished.remove(0);
        debug!(role = dropped.role.as_str(), lines = dropped.sources.len(), "dropped oldest turn");
    }
    Conversation::new(finished)
}

fn flush(finished: &mut Vec<ConversationTurn>, role: Option<Role>, chunk: &mut Vec<Contribution>) {
    let Some(role) = role else {
        return;
    };
    if chunk.is_empty() {
        return;
    }
    chunk.reverse();
    let content = chunk
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let sources = chunk.iter().map(|c| c.message_id).collect();
    chunk.clear();
    finished.push(ConversationTurn {
        role,
        content,
        sources,
    });
}

/// Render the contribution line for one message.
///
/// Agent lines are the sanitized content. Everyone else is attributed, with the
/// reply parent appended when it could be resolved.
async fn render(
    msg: &RawMessage,
    history: &dyn HistorySource,
    identity: &dyn IdentityLookup,
    replies: &mut ReplyCache,
) -> Contribution {
    let role = role_of(msg);
    let content = sanitize(&msg.content, identity).await;
    let text = match role {
        Role::Assistant => content,
        _ => {
            let reply = replies.resolve(history, identity, msg).await;
            let resolved = reply.as_ref().and_then(|r| r.resolved.as_ref());
            render_user_line(&msg.author, &content, resolved)
        }
    };
    Contribution {
        role,
        text,
        message_id: msg.id,
    }
}

/// Build the conversation for an already-fetched newest-first history window.
///
/// Reply parents already in `replies` are reused rather than fetched again.
pub async fn aggregate_history(
    messages: &[RawMessage],
    rules: &WindowRules,
    history: &dyn HistorySource,
    identity: &dyn IdentityLookup,
    replies: &mut ReplyCache,
) -> Conversation {
    let window = select_window(messages, rules);
    let mut contributions = Vec::with_capacity(window.len());
    for msg in window {
        contributions.push(render(msg, history, identity, replies).await);
    }
    fold_turns(contributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::types::Author;

    fn author(id: u64, is_self: bool) -> Author {
        Author {
            id,
            display_name: format!("name{id}"),
            handle: format!("user{id}"),
            is_bot: is_self,
            is_self,
        }
    }

    fn msg(id: u64, from_self: bool, content: &str) -> RawMessage {
        RawMessage {
            id,
            author: author(if from_self { 1 } else { 100 + id }, from_self),
            content: content.to_string(),
            position: 0,
            reply_to: None,
            channel_id: 5,
            guild_id: None,
        }
    }

    fn rules() -> WindowRules {
        WindowRules::from(&BotConfig::default())
    }

    fn contrib(role: Role, text: &str, id: u64) -> Contribution {
        Contribution {
            role,
            text: text.to_string(),
            message_id: id,
        }
    }

    #[test]
    fn empty_input_gives_empty_conversation() {
        assert!(fold_turns(Vec::new()).is_empty());
    }

    #[test]
    fn single_author_collapses_to_nothing() {
        let conv = fold_turns(vec![
            contrib(Role::User, "b", 2),
            contrib(Role::User, "a", 1),
        ]);
        assert!(conv.is_empty());
    }

    #[test]
    fn three_runs_keep_the_two_newest() {
        // newest-first: U1 "hi", B1 "hello", U2 "how are you"
        let conv = fold_turns(vec![
            contrib(Role::User, "hi", 3),
            contrib(Role::Assistant, "hello", 2),
            contrib(Role::User, "how are you", 1),
        ]);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns()[0].role, Role::Assistant);
        assert_eq!(conv.turns()[0].content, "hello");
        assert_eq!(conv.turns()[1].role, Role::User);
        assert_eq!(conv.turns()[1].content, "hi");
    }

    #[test]
    fn same_role_lines_join_chronologically() {
        let conv = fold_turns(vec![
            contrib(Role::User, "third", 6),
            contrib(Role::User, "second", 5),
            contrib(Role::Assistant, "reply", 4),
            contrib(Role::User, "first", 3),
        ]);
        let last = conv.turns().last().unwrap();
        assert_eq!(last.content, "second\nthird");
        assert_eq!(last.sources, vec![5, 6]);
    }

    #[test]
    fn roles_alternate_and_count_is_runs_minus_one() {
        let roles = [
            Role::User,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::Assistant,
            Role::User,
        ];
        let input: Vec<Contribution> = roles
            .iter()
            .enumerate()
            .map(|(i, r)| contrib(*r, "x", i as u64))
            .collect();
        let runs = 5;
        let conv = fold_turns(input);
        assert_eq!(conv.len(), runs - 1);
        for pair in conv.turns().windows(2) {
            assert_ne!(pair[0].role, pair[1].role);
        }
    }

    #[test]
    fn boundary_marker_stops_the_scan() {
        let history = vec![
            msg(4, false, "newest"),
            msg(3, true, "answer"),
            msg(2, false, "---"),
            msg(1, false, "older than the marker"),
        ];
        let window = select_window(&history, &rules());
        let ids: Vec<u64> = window.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn boundary_must_match_exactly() {
        let history = vec![msg(2, false, "--- not a marker"), msg(1, false, "kept")];
        assert_eq!(select_window(&history, &rules()).len(), 2);
    }

    #[test]
    fn hidden_and_command_messages_do_not_split_runs() {
        let history = vec![
            msg(5, true, "bot two"),
            msg(4, false, "!ping"),
            msg(3, false, "// note to self"),
            msg(2, true, "bot one"),
            msg(1, false, "user"),
        ];
        let window = select_window(&history, &rules());
        let ids: Vec<u64> = window.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 2, 1]);

        let conv = fold_turns(window.iter().map(|m| contrib(role_of(m), &m.content, m.id)));
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.turns()[0].content, "bot one\nbot two");
    }

    #[test]
    fn empty_prefixes_hide_nothing() {
        let rules = WindowRules {
            boundary_marker: "---".to_string(),
            command_prefix: String::new(),
            hidden_prefix: String::new(),
        };
        let history = vec![msg(1, false, "hello")];
        assert_eq!(select_window(&history, &rules).len(), 1);
    }
}
