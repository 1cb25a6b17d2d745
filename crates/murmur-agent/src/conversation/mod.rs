//! Turn-structured conversation built from channel history.
//!
//! `aggregate` folds raw messages into alternating turns, `reply` resolves
//! reply links, `sanitize` translates platform markup in both directions and
//! `prompt` injects the system directives.

pub mod aggregate;
pub mod prompt;
pub mod reply;
pub mod sanitize;

use serde::Serialize;

use crate::provider::{Message, Role};

pub use aggregate::{aggregate_history, fold_turns, select_window, Contribution, WindowRules};
pub use prompt::{assemble, build_symbol_catalog, persona_directive, PersonaContext};
pub use reply::{render_user_line, resolve_reply, ReplyCache};
pub use sanitize::{desanitize, sanitize, SymbolCatalog};

/// One role-attributed block of conversation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Ids of the channel messages that contributed to this turn, oldest first.
    /// Empty for injected system turns.
    pub sources: Vec<u64>,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            sources: Vec::new(),
        }
    }
}

/// Ordered turns, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Insert a system turn at `index` (clamped to the end).
    pub fn insert_system(&mut self, index: usize, content: impl Into<String>) {
        let index = index.min(self.turns.len());
        self.turns.insert(index, ConversationTurn::system(content));
    }

    /// Convert to the message list sent to the model.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .map(|t| Message::new(t.role, t.content.clone()))
            .collect()
    }

    /// `role: content` lines, used as validator input.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn {
            role,
            content: content.to_string(),
            sources: vec![1],
        }
    }

    #[test]
    fn transcript_lists_role_prefixed_lines() {
        let conv = Conversation::new(vec![
            turn(Role::User, "hi"),
            turn(Role::Assistant, "hello"),
        ]);
        assert_eq!(conv.transcript(), "user: hi\nassistant: hello");
    }

    #[test]
    fn insert_system_clamps_to_end() {
        let mut conv = Conversation::new(vec![turn(Role::User, "hi")]);
        conv.insert_system(10, "sys");
        assert_eq!(conv.turns()[1].role, Role::System);
        assert!(conv.turns()[1].sources.is_empty());
    }

    #[test]
    fn serializes_as_plain_array() {
        let conv = Conversation::new(vec![turn(Role::User, "hi")]);
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json[0]["role"], "user");
        assert_eq!(json[0]["content"], "hi");
    }
}
