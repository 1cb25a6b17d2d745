use serde::{Deserialize, Serialize};

/// Author of a channel message, as seen from the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub display_name: String,
    /// Unique account name, rendered as `@handle`.
    pub handle: String,
    pub is_bot: bool,
    /// True when the message was written by the agent itself.
    pub is_self: bool,
}

/// One message fetched from channel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: u64,
    pub author: Author,
    pub content: String,
    /// Position within the fetched window, 0 = newest.
    pub position: usize,
    /// Parent message id when this message is a reply.
    pub reply_to: Option<u64>,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
}

/// Naming context of the channel a request originates from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContext {
    pub channel_name: String,
    pub category_name: Option<String>,
    pub guild_name: Option<String>,
}

/// Snapshot of a successfully resolved reply parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReply {
    pub message_id: u64,
    pub author_display_name: String,
    pub author_handle: String,
    pub content: String,
}

/// A reply link: the parent id plus the resolved snapshot, if resolution succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyLink {
    pub parent_id: u64,
    pub resolved: Option<ResolvedReply>,
}

/// Identity returned by a user lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub display_name: String,
    pub handle: String,
}

/// Guild member as returned by a member listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    /// Account name (handle).
    pub name: String,
    pub display_name: String,
}

/// Custom pictograph (guild emoji) available to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub id: u64,
    pub animated: bool,
}

impl Symbol {
    /// Platform markup for this symbol: `<:name:id>` or `<a:name:id>`.
    pub fn markup(&self) -> String {
        if self.animated {
            format!("<a:{}:{}>", self.name, self.id)
        } else {
            format!("<:{}:{}>", self.name, self.id)
        }
    }
}
