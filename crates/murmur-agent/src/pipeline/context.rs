//! Collaborator interfaces implemented by the messaging-platform adapter.
//!
//! Every call is a suspension point and returns an explicit `Result`; the
//! pipeline decides where a failure degrades to "absent".

use async_trait::async_trait;

use murmur_core::error::FetchError;
use murmur_core::types::{Member, RawMessage, Symbol, UserIdentity};

/// Read access to channel messages.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` most recent messages, newest first.
    async fn fetch_history(&self, channel_id: u64, limit: usize)
        -> Result<Vec<RawMessage>, FetchError>;

    /// A single message by id.
    async fn fetch_message(&self, channel_id: u64, message_id: u64)
        -> Result<RawMessage, FetchError>;
}

/// User, member and symbol lookups.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn resolve_user(&self, user_id: u64) -> Result<UserIdentity, FetchError>;

    /// Members of one group (guild).
    async fn list_members(&self, guild_id: u64) -> Result<Vec<Member>, FetchError>;

    /// Custom symbols across every group the agent belongs to.
    async fn list_symbols(&self) -> Result<Vec<Symbol>, FetchError>;
}
