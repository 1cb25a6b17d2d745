//! Reply-link resolution. A failed lookup only drops the "in the context of" clause.

use std::collections::HashMap;

use tracing::debug;

use murmur_core::types::{Author, RawMessage, ReplyLink, ResolvedReply};

use crate::pipeline::context::{HistorySource, IdentityLookup};

use super::sanitize::sanitize;

/// Resolve the reply link of `msg`, if it has one.
///
/// Returns `None` when the message is not a reply. A reply whose parent cannot
/// be fetched yields a link with `resolved: None`.
pub async fn resolve_reply(
    history: &dyn HistorySource,
    identity: &dyn IdentityLookup,
    msg: &RawMessage,
) -> Option<ReplyLink> {
    let parent_id = msg.reply_to?;

    let resolved = match history.fetch_message(msg.channel_id, parent_id).await {
        Ok(parent) => Some(ResolvedReply {
            message_id: parent.id,
            author_display_name: parent.author.display_name.clone(),
            author_handle: parent.author.handle.clone(),
            content: sanitize(&parent.content, identity).await,
        }),
        Err(e) => {
            debug!(message = msg.id, parent = parent_id, error = %e, "reply parent unavailable");
            None
        }
    };

    Some(ReplyLink {
        parent_id,
        resolved,
    })
}

/// Reply parents resolved during one request, keyed by parent id.
///
/// Failed lookups are remembered too, so every reader of a parent sees the
/// same outcome and each parent is fetched at most once.
#[derive(Debug, Default)]
pub struct ReplyCache {
    parents: HashMap<u64, Option<ResolvedReply>>,
}

impl ReplyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`resolve_reply`], reusing an earlier result for the same parent.
    pub async fn resolve(
        &mut self,
        history: &dyn HistorySource,
        identity: &dyn IdentityLookup,
        msg: &RawMessage,
    ) -> Option<ReplyLink> {
        let parent_id = msg.reply_to?;
        if let Some(resolved) = self.parents.get(&parent_id) {
            return Some(ReplyLink {
                parent_id,
                resolved: resolved.clone(),
            });
        }
        let link = resolve_reply(history, identity, msg).await?;
        self.parents.insert(parent_id, link.resolved.clone());
        Some(link)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// `"<display>" (@<handle>) said "<content>"`, plus the reply parent when known.
pub fn render_user_line(author: &Author, content: &str, reply: Option<&ResolvedReply>) -> String {
    let mut line = format!(
        "\"{}\" (@{}) said \"{}\"",
        author.display_name, author.handle, content
    );
    if let Some(parent) = reply {
        line.push_str(&format!(
            " in the context of \"{}\" (@{}) saying \"{}\"",
            parent.author_display_name, parent.author_handle, parent.content
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use murmur_core::error::FetchError;
    use murmur_core::types::{Member, Symbol, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Knows one parent message (id 3) and counts lookups.
    struct OneParent {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl HistorySource for OneParent {
        async fn fetch_history(&self, _: u64, _: usize) -> Result<Vec<RawMessage>, FetchError> {
            Ok(Vec::new())
        }
        async fn fetch_message(&self, channel_id: u64, id: u64) -> Result<RawMessage, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if id != 3 {
                return Err(FetchError::NotFound);
            }
            Ok(RawMessage {
                id,
                author: alice(),
                content: "original".to_string(),
                position: 0,
                reply_to: None,
                channel_id,
                guild_id: None,
            })
        }
    }

    #[async_trait]
    impl IdentityLookup for OneParent {
        async fn resolve_user(&self, _: u64) -> Result<UserIdentity, FetchError> {
            Err(FetchError::NotFound)
        }
        async fn list_members(&self, _: u64) -> Result<Vec<Member>, FetchError> {
            Ok(Vec::new())
        }
        async fn list_symbols(&self) -> Result<Vec<Symbol>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn reply_to(id: u64, parent: u64) -> RawMessage {
        RawMessage {
            id,
            author: alice(),
            content: "child".to_string(),
            position: 0,
            reply_to: Some(parent),
            channel_id: 9,
            guild_id: None,
        }
    }

    #[tokio::test]
    async fn cache_fetches_each_parent_once() {
        let source = OneParent {
            fetches: AtomicUsize::new(0),
        };
        let mut cache = ReplyCache::new();

        let first = cache.resolve(&source, &source, &reply_to(5, 3)).await.unwrap();
        let again = cache.resolve(&source, &source, &reply_to(5, 3)).await.unwrap();
        let sibling = cache.resolve(&source, &source, &reply_to(6, 3)).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(first, sibling);
        assert_eq!(first.resolved.unwrap().content, "original");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_remembers_failed_lookups() {
        let source = OneParent {
            fetches: AtomicUsize::new(0),
        };
        let mut cache = ReplyCache::new();

        for _ in 0..2 {
            let link = cache.resolve(&source, &source, &reply_to(5, 99)).await.unwrap();
            assert_eq!(link.parent_id, 99);
            assert!(link.resolved.is_none());
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn non_reply_is_not_cached() {
        let source = OneParent {
            fetches: AtomicUsize::new(0),
        };
        let mut cache = ReplyCache::new();
        let mut msg = reply_to(5, 3);
        msg.reply_to = None;

        assert!(cache.resolve(&source, &source, &msg).await.is_none());
        assert!(cache.is_empty());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    fn alice() -> Author {
        Author {
            id: 10,
            display_name: "Alice".to_string(),
            handle: "alice".to_string(),
            is_bot: false,
            is_self: false,
        }
    }

    #[test]
    fn plain_line() {
        assert_eq!(
            render_user_line(&alice(), "hi there", None),
            r#""Alice" (@alice) said "hi there""#
        );
    }

    #[test]
    fn line_with_reply_context() {
        let parent = ResolvedReply {
            message_id: 3,
            author_display_name: "Bob".to_string(),
            author_handle: "bob".to_string(),
            content: "original".to_string(),
        };
        assert_eq!(
            render_user_line(&alice(), "agreed", Some(&parent)),
            r#""Alice" (@alice) said "agreed" in the context of "Bob" (@bob) saying "original""#
        );
    }
}
