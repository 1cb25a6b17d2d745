//! Translation between platform entity markup and model-safe text.
//!
//! Inbound: `<@id>` → `"Display" (@handle)`, `<:name:id>` → `:name:`.
//! Outbound (fixed order): symbols, `<@handle>`, bare `@handle`, bare `<id>`,
//! then everything outside printable ASCII is stripped.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use murmur_core::types::{Member, Symbol};

use crate::pipeline::context::IdentityLookup;

static MENTION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("hardcoded regex"));
static SYMBOL_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:(\w+):\d+>").expect("hardcoded regex"));
/// Full markup is matched first so it passes through untouched.
static SYMBOL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:\w+:\d+>|:(\w+):").expect("hardcoded regex"));
static HANDLE_MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?([A-Za-z0-9_.]+)>").expect("hardcoded regex"));
static BARE_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w<@])@([A-Za-z0-9_.]+)").expect("hardcoded regex"));
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\d+)>").expect("hardcoded regex"));

/// Custom symbols available for one request, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SymbolCatalog {
    by_name: HashMap<String, Symbol>,
}

impl SymbolCatalog {
    /// Build a catalog. When two groups share a name the first one wins.
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        let mut by_name = HashMap::new();
        for symbol in symbols {
            by_name.entry(symbol.name.clone()).or_insert(symbol);
        }
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name)
    }

    /// Symbol names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Rewrite inbound content into model-safe text.
///
/// Mentions of users that cannot be resolved are left as they are.
pub async fn sanitize(text: &str, identity: &dyn IdentityLookup) -> String {
    let mut names: HashMap<u64, String> = HashMap::new();
    for caps in MENTION_ID.captures_iter(text) {
        let Ok(id) = caps[1].parse::<u64>() else {
            continue;
        };
        if names.contains_key(&id) {
            continue;
        }
        if let Ok(user) = identity.resolve_user(id).await {
            names.insert(id, format!("\"{}\" (@{})", user.display_name, user.handle));
        }
    }

    let text = MENTION_ID.replace_all(text, |caps: &Captures| {
        caps[1]
            .parse::<u64>()
            .ok()
            .and_then(|id| names.get(&id).cloned())
            .unwrap_or_else(|| caps[0].to_string())
    });

    SYMBOL_MARKUP.replace_all(&text, ":$1:").into_owned()
}

/// Rewrite generated text into platform markup before it is sent.
///
/// `members` is the member list of the originating group. It may be empty, in
/// which case no handle resolves.
pub fn desanitize(text: &str, catalog: &SymbolCatalog, members: &[Member]) -> String {
    // 1. :name: → symbol markup
    let text = expand_symbols(text, catalog);

    // 2. <@handle> → <@id>, or plain @handle when unknown
    let text = HANDLE_MARKUP.replace_all(&text, |caps: &Captures| {
        let raw = &caps[1];
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return caps[0].to_string();
        }
        let (handle, rest) = split_handle(raw);
        match find_member(members, handle) {
            Some(m) => format!("<@{}>{}", m.id, rest),
            None => format!("@{}", raw),
        }
    });

    // 3. bare @handle → <@id>
    let text = BARE_HANDLE.replace_all(&text, |caps: &Captures| {
        let (handle, rest) = split_handle(&caps[2]);
        match find_member(members, handle) {
            Some(m) => format!("{}<@{}>{}", &caps[1], m.id, rest),
            None => caps[0].to_string(),
        }
    });

    // 4. <digits> → <@digits>
    let text = BARE_ID.replace_all(&text, "<@$1>");

    // 5. printable ASCII only
    text.chars().filter(|c| is_printable_ascii(*c)).collect()
}

/// Replace every catalog `:name:` with its markup.
///
/// An unknown `:name:` gives its closing colon back, so `:shrug:wave:` and
/// `10:30:wave:` still reach `:wave:`.
fn expand_symbols(text: &str, catalog: &SymbolCatalog) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(caps) = SYMBOL_TOKEN.captures_at(text, pos) {
        let whole = caps.get(0).map_or(pos..text.len(), |m| m.range());
        let symbol = caps.get(1).and_then(|name| catalog.get(name.as_str()));
        match (caps.get(1), symbol) {
            (Some(_), Some(symbol)) => {
                out.push_str(&text[pos..whole.start]);
                out.push_str(&symbol.markup());
                pos = whole.end;
            }
            (Some(_), None) => {
                let resume = whole.end - 1;
                out.push_str(&text[pos..resume]);
                pos = resume;
            }
            (None, _) => {
                out.push_str(&text[pos..whole.end]);
                pos = whole.end;
            }
        }
    }

    out.push_str(&text[pos..]);
    out
}

fn is_printable_ascii(c: char) -> bool {
    matches!(c, ' '..='~' | '\n')
}

/// Trailing dots belong to the sentence, not the handle.
fn split_handle(raw: &str) -> (&str, &str) {
    let handle = raw.trim_end_matches('.');
    (handle, &raw[handle.len()..])
}

fn find_member<'a>(members: &'a [Member], handle: &str) -> Option<&'a Member> {
    if handle.is_empty() {
        return None;
    }
    members
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(handle))
        .or_else(|| {
            members
                .iter()
                .find(|m| m.display_name.eq_ignore_ascii_case(handle))
        })
}
