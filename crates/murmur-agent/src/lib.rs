//! Conversation assembly, generation and response validation for the murmur bot.

pub mod conversation;
pub mod gate;
pub mod ollama;
pub mod pipeline;
pub mod provider;
pub mod stream;
pub mod validate;

pub use gate::GenerationGate;
pub use pipeline::{HistorySource, IdentityLookup, ResponsePipeline, Trigger};
pub use provider::{LlmProvider, ProviderError};
