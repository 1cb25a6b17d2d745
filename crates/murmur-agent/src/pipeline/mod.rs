//! Response pipeline shared by channel adapters.
//!
//! Adapters implement the collaborator traits in `context` and call
//! `ResponsePipeline::respond`; everything between history fetch and the
//! final desanitized text happens here.

pub mod context;
pub mod process;

pub use context::{HistorySource, IdentityLookup};
pub use process::{build_conversation, operator_diagnostic, ResponsePipeline, Trigger};
