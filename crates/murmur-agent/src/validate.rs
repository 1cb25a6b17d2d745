//! Anti-parroting loop: generate a candidate, ask the model to approve it
//! through a single tool call, retry on denial.
//!
//! The decision is fail-closed: anything other than a well-formed
//! `allow_response` call with a boolean `response` argument counts as deny.

use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::gate::GenerationGate;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolDefinition};
use crate::stream::collect_stream;

/// Generation attempts before giving up.
pub const MAX_ATTEMPTS: usize = 10;

/// Sent instead of any denied candidate once all attempts are used.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I couldn't generate a suitable response after multiple attempts.";

pub const DECISION_TOOL: &str = "allow_response";
const DECISION_ARG: &str = "response";

const VALIDATOR_INSTRUCTIONS: &str = "The user is going to give you a conversation and a proposed response. \
Use your \"allow_response\" tool to allow or deny the message. Deny the message if it is a copy of \
another message in the conversation, otherwise allow it. Do not be too strict. Never respond in text, \
always use the \"allow_response\" tool.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Allow,
    Deny,
}

/// Model settings for the generation call.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub stream: bool,
}

/// Result of a gated generate-validate cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub content: String,
    /// Generation calls made.
    pub attempts: usize,
    /// False when every candidate was denied and the fallback was used.
    pub accepted: bool,
}

/// The single tool the validator may answer with.
pub fn decision_tool() -> ToolDefinition {
    ToolDefinition {
        name: DECISION_TOOL.to_string(),
        description: "allow or disallow the response".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                DECISION_ARG: {
                    "type": "boolean",
                    "description": "whether to allow the response or not",
                }
            },
            "required": [DECISION_ARG],
        }),
    }
}

/// Build the validator request for `candidate`.
pub fn validation_request(model: &str, conversation: &Conversation, candidate: &str) -> ChatRequest {
    let messages = vec![
        Message::new(Role::System, VALIDATOR_INSTRUCTIONS),
        Message::new(
            Role::User,
            format!(
                "Conversation: {}\n\nProposed Response: {}",
                conversation.transcript(),
                candidate
            ),
        ),
    ];
    let mut req = ChatRequest::new(model, messages);
    req.tools = vec![decision_tool()];
    req
}

/// Read the decision from a validator response.
pub fn parse_decision(resp: &ChatResponse) -> ValidationOutcome {
    let Some(call) = resp.tool_calls.iter().find(|c| c.name == DECISION_TOOL) else {
        debug!(tool_calls = resp.tool_calls.len(), "no decision tool call, denying");
        return ValidationOutcome::Deny;
    };

    // Some models send the arguments as a JSON-encoded string.
    let input = match &call.input {
        serde_json::Value::String(s) => serde_json::from_str(s).unwrap_or(serde_json::Value::Null),
        other => other.clone(),
    };

    let allowed = match input.get(DECISION_ARG) {
        Some(serde_json::Value::Bool(b)) => Some(*b),
        Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("true") => Some(true),
        Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    };

    match allowed {
        Some(true) => ValidationOutcome::Allow,
        Some(false) => ValidationOutcome::Deny,
        None => {
            warn!(input = %call.input, "malformed decision argument, denying");
            ValidationOutcome::Deny
        }
    }
}

/// Ask the model whether `candidate` may be sent.
pub async fn validate(
    provider: &dyn LlmProvider,
    model: &str,
    conversation: &Conversation,
    candidate: &str,
) -> Result<ValidationOutcome, ProviderError> {
    let req = validation_request(model, conversation, candidate);
    let resp = provider.send(&req).await?;
    Ok(parse_decision(&resp))
}

async fn generate_once(
    provider: &dyn LlmProvider,
    settings: &GenerationSettings,
    conversation: &Conversation,
) -> Result<String, ProviderError> {
    let mut req = ChatRequest::new(settings.model.clone(), conversation.to_messages());
    req.temperature = Some(settings.temperature);

    let resp = if settings.stream {
        collect_stream(provider, &req).await?
    } else {
        provider.send(&req).await?
    };
    Ok(resp.content)
}

/// Run the gated generate-validate loop.
///
/// Returns the first allowed candidate, or [`FALLBACK_MESSAGE`] after
/// [`MAX_ATTEMPTS`] denials. Provider errors end the loop immediately.
pub async fn generate_validated(
    provider: &dyn LlmProvider,
    gate: &GenerationGate,
    settings: &GenerationSettings,
    conversation: &Conversation,
) -> Result<Generated, ProviderError> {
    gate.run(async {
        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = generate_once(provider, settings, conversation).await?;
            debug!(attempt, len = candidate.len(), "candidate generated");

            match validate(provider, &settings.model, conversation, &candidate).await? {
                ValidationOutcome::Allow => {
                    info!(attempt, provider = %provider.name(), "candidate accepted");
                    return Ok(Generated {
                        content: candidate,
                        attempts: attempt,
                        accepted: true,
                    });
                }
                ValidationOutcome::Deny => {
                    info!(attempt, "candidate denied");
                }
            }
        }

        warn!(attempts = MAX_ATTEMPTS, "every candidate denied, using fallback");
        Ok(Generated {
            content: FALLBACK_MESSAGE.to_string(),
            attempts: MAX_ATTEMPTS,
            accepted: false,
        })
    })
    .await
}
