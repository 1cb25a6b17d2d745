use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};
use crate::stream::StreamEvent;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Unavailable(e.to_string())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req, false);
        debug!(model = %req.model, tools = req.tools.len(), "sending request to Ollama");

        let api_resp: ApiResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req, true);
        debug!(model = %req.model, "sending streaming request to Ollama");

        let resp = self.post(&body).await?;
        process_ollama_stream(resp, tx).await;
        Ok(())
    }
}

fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content,
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "stream": stream,
    });

    if let Some(temperature) = req.temperature {
        body["options"] = serde_json::json!({ "temperature": temperature });
    }

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    },
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let tool_calls = resp
        .message
        .tool_calls
        .into_iter()
        .map(|c| ToolCall {
            name: c.function.name,
            input: c.function.arguments,
        })
        .collect();

    let stop_reason = if resp.done {
        resp.done_reason.unwrap_or_else(|| "stop".to_string())
    } else {
        String::new()
    };

    ChatResponse {
        content: resp.message.content,
        model: resp.model,
        tokens_in: resp.prompt_eval_count.unwrap_or(0),
        tokens_out: resp.eval_count.unwrap_or(0),
        stop_reason,
        tool_calls,
    }
}

/// Byte buffer that yields complete NDJSON lines.
///
/// Network chunks may end inside a multi-byte character, so bytes are only
/// decoded once a whole line is available.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the stream has ended without a trailing newline.
    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[derive(Debug, Default)]
struct StreamTotals {
    model: String,
    tokens_in: u32,
    tokens_out: u32,
    stop_reason: String,
}

impl StreamTotals {
    /// Fold one NDJSON line in; returns the text delta it carries, if any.
    fn apply(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let chunk = match serde_json::from_str::<ApiResponse>(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(line, err = %e, "failed to parse Ollama stream chunk");
                return None;
            }
        };

        if self.model.is_empty() {
            self.model = chunk.model;
        }
        if chunk.done {
            self.tokens_in = chunk.prompt_eval_count.unwrap_or(0);
            self.tokens_out = chunk.eval_count.unwrap_or(0);
            self.stop_reason = chunk.done_reason.unwrap_or_else(|| "stop".to_string());
        }
        Some(chunk.message.content).filter(|text| !text.is_empty())
    }
}

/// Parse Ollama's newline-delimited JSON streaming format.
/// Each line is a JSON object. When `done` is true the final stats are included.
async fn process_ollama_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut totals = StreamTotals::default();
    let mut lines = LineBuffer::default();
    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        lines.push(&chunk);
        while let Some(line) = lines.next_line() {
            if let Some(text) = totals.apply(&line) {
                if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                    return; // receiver dropped
                }
            }
        }
    }

    if let Some(text) = lines.finish().and_then(|line| totals.apply(&line)) {
        if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
            return;
        }
    }

    let _ = tx
        .send(StreamEvent::Done {
            model: totals.model,
            tokens_in: totals.tokens_in,
            tokens_out: totals.tokens_out,
            stop_reason: totals.stop_reason,
        })
        .await;
}

// Ollama API response types (private — deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role, ToolDefinition};

    #[test]
    fn body_carries_temperature_and_tools() {
        let mut req = ChatRequest::new("llama3.2", vec![Message::new(Role::System, "be nice")]);
        req.temperature = Some(0.5);
        req.tools.push(ToolDefinition {
            name: "allow_response".to_string(),
            description: "decide".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        });

        let body = build_request_body(&req, false);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "allow_response");
    }

    #[test]
    fn body_omits_empty_tools_and_options() {
        let req = ChatRequest::new("m", Vec::new());
        let body = build_request_body(&req, true);
        assert!(body.get("tools").is_none());
        assert!(body.get("options").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tool_calls_are_surfaced() {
        let raw = r#"{
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "allow_response", "arguments": {"response": true}}}
                ]
            },
            "done": true,
            "prompt_eval_count": 10,
            "eval_count": 2
        }"#;
        let resp = parse_response(serde_json::from_str(raw).unwrap());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "allow_response");
        assert_eq!(resp.tool_calls[0].input["response"], true);
        assert_eq!(resp.stop_reason, "stop");
        assert_eq!(resp.tokens_in, 10);
    }

    #[test]
    fn plain_reply_has_no_tool_calls() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"hi"},"done":true}"#;
        let resp = parse_response(serde_json::from_str(raw).unwrap());
        assert_eq!(resp.content, "hi");
        assert!(resp.tool_calls.is_empty());
    }

    #[test]
    fn character_split_across_chunks_survives() {
        let line = "{\"model\":\"m\",\"message\":{\"content\":\"caf\u{e9}\"},\"done\":false}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').unwrap() + 1;

        let mut lines = LineBuffer::default();
        let mut totals = StreamTotals::default();
        lines.push(&bytes[..split]);
        assert_eq!(lines.next_line(), None);
        lines.push(&bytes[split..]);

        let text = lines.next_line().and_then(|l| totals.apply(&l));
        assert_eq!(text.as_deref(), Some("caf\u{e9}"));
        assert_eq!(totals.model, "m");
    }

    #[test]
    fn final_line_without_newline_is_read() {
        let mut lines = LineBuffer::default();
        let mut totals = StreamTotals::default();
        lines.push(br#"{"model":"m","message":{"content":"a"},"done":false}"#);
        lines.push(b"\n");
        lines.push(br#"{"model":"m","message":{"content":""},"done":true,"eval_count":3}"#);

        assert_eq!(lines.next_line().and_then(|l| totals.apply(&l)).as_deref(), Some("a"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish().and_then(|l| totals.apply(&l)), None);
        assert_eq!(totals.tokens_out, 3);
        assert_eq!(totals.stop_reason, "stop");
    }
}
