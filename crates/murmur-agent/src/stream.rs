use tokio::sync::mpsc;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Events emitted during a streaming LLM response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },

    /// Error during streaming.
    Error { message: String },
}

/// Run a streaming request and consume the stream to completion.
///
/// Returns only after the provider has finished and every event has been read,
/// so a caller holding the generation gate never releases it mid-stream.
pub async fn collect_stream(
    provider: &dyn LlmProvider,
    req: &ChatRequest,
) -> Result<ChatResponse, ProviderError> {
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);

    let producer = provider.send_stream(req, tx);
    let consumer = async {
        let mut resp = ChatResponse::default();
        let mut error: Option<String> = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } => resp.content.push_str(&text),
                StreamEvent::Done {
                    model,
                    tokens_in,
                    tokens_out,
                    stop_reason,
                } => {
                    resp.model = model;
                    resp.tokens_in = tokens_in;
                    resp.tokens_out = tokens_out;
                    resp.stop_reason = stop_reason;
                }
                StreamEvent::Error { message } => error = Some(message),
            }
        }
        (resp, error)
    };

    let (sent, (resp, error)) = tokio::join!(producer, consumer);
    sent?;
    match error {
        Some(message) => Err(ProviderError::Stream(message)),
        None => Ok(resp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use crate::provider::Role;
    use async_trait::async_trait;

    struct Chunked(Vec<&'static str>);

    #[async_trait]
    impl LlmProvider for Chunked {
        fn name(&self) -> &str {
            "chunked"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unreachable!("streaming only")
        }
        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            for part in &self.0 {
                let _ = tx
                    .send(StreamEvent::TextDelta {
                        text: part.to_string(),
                    })
                    .await;
            }
            let _ = tx
                .send(StreamEvent::Done {
                    model: "m".to_string(),
                    tokens_in: 3,
                    tokens_out: 5,
                    stop_reason: "stop".to_string(),
                })
                .await;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl LlmProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unreachable!("streaming only")
        }
        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            let _ = tx
                .send(StreamEvent::TextDelta {
                    text: "partial".to_string(),
                })
                .await;
            let _ = tx
                .send(StreamEvent::Error {
                    message: "connection reset".to_string(),
                })
                .await;
            Ok(())
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("m", vec![Message::new(Role::User, "hi")])
    }

    #[tokio::test]
    async fn deltas_are_joined_in_order() {
        let provider = Chunked(vec!["hel", "lo ", "there"]);
        let resp = collect_stream(&provider, &request()).await.unwrap();
        assert_eq!(resp.content, "hello there");
        assert_eq!(resp.tokens_out, 5);
        assert_eq!(resp.stop_reason, "stop");
    }

    #[tokio::test]
    async fn stream_error_event_fails_the_call() {
        let err = collect_stream(&Broken, &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Stream(ref m) if m == "connection reset"));
    }

    #[tokio::test]
    async fn default_send_stream_falls_back_to_send() {
        struct Plain;

        #[async_trait]
        impl LlmProvider for Plain {
            fn name(&self) -> &str {
                "plain"
            }
            async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
                Ok(ChatResponse {
                    content: "whole".to_string(),
                    model: req.model.clone(),
                    ..Default::default()
                })
            }
        }

        let resp = collect_stream(&Plain, &request()).await.unwrap();
        assert_eq!(resp.content, "whole");
        assert_eq!(resp.model, "m");
    }
}
