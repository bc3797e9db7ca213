use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::retry::{retry_when, RetryPolicy};
use crate::EnrichmentError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One chat-completion round trip, returning the raw message content.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, EnrichmentError>;
}

/// A model that answers with a JSON document.
#[async_trait]
pub trait JsonModel: Send + Sync {
    async fn request(&self, messages: Vec<ChatMessage>) -> Result<Value, EnrichmentError>;
}

#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Chat completions against an OpenAI-compatible endpoint in JSON mode.
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    settings: LlmSettings,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenAiTransport {
    pub fn new(client: Client, settings: LlmSettings) -> Self {
        Self { client, settings }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_base.trim().trim_end_matches('/')
        )
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, EnrichmentError> {
        let api_key = self.settings.api_key.trim();
        if api_key.is_empty() {
            return Err(EnrichmentError::MissingApiKey);
        }
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(self.settings.timeout)
            .json(&self.request_body(messages))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let payload = response.json::<CompletionResponse>().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(EnrichmentError::EmptyCompletion)
    }
}

/// Wraps a transport with the retry policy and JSON decoding of the reply.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn ChatTransport>,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn ChatTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }
}

#[async_trait]
impl JsonModel for LlmClient {
    async fn request(&self, messages: Vec<ChatMessage>) -> Result<Value, EnrichmentError> {
        let transport = &self.transport;
        let messages = &messages;
        let mut attempts = 0;
        let result = retry_when(
            self.policy,
            |attempt| {
                attempts = attempt;
                async move {
                    debug!(attempt, "llm.request");
                    let content = transport.complete(messages).await?;
                    parse_json_payload(&content)
                }
            },
            EnrichmentError::is_retryable,
        )
        .await;
        result.map_err(|err| EnrichmentError::Exhausted {
            attempts,
            source: Box::new(err),
        })
    }
}

/// Decodes a completion body, tolerating a surrounding markdown code fence.
pub fn parse_json_payload(content: &str) -> Result<Value, EnrichmentError> {
    let mut body = content.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use serde_json::json;

    use super::{
        parse_json_payload, ChatMessage, ChatTransport, JsonModel, LlmClient, LlmSettings,
        OpenAiTransport,
    };
    use crate::retry::RetryPolicy;
    use crate::EnrichmentError;

    struct FlakyTransport {
        failures: u32,
        status: u16,
        calls: AtomicU32,
        reply: &'static str,
    }

    impl FlakyTransport {
        fn new(failures: u32, reply: &'static str) -> Self {
            Self::with_status(failures, 429, reply)
        }

        fn with_status(failures: u32, status: u16, reply: &'static str) -> Self {
            Self {
                failures,
                status,
                calls: AtomicU32::new(0),
                reply,
            }
        }
    }

    #[async_trait]
    impl ChatTransport for FlakyTransport {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, EnrichmentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(EnrichmentError::Status {
                    status: self.status,
                    body: "upstream said no".to_string(),
                })
            } else {
                Ok(self.reply.to_string())
            }
        }
    }

    fn client(transport: Arc<FlakyTransport>) -> LlmClient {
        LlmClient::new(transport, RetryPolicy::new(3, Duration::ZERO))
    }

    #[tokio::test]
    async fn retries_until_transport_recovers() {
        let transport = Arc::new(FlakyTransport::new(2, r#"{"genre":"Jazz"}"#));
        let value = client(Arc::clone(&transport))
            .request(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(value, json!({"genre": "Jazz"}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let transport = Arc::new(FlakyTransport::new(10, "{}"));
        let err = client(Arc::clone(&transport))
            .request(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Exhausted { attempts: 3, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_json_reply_is_retried() {
        let transport = Arc::new(FlakyTransport::new(0, "sorry, I cannot help with that"));
        let err = client(Arc::clone(&transport))
            .request(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Exhausted { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let transport = Arc::new(FlakyTransport::with_status(10, 401, "{}"));
        let err = client(Arc::clone(&transport))
            .request(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Exhausted { attempts: 1, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let transport = Arc::new(FlakyTransport::with_status(2, 503, "{}"));
        let value = client(Arc::clone(&transport))
            .request(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(value, json!({}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_api_key_is_attempted_once() {
        let transport = OpenAiTransport::new(Client::new(), LlmSettings::default());
        let client = LlmClient::new(Arc::new(transport), RetryPolicy::default());
        let started = tokio::time::Instant::now();
        let err = client
            .request(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        match err {
            EnrichmentError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, EnrichmentError::MissingApiKey));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn retryable_errors() {
        let status = |status| EnrichmentError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
        assert!(status(500).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!EnrichmentError::MissingApiKey.is_retryable());
        assert!(EnrichmentError::EmptyCompletion.is_retryable());
    }

    #[test]
    fn parses_fenced_payload() {
        let value = parse_json_payload("```json\n{\"year\": 1959}\n```").unwrap();
        assert_eq!(value, json!({"year": 1959}));
    }

    #[test]
    fn request_body_uses_json_mode() {
        let transport = OpenAiTransport::new(
            Client::new(),
            LlmSettings {
                api_base: "https://llm.local/v1/".to_string(),
                ..LlmSettings::default()
            },
        );
        let messages = vec![ChatMessage::system("be terse"), ChatMessage::user("hi")];
        let body = serde_json::to_value(transport.request_body(&messages)).unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(transport.endpoint(), "https://llm.local/v1/chat/completions");
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let transport = OpenAiTransport::new(Client::new(), LlmSettings::default());
        let err = transport
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::MissingApiKey));
    }
}
