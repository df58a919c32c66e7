//! Generation service: the text-completion channel used by both stages.
//!
//! `OpenAiGenerationService` talks to any OpenAI-compatible
//! `/chat/completions` endpoint. `MockGeneration` scripts replies and
//! failures for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Failure of a single generation call. Callers treat every variant alike.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("completion was empty")]
    EmptyCompletion,
}

/// One completion request: a system instruction plus one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_content: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// A text-completion backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce a completion, trimmed of surrounding whitespace.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatCompletionMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionContent,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionContent {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiGenerationService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerationService")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiGenerationService {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatCompletionMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatCompletionMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: 1.0,
        };

        debug!(
            model = %self.model,
            max_tokens = request.max_output_tokens,
            prompt_chars = request.system_instruction.len() + request.user_content.len(),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_completion(&text)
    }
}

/// Extract the first choice's content from a chat completion body.
fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(GenerationError::EmptyCompletion);
    }
    Ok(content)
}

// ---------------------------------------------------------------------------
// MockGeneration
// ---------------------------------------------------------------------------

enum MockMode {
    Reply(String),
    Fail,
    Script(VecDeque<Result<String, String>>),
}

/// Scripted generation service for tests and offline runs.
///
/// Every request is recorded and can be inspected with [`requests`].
///
/// [`requests`]: MockGeneration::requests
pub struct MockGeneration {
    mode: Mutex<MockMode>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGeneration {
    /// Always reply with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_mode(MockMode::Reply(text.into()))
    }

    /// Always fail with a transport error.
    pub fn failing() -> Self {
        Self::with_mode(MockMode::Fail)
    }

    /// Return the scripted results in order, then fail once exhausted.
    ///
    /// `Err(reason)` entries become transport errors.
    pub fn scripted(script: Vec<Result<String, String>>) -> Self {
        Self::with_mode(MockMode::Script(script.into()))
    }

    fn with_mode(mode: MockMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationService for MockGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let mut mode = self
            .mode
            .lock()
            .map_err(|e| GenerationError::Transport(format!("mock lock poisoned: {}", e)))?;

        match &mut *mode {
            MockMode::Reply(text) => Ok(text.trim().to_string()),
            MockMode::Fail => Err(GenerationError::Transport("mock failure".to_string())),
            MockMode::Script(queue) => match queue.pop_front() {
                Some(Ok(text)) => Ok(text.trim().to_string()),
                Some(Err(reason)) => Err(GenerationError::Transport(reason)),
                None => Err(GenerationError::Transport("mock script exhausted".to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_instruction: "sys".to_string(),
            user_content: "Olá".to_string(),
            max_output_tokens: 10,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_parse_completion_trims_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  9h às 18h \n"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "9h às 18h");
    }

    #[test]
    fn test_parse_completion_no_choices() {
        let body = r#"{"choices":[]}"#;
        assert!(matches!(
            parse_completion(body),
            Err(GenerationError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_parse_completion_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(matches!(
            parse_completion(body),
            Err(GenerationError::EmptyCompletion)
        ));
    }

    #[test]
    fn test_parse_completion_invalid_json() {
        assert!(matches!(
            parse_completion("<html>bad gateway</html>"),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: vec![
                ChatCompletionMessage {
                    role: "system",
                    content: "sys",
                },
                ChatCompletionMessage {
                    role: "user",
                    content: "Olá",
                },
            ],
            max_tokens: 150,
            temperature: 0.0,
            top_p: 1.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Olá");
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["top_p"], 1.0);
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let svc = OpenAiGenerationService::new(
            "http://localhost:11434/v1/",
            "m",
            "k",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(svc.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_http_error_display() {
        let err = GenerationError::Http {
            status: 429,
            body: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 429: quota");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let svc = OpenAiGenerationService::new(
            "http://127.0.0.1:9",
            "m",
            "k",
            Duration::from_millis(500),
        )
        .unwrap();
        let result = svc.generate(&request()).await;
        assert!(matches!(result, Err(GenerationError::Transport(_))));
    }

    #[tokio::test]
    async fn test_mock_replying() {
        let mock = MockGeneration::replying(" resposta ");
        assert_eq!(mock.generate(&request()).await.unwrap(), "resposta");
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockGeneration::failing();
        assert!(mock.generate(&request()).await.is_err());
        assert_eq!(mock.requests()[0].user_content, "Olá");
    }

    #[tokio::test]
    async fn test_mock_scripted_then_exhausted() {
        let mock = MockGeneration::scripted(vec![Ok("um".to_string()), Err("quota".to_string())]);
        assert_eq!(mock.generate(&request()).await.unwrap(), "um");
        assert!(mock.generate(&request()).await.is_err());
        assert!(mock.generate(&request()).await.is_err());
        assert_eq!(mock.requests().len(), 3);
    }
}
