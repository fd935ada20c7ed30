//! OpenRouter connector
//!
//! Speaks the OpenAI chat completions wire format, which OpenRouter exposes
//! for every model it hosts. All three backend kinds go through here and
//! differ only in their model identifier.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::types::Message;

use super::{Connector, ConnectorKind, ConnectorSettings};

/// OpenRouter-backed connector for one model
pub struct OpenRouterConnector {
    client: Client,
    kind: ConnectorKind,
    api_key: String,
    model: String,
    url: String,
}

impl std::fmt::Debug for OpenRouterConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConnector")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("url", &self.url)
            .finish()
    }
}

impl OpenRouterConnector {
    pub fn new(client: Client, settings: ConnectorSettings) -> Self {
        Self {
            client,
            kind: settings.kind,
            api_key: settings.api_key,
            model: settings.model,
            url: settings.url,
        }
    }

    fn build_request<'a>(
        &'a self,
        history: &'a [Message],
        session_hint: Option<&'a str>,
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: history
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            // OpenRouter tracks end users through the `user` field
            user: session_hint,
        }
    }

    /// Pull the reply text out of a completion response
    fn extract_reply(resp: CompletionResponse) -> Result<String, ProviderError> {
        if let Some(err) = resp.error {
            let status = err
                .code
                .as_ref()
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok());
            return Err(ProviderError::new(status, err.message));
        }

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::transport("completion response had no choices"))?;

        choice
            .message
            .content
            .ok_or_else(|| ProviderError::transport("completion response had no message content"))
    }
}

#[async_trait]
impl Connector for OpenRouterConnector {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        history: &[Message],
        session_hint: Option<&str>,
    ) -> Result<String, ProviderError> {
        let body = self.build_request(history, session_hint);

        debug!(
            "{} request: model={}, messages={}",
            self.kind.display_name(),
            self.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::transport(format!(
                    "Failed to send request to {} API: {}",
                    self.kind.display_name(),
                    e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::new(Some(status.as_u16()), error_text));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            ProviderError::transport(format!(
                "Failed to parse {} API response: {}",
                self.kind.display_name(),
                e
            ))
        })?;

        debug!(
            "{} response: choices={}",
            self.kind.display_name(),
            completion.choices.len()
        );

        Self::extract_reply(completion)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: String,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<CompletionError>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionError {
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector_for(server: &MockServer, kind: ConnectorKind) -> OpenRouterConnector {
        let settings = ConnectorSettings::new(kind, "sk-or-test")
            .with_url(format!("{}/api/v1/chat/completions", server.uri()));
        OpenRouterConnector::new(Client::new(), settings)
    }

    fn completion(content: &str) -> Value {
        serde_json::json!({
            "id": "gen-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn test_build_request_with_hint() {
        let connector = OpenRouterConnector::new(
            Client::new(),
            ConnectorSettings::new(ConnectorKind::Qwen, "k"),
        );
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let body = serde_json::to_value(connector.build_request(&history, Some("sess-1"))).unwrap();
        assert_eq!(body["model"], "qwen/qwen3-coder:free");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["user"], "sess-1");
    }

    #[test]
    fn test_build_request_without_hint_omits_user() {
        let connector = OpenRouterConnector::new(
            Client::new(),
            ConnectorSettings::new(ConnectorKind::Mistral, "k"),
        );
        let body = serde_json::to_value(connector.build_request(&[], None)).unwrap();
        assert!(body.get("user").is_none());
    }

    #[test]
    fn test_extract_reply_no_choices() {
        let resp: CompletionResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        let err = OpenRouterConnector::extract_reply(resp).unwrap_err();
        assert!(err.message.contains("no choices"));
    }

    #[test]
    fn test_extract_reply_embedded_error() {
        let resp: CompletionResponse = serde_json::from_value(serde_json::json!({
            "error": {"message": "Rate limit exceeded", "code": 429}
        }))
        .unwrap();
        let err = OpenRouterConnector::extract_reply(resp).unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, "Rate limit exceeded");
    }

    #[test]
    fn test_debug_hides_key() {
        let connector = OpenRouterConnector::new(
            Client::new(),
            ConnectorSettings::new(ConnectorKind::DeepSeek, "sk-or-secret-key"),
        );
        let debug = format!("{:?}", connector);
        assert!(!debug.contains("sk-or-secret-key"));
        assert!(debug.contains("DeepSeek"));
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-or-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "deepseek/deepseek-r1:free",
                "user": "sess-42",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hi there!")))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector_for(&server, ConnectorKind::DeepSeek);
        let reply = connector
            .chat(&[Message::user("hello")], Some("sess-42"))
            .await
            .unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn test_chat_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("No auth credentials found"))
            .mount(&server)
            .await;

        let connector = connector_for(&server, ConnectorKind::Qwen);
        let err = connector.chat(&[Message::user("hi")], None).await.unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "No auth credentials found");
    }

    #[tokio::test]
    async fn test_chat_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let connector = connector_for(&server, ConnectorKind::Mistral);
        let err = connector.chat(&[Message::user("hi")], None).await.unwrap_err();
        assert!(err.status.is_none());
        assert!(err.message.contains("Failed to parse Mistral API response"));
    }

    #[tokio::test]
    async fn test_chat_network_error() {
        let settings = ConnectorSettings::new(ConnectorKind::Qwen, "k")
            .with_url("http://127.0.0.1:1/v1/chat/completions");
        let connector = OpenRouterConnector::new(Client::new(), settings);
        let err = connector.chat(&[Message::user("hi")], None).await.unwrap_err();
        assert!(err.status.is_none());
        assert!(err.message.contains("Failed to send request to Qwen API"));
    }
}
