//! Chat-completion gateway.
//!
//! [`ChatProvider::try_complete`] returns a typed result; the provided
//! [`ChatProvider::complete`] fails closed and turns any error into the
//! visible reply `"Error: <detail>"`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::models::ChatMessage;
use crate::openai::{ApiClient, ApiError};

/// Environment variables holding the Azure chat key, in lookup order.
const AZURE_CHAT_KEY_VARS: &[&str] = &["AZURE_OPENAI_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("chat provider is disabled")]
    Disabled,
    #[error("chat request failed: {0}")]
    Api(#[from] ApiError),
    #[error("invalid chat response: {0}")]
    InvalidResponse(String),
}

/// Reply text shown in place of a failed completion.
pub fn failure_reply(err: &CompletionError) -> String {
    format!("Error: {}", err)
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// One completion call; returns the first choice's text.
    async fn try_complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;

    async fn complete(&self, messages: &[ChatMessage]) -> String {
        match self.try_complete(messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "chat completion failed");
                failure_reply(&e)
            }
        }
    }
}

/// Used when `chat.provider = "disabled"`.
pub struct DisabledChatProvider;

#[async_trait]
impl ChatProvider for DisabledChatProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn try_complete(&self, _messages: &[ChatMessage]) -> Result<String, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

/// Chat provider for the OpenAI or Azure OpenAI chat-completions API.
pub struct OpenAIChatProvider {
    client: ApiClient,
    temperature: f32,
}

impl OpenAIChatProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            client: ApiClient::from_config(config, AZURE_CHAT_KEY_VARS)?,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    fn model_name(&self) -> &str {
        self.client.model()
    }

    async fn try_complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.client.model(),
            "messages": messages,
            "temperature": self.temperature,
        });
        let json = self.client.post_json("chat/completions", &body).await?;
        parse_first_choice(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_first_choice(json: &serde_json::Value) -> Result<String, CompletionError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| CompletionError::InvalidResponse("missing choices[0].message.content".into()))
}

pub fn create_chat_provider(
    config: &ProviderConfig,
) -> Result<Arc<dyn ChatProvider>, CompletionError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatProvider)),
        _ => Ok(Arc::new(OpenAIChatProvider::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_first_choice() {
        let resp = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        });
        assert_eq!(parse_first_choice(&resp).unwrap(), "first");
    }

    #[test]
    fn test_parse_missing_choice() {
        let err = parse_first_choice(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_disabled_provider_fails_closed() {
        let provider = create_chat_provider(&ProviderConfig::default()).unwrap();
        let messages = [ChatMessage::user("hello")];
        assert!(matches!(
            provider.try_complete(&messages).await,
            Err(CompletionError::Disabled)
        ));
        assert_eq!(
            provider.complete(&messages).await,
            "Error: chat provider is disabled"
        );
    }

    #[test]
    fn test_messages_serialize_as_role_content() {
        let value = serde_json::to_value([ChatMessage::system("ctx"), ChatMessage::user("q")])
            .unwrap();
        assert_eq!(
            value,
            json!([
                {"role": "system", "content": "ctx"},
                {"role": "user", "content": "q"}
            ])
        );
    }
}
