//! HTTP plumbing shared by the embedding and chat gateways.
//!
//! Both gateways talk to an OpenAI-compatible REST API, either the public
//! OpenAI endpoint or an Azure OpenAI resource. [`ApiClient`] hides the
//! differences between the two:
//!
//! | Flavor | URL | Auth header |
//! |--------|-----|-------------|
//! | `openai` | `{base}/{operation}` (base defaults to `https://api.openai.com/v1`) | `Authorization: Bearer <key>` |
//! | `azure` | `{endpoint}/openai/deployments/{model}/{operation}?api-version={v}` | `api-key: <key>` |
//!
//! The client is built once and reused for every request.
//!
//! # Retry Strategy
//!
//! `max_retries` defaults to `0`, so a failed call is reported immediately.
//! When raised, transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ProviderConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors raised while talking to a hosted model API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
    #[error("invalid provider configuration: {0}")]
    Config(String),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
enum Flavor {
    OpenAI { base_url: String },
    Azure { endpoint: String, api_version: String },
}

/// A configured client for one hosted model (embedding model or chat model).
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    flavor: Flavor,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl ApiClient {
    /// Build a client from a provider section.
    ///
    /// `azure_key_vars` lists the environment variables consulted, in order,
    /// for the Azure API key. The OpenAI flavor always reads `OPENAI_API_KEY`.
    pub fn from_config(config: &ProviderConfig, azure_key_vars: &[&str]) -> Result<Self, ApiError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| ApiError::Config("model is required".to_string()))?;

        let (flavor, key_vars): (Flavor, Vec<&str>) = match config.provider.as_str() {
            "openai" => (
                Flavor::OpenAI {
                    base_url: config
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                },
                vec!["OPENAI_API_KEY"],
            ),
            "azure" => {
                let endpoint = config
                    .endpoint
                    .clone()
                    .ok_or_else(|| ApiError::Config("endpoint is required for azure".into()))?;
                let api_version = config
                    .api_version
                    .clone()
                    .ok_or_else(|| ApiError::Config("api_version is required for azure".into()))?;
                (
                    Flavor::Azure {
                        endpoint,
                        api_version,
                    },
                    azure_key_vars.to_vec(),
                )
            }
            other => return Err(ApiError::Config(format!("unknown provider '{}'", other))),
        };

        let api_key = key_vars
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| ApiError::MissingApiKey(key_vars.join(" or ")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            flavor,
            api_key,
            model,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full request URL for an API operation such as `embeddings`.
    pub fn url(&self, operation: &str) -> String {
        match &self.flavor {
            Flavor::OpenAI { base_url } => {
                format!("{}/{}", base_url.trim_end_matches('/'), operation)
            }
            Flavor::Azure {
                endpoint,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                endpoint.trim_end_matches('/'),
                self.model,
                operation,
                api_version
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.flavor {
            Flavor::OpenAI { .. } => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            Flavor::Azure { .. } => request.header("api-key", &self.api_key),
        }
    }

    /// POST a JSON body to `operation` and return the decoded JSON response.
    pub async fn post_json(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.url(operation);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(operation, attempt, delay_secs = delay.as_secs(), "retrying API call");
                tokio::time::sleep(delay).await;
            }

            debug!(operation, model = %self.model, "sending API request");
            let resp = self
                .authorize(self.http.post(&url))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<serde_json::Value>()
                            .await
                            .map_err(|e| ApiError::Decode(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = ApiError::Status {
                        status: status.as_u16(),
                        body: body_text,
                    };

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(ApiError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ApiError::Transport("request failed after retries".into())))
    }
}
