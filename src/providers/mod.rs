//! Completion provider dispatch.
//!
//! [`ProviderDispatcher`] routes one grounded message sequence to a hosted OpenAI model,
//! a remote OpenAI-compatible server, or a local Ollama instance. Every adapter accepts
//! the same [`DispatchRequest`] and returns plain text; every failure surfaces as one
//! [`DispatchError`]. Nothing is retried.

mod chat;
mod compat;
mod ollama;
mod openai;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::LlmSettings;
use crate::prompt::CompletionMessage;

/// Provider names accepted by the dispatcher.
pub const SUPPORTED_PROVIDERS: [&str; 3] = ["openai", "openai_compat", "ollama"];

/// Errors surfaced by provider dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Provider name is not one of [`SUPPORTED_PROVIDERS`].
    #[error("Unsupported provider '{0}'. Use 'openai', 'openai_compat', or 'ollama'.")]
    UnsupportedProvider(String),
    /// Hosted provider selected without an API key.
    #[error("Missing OpenAI key. Provide X-OpenAI-Key or set OPENAI_API_KEY.")]
    MissingCredential,
    /// Shared HTTP client could not be built.
    #[error("HTTP client unavailable: {0}")]
    Client(String),
    /// Backend call failed: transport, status, or body shape.
    #[error("{provider} error: {message}")]
    Upstream {
        /// Provider that failed.
        provider: ProviderKind,
        /// Backend message.
        message: String,
    },
}

impl DispatchError {
    pub(crate) fn upstream(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }
}

/// Completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Hosted OpenAI API.
    OpenAi,
    /// Remote server speaking the OpenAI chat-completions protocol.
    OpenAiCompat,
    /// Local Ollama server.
    Ollama,
}

impl ProviderKind {
    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenAiCompat => "openai_compat",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openai_compat" => Ok(Self::OpenAiCompat),
            "ollama" => Ok(Self::Ollama),
            other => Err(DispatchError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Stop sequences: a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    /// One sequence.
    One(String),
    /// Several sequences.
    Many(Vec<String>),
}

impl StopSequences {
    pub(crate) fn to_list(&self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

/// Optional sampling parameters forwarded when present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingOptions {
    /// Nucleus sampling bound.
    pub top_p: Option<f64>,
    /// Stop sequences.
    pub stop: Option<StopSequences>,
    /// Maximum output tokens.
    pub max_output_tokens: Option<u32>,
    /// Per-call choice between the Responses and chat-completions shapes (hosted only).
    pub use_responses_api: Option<bool>,
}

/// Caller-supplied credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// API key for OpenAI-protocol backends.
    pub openai_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Messages in order.
    pub messages: Vec<CompletionMessage>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Provider name; the configured default when `None`.
    pub provider: Option<String>,
    /// Model name; the configured default when `None`.
    pub model: Option<String>,
    /// Caller credentials.
    pub credentials: Credentials,
    /// Optional sampling parameters.
    pub sampling: SamplingOptions,
}

/// Seam between the pipeline and completion backends.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Send `request` to its provider and return the reply text.
    async fn dispatch(&self, request: DispatchRequest) -> Result<String, DispatchError>;
}

/// Fully resolved call handed to one adapter.
pub(crate) struct ResolvedCall<'a> {
    pub model: String,
    pub api_key: Option<String>,
    pub request: &'a DispatchRequest,
}

/// Routes requests to the configured provider adapters.
pub struct ProviderDispatcher {
    client: Client,
    settings: LlmSettings,
}

impl ProviderDispatcher {
    /// Build a dispatcher with one shared HTTP client carrying the configured timeout.
    pub fn new(settings: LlmSettings) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .user_agent("groundwork/0.1")
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| DispatchError::Client(err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn resolve_provider(&self, requested: Option<&str>) -> Result<ProviderKind, DispatchError> {
        let name = non_blank(requested).unwrap_or(&self.settings.default_provider);
        name.parse()
    }

    /// Caller key first, then the server key belonging to `provider`. The hosted OpenAI
    /// key never leaves for a compatible server.
    fn resolve_api_key(&self, provider: ProviderKind, caller: Option<&str>) -> Option<String> {
        let server_key = match provider {
            ProviderKind::OpenAi => self.settings.openai_api_key.as_deref(),
            ProviderKind::OpenAiCompat => self.settings.compat_api_key.as_deref(),
            ProviderKind::Ollama => None,
        };
        non_blank(caller)
            .or(non_blank(server_key))
            .map(str::to_string)
    }
}

#[async_trait]
impl Dispatch for ProviderDispatcher {
    async fn dispatch(&self, mut request: DispatchRequest) -> Result<String, DispatchError> {
        let provider = self.resolve_provider(request.provider.as_deref())?;
        if request.sampling.max_output_tokens.is_none() {
            request.sampling.max_output_tokens = self.settings.max_output_tokens;
        }
        let model = non_blank(request.model.as_deref())
            .unwrap_or(&self.settings.default_model)
            .to_string();
        let api_key =
            self.resolve_api_key(provider, request.credentials.openai_api_key.as_deref());

        tracing::debug!(
            provider = %provider,
            model = %model,
            messages = request.messages.len(),
            has_key = api_key.is_some(),
            "Dispatching completion"
        );

        let call = ResolvedCall {
            model,
            api_key,
            request: &request,
        };
        let result = match provider {
            ProviderKind::OpenAi => openai::complete(&self.client, &self.settings, call).await,
            ProviderKind::OpenAiCompat => {
                compat::complete(&self.client, &self.settings, call).await
            }
            ProviderKind::Ollama => ollama::complete(&self.client, &self.settings, call).await,
        };

        if let Err(error) = &result {
            tracing::warn!(provider = %provider, error = %error, "Completion failed");
        }
        result
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// POST a JSON body and return the parsed JSON reply, mapping every failure to
/// [`DispatchError::Upstream`].
pub(crate) async fn post_json(
    client: &Client,
    provider: ProviderKind,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Result<Value, DispatchError> {
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|err| DispatchError::upstream(provider, err.to_string()))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| DispatchError::upstream(provider, err.to_string()))?;
    if !status.is_success() {
        return Err(DispatchError::upstream(provider, map_http_error(status, &text)));
    }
    serde_json::from_str(&text)
        .map_err(|err| DispatchError::upstream(provider, format!("malformed response body: {err}")))
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message").or(Some(error)))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    format!("HTTP {}: {}", status.as_u16(), detail)
}

pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings(base: &str) -> LlmSettings {
        LlmSettings {
            default_provider: "ollama".into(),
            default_model: "llama3:latest".into(),
            openai_base_url: base.into(),
            openai_api_key: None,
            compat_base_url: base.into(),
            compat_api_key: None,
            ollama_url: base.into(),
            use_responses_api: true,
            timeout_secs: 5,
            max_output_tokens: None,
        }
    }

    pub(crate) fn request(provider: &str) -> DispatchRequest {
        DispatchRequest {
            messages: vec![
                CompletionMessage::system("rules"),
                CompletionMessage::user("question"),
            ],
            temperature: 0.2,
            provider: Some(provider.into()),
            model: Some("m1".into()),
            credentials: Credentials::default(),
            sampling: SamplingOptions::default(),
        }
    }

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!("OpenAI".parse::<ProviderKind>().ok(), Some(ProviderKind::OpenAi));
        assert_eq!(
            " openai_compat ".parse::<ProviderKind>().ok(),
            Some(ProviderKind::OpenAiCompat)
        );
        assert_eq!("OLLAMA".parse::<ProviderKind>().ok(), Some(ProviderKind::Ollama));
    }

    #[tokio::test]
    async fn unknown_provider_names_the_supported_set() {
        let dispatcher = ProviderDispatcher::new(settings("http://127.0.0.1:9")).expect("dispatcher");
        let err = dispatcher
            .dispatch(request("unknown"))
            .await
            .expect_err("unsupported");
        assert!(matches!(err, DispatchError::UnsupportedProvider(ref name) if name == "unknown"));
        let message = err.to_string();
        for name in SUPPORTED_PROVIDERS {
            assert!(message.contains(name));
        }
    }

    #[tokio::test]
    async fn hosted_provider_without_key_fails_before_network() {
        let dispatcher = ProviderDispatcher::new(settings("http://127.0.0.1:9")).expect("dispatcher");
        let err = dispatcher
            .dispatch(request("openai"))
            .await
            .expect_err("missing key");
        assert!(matches!(err, DispatchError::MissingCredential));
    }

    #[test]
    fn http_errors_prefer_backend_message() {
        let message = map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"bad key"}}"#,
        );
        assert_eq!(message, "HTTP 401: bad key");
        assert_eq!(
            map_http_error(reqwest::StatusCode::BAD_GATEWAY, "oops"),
            "HTTP 502: oops"
        );
    }

    #[test]
    fn stop_sequences_accept_string_or_list() {
        let one: StopSequences = serde_json::from_str("\"END\"").expect("one");
        let many: StopSequences = serde_json::from_str("[\"a\",\"b\"]").expect("many");
        assert_eq!(one.to_list(), vec!["END"]);
        assert_eq!(many.to_list(), vec!["a", "b"]);
    }
}
