use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the Groundwork server.
///
/// Grouped into per-component settings so the composition root can hand each component
/// exactly the slice it needs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which vector index backend to open.
    pub vector_backend: VectorBackend,
    /// Qdrant connection settings.
    pub qdrant: QdrantSettings,
    /// Embedding provider settings.
    pub embedding: EmbeddingSettings,
    /// Text splitter settings.
    pub chunking: ChunkingSettings,
    /// Completion provider settings.
    pub llm: LlmSettings,
    /// Shared secret required by the full-reset endpoint. Disabled when absent.
    pub admin_token: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Vector index backends available to the composition root.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Remote Qdrant instance reached over HTTP.
    Qdrant,
    /// In-process brute-force index; contents are lost on restart.
    Memory,
}

/// Connection details for the Qdrant backend.
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub url: String,
    /// Name of the collection holding document chunks.
    pub collection_name: String,
    /// Optional API key required to access Qdrant.
    pub api_key: Option<String>,
}

/// Supported embedding backends for the ingestion and query paths.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic byte-hash embeddings, for tests and offline runs.
    Hash,
}

/// Embedding provider configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Embedding provider used to generate vector representations.
    pub provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub model: String,
    /// Dimensionality of the produced vectors.
    pub dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the OpenAI API.
    pub openai_base_url: String,
    /// API key for hosted embeddings.
    pub openai_api_key: Option<String>,
}

/// Text splitter configuration.
#[derive(Debug, Clone)]
pub struct ChunkingSettings {
    /// Upper bound per chunk, in characters (or tokens when a tokenizer is set).
    pub chunk_size: usize,
    /// Overlap carried from the tail of the previous chunk.
    pub chunk_overlap: usize,
    /// Model or encoding name; switches chunk budgets from characters to tokens.
    pub tokenizer: Option<String>,
}

/// Completion provider configuration consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Provider used when a request does not name one.
    pub default_provider: String,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Base URL of the hosted OpenAI API.
    pub openai_base_url: String,
    /// Server-side OpenAI key, used when the caller supplies none.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible backend.
    pub compat_base_url: String,
    /// Bearer for the OpenAI-compatible backend; the hosted key is never sent there.
    pub compat_api_key: Option<String>,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Whether the hosted backend uses the structured Responses shape by default.
    pub use_responses_api: bool,
    /// Per-request timeout applied by each adapter.
    pub timeout_secs: u64,
    /// Output token cap sent when a request sets none; `None` leaves it to the backend.
    pub max_output_tokens: Option<u32>,
}

const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION: &str = "docs";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_COMPAT_URL: &str = "http://127.0.0.1:8001/v1";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        let ollama_url =
            load_env_optional("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.into());
        let openai_base_url =
            load_env_optional("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.into());

        Ok(Self {
            vector_backend: load_env_optional("VECTOR_BACKEND")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("VECTOR_BACKEND".into()))
                })
                .transpose()?
                .unwrap_or(VectorBackend::Qdrant),
            qdrant: QdrantSettings {
                url: load_env_optional("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.into()),
                collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                    .unwrap_or_else(|| DEFAULT_COLLECTION.into()),
                api_key: load_env_optional("QDRANT_API_KEY"),
            },
            embedding: EmbeddingSettings {
                provider: load_env_optional("EMBEDDING_PROVIDER")
                    .map(|value| {
                        value
                            .parse()
                            .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                    })
                    .transpose()?
                    .unwrap_or(EmbeddingProvider::Ollama),
                model: load_env_optional("EMBEDDING_MODEL").unwrap_or_else(|| "bge-m3".into()),
                dimension: parse_env_or("EMBEDDING_DIMENSION", 1024)?,
                ollama_url: ollama_url.clone(),
                openai_base_url: openai_base_url.clone(),
                openai_api_key: openai_api_key.clone(),
            },
            chunking: ChunkingSettings {
                chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", 900)?,
                chunk_overlap: parse_env_or("TEXT_SPLITTER_CHUNK_OVERLAP", 150)?,
                tokenizer: load_env_optional("TEXT_SPLITTER_TOKENIZER"),
            },
            llm: LlmSettings {
                default_provider: load_env_optional("LLM_PROVIDER")
                    .unwrap_or_else(|| "ollama".into())
                    .to_lowercase(),
                default_model: load_env_optional("LLM_MODEL")
                    .unwrap_or_else(|| "llama3:latest".into()),
                openai_base_url,
                openai_api_key,
                compat_base_url: load_env_optional("LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_COMPAT_URL.into()),
                compat_api_key: load_env_optional("LLM_API_KEY"),
                ollama_url,
                use_responses_api: load_env_optional("OPENAI_USE_RESPONSES_API")
                    .map(|value| parse_flag(&value))
                    .unwrap_or(true),
                timeout_secs: parse_env_or("LLM_TIMEOUT_SECS", 120)?,
                max_output_tokens: output_token_cap(parse_env_or(
                    "LLM_MAX_OUTPUT_TOKENS",
                    DEFAULT_MAX_OUTPUT_TOKENS,
                )?),
            },
            admin_token: load_env_optional("ADMIN_TOKEN"),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Zero disables the cap.
fn output_token_cap(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        backend = ?config.vector_backend,
        qdrant_url = %config.qdrant.url,
        collection = %config.qdrant.collection_name,
        embedding_provider = ?config.embedding.provider,
        llm_provider = %config.llm.default_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_providers_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("hash".parse(), Ok(EmbeddingProvider::Hash));
        assert!("cohere".parse::<EmbeddingProvider>().is_err());
        assert_eq!("Memory".parse(), Ok(VectorBackend::Memory));
    }

    #[test]
    fn parse_flag_accepts_truthy_spellings() {
        assert!(parse_flag("1"));
        assert!(parse_flag("YES"));
        assert!(parse_flag(" true "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn output_token_cap_defaults_and_disables() {
        assert_eq!(output_token_cap(DEFAULT_MAX_OUTPUT_TOKENS), Some(1024));
        assert_eq!(output_token_cap(256), Some(256));
        assert_eq!(output_token_cap(0), None);
    }
}
