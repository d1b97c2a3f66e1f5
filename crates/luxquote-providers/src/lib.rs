//! Service clients for the quotation pipeline.
//!
//! Two capabilities, each behind a trait: text generation and text
//! embedding. Each trait has a live OpenAI-compatible HTTP implementation
//! and a deterministic offline stub. Which one runs is decided once at
//! process start from the environment (no API key selects the stubs);
//! call sites never branch on backend.

pub mod http;
pub mod stub;

use async_trait::async_trait;
use std::sync::Arc;

pub use http::{HttpEmbeddingClient, HttpGenerationClient};
pub use stub::{StubGeneration, TokenHashEmbedder};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBED_DIM: usize = 256;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

// ============================================================================
// Provider interface
// ============================================================================

/// A single generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Text generation service.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// Text embedding service with a fixed per-deployment dimensionality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn dimension(&self) -> usize;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("network error: {0}")]
    Network(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Provider configuration loaded from the environment once at startup.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Absent key selects the deterministic stub backend.
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub generation_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBED_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBED_DIM,
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            embedding_timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ProviderConfig {
    /// Loads from `LUXQUOTE_*` environment variables, defaulting anything
    /// unset. Malformed numeric values warn and fall back to defaults.
    pub fn from_env() -> Self {
        Self {
            api_key: env_nonempty("LUXQUOTE_API_KEY"),
            base_url: env_nonempty("LUXQUOTE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chat_model: env_nonempty("LUXQUOTE_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: env_nonempty("LUXQUOTE_EMBED_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            embedding_dim: env_clamped("LUXQUOTE_EMBED_DIM", DEFAULT_EMBED_DIM as u64, 16, 4096)
                as usize,
            generation_timeout_secs: env_clamped(
                "LUXQUOTE_GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
                1,
                600,
            ),
            embedding_timeout_secs: env_clamped(
                "LUXQUOTE_EMBEDDING_TIMEOUT_SECS",
                DEFAULT_EMBEDDING_TIMEOUT_SECS,
                1,
                600,
            ),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn backend(&self) -> Backend {
        if self.api_key.is_some() {
            Backend::Http
        } else {
            Backend::Stub
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Http,
    Stub,
}

fn env_nonempty(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_clamped(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_nonempty(name) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(parsed) => parsed.clamp(min, max),
            Err(_) => {
                tracing::warn!(%name, value = %raw, "ignoring unparseable integer, using default");
                default
            }
        },
        None => default,
    }
}

// ============================================================================
// Backend selection
// ============================================================================

/// The generation and embedding providers the process runs with.
#[derive(Clone)]
pub struct ProviderSet {
    pub generation: Arc<dyn GenerationProvider>,
    pub embedding: Arc<dyn EmbeddingProvider>,
}

impl ProviderSet {
    /// Builds both providers for the configured backend. Called once at
    /// startup; the choice never changes afterwards.
    pub fn from_config(config: &ProviderConfig) -> Self {
        match config.backend() {
            Backend::Http => {
                tracing::info!(
                    base_url = %config.base_url,
                    chat_model = %config.chat_model,
                    embedding_model = %config.embedding_model,
                    "using live service providers"
                );
                Self {
                    generation: Arc::new(HttpGenerationClient::new(config)),
                    embedding: Arc::new(HttpEmbeddingClient::new(config)),
                }
            }
            Backend::Stub => {
                tracing::info!(
                    dimension = config.embedding_dim,
                    "no API key configured, using deterministic stub providers"
                );
                Self {
                    generation: Arc::new(StubGeneration),
                    embedding: Arc::new(TokenHashEmbedder::new(config.embedding_dim)),
                }
            }
        }
    }
}
