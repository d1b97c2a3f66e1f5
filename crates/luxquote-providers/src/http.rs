//! OpenAI-compatible HTTP clients for generation and embeddings.

use crate::{
    CompletionRequest, EmbeddingProvider, GenerationProvider, ProviderConfig, ProviderError,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl HttpGenerationClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.generation_timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.chat_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {error_text}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        extract_message_content(&data).ok_or_else(|| {
            ProviderError::InvalidResponse("no message content in completion".to_string())
        })
    }
}

/// Chat content arrives either as a plain string or as a list of typed
/// parts; join the text parts in the latter case.
fn extract_message_content(data: &Value) -> Option<String> {
    match &data["choices"][0]["message"]["content"] {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("");
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        _ => None,
    }
}

pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.embedding_timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dim,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {error_text}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let vector: Vec<f32> = data["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| ProviderError::InvalidResponse("missing embedding array".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "empty embedding vector".to_string(),
            ));
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
