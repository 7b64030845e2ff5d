//! OpenAI-compatible HTTP provider (LM Studio, Ollama, vLLM, OpenAI).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::ModelProvider;
use super::types::{CompletionRequest, ProviderModel};
use crate::config::ProviderConfig;
use crate::errors::RagError;

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            client: Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

/// Healthy means both configured model ids appear in the provider's list.
fn models_satisfy(models: &[ProviderModel], chat_model: &str, embedding_model: &str) -> bool {
    let has = |id: &str| models.iter().any(|m| m.id == id);
    has(chat_model) && has(embedding_model)
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let models = match self.list_models().await {
            Ok(models) => models,
            Err(_) => return Ok(false),
        };

        Ok(models_satisfy(
            &models,
            &self.chat_model,
            &self.embedding_model,
        ))
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError> {
        let url = format!("{}/v1/models", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RagError::upstream)?;

        if !res.status().is_success() {
            return Err(RagError::Upstream(format!(
                "failed to list models: {}",
                res.status()
            )));
        }

        let response: ModelsResponse = res.json().await.map_err(RagError::upstream)?;
        Ok(response
            .data
            .into_iter()
            .map(|m| ProviderModel { id: m.id })
            .collect())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.top_p {
                obj.insert("top_p".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Upstream(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::upstream)?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                RagError::Upstream("chat completion response had no content".to_string())
            })?
            .to_string();

        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Upstream("embedding response was empty".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Upstream(format!(
                "embedding call failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::upstream)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != texts.len() {
            return Err(RagError::Upstream(format!(
                "embedding count mismatch: {} inputs, {} vectors",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
