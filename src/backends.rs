//! Thin HTTP/JSON adapters over the three backend services the orchestrator
//! collaborates with: retrieval, inference, and architecture-mutation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BackendUrls;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    #[serde(default)]
    pub documents: Vec<RetrievedDocument>,
    #[serde(default)]
    pub total_results: u32,
    #[serde(default)]
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchProposeResponse {
    pub change_id: String,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub safe: bool,
    #[serde(default)]
    pub safety_checks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchApplyResponse {
    pub rollback_id: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Backend HTTP client pool. One `reqwest::Client` shared across every call,
/// matching the concurrency model's connection-pooling contract.
pub struct Backends {
    http: reqwest::Client,
    urls: BackendUrls,
}

impl Backends {
    pub fn new(urls: BackendUrls, max_idle: usize, max_idle_per_host: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(max_idle_per_host)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .map_err(|e| OrchestratorError::Config(format!("failed to build http client: {e}")))?;
        let _ = max_idle; // reqwest exposes per-host idle limits only
        Ok(Self { http, urls })
    }

    pub async fn health_check(&self, service: &str) -> Result<Value> {
        let url = match service {
            "rag" => format!("{}/health", self.urls.retrieval_url),
            "arch" => format!("{}/health", self.urls.arch_service_url),
            "ollama" => format!("{}/api/tags", self.urls.ollama_url),
            other => return Err(OrchestratorError::Validation(format!("unknown service '{other}'"))),
        };
        let resp = self
            .http
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| OrchestratorError::backend(service, e))?;
        resp.json::<Value>()
            .await
            .map_err(|e| OrchestratorError::backend(service, e))
    }

    pub async fn aggregate_health(&self) -> serde_json::Map<String, Value> {
        let mut health = serde_json::Map::new();
        for service in ["rag", "arch", "ollama"] {
            let status = match self.health_check(service).await {
                Ok(_) => "healthy",
                Err(_) => "unhealthy",
            };
            health.insert(service.to_string(), Value::String(status.to_string()));
        }
        health
    }

    pub async fn query_retrieval(&self, query: &str, top_k: u32) -> Result<RetrievalResponse> {
        let resp = self
            .http
            .post(format!("{}/query", self.urls.retrieval_url))
            .json(&serde_json::json!({ "query": query, "top_k": top_k }))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| OrchestratorError::backend("rag", e))?;
        resp.json::<RetrievalResponse>()
            .await
            .map_err(|e| OrchestratorError::backend("rag", e))
    }

    pub async fn add_document(&self, content: &str, metadata: Value) -> Result<()> {
        self.http
            .post(format!("{}/add", self.urls.retrieval_url))
            .json(&serde_json::json!({ "content": content, "metadata": metadata }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| OrchestratorError::backend("rag", e))?;
        Ok(())
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/api/generate", self.urls.ollama_url))
            .json(&serde_json::json!({
                "model": "llama2",
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": 0.7, "num_predict": 512 }
            }))
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| OrchestratorError::backend("ollama", e))?;
        let body: Value = resp.json().await.map_err(|e| OrchestratorError::backend("ollama", e))?;
        Ok(body.get("response").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    pub async fn arch_propose(&self, prompt: &str) -> Result<ArchProposeResponse> {
        let resp = self
            .http
            .post(format!("{}/arch/propose", self.urls.arch_service_url))
            .json(&serde_json::json!({ "prompt": prompt, "auto_apply": false }))
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| OrchestratorError::backend("arch", e))?;
        resp.json::<ArchProposeResponse>()
            .await
            .map_err(|e| OrchestratorError::backend("arch", e))
    }

    pub async fn arch_apply(&self, change_id: &str) -> Result<ArchApplyResponse> {
        let resp = self
            .http
            .post(format!("{}/arch/apply", self.urls.arch_service_url))
            .json(&serde_json::json!({ "change_id": change_id, "confirm": true }))
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| OrchestratorError::backend("arch", e))?;
        resp.json::<ArchApplyResponse>()
            .await
            .map_err(|e| OrchestratorError::backend("arch", e))
    }
}
