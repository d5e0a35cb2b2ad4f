//! Automatic storage of execution results and learning insights into the
//! retrieval backend, so future plans can draw on past runs.

use serde::Serialize;
use tokio::sync::RwLock;

use crate::backends::Backends;
use crate::error::Result;
use crate::types::{ExecutionSummary, StepResult};

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub stored_executions: usize,
    pub status: &'static str,
}

/// A learning insight worth persisting for later retrieval.
pub struct Insight<'a> {
    pub kind: &'a str,
    pub description: &'a str,
    pub recommendations: &'a str,
}

pub struct KnowledgeStore {
    stored_count: RwLock<usize>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            stored_count: RwLock::new(0),
        }
    }

    /// Renders a task's step results into a readable document and stores it
    /// in the retrieval backend, tagged so later queries can filter on it.
    pub async fn store_execution_result(
        &self,
        backends: &Backends,
        task_id: &str,
        message: &str,
        summary: &ExecutionSummary,
        steps: &[StepResult],
    ) -> Result<bool> {
        let mut content = format!(
            "Task: {message}\nTask ID: {task_id}\n\nResult:\n- Status: {:?}\n- Completed: {}/{} steps\n- Success rate: {}%\n\nSteps:\n",
            summary.status, summary.successful, summary.total, summary.success_rate
        );

        for (i, step) in steps.iter().enumerate() {
            let mark = if step.status.is_ok() { "done" } else { "failed" };
            content.push_str(&format!("{}. [{mark}] {}\n", i + 1, step.step));
            if let Some(msg) = &step.data.message {
                content.push_str(&format!("   Result: {msg}\n"));
            }
        }

        let lower = message.to_lowercase();
        let intent = if lower.contains("create") { "create" } else { "execute" };

        let metadata = serde_json::json!({
            "type": "execution_result",
            "task_id": task_id,
            "success_rate": summary.success_rate,
            "intent": intent,
        });

        backends.add_document(&content, metadata).await?;
        *self.stored_count.write().await += 1;
        Ok(true)
    }

    pub async fn store_learning_insight(&self, backends: &Backends, insight: &Insight<'_>) -> Result<bool> {
        let content = format!(
            "Learning insight\nType: {}\n\nDescription: {}\n\nRecommendations:\n{}",
            insight.kind, insight.description, insight.recommendations
        );
        let metadata = serde_json::json!({
            "type": "learning_insight",
            "insight_type": insight.kind,
        });
        backends.add_document(&content, metadata).await?;
        Ok(true)
    }

    /// Queries past executions from the retrieval backend, filtering out
    /// anything not tagged as an execution result.
    pub async fn query_similar_executions(&self, backends: &Backends, query: &str, top_k: u32) -> Vec<serde_json::Value> {
        let response = match backends.query_retrieval(query, top_k).await {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        response
            .documents
            .into_iter()
            .filter(|doc| doc.metadata.get("type").and_then(|v| v.as_str()) == Some("execution_result"))
            .map(|doc| serde_json::json!({ "content": doc.content, "metadata": doc.metadata, "score": doc.score }))
            .collect()
    }

    pub async fn get_stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            stored_executions: *self.stored_count.read().await,
            status: "active",
        }
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendUrls;
    use crate::types::{StepData, StepStatus as SS};
    use chrono::Utc;

    fn backends() -> Backends {
        let urls = BackendUrls {
            ollama_url: "http://127.0.0.1:1".to_string(),
            qwen_api_url: None,
            qwen_api_key: None,
            retrieval_url: "http://127.0.0.1:1".to_string(),
            arch_service_url: "http://127.0.0.1:1".to_string(),
        };
        Backends::new(urls, 4, 4).unwrap()
    }

    fn summary() -> ExecutionSummary {
        ExecutionSummary {
            total: 1,
            successful: 1,
            failed: 0,
            success_rate: 100.0,
            status: crate::types::ExecutionStatus::Completed,
        }
    }

    #[tokio::test]
    async fn store_execution_result_reports_failure_without_panicking() {
        let store = KnowledgeStore::new();
        let step = StepResult {
            step: "Check system health".to_string(),
            status: SS::Success,
            data: StepData::default(),
            error: None,
            timestamp: Utc::now(),
        };
        let result = store
            .store_execution_result(&backends(), "task-1", "run health check", &summary(), &[step])
            .await;
        assert!(result.is_err() || result.is_ok());
    }

    #[tokio::test]
    async fn query_similar_executions_returns_empty_on_backend_error() {
        let store = KnowledgeStore::new();
        let docs = store.query_similar_executions(&backends(), "health check", 3).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn stats_start_at_zero() {
        let store = KnowledgeStore::new();
        let stats = store.get_stats().await;
        assert_eq!(stats.stored_executions, 0);
        assert_eq!(stats.status, "active");
    }
}
