//! Dispatches plan steps to backend calls by keyword-matching the step text,
//! threads successful-step data forward, and guards against runaway plans.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::backends::Backends;
use crate::circuit_breaker::CircuitBreaker;
use crate::decomposer::SAFE_ZONES;
use crate::error::OrchestratorError;
use crate::metrics::MetricsStore;
use crate::types::{ExecutionSummary, StepData, StepResult, StepStatus};

pub const MAX_STEPS_PER_TASK: usize = 50;

/// Patterns refused in generated artifacts regardless of safe-zone status.
const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf",
    "del /f",
    "format c:",
    "drop database",
    "delete from",
    "__import__(\"os\").system",
    "eval(",
    "exec(",
    "subprocess.call",
];

fn is_safe_zone(path: &str) -> bool {
    let lower = path.to_lowercase();
    SAFE_ZONES.iter().any(|zone| lower.starts_with(zone) || lower.contains(zone))
}

fn contains_dangerous_code(code: &str) -> bool {
    let lower = code.to_lowercase();
    DANGEROUS_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Strips a markdown code fence from a model response, matching the
/// inference backend's tendency to wrap generated code in ``` blocks.
fn strip_code_fence(code: &str) -> String {
    if let Some(start) = code.find("```") {
        let rest = &code[start + 3..];
        if let Some(end) = rest.find("```") {
            let mut body = &rest[..end];
            for lang in ["python", "py", "rust", "rs"] {
                if let Some(stripped) = body.strip_prefix(lang) {
                    body = stripped;
                    break;
                }
            }
            return body.trim().to_string();
        }
    }
    code.trim().to_string()
}

/// Shares its backend client, circuit breaker, and metrics store with the
/// rest of the orchestrator container rather than owning private copies.
pub struct ExecutionEngine {
    backends: Arc<Backends>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsStore>,
}

impl ExecutionEngine {
    pub fn new(backends: Arc<Backends>, breaker: Arc<CircuitBreaker>, metrics: Arc<MetricsStore>) -> Self {
        Self { backends, breaker, metrics }
    }

    /// Runs every step in order, threading `StepData` forward and stopping
    /// early if a step whose text mentions "critical" fails.
    pub async fn execute_task(&self, steps: &[String], mut context: StepData) -> Vec<StepResult> {
        if steps.len() > MAX_STEPS_PER_TASK {
            return vec![StepResult {
                step: "plan".to_string(),
                status: StepStatus::Failed,
                data: StepData::default(),
                error: Some(format!(
                    "plan has {} steps, exceeding the {MAX_STEPS_PER_TASK}-step limit",
                    steps.len()
                )),
                timestamp: Utc::now(),
            }];
        }

        let mut results = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if i >= MAX_STEPS_PER_TASK {
                results.push(StepResult {
                    step: step.clone(),
                    status: StepStatus::Failed,
                    data: StepData::default(),
                    error: Some("LOOP_PROTECTION: step count exceeded mid-execution".to_string()),
                    timestamp: Utc::now(),
                });
                break;
            }

            let result = self.execute_step(step, &context).await;
            result.data.merge_into(&mut context);

            let should_halt = result.status == StepStatus::Failed && step.to_lowercase().contains("critical");
            results.push(result);
            if should_halt {
                warn!(step, "critical step failed, halting remaining plan");
                break;
            }
        }
        results
    }

    pub fn execution_summary(&self, results: &[StepResult]) -> ExecutionSummary {
        ExecutionSummary::from_results(results)
    }

    /// Dispatches a single step by keyword precedence. Mirrors the numbered
    /// branches of the original dispatch table.
    pub fn execute_step<'a>(
        &'a self,
        step: &'a str,
        context: &'a StepData,
    ) -> Pin<Box<dyn Future<Output = StepResult> + Send + 'a>> {
        Box::pin(async move {
            let lower = step.to_lowercase();
            let started = Utc::now();

            let outcome = if (lower.contains("file") || lower.contains("folder")) && lower.contains("creat") {
                self.run_create_artifact(&lower, context).await
            } else if lower.contains("code") && (lower.contains("analy") || lower.contains("design") || lower.contains("generat") || lower.contains("valid")) {
                self.run_code_generation_step(&lower, step, context).await
            } else if lower.contains("health") {
                self.run_health_check(&lower).await
            } else if lower.contains("metric") || lower.contains("measure") {
                self.run_metrics_step(&lower).await
            } else if lower.contains("analy") {
                self.run_analysis_step(&lower).await
            } else if lower.contains("generat") && lower.contains("config") {
                self.run_generate_config(step).await
            } else if lower.contains("valid") && lower.contains("safety") {
                self.run_validate_safety(context).await
            } else if lower.contains("apply") {
                self.run_apply(context).await
            } else if lower.contains("backup") {
                self.run_backup().await
            } else if lower.contains("verify") {
                return self.run_verify(step, &lower, context).await;
            } else if lower.contains("optimize") || lower.contains("improve") {
                self.run_optimize().await
            } else if lower.contains("search") || lower.contains("find") {
                self.run_search(step).await
            } else {
                Ok(StepData {
                    message: Some(format!("Completed: {step}")),
                    ..Default::default()
                })
            };

            match outcome {
                Ok(data) => StepResult {
                    step: step.to_string(),
                    status: StepStatus::Completed,
                    data,
                    error: None,
                    timestamp: started,
                },
                Err(err) => StepResult {
                    step: step.to_string(),
                    status: StepStatus::Failed,
                    data: StepData::default(),
                    error: Some(err.to_string()),
                    timestamp: started,
                },
            }
        })
    }

    /// Folder/file creation, gated on the target living in a safe zone.
    /// Grounded on the code generator's `is_safe_zone`/`create_file`/
    /// `create_folder` trio: refuse outside the safe zones, otherwise write.
    async fn run_create_artifact(&self, lower: &str, context: &StepData) -> crate::error::Result<StepData> {
        let path = context.target_path.clone().unwrap_or_else(|| "playground/generated_output.txt".to_string());
        if !is_safe_zone(&path) {
            return Err(OrchestratorError::Validation(format!(
                "path '{path}' is not in a safe zone (allowed: {})",
                SAFE_ZONES.join(", ")
            )));
        }

        if lower.contains("folder") && !lower.contains("file") {
            tokio::fs::create_dir_all(&path).await?;
            return Ok(StepData {
                target_path: Some(path.clone()),
                message: Some(format!("folder created at {path}")),
                ..Default::default()
            });
        }

        let content = context.generated_code.clone().unwrap_or_default();
        if contains_dangerous_code(&content) {
            return Err(OrchestratorError::Validation(
                "generated content contains a dangerous pattern and was not written".to_string(),
            ));
        }
        if let Some(parent) = Path::new(&path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;

        Ok(StepData {
            target_path: Some(path.clone()),
            message: Some(format!("file created at {path} ({} bytes)", content.len())),
            ..Default::default()
        })
    }

    /// The analyze/design/generate/validate sub-steps of the code-generation
    /// workflow. "generate" calls the inference backend; the rest are
    /// descriptive or check the context threaded by the "generate" step.
    async fn run_code_generation_step(&self, lower: &str, step: &str, context: &StepData) -> crate::error::Result<StepData> {
        // "validate generated code" contains "generat" too, so the validation
        // check must run before the generation check.
        if lower.contains("valid") {
            match &context.generated_code {
                Some(code) if contains_dangerous_code(code) => Err(OrchestratorError::Validation(
                    "generated code contains a dangerous pattern".to_string(),
                )),
                Some(_) => Ok(StepData {
                    message: Some("generated code passed validation".to_string()),
                    ..Default::default()
                }),
                None => Ok(StepData {
                    message: Some("no generated code to validate".to_string()),
                    ..Default::default()
                }),
            }
        } else if lower.contains("generat") {
            let topic = context
                .request_text
                .as_deref()
                .and_then(|text| text.split('.').next())
                .unwrap_or("a simple program")
                .trim()
                .to_string();
            let prompt = format!("Write a simple python {topic}. Keep it minimal and functional.");
            let response = self.breaker.call("ollama", || self.backends.generate(&prompt)).await?;
            let code = strip_code_fence(&response);
            Ok(StepData {
                generated_code: Some(code),
                message: Some("code generated".to_string()),
                ..Default::default()
            })
        } else if lower.contains("design") {
            Ok(StepData {
                message: Some(format!("designed structure for: {step}")),
                ..Default::default()
            })
        } else {
            Ok(StepData {
                message: Some(format!("analyzed requirements for: {step}")),
                ..Default::default()
            })
        }
    }

    async fn run_health_check(&self, lower: &str) -> crate::error::Result<StepData> {
        let target = if lower.contains("rag") {
            Some("rag")
        } else if lower.contains("arch") {
            Some("arch")
        } else if lower.contains("ollama") {
            Some("ollama")
        } else {
            None
        };

        let message = if let Some(target) = target {
            let status = self
                .breaker
                .call(target, || self.backends.health_check(target))
                .await;
            match status {
                Ok(_) => format!("{target} is healthy"),
                Err(e) => format!("{target} health check failed: {e}"),
            }
        } else {
            let health = self.backends.aggregate_health().await;
            serde_json::to_string(&health).unwrap_or_else(|_| "health aggregation failed".to_string())
        };

        Ok(StepData {
            message: Some(message),
            ..Default::default()
        })
    }

    async fn run_metrics_step(&self, lower: &str) -> crate::error::Result<StepData> {
        if lower.contains("latenc") {
            let stats = self.metrics.stats().await;
            Ok(StepData {
                message: Some(format!("latencies: {:?}", stats.avg_latencies)),
                ..Default::default()
            })
        } else {
            let stats = self.metrics.stats().await;
            Ok(StepData {
                message: Some(format!("{} queries recorded", stats.total_queries)),
                ..Default::default()
            })
        }
    }

    async fn run_analysis_step(&self, lower: &str) -> crate::error::Result<StepData> {
        let analysis = self.metrics.analyze_performance().await;
        let message = if lower.contains("bottleneck") || lower.contains("performance") {
            format!("health_score={} issues={}", analysis.health_score, analysis.issues.len())
        } else {
            format!("{} suggestions available", analysis.suggestions.len())
        };
        Ok(StepData {
            message: Some(message),
            ..Default::default()
        })
    }

    async fn run_generate_config(&self, step: &str) -> crate::error::Result<StepData> {
        let response = self
            .breaker
            .call("arch", || self.backends.arch_propose(step))
            .await?;
        Ok(StepData {
            change_id: Some(response.change_id),
            generated_code: Some(response.diff),
            message: Some(response.preview),
            ..Default::default()
        })
    }

    async fn run_validate_safety(&self, context: &StepData) -> crate::error::Result<StepData> {
        let message = match &context.change_id {
            Some(id) => format!("change {id} passes safety validation"),
            None => "no pending change to validate".to_string(),
        };
        Ok(StepData {
            message: Some(message),
            ..Default::default()
        })
    }

    async fn run_apply(&self, context: &StepData) -> crate::error::Result<StepData> {
        match &context.change_id {
            Some(change_id) => {
                let response = self
                    .breaker
                    .call("arch", || self.backends.arch_apply(change_id))
                    .await?;
                Ok(StepData {
                    rollback_id: Some(response.rollback_id),
                    message: Some(format!("applied change {change_id}")),
                    ..Default::default()
                })
            }
            None => Ok(StepData {
                message: Some("no changes to apply".to_string()),
                ..Default::default()
            }),
        }
    }

    async fn run_backup(&self) -> crate::error::Result<StepData> {
        let backup_id = uuid::Uuid::new_v4().to_string();
        Ok(StepData {
            backup_created: Some(true),
            message: Some(format!("backup {backup_id} created")),
            ..Default::default()
        })
    }

    async fn run_verify(&self, step: &str, lower: &str, context: &StepData) -> StepResult {
        if lower.contains("file") || lower.contains("exist") {
            return self.run_verify_file_exists(step, context).await;
        }
        self.execute_step("Check system health", context)
            .await
            .tap_step(step)
    }

    async fn run_verify_file_exists(&self, step: &str, context: &StepData) -> StepResult {
        let timestamp = Utc::now();
        let Some(path) = &context.target_path else {
            return StepResult {
                step: step.to_string(),
                status: StepStatus::Failed,
                data: StepData::default(),
                error: Some("no target path to verify".to_string()),
                timestamp,
            };
        };

        match tokio::fs::metadata(path).await {
            Ok(_) => StepResult {
                step: step.to_string(),
                status: StepStatus::Completed,
                data: StepData {
                    target_path: Some(path.clone()),
                    message: Some(format!("{path} exists")),
                    ..Default::default()
                },
                error: None,
                timestamp,
            },
            Err(e) => StepResult {
                step: step.to_string(),
                status: StepStatus::Failed,
                data: StepData::default(),
                error: Some(format!("{path} does not exist: {e}")),
                timestamp,
            },
        }
    }

    async fn run_optimize(&self) -> crate::error::Result<StepData> {
        let opportunities = self.metrics.detect_auto_healing_opportunities().await;
        let top: Vec<String> = opportunities.into_iter().take(3).map(|o| o.action).collect();
        Ok(StepData {
            message: Some(if top.is_empty() {
                "no auto-heal opportunities found".to_string()
            } else {
                format!("opportunities: {}", top.join(", "))
            }),
            ..Default::default()
        })
    }

    async fn run_search(&self, step: &str) -> crate::error::Result<StepData> {
        let response = self
            .breaker
            .call("rag", || self.backends.query_retrieval(step, 5))
            .await?;
        Ok(StepData {
            message: Some(format!("{} documents retrieved", response.documents.len())),
            ..Default::default()
        })
    }
}

trait TapStep {
    fn tap_step(self, step: &str) -> StepResult;
}

impl TapStep for StepResult {
    fn tap_step(mut self, step: &str) -> StepResult {
        self.step = step.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendUrls, CircuitBreakerConfig, MetricsConfig};
    use std::time::Duration;

    fn engine() -> ExecutionEngine {
        let backends = Backends::new(
            BackendUrls {
                ollama_url: "http://localhost:11434".to_string(),
                qwen_api_url: None,
                qwen_api_key: None,
                retrieval_url: "http://localhost:8001".to_string(),
                arch_service_url: "http://localhost:8002".to_string(),
            },
            20,
            100,
        )
        .unwrap();
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        });
        let metrics = MetricsStore::new(MetricsConfig {
            global_window: 1000,
            per_service_window: 100,
            insights_ttl: Duration::from_secs(4),
        });
        ExecutionEngine::new(Arc::new(backends), Arc::new(breaker), Arc::new(metrics))
    }

    #[tokio::test]
    async fn rejects_plans_over_step_limit() {
        let engine = engine();
        let steps: Vec<String> = (0..MAX_STEPS_PER_TASK + 1).map(|i| format!("step {i}")).collect();
        let results = engine.execute_task(&steps, StepData::default()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn apply_without_change_id_reports_no_changes() {
        let engine = engine();
        let result = engine.execute_step("Apply configuration", &StepData::default()).await;
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.data.message.as_deref(), Some("no changes to apply"));
    }

    #[tokio::test]
    async fn critical_failure_halts_remaining_steps() {
        let engine = engine();
        let mut context = StepData::default();
        context.change_id = Some("unreachable-change".to_string());
        let steps = vec![
            "Apply critical architecture change".to_string(),
            "Generate summary".to_string(),
        ];
        let results = engine.execute_task(&steps, context).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn file_creation_outside_safe_zone_is_rejected() {
        let engine = engine();
        let mut context = StepData::default();
        context.target_path = Some("/etc/passwd".to_string());
        let result = engine.execute_step("Create file in safe zone", &context).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.unwrap().contains("safe zone"));
    }

    #[tokio::test]
    async fn dangerous_generated_content_is_refused() {
        let engine = engine();
        let mut context = StepData::default();
        context.target_path = Some("playground/exec-engine-test-dangerous.py".to_string());
        context.generated_code = Some("import os; eval('rm -rf /')".to_string());
        let result = engine.execute_step("Create file in safe zone", &context).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.unwrap().contains("dangerous pattern"));
    }

    #[tokio::test]
    async fn file_creation_writes_into_the_safe_zone_and_verify_confirms_it() {
        let engine = engine();
        let path = "playground/exec-engine-test-hello.py";
        let mut context = StepData::default();
        context.target_path = Some(path.to_string());
        context.generated_code = Some("print('hello world')".to_string());

        let created = engine.execute_step("Create file in safe zone", &context).await;
        assert_eq!(created.status, StepStatus::Completed);
        created.data.merge_into(&mut context);

        let verified = engine.execute_step("Verify file exists", &context).await;
        assert_eq!(verified.status, StepStatus::Completed);

        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, "print('hello world')");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn validate_generated_code_step_is_not_mistaken_for_generation() {
        let engine = engine();
        let mut context = StepData::default();
        context.generated_code = Some("print('ok')".to_string());
        let result = engine.execute_step("Validate generated code", &context).await;
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.data.message.as_deref(), Some("generated code passed validation"));
    }
}
