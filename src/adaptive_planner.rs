//! Learns from execution history: tracks per-pattern success rates and
//! per-step-type failure rates, and reorders/deduplicates proposed plans.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::intent::derive_pattern;
use crate::types::{ExecutionSummary, ExecutionStatus, StepResult, StepType};

#[derive(Debug, Clone, Default)]
struct PatternStats {
    success: u32,
    total: u32,
}

impl PatternStats {
    fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 * 100.0 / self.total as f64
        }
    }
}

struct StepOutcome {
    failed: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Suggestion {
    pub kind: String,
    pub message: String,
    pub confidence: String,
    pub step_index: Option<usize>,
    pub suggested_step: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanAdvice {
    pub pattern: String,
    pub suggestions: Vec<Suggestion>,
    pub historical_success_rate: f64,
    pub total_executions: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LearningInsights {
    pub total_executions: usize,
    pub successful_executions: usize,
    pub overall_success_rate: f64,
    pub patterns_learned: usize,
    pub best_pattern: Option<(String, f64)>,
    pub worst_pattern: Option<(String, f64)>,
    pub step_types_tracked: usize,
}

struct ExecutionRecord {
    completed: bool,
}

struct Inner {
    pattern_stats: HashMap<String, PatternStats>,
    step_performance: HashMap<StepType, Vec<StepOutcome>>,
    history: Vec<ExecutionRecord>,
}

pub struct AdaptivePlanner {
    inner: RwLock<Inner>,
}

impl AdaptivePlanner {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                pattern_stats: HashMap::new(),
                step_performance: HashMap::new(),
                history: Vec::new(),
            }),
        }
    }

    pub async fn suggest_improvements(&self, task: &str, proposed_steps: &[String]) -> PlanAdvice {
        let pattern = derive_pattern(task);
        let inner = self.inner.read().await;
        let mut suggestions = Vec::new();

        let stats = inner.pattern_stats.get(&pattern).cloned().unwrap_or_default();
        if stats.total > 0 && stats.rate() < 80.0 {
            suggestions.push(Suggestion {
                kind: "warning".into(),
                message: format!(
                    "This task pattern has {:.1}% success rate. Consider review.",
                    stats.rate()
                ),
                confidence: "medium".into(),
                step_index: None,
                suggested_step: None,
            });
        }

        for (i, step) in proposed_steps.iter().enumerate() {
            let step_type = StepType::classify(step);
            if let Some(perf) = inner.step_performance.get(&step_type) {
                if !perf.is_empty() {
                    let failures = perf.iter().filter(|p| p.failed).count();
                    if failures as f64 > perf.len() as f64 * 0.2 {
                        suggestions.push(Suggestion {
                            kind: "step_warning".into(),
                            message: format!("Step type '{step_type:?}' has high failure rate"),
                            confidence: "high".into(),
                            step_index: Some(i),
                            suggested_step: Some(step.clone()),
                        });
                    }
                }
            }
        }

        if pattern == "add_service" && !proposed_steps.iter().any(|s| s.to_lowercase().contains("backup")) {
            suggestions.push(Suggestion {
                kind: "missing_step".into(),
                message: "Consider adding a backup step before applying changes".into(),
                confidence: "high".into(),
                step_index: None,
                suggested_step: Some("Create backup point".into()),
            });
        }
        if pattern == "optimization" && !proposed_steps.iter().any(|s| s.to_lowercase().contains("measure")) {
            suggestions.push(Suggestion {
                kind: "missing_step".into(),
                message: "Add a baseline measurement for optimization validation".into(),
                confidence: "high".into(),
                step_index: None,
                suggested_step: Some("Measure current performance baseline".into()),
            });
        }

        PlanAdvice {
            pattern,
            suggestions,
            historical_success_rate: stats.rate(),
            total_executions: stats.total,
        }
    }

    /// Removes a redundant second backup step, then stably reorders by
    /// StepType priority.
    pub fn optimize_steps(&self, steps: &[String]) -> Vec<String> {
        let mut seen_backup = false;
        let mut filtered = Vec::with_capacity(steps.len());
        for step in steps {
            let step_type = StepType::classify(step);
            if step_type == StepType::Backup {
                if seen_backup {
                    continue;
                }
                seen_backup = true;
            }
            filtered.push(step.clone());
        }
        filtered.sort_by_key(|s| StepType::classify(s).priority());
        filtered
    }

    pub async fn record_execution(
        &self,
        task: &str,
        results: &[StepResult],
        summary: &ExecutionSummary,
    ) {
        let pattern = derive_pattern(task);
        let mut inner = self.inner.write().await;

        let stats = inner.pattern_stats.entry(pattern).or_default();
        stats.total += 1;
        if summary.status == ExecutionStatus::Completed {
            stats.success += 1;
        }

        for result in results {
            let step_type = StepType::classify(&result.step);
            inner
                .step_performance
                .entry(step_type)
                .or_default()
                .push(StepOutcome {
                    failed: !result.status.is_ok(),
                });
        }

        inner.history.push(ExecutionRecord {
            completed: summary.status == ExecutionStatus::Completed,
        });
    }

    pub async fn learning_insights(&self) -> LearningInsights {
        let inner = self.inner.read().await;
        let total = inner.history.len();
        let successful = inner.history.iter().filter(|e| e.completed).count();

        let mut best: Option<(String, f64)> = None;
        let mut worst: Option<(String, f64)> = None;
        for (pattern, stats) in &inner.pattern_stats {
            if stats.total < 2 {
                continue;
            }
            let rate = stats.rate();
            if best.as_ref().map(|(_, r)| rate > *r).unwrap_or(true) {
                best = Some((pattern.clone(), rate));
            }
            if worst.as_ref().map(|(_, r)| rate < *r).unwrap_or(true) {
                worst = Some((pattern.clone(), rate));
            }
        }

        LearningInsights {
            total_executions: total,
            successful_executions: successful,
            overall_success_rate: if total > 0 {
                successful as f64 * 100.0 / total as f64
            } else {
                0.0
            },
            patterns_learned: inner.pattern_stats.len(),
            best_pattern: best,
            worst_pattern: worst,
            step_types_tracked: inner.step_performance.len(),
        }
    }
}

impl Default for AdaptivePlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepData, StepStatus};
    use chrono::Utc;

    fn result(step: &str, status: StepStatus) -> StepResult {
        StepResult {
            step: step.to_string(),
            status,
            data: StepData::default(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn suggests_backup_for_add_service_pattern() {
        let planner = AdaptivePlanner::new();
        let advice = planner
            .suggest_improvements("add a new service", &["Apply configuration".to_string()])
            .await;
        assert_eq!(advice.pattern, "add_service");
        assert!(advice.suggestions.iter().any(|s| s.kind == "missing_step"));
    }

    #[test]
    fn optimize_steps_dedups_backup_and_reorders() {
        let planner = AdaptivePlanner::new();
        let steps = vec![
            "Apply configuration".to_string(),
            "Create backup point".to_string(),
            "Create backup point".to_string(),
            "Validate safety".to_string(),
        ];
        let optimized = planner.optimize_steps(&steps);
        assert_eq!(optimized.len(), 3);
        assert_eq!(optimized[0], "Create backup point");
        assert_eq!(optimized[1], "Validate safety");
    }

    #[tokio::test]
    async fn low_success_rate_triggers_warning() {
        let planner = AdaptivePlanner::new();
        let summary_fail = ExecutionSummary {
            total: 1,
            successful: 0,
            failed: 1,
            success_rate: 0.0,
            status: ExecutionStatus::Failed,
        };
        for _ in 0..5 {
            planner
                .record_execution("check service health", &[result("Check RAG service health", StepStatus::Failed)], &summary_fail)
                .await;
        }
        let advice = planner.suggest_improvements("check service health", &[]).await;
        assert!(advice.suggestions.iter().any(|s| s.kind == "warning"));
    }
}
