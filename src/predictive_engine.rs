//! Projects near-future issues from metrics and learning trends, and scores
//! plan steps by predicted failure probability before execution.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::adaptive_planner::LearningInsights;
use crate::metrics::Stats;
use crate::types::FailurePrediction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Immediate,
    ShortTerm,
    LongTerm,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub prediction_type: String,
    pub description: String,
    pub probability: f64,
    pub time_horizon: TimeHorizon,
    pub recommended_action: String,
    pub timestamp: DateTime<Utc>,
    pub prevented: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProactiveAction {
    pub priority: String,
    pub action: String,
    pub reason: String,
    pub auto_executable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeAccuracy {
    pub accuracy: f64,
    pub predictions_made: u32,
    pub correct_predictions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyReport {
    pub overall_accuracy: f64,
    pub by_type: HashMap<String, TypeAccuracy>,
    pub total_predictions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HorizonCounts {
    pub immediate: usize,
    pub short_term: usize,
    pub long_term: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictiveInsights {
    pub total_predictions: usize,
    pub active_predictions: usize,
    pub prevented_issues: usize,
    pub by_horizon: HorizonCounts,
    pub accuracy: AccuracyReport,
    pub recent_predictions: Vec<Prediction>,
}

#[derive(Default)]
struct AccuracyTally {
    correct: u32,
    total: u32,
}

struct Inner {
    predictions: Vec<Prediction>,
    prevented_issues: Vec<String>,
    accuracy: HashMap<String, AccuracyTally>,
}

pub struct PredictiveEngine {
    inner: RwLock<Inner>,
}

impl PredictiveEngine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                predictions: Vec::new(),
                prevented_issues: Vec::new(),
                accuracy: HashMap::new(),
            }),
        }
    }

    pub async fn analyze_trends(&self, metrics: &Stats, learning: &LearningInsights) -> Vec<Prediction> {
        let mut predictions = Vec::new();
        let success_rate = if learning.total_executions == 0 {
            100.0
        } else {
            learning.overall_success_rate
        };

        if success_rate < 100.0 && success_rate > 90.0 {
            predictions.push(new_prediction(
                "performance_degradation",
                format!("Success rate declining to {success_rate:.1}%, may drop below 90% soon"),
                0.6,
                TimeHorizon::ShortTerm,
                "Review recent failures and improve error handling",
            ));
        } else if success_rate <= 90.0 && learning.total_executions > 0 {
            predictions.push(new_prediction(
                "critical_performance",
                format!("Success rate at {success_rate:.1}%, critical threshold reached"),
                0.9,
                TimeHorizon::Immediate,
                "Immediate investigation required - system reliability at risk",
            ));
        }

        let total_errors: u32 = metrics.errors.values().sum();
        if total_errors > 10 {
            predictions.push(new_prediction(
                "error_spike",
                format!("Error count at {total_errors}, may indicate systemic issue"),
                0.75,
                TimeHorizon::Immediate,
                "Investigate error patterns and implement fixes",
            ));
        }

        let high_latency: Vec<&str> = metrics
            .avg_latencies
            .iter()
            .filter(|(_, lat)| **lat > 1500.0)
            .map(|(svc, _)| svc.as_str())
            .collect();
        if !high_latency.is_empty() {
            predictions.push(new_prediction(
                "latency_increase",
                format!("Services {} showing high latency, may worsen", high_latency.join(", ")),
                0.7,
                TimeHorizon::ShortTerm,
                "Optimize slow services or add caching",
            ));
        }

        if learning.patterns_learned < 3 {
            predictions.push(new_prediction(
                "insufficient_learning",
                "System has limited learning data, predictions may be inaccurate",
                0.8,
                TimeHorizon::LongTerm,
                "Execute more diverse tasks to build learning history",
            ));
        }

        if metrics.total_queries > 100 {
            predictions.push(new_prediction(
                "resource_pressure",
                format!("High query volume ({}), may need scaling", metrics.total_queries),
                0.5,
                TimeHorizon::LongTerm,
                "Monitor resource usage and plan for scaling",
            ));
        }

        let mut inner = self.inner.write().await;
        inner.predictions.extend(predictions.clone());
        predictions
    }

    /// Scores each step's failure risk by keyword, independent of `analyze_trends`.
    pub fn predict_failure_points(&self, steps: &[String]) -> Vec<FailurePrediction> {
        steps
            .iter()
            .filter_map(|step| {
                let lower = step.to_lowercase();
                let mut risk: f64 = 0.1;
                if ["delete", "drop", "remove"].iter().any(|k| lower.contains(k)) {
                    risk = 0.8;
                } else if ["modify", "update", "change"].iter().any(|k| lower.contains(k)) {
                    risk = 0.5;
                } else if ["generate", "create"].iter().any(|k| lower.contains(k)) {
                    risk = 0.3;
                }
                if lower.contains("production") || lower.contains("database") {
                    risk = (risk + 0.2).min(1.0);
                }
                if risk > 0.4 {
                    Some(FailurePrediction {
                        step: step.clone(),
                        probability: (risk * 100.0).round() / 100.0,
                        mitigation: suggest_mitigation(&lower),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn generate_proactive_actions(&self, predictions: &[Prediction]) -> Vec<ProactiveAction> {
        predictions
            .iter()
            .filter_map(|pred| {
                if pred.probability > 0.7 && pred.time_horizon == TimeHorizon::Immediate {
                    Some(ProactiveAction {
                        priority: "high".to_string(),
                        action: pred.recommended_action.clone(),
                        reason: pred.description.clone(),
                        auto_executable: matches!(pred.prediction_type.as_str(), "error_spike" | "latency_increase"),
                    })
                } else if pred.probability > 0.6 {
                    Some(ProactiveAction {
                        priority: "medium".to_string(),
                        action: pred.recommended_action.clone(),
                        reason: pred.description.clone(),
                        auto_executable: false,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub async fn validate_prediction(&self, prediction_type: &str, actual_outcome: bool) {
        let mut inner = self.inner.write().await;
        let tally = inner.accuracy.entry(prediction_type.to_string()).or_default();
        tally.total += 1;
        if actual_outcome {
            tally.correct += 1;
        }
    }

    pub async fn get_prediction_accuracy(&self) -> AccuracyReport {
        let inner = self.inner.read().await;
        let mut by_type = HashMap::new();
        let mut overall_correct = 0;
        let mut overall_total = 0;
        for (kind, tally) in &inner.accuracy {
            overall_correct += tally.correct;
            overall_total += tally.total;
            if tally.total > 0 {
                by_type.insert(
                    kind.clone(),
                    TypeAccuracy {
                        accuracy: (tally.correct as f64 * 1000.0 / tally.total as f64).round() / 10.0,
                        predictions_made: tally.total,
                        correct_predictions: tally.correct,
                    },
                );
            }
        }
        AccuracyReport {
            overall_accuracy: if overall_total > 0 {
                (overall_correct as f64 * 1000.0 / overall_total as f64).round() / 10.0
            } else {
                0.0
            },
            by_type,
            total_predictions: overall_total,
        }
    }

    pub async fn get_predictive_insights(&self) -> PredictiveInsights {
        let (total_predictions, prevented_issues, active_predictions, by_horizon, recent_predictions) = {
            let inner = self.inner.read().await;
            let active: Vec<&Prediction> = inner.predictions.iter().filter(|p| !p.prevented).collect();
            let counts = HorizonCounts {
                immediate: active.iter().filter(|p| p.time_horizon == TimeHorizon::Immediate).count(),
                short_term: active.iter().filter(|p| p.time_horizon == TimeHorizon::ShortTerm).count(),
                long_term: active.iter().filter(|p| p.time_horizon == TimeHorizon::LongTerm).count(),
            };
            let recent: Vec<Prediction> = active.iter().rev().take(5).rev().map(|p| (*p).clone()).collect();
            (inner.predictions.len(), inner.prevented_issues.len(), active.len(), counts, recent)
        };

        PredictiveInsights {
            total_predictions,
            active_predictions,
            prevented_issues,
            by_horizon,
            accuracy: self.get_prediction_accuracy().await,
            recent_predictions,
        }
    }
}

impl Default for PredictiveEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn new_prediction(
    kind: &str,
    description: impl Into<String>,
    probability: f64,
    horizon: TimeHorizon,
    action: &str,
) -> Prediction {
    Prediction {
        prediction_type: kind.to_string(),
        description: description.into(),
        probability,
        time_horizon: horizon,
        recommended_action: action.to_string(),
        timestamp: Utc::now(),
        prevented: false,
    }
}

fn suggest_mitigation(lower_step: &str) -> String {
    if lower_step.contains("delete") || lower_step.contains("drop") {
        "Add backup before deletion and implement soft delete".to_string()
    } else if lower_step.contains("modify") || lower_step.contains("update") {
        "Create rollback point and validate changes".to_string()
    } else if lower_step.contains("generate") {
        "Validate generated output before applying".to_string()
    } else {
        "Add error handling and retry logic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(errors: u32, total_queries: usize) -> Stats {
        let mut error_map = HashMap::new();
        if errors > 0 {
            error_map.insert("rag".to_string(), errors);
        }
        Stats {
            total_queries,
            avg_latencies: HashMap::new(),
            errors: error_map,
            top_patterns: Vec::new(),
        }
    }

    fn learning(rate: f64, total: usize, patterns: usize) -> LearningInsights {
        LearningInsights {
            total_executions: total,
            successful_executions: (total as f64 * rate / 100.0) as usize,
            overall_success_rate: rate,
            patterns_learned: patterns,
            best_pattern: None,
            worst_pattern: None,
            step_types_tracked: 0,
        }
    }

    #[tokio::test]
    async fn critical_success_rate_yields_immediate_prediction() {
        let engine = PredictiveEngine::new();
        let predictions = engine.analyze_trends(&stats(0, 0), &learning(85.0, 10, 5)).await;
        assert!(predictions.iter().any(|p| p.prediction_type == "critical_performance"));
    }

    #[test]
    fn delete_step_flagged_as_high_risk() {
        let engine = PredictiveEngine::new();
        let points = engine.predict_failure_points(&["Delete the old config".to_string()]);
        assert_eq!(points.len(), 1);
        assert!(points[0].probability >= 0.8);
    }

    #[tokio::test]
    async fn accuracy_tracks_correct_and_total() {
        let engine = PredictiveEngine::new();
        engine.validate_prediction("error_spike", true).await;
        engine.validate_prediction("error_spike", false).await;
        let report = engine.get_prediction_accuracy().await;
        assert_eq!(report.by_type["error_spike"].predictions_made, 2);
        assert_eq!(report.by_type["error_spike"].correct_predictions, 1);
    }
}
