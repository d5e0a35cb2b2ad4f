//! Learns which learning strategy works best for which situation — a level
//! above the adaptive planner's pattern-success tracking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct LearningStrategy {
    pub name: String,
    pub description: String,
    pub effectiveness: f64,
    pub times_used: u32,
    pub successes: u32,
}

impl LearningStrategy {
    fn new(name: &str, description: &str, effectiveness: f64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            effectiveness,
            times_used: 0,
            successes: 0,
        }
    }

    fn update(&mut self, success: bool) {
        self.times_used += 1;
        if success {
            self.successes += 1;
        }
        self.effectiveness = self.successes as f64 / self.times_used as f64;
    }

    fn success_rate_pct(&self) -> f64 {
        if self.times_used == 0 {
            0.0
        } else {
            (self.successes as f64 * 1000.0 / self.times_used as f64).round() / 10.0
        }
    }
}

struct LearningEvent {
    success: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectivenessAnalysis {
    pub status: String,
    pub current_success_rate: f64,
    pub improvement_trend: f64,
    pub learning_velocity: String,
    pub best_strategies: Vec<LearningStrategy>,
    pub total_learning_events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Optimization {
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub optimizations_found: usize,
    pub optimizations: Vec<Optimization>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetaInsights {
    pub strategies: HashMap<String, LearningStrategy>,
    pub effectiveness: EffectivenessAnalysis,
    pub optimizations: OptimizationReport,
    pub meta_level: String,
}

/// Context used to pick a strategy for a given learning event.
pub struct RecommendationContext<'a> {
    pub task_type: &'a str,
    pub has_errors: bool,
    pub has_rag_context: bool,
}

struct Inner {
    strategies: HashMap<String, LearningStrategy>,
    history: Vec<LearningEvent>,
}

pub struct MetaLearningEngine {
    inner: RwLock<Inner>,
}

impl MetaLearningEngine {
    pub fn new() -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(
            "pattern_recognition".to_string(),
            LearningStrategy::new(
                "pattern_recognition",
                "Learn from task patterns and their success rates",
                0.8,
            ),
        );
        strategies.insert(
            "error_analysis".to_string(),
            LearningStrategy::new(
                "error_analysis",
                "Learn from failures to avoid similar mistakes",
                0.75,
            ),
        );
        strategies.insert(
            "context_adaptation".to_string(),
            LearningStrategy::new(
                "context_adaptation",
                "Adapt behavior based on context (retrieval results, entities, etc.)",
                0.85,
            ),
        );
        strategies.insert(
            "feedback_integration".to_string(),
            LearningStrategy::new(
                "feedback_integration",
                "Learn from user feedback and corrections",
                0.7,
            ),
        );
        strategies.insert(
            "performance_optimization".to_string(),
            LearningStrategy::new(
                "performance_optimization",
                "Learn optimal execution paths and shortcuts",
                0.65,
            ),
        );

        Self {
            inner: RwLock::new(Inner {
                strategies,
                history: Vec::new(),
            }),
        }
    }

    pub async fn record_learning_event(&self, strategy_name: &str, outcome_completed: bool) {
        let mut inner = self.inner.write().await;
        inner.history.push(LearningEvent {
            success: outcome_completed,
            timestamp: Utc::now(),
        });
        if let Some(strategy) = inner.strategies.get_mut(strategy_name) {
            strategy.update(outcome_completed);
        }
    }

    pub async fn analyze_learning_effectiveness(&self) -> EffectivenessAnalysis {
        let inner = self.inner.read().await;
        if inner.history.len() < 5 {
            return EffectivenessAnalysis {
                status: "insufficient_data".to_string(),
                current_success_rate: 0.0,
                improvement_trend: 0.0,
                learning_velocity: "unknown".to_string(),
                best_strategies: Vec::new(),
                total_learning_events: inner.history.len(),
            };
        }

        let recent = &inner.history[inner.history.len().saturating_sub(20)..];
        let success_rate = recent.iter().filter(|e| e.success).count() as f64 / recent.len() as f64;

        let improvement = if inner.history.len() > 40 {
            let earlier = &inner.history[inner.history.len() - 40..inner.history.len() - 20];
            let earlier_rate = earlier.iter().filter(|e| e.success).count() as f64 / earlier.len() as f64;
            success_rate - earlier_rate
        } else {
            0.0
        };

        let mut best_strategies: Vec<LearningStrategy> = inner.strategies.values().cloned().collect();
        best_strategies.sort_by(|a, b| b.effectiveness.partial_cmp(&a.effectiveness).unwrap());
        best_strategies.truncate(3);

        EffectivenessAnalysis {
            status: "ok".to_string(),
            current_success_rate: (success_rate * 1000.0).round() / 10.0,
            improvement_trend: (improvement * 1000.0).round() / 10.0,
            learning_velocity: if improvement > 0.1 {
                "fast".to_string()
            } else if improvement > 0.0 {
                "moderate".to_string()
            } else {
                "slow".to_string()
            },
            best_strategies,
            total_learning_events: inner.history.len(),
        }
    }

    pub async fn recommend_learning_strategy(&self, ctx: &RecommendationContext<'_>) -> String {
        if ctx.has_errors {
            return "error_analysis".to_string();
        }
        if ctx.has_rag_context {
            return "context_adaptation".to_string();
        }
        if ctx.task_type == "health_check" || ctx.task_type == "analysis" {
            return "pattern_recognition".to_string();
        }
        let inner = self.inner.read().await;
        inner
            .strategies
            .values()
            .max_by(|a, b| a.effectiveness.partial_cmp(&b.effectiveness).unwrap())
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "pattern_recognition".to_string())
    }

    pub async fn optimize_learning_process(&self) -> OptimizationReport {
        let inner = self.inner.read().await;
        let mut optimizations = Vec::new();

        for strategy in inner.strategies.values() {
            if strategy.times_used > 5 && strategy.effectiveness < 0.6 {
                optimizations.push(Optimization {
                    kind: "improve_strategy".to_string(),
                    detail: format!(
                        "Strategy '{}' needs improvement (effectiveness {:.2})",
                        strategy.name, strategy.effectiveness
                    ),
                });
            }
        }

        let unused: Vec<&str> = inner
            .strategies
            .values()
            .filter(|s| s.times_used == 0)
            .map(|s| s.name.as_str())
            .collect();
        if !unused.is_empty() {
            optimizations.push(Optimization {
                kind: "activate_strategies".to_string(),
                detail: format!("Activate unused learning strategies: {}", unused.join(", ")),
            });
        }

        drop(inner);
        let analysis = self.analyze_learning_effectiveness().await;
        if analysis.learning_velocity == "slow" {
            optimizations.push(Optimization {
                kind: "accelerate_learning".to_string(),
                detail: "Increase learning rate or try different strategies".to_string(),
            });
        }

        OptimizationReport {
            optimizations_found: optimizations.len(),
            optimizations,
        }
    }

    pub async fn get_meta_insights(&self) -> MetaInsights {
        let strategies = self.inner.read().await.strategies.clone();
        MetaInsights {
            strategies,
            effectiveness: self.analyze_learning_effectiveness().await,
            optimizations: self.optimize_learning_process().await,
            meta_level: "learning_to_learn".to_string(),
        }
    }
}

impl Default for MetaLearningEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_context_recommends_error_analysis() {
        let engine = MetaLearningEngine::new();
        let ctx = RecommendationContext {
            task_type: "generic",
            has_errors: true,
            has_rag_context: false,
        };
        assert_eq!(engine.recommend_learning_strategy(&ctx).await, "error_analysis");
    }

    #[tokio::test]
    async fn insufficient_history_reports_status() {
        let engine = MetaLearningEngine::new();
        let analysis = engine.analyze_learning_effectiveness().await;
        assert_eq!(analysis.status, "insufficient_data");
    }

    #[tokio::test]
    async fn underperforming_strategy_flagged_after_repeated_use() {
        let engine = MetaLearningEngine::new();
        for _ in 0..6 {
            engine.record_learning_event("performance_optimization", false).await;
        }
        let report = engine.optimize_learning_process().await;
        assert!(report.optimizations.iter().any(|o| o.kind == "improve_strategy"));
    }

    #[test]
    fn success_rate_pct_rounds_to_one_decimal() {
        let mut s = LearningStrategy::new("x", "d", 0.5);
        s.update(true);
        s.update(true);
        s.update(false);
        assert_eq!(s.success_rate_pct(), 66.7);
    }
}
