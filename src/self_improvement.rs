//! Analyzes system-wide performance across metrics, learning, and decision
//! confidence to surface and prioritize improvement opportunities.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::adaptive_planner::LearningInsights;
use crate::decision_engine::DecisionInsights;
use crate::metrics::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    fn score(&self) -> u8 {
        match self {
            Impact::Low => 1,
            Impact::Medium => 2,
            Impact::High => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovementOpportunity {
    pub area: String,
    pub issue: String,
    pub suggestion: String,
    pub impact: Impact,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovementRecord {
    pub opportunity: ImprovementOpportunity,
    pub applied_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovementPlan {
    pub immediate_actions: Vec<ImprovementOpportunity>,
    pub scheduled_improvements: Vec<ImprovementOpportunity>,
    pub backlog: Vec<ImprovementOpportunity>,
    pub total_opportunities: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDelta {
    pub metric: String,
    pub before: f64,
    pub after: f64,
    pub improvement: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactMeasurement {
    pub improvements_detected: usize,
    pub improvements: Vec<MetricDelta>,
    pub overall_impact: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovementInsights {
    pub total_opportunities_identified: usize,
    pub improvements_applied: usize,
    pub pending_opportunities: usize,
    pub areas_analyzed: Vec<String>,
    pub recent_improvements: Vec<ImprovementRecord>,
}

struct Inner {
    opportunities: Vec<ImprovementOpportunity>,
    applied: Vec<ImprovementRecord>,
}

pub struct SelfImprovementEngine {
    inner: RwLock<Inner>,
}

impl SelfImprovementEngine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                opportunities: Vec::new(),
                applied: Vec::new(),
            }),
        }
    }

    pub async fn analyze_system_performance(
        &self,
        metrics: &Stats,
        learning: &LearningInsights,
        decisions: &DecisionInsights,
    ) -> Vec<ImprovementOpportunity> {
        let mut found = Vec::new();

        if learning.total_executions > 0 && learning.overall_success_rate < 95.0 {
            found.push(opportunity(
                "execution",
                format!(
                    "Success rate is {:.1}%, below optimal 95%",
                    learning.overall_success_rate
                ),
                "Improve error handling and retry logic in execution engine",
                Impact::High,
                0.9,
            ));
        }

        if decisions.total_decisions > 0 && decisions.avg_confidence < 0.7 {
            found.push(opportunity(
                "decision_making",
                format!(
                    "Average decision confidence is {:.2}, below optimal 0.7",
                    decisions.avg_confidence
                ),
                "Enhance decision rules with more context factors",
                Impact::Medium,
                0.8,
            ));
        }

        if let Some((name, rate)) = &learning.worst_pattern {
            if *rate < 80.0 {
                found.push(opportunity(
                    "task_decomposition",
                    format!("Pattern '{name}' has only {rate:.1}% success"),
                    format!("Refine task decomposition for {name} pattern"),
                    Impact::High,
                    0.85,
                ));
            }
        }

        let high_latency: Vec<&str> = metrics
            .avg_latencies
            .iter()
            .filter(|(_, lat)| **lat > 1000.0)
            .map(|(svc, _)| svc.as_str())
            .collect();
        if !high_latency.is_empty() {
            found.push(opportunity(
                "performance",
                format!("High latency detected in: {}", high_latency.join(", ")),
                "Implement caching or optimize service calls",
                Impact::Medium,
                0.75,
            ));
        }

        let high_error: Vec<&str> = metrics
            .errors
            .iter()
            .filter(|(_, count)| **count > 5)
            .map(|(svc, _)| svc.as_str())
            .collect();
        if !high_error.is_empty() {
            found.push(opportunity(
                "reliability",
                format!("High error count in: {}", high_error.join(", ")),
                "Add circuit breaker or improve error handling",
                Impact::High,
                0.9,
            ));
        }

        let mut inner = self.inner.write().await;
        inner.opportunities.extend(found.clone());
        found
    }

    async fn prioritize(&self) -> Vec<ImprovementOpportunity> {
        let inner = self.inner.read().await;
        let mut scored: Vec<(f64, ImprovementOpportunity)> = inner
            .opportunities
            .iter()
            .filter(|o| !o.applied)
            .map(|o| (o.impact.score() as f64 * o.confidence, o.clone()))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.into_iter().map(|(_, o)| o).collect()
    }

    pub async fn generate_improvement_plan(&self) -> ImprovementPlan {
        let prioritized = self.prioritize().await;
        let mut immediate = Vec::new();
        let mut scheduled = Vec::new();
        let mut backlog = Vec::new();

        for opp in prioritized {
            if opp.impact == Impact::High && opp.confidence >= 0.8 {
                immediate.push(opp);
            } else if matches!(opp.impact, Impact::High | Impact::Medium) && opp.confidence >= 0.6 {
                scheduled.push(opp);
            } else {
                backlog.push(opp);
            }
        }

        ImprovementPlan {
            total_opportunities: immediate.len() + scheduled.len() + backlog.len(),
            immediate_actions: immediate,
            scheduled_improvements: scheduled,
            backlog,
        }
    }

    pub async fn apply_improvement(&self, area: &str, issue: &str) -> Option<ImprovementRecord> {
        let mut inner = self.inner.write().await;
        let opp = inner
            .opportunities
            .iter_mut()
            .find(|o| o.area == area && o.issue == issue && !o.applied)?;
        opp.applied = true;
        let record = ImprovementRecord {
            opportunity: opp.clone(),
            applied_at: Utc::now(),
            status: "applied".to_string(),
        };
        inner.applied.push(record.clone());
        Some(record)
    }

    pub fn measure_improvement_impact(
        &self,
        before_success_rate: f64,
        after_success_rate: f64,
        before_confidence: f64,
        after_confidence: f64,
    ) -> ImpactMeasurement {
        let mut improvements = Vec::new();
        if after_success_rate > before_success_rate {
            improvements.push(MetricDelta {
                metric: "success_rate".to_string(),
                before: before_success_rate,
                after: after_success_rate,
                improvement: after_success_rate - before_success_rate,
            });
        }
        if after_confidence > before_confidence {
            improvements.push(MetricDelta {
                metric: "decision_confidence".to_string(),
                before: before_confidence,
                after: after_confidence,
                improvement: after_confidence - before_confidence,
            });
        }
        ImpactMeasurement {
            overall_impact: if improvements.is_empty() { "neutral".to_string() } else { "positive".to_string() },
            improvements_detected: improvements.len(),
            improvements,
        }
    }

    pub async fn get_improvement_insights(&self) -> ImprovementInsights {
        let inner = self.inner.read().await;
        let mut areas: Vec<String> = inner.opportunities.iter().map(|o| o.area.clone()).collect();
        areas.sort();
        areas.dedup();
        ImprovementInsights {
            total_opportunities_identified: inner.opportunities.len(),
            improvements_applied: inner.applied.len(),
            pending_opportunities: inner.opportunities.iter().filter(|o| !o.applied).count(),
            areas_analyzed: areas,
            recent_improvements: inner.applied.iter().rev().take(5).rev().cloned().collect(),
        }
    }
}

impl Default for SelfImprovementEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn opportunity(
    area: &str,
    issue: impl Into<String>,
    suggestion: impl Into<String>,
    impact: Impact,
    confidence: f64,
) -> ImprovementOpportunity {
    ImprovementOpportunity {
        area: area.to_string(),
        issue: issue.into(),
        suggestion: suggestion.into(),
        impact,
        confidence,
        timestamp: Utc::now(),
        applied: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stats() -> Stats {
        Stats {
            total_queries: 0,
            avg_latencies: HashMap::new(),
            errors: HashMap::new(),
            top_patterns: Vec::new(),
        }
    }

    fn learning(rate: f64, total: usize) -> LearningInsights {
        LearningInsights {
            total_executions: total,
            successful_executions: 0,
            overall_success_rate: rate,
            patterns_learned: 0,
            best_pattern: None,
            worst_pattern: None,
            step_types_tracked: 0,
        }
    }

    fn decisions(avg_confidence: f64, total: usize) -> DecisionInsights {
        DecisionInsights {
            total_decisions: total,
            avg_confidence,
        }
    }

    #[tokio::test]
    async fn low_success_rate_is_flagged_high_impact() {
        let engine = SelfImprovementEngine::new();
        let found = engine
            .analyze_system_performance(&stats(), &learning(80.0, 20), &decisions(0.9, 10))
            .await;
        assert!(found.iter().any(|o| o.area == "execution" && o.impact == Impact::High));
    }

    #[tokio::test]
    async fn plan_sorts_by_impact_and_confidence() {
        let engine = SelfImprovementEngine::new();
        engine
            .analyze_system_performance(&stats(), &learning(80.0, 20), &decisions(0.5, 10))
            .await;
        let plan = engine.generate_improvement_plan().await;
        assert!(plan.immediate_actions.iter().any(|o| o.area == "execution"));
    }

    #[test]
    fn impact_measurement_detects_improvement() {
        let engine = SelfImprovementEngine::new();
        let result = engine.measure_improvement_impact(80.0, 92.0, 0.6, 0.75);
        assert_eq!(result.overall_impact, "positive");
        assert_eq!(result.improvements_detected, 2);
    }
}
