//! Time-indexed query/error/latency log with rolling analysis and preference
//! learning. The orchestrator's one proactive, self-monitoring subsystem.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::MetricsConfig;
use crate::types::MetricSample;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: String,
    pub service: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub issue: String,
    pub suggestion: String,
    pub expected_improvement: String,
    pub action: String,
    pub priority: Priority,
    pub learning_adjusted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub issues: Vec<Issue>,
    pub suggestions: Vec<Suggestion>,
    pub health_score: i32,
    pub insights: Vec<String>,
    pub learning_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_queries: usize,
    pub avg_latencies: HashMap<String, f64>,
    pub errors: HashMap<String, u32>,
    pub top_patterns: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionOutcome {
    Applied,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsights {
    pub total_suggestions: usize,
    pub applied_count: usize,
    pub dismissed_count: usize,
    pub acceptance_rate: f64,
    pub insights: Vec<String>,
    pub preferred_actions: HashMap<String, u32>,
    pub avoided_actions: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoHealOpportunity {
    pub kind: String,
    pub service: String,
    pub issue: String,
    pub action: String,
    pub confidence: String,
    pub safe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub kind: String,
    pub service: Option<String>,
    pub current: f64,
    pub trend: String,
    pub predicted_critical_in: String,
    pub recommended_action: String,
    pub confidence: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub predictions: Vec<Prediction>,
    pub immediate_actions: Vec<String>,
    pub planned_actions: Vec<String>,
    pub total_actions: usize,
    pub requires_attention: bool,
}

struct SuggestionRecord {
    action: String,
    outcome: SuggestionOutcome,
}

struct Inner {
    queries: Vec<MetricSample>,
    latencies: HashMap<String, Vec<u64>>,
    errors: HashMap<String, u32>,
    patterns: HashMap<String, u32>,
    suggestions_history: Vec<SuggestionRecord>,
    preferred_actions: HashMap<String, u32>,
    avoided_actions: HashMap<String, u32>,
    analysis_cache: Option<(Instant, Analysis)>,
}

pub struct MetricsStore {
    config: MetricsConfig,
    inner: RwLock<Inner>,
}

impl MetricsStore {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                queries: Vec::new(),
                latencies: HashMap::new(),
                errors: HashMap::new(),
                patterns: HashMap::new(),
                suggestions_history: Vec::new(),
                preferred_actions: HashMap::new(),
                avoided_actions: HashMap::new(),
                analysis_cache: None,
            }),
        }
    }

    pub async fn record_query(&self, service: &str, query: &str, latency_ms: u64, success: bool) {
        let mut inner = self.inner.write().await;

        inner.queries.push(MetricSample {
            service: service.to_string(),
            query: query.to_string(),
            latency_ms,
            success,
            timestamp: Utc::now(),
        });
        let cap = self.config.global_window;
        if inner.queries.len() > cap {
            let drop = inner.queries.len() - cap;
            inner.queries.drain(0..drop);
        }

        let lats = inner.latencies.entry(service.to_string()).or_default();
        lats.push(latency_ms);
        let per_service_cap = self.config.per_service_window;
        if lats.len() > per_service_cap {
            let drop = lats.len() - per_service_cap;
            lats.drain(0..drop);
        }

        if !success {
            *inner.errors.entry(service.to_string()).or_insert(0) += 1;
        }

        for word in query.to_lowercase().split_whitespace() {
            if word.len() > 3 {
                *inner.patterns.entry(word.to_string()).or_insert(0) += 1;
            }
        }
        inner.analysis_cache = None;
    }

    pub async fn stats(&self) -> Stats {
        let inner = self.inner.read().await;
        let avg_latencies = inner
            .latencies
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.iter().sum::<u64>() as f64 / v.len() as f64))
            .collect();

        let mut top_patterns: Vec<(String, u32)> =
            inner.patterns.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_patterns.sort_by(|a, b| b.1.cmp(&a.1));
        top_patterns.truncate(10);

        Stats {
            total_queries: inner.queries.len(),
            avg_latencies,
            errors: inner.errors.clone(),
            top_patterns,
        }
    }

    pub async fn analyze_performance(&self) -> Analysis {
        {
            let inner = self.inner.read().await;
            if let Some((when, cached)) = &inner.analysis_cache {
                if when.elapsed() < Duration::from_secs(5) {
                    return cached.clone();
                }
            }
        }

        let mut inner = self.inner.write().await;
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if let Some(rag_lats) = inner.latencies.get("rag") {
            if rag_lats.len() > 5 {
                let avg_rag = rag_lats.iter().sum::<u64>() as f64 / rag_lats.len() as f64;
                if avg_rag > 500.0 {
                    issues.push(Issue {
                        kind: "performance".into(),
                        service: "rag".into(),
                        metric: "latency".into(),
                        value: avg_rag,
                        threshold: 500.0,
                    });

                    let preferred = *inner.preferred_actions.get("Add Redis cache service").unwrap_or(&0);
                    let avoided = *inner.avoided_actions.get("Add Redis cache service").unwrap_or(&0);
                    let priority = if avoided > preferred {
                        Priority::Low
                    } else {
                        Priority::High
                    };

                    suggestions.push(Suggestion {
                        issue: format!("RAG queries averaging {avg_rag:.0}ms (slow)"),
                        suggestion: "Add Redis cache to speed up repeated queries".into(),
                        expected_improvement: format!(
                            "50-80% faster (from {avg_rag:.0}ms to ~100ms)"
                        ),
                        action: "Add Redis cache service".into(),
                        priority,
                        learning_adjusted: preferred > 0 || avoided > 0,
                    });
                }
            }
        }

        if inner.queries.len() > 50 {
            let unique: std::collections::HashSet<&str> =
                inner.queries.iter().map(|q| q.query.as_str()).collect();
            let repeat_rate = 1.0 - (unique.len() as f64 / inner.queries.len() as f64);
            if repeat_rate > 0.3 {
                let cache_score: u32 = inner
                    .preferred_actions
                    .iter()
                    .filter(|(k, _)| k.to_lowercase().contains("cache") || k.to_lowercase().contains("redis"))
                    .map(|(_, v)| *v)
                    .sum();
                let priority = if cache_score > 2 { Priority::High } else { Priority::Medium };
                suggestions.push(Suggestion {
                    issue: format!("High query repetition detected ({:.0}% repeated)", repeat_rate * 100.0),
                    suggestion: "Add Redis cache - many queries are repeated".into(),
                    expected_improvement: format!(
                        "Cache {:.0}% of queries, reduce load significantly",
                        repeat_rate * 100.0
                    ),
                    action: "Add Redis cache service".into(),
                    priority,
                    learning_adjusted: cache_score > 0,
                });
            }
        }

        for (service, count) in inner.errors.clone() {
            if count > 5 {
                issues.push(Issue {
                    kind: "reliability".into(),
                    service: service.clone(),
                    metric: "errors".into(),
                    value: count as f64,
                    threshold: 5.0,
                });
                suggestions.push(Suggestion {
                    issue: format!("{service} has {count} errors"),
                    suggestion: format!("Investigate {service} service logs and restart if needed"),
                    expected_improvement: "Improved reliability".into(),
                    action: format!("Check {service} service health"),
                    priority: Priority::High,
                    learning_adjusted: false,
                });
            }
        }

        let docker_queries = *inner.patterns.get("docker").unwrap_or(&0);
        if docker_queries > 10 {
            let avoided = *inner
                .avoided_actions
                .get("Optimize RAG for Docker content")
                .unwrap_or(&0);
            if avoided == 0 {
                suggestions.push(Suggestion {
                    issue: format!("Many Docker-related queries ({docker_queries} times)"),
                    suggestion: "Create Docker-specific collection for faster, more accurate searches".into(),
                    expected_improvement: "30-40% faster Docker queries, better relevance".into(),
                    action: "Optimize RAG for Docker content".into(),
                    priority: Priority::Low,
                    learning_adjusted: false,
                });
            }
        }

        let redis_queries = *inner.patterns.get("redis").unwrap_or(&0);
        if redis_queries > 5 {
            let dismissed = inner
                .suggestions_history
                .iter()
                .any(|s| s.outcome == SuggestionOutcome::Dismissed && s.action.to_lowercase().contains("redis"));
            if !dismissed {
                suggestions.push(Suggestion {
                    issue: format!("Frequent Redis queries ({redis_queries} times)"),
                    suggestion: "Add Redis service to the stack for experimentation".into(),
                    expected_improvement: "Enable Redis caching and hands-on learning".into(),
                    action: "Add Redis cache service".into(),
                    priority: Priority::Medium,
                    learning_adjusted: true,
                });
            }
        }

        suggestions.sort_by_key(|s| match s.priority {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        });

        let health_score = Self::health_score(&inner.latencies, &inner.errors);
        let insights = Self::usage_insights(&inner.queries, &inner.patterns);
        let learning_applied = suggestions.iter().any(|s| s.learning_adjusted);

        let analysis = Analysis {
            issues,
            suggestions,
            health_score,
            insights,
            learning_applied,
        };
        inner.analysis_cache = Some((Instant::now(), analysis.clone()));
        analysis
    }

    fn health_score(latencies: &HashMap<String, Vec<u64>>, errors: &HashMap<String, u32>) -> i32 {
        let mut score: i32 = 100;
        for lats in latencies.values() {
            if lats.is_empty() {
                continue;
            }
            let avg = lats.iter().sum::<u64>() as f64 / lats.len() as f64;
            if avg > 500.0 {
                score -= 10;
            } else if avg > 300.0 {
                score -= 5;
            }
        }
        let total_errors: u32 = errors.values().sum();
        if total_errors > 10 {
            score -= 20;
        } else if total_errors > 5 {
            score -= 10;
        }
        score.max(0)
    }

    fn usage_insights(queries: &[MetricSample], patterns: &HashMap<String, u32>) -> Vec<String> {
        let mut insights = Vec::new();
        if queries.is_empty() {
            return insights;
        }

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for q in queries {
            *counts.entry(q.service.as_str()).or_insert(0) += 1;
        }
        if let Some((service, count)) = counts.iter().max_by_key(|(_, c)| **c) {
            insights.push(format!("Most used service: {service} ({count} queries)"));
        }

        if let Some((topic, count)) = patterns.iter().max_by_key(|(_, c)| **c) {
            insights.push(format!("Top topic: '{topic}' ({count} mentions)"));
        }

        if queries.len() > 10 {
            let recent: Vec<u64> = queries[queries.len() - 10..].iter().map(|q| q.latency_ms).collect();
            let older: Vec<u64> = if queries.len() > 20 {
                queries[queries.len() - 20..queries.len() - 10]
                    .iter()
                    .map(|q| q.latency_ms)
                    .collect()
            } else {
                recent.clone()
            };
            let recent_avg = recent.iter().sum::<u64>() as f64 / recent.len() as f64;
            let older_avg = older.iter().sum::<u64>() as f64 / older.len() as f64;
            if recent_avg < older_avg * 0.9 {
                insights.push(format!("Performance improving: {older_avg:.0}ms -> {recent_avg:.0}ms"));
            } else if recent_avg > older_avg * 1.1 {
                insights.push(format!("Performance degrading: {older_avg:.0}ms -> {recent_avg:.0}ms"));
            }
        }

        insights
    }

    pub async fn record_suggestion_outcome(&self, action: &str, outcome: SuggestionOutcome) {
        let mut inner = self.inner.write().await;
        inner.suggestions_history.push(SuggestionRecord {
            action: action.to_string(),
            outcome,
        });
        if inner.suggestions_history.len() > 100 {
            let drop = inner.suggestions_history.len() - 100;
            inner.suggestions_history.drain(0..drop);
        }
        match outcome {
            SuggestionOutcome::Applied => {
                *inner.preferred_actions.entry(action.to_string()).or_insert(0) += 1;
            }
            SuggestionOutcome::Dismissed => {
                *inner.avoided_actions.entry(action.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub async fn learning_insights(&self) -> LearningInsights {
        let inner = self.inner.read().await;
        if inner.suggestions_history.is_empty() {
            return LearningInsights {
                total_suggestions: 0,
                applied_count: 0,
                dismissed_count: 0,
                acceptance_rate: 0.0,
                insights: Vec::new(),
                preferred_actions: HashMap::new(),
                avoided_actions: HashMap::new(),
            };
        }

        let applied = inner
            .suggestions_history
            .iter()
            .filter(|s| s.outcome == SuggestionOutcome::Applied)
            .count();
        let dismissed = inner.suggestions_history.len() - applied;
        let acceptance_rate = applied as f64 / inner.suggestions_history.len() as f64;

        let mut insights = Vec::new();
        if let Some((action, count)) = inner.preferred_actions.iter().max_by_key(|(_, c)| **c) {
            insights.push(format!("User prefers: {action} (applied {count} times)"));
        }
        if let Some((action, count)) = inner.avoided_actions.iter().max_by_key(|(_, c)| **c) {
            insights.push(format!("User avoids: {action} (dismissed {count} times)"));
        }
        if inner.suggestions_history.len() > 5 {
            let recent = &inner.suggestions_history[inner.suggestions_history.len() - 5..];
            let recent_applied = recent.iter().filter(|s| s.outcome == SuggestionOutcome::Applied).count();
            let recent_rate = recent_applied as f64 / recent.len() as f64;
            if recent_rate > 0.7 {
                insights.push("User is actively accepting suggestions".into());
            } else if recent_rate < 0.3 {
                insights.push("User is cautious with suggestions".into());
            }
        }

        LearningInsights {
            total_suggestions: inner.suggestions_history.len(),
            applied_count: applied,
            dismissed_count: dismissed,
            acceptance_rate,
            insights,
            preferred_actions: inner.preferred_actions.clone(),
            avoided_actions: inner.avoided_actions.clone(),
        }
    }

    pub async fn detect_auto_healing_opportunities(&self) -> Vec<AutoHealOpportunity> {
        let inner = self.inner.read().await;
        let mut opportunities = Vec::new();

        for (service, count) in &inner.errors {
            if *count > 10 {
                opportunities.push(AutoHealOpportunity {
                    kind: "auto_heal".into(),
                    service: service.clone(),
                    issue: format!("High error rate: {count} errors"),
                    action: format!("Restart {service} service"),
                    confidence: "high".into(),
                    safe: true,
                });
            }
        }

        for (service, lats) in &inner.latencies {
            if lats.len() > 20 {
                let recent_avg = lats[lats.len() - 10..].iter().sum::<u64>() as f64 / 10.0;
                let older_avg = lats[lats.len() - 20..lats.len() - 10].iter().sum::<u64>() as f64 / 10.0;
                if older_avg > 0.0 && recent_avg > older_avg * 2.0 {
                    opportunities.push(AutoHealOpportunity {
                        kind: "auto_optimize".into(),
                        service: service.clone(),
                        issue: format!("Performance degraded: {older_avg:.0}ms -> {recent_avg:.0}ms"),
                        action: format!("Increase {service} memory"),
                        confidence: "medium".into(),
                        safe: true,
                    });
                }
            }
        }

        opportunities
    }

    pub async fn predict_future_issues(&self) -> Vec<Prediction> {
        let inner = self.inner.read().await;
        let mut predictions = Vec::new();

        for (service, lats) in &inner.latencies {
            if lats.len() > 30 {
                let window = &lats[lats.len() - 30..];
                let first_10 = window[0..10].iter().sum::<u64>() as f64 / 10.0;
                let last_10 = window[20..30].iter().sum::<u64>() as f64 / 10.0;
                if last_10 > first_10 * 1.2 {
                    let degradation_rate = (last_10 - first_10) / 20.0;
                    let queries_until_critical = if degradation_rate > 0.0 {
                        ((1000.0 - last_10) / degradation_rate) as i64
                    } else {
                        999
                    };
                    predictions.push(Prediction {
                        kind: "latency_degradation".into(),
                        service: Some(service.clone()),
                        current: last_10.round(),
                        trend: "increasing".into(),
                        predicted_critical_in: format!("{queries_until_critical} queries"),
                        recommended_action: format!("Increase {service} resources proactively"),
                        confidence: "medium".into(),
                        urgency: if queries_until_critical > 100 { "low".into() } else { "high".into() },
                    });
                }
            }
        }

        for (service, count) in &inner.errors {
            if *count > 3 {
                let recent: Vec<&MetricSample> = inner
                    .queries
                    .iter()
                    .rev()
                    .take(20)
                    .filter(|q| &q.service == service)
                    .collect();
                if recent.len() > 10 {
                    let recent_errors = recent.iter().filter(|q| !q.success).count();
                    let error_rate = recent_errors as f64 / recent.len() as f64;
                    if error_rate > 0.2 {
                        predictions.push(Prediction {
                            kind: "error_rate_increase".into(),
                            service: Some(service.clone()),
                            current: (error_rate * 100.0).round(),
                            trend: "increasing".into(),
                            predicted_critical_in: "soon".into(),
                            recommended_action: format!("Investigate {service} logs and prepare restart"),
                            confidence: "high".into(),
                            urgency: "high".into(),
                        });
                    }
                }
            }
        }

        if inner.queries.len() > 100 {
            let last_50 = &inner.queries[inner.queries.len() - 50..];
            let prev_50 = &inner.queries[inner.queries.len() - 100..inner.queries.len() - 50];
            let last_span = time_span_secs(last_50);
            let prev_span = time_span_secs(prev_50);
            if last_span > 0.0 && prev_span > 0.0 {
                let last_rate = 50.0 / last_span;
                let prev_rate = 50.0 / prev_span;
                if last_rate > prev_rate * 1.5 {
                    predictions.push(Prediction {
                        kind: "load_increase".into(),
                        service: None,
                        current: last_rate,
                        trend: "accelerating".into(),
                        predicted_critical_in: "10-20 minutes".into(),
                        recommended_action: "Scale up services or enable caching".into(),
                        confidence: "medium".into(),
                        urgency: "medium".into(),
                    });
                }
            }
        }

        predictions
    }

    pub async fn generate_action_plan(&self) -> ActionPlan {
        let predictions = self.predict_future_issues().await;
        let analysis = self.analyze_performance().await;

        let mut immediate = Vec::new();
        let mut planned = Vec::new();

        for pred in &predictions {
            if pred.urgency == "high" {
                immediate.push(pred.recommended_action.clone());
            } else {
                planned.push(pred.recommended_action.clone());
            }
        }
        for issue in &analysis.issues {
            immediate.push(format!("Address {} {} issue", issue.service, issue.metric));
        }
        for suggestion in &analysis.suggestions {
            if suggestion.priority == Priority::High {
                immediate.push(suggestion.action.clone());
            } else {
                planned.push(suggestion.action.clone());
            }
        }

        let total_actions = immediate.len() + planned.len();
        ActionPlan {
            predictions,
            requires_attention: !immediate.is_empty(),
            immediate_actions: immediate,
            planned_actions: planned,
            total_actions,
        }
    }
}

fn time_span_secs(queries: &[MetricSample]) -> f64 {
    if queries.len() < 2 {
        return 0.0;
    }
    let first = queries[0].timestamp;
    let last = queries[queries.len() - 1].timestamp;
    (last - first).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MetricsConfig {
        MetricsConfig {
            global_window: 1000,
            per_service_window: 100,
            insights_ttl: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn health_score_degrades_with_errors() {
        let store = MetricsStore::new(config());
        for _ in 0..12 {
            store.record_query("rag", "docker setup", 100, false).await;
        }
        let analysis = store.analyze_performance().await;
        assert!(analysis.health_score <= 80);
    }

    #[tokio::test]
    async fn preference_learning_demotes_avoided_action() {
        let store = MetricsStore::new(config());
        for _ in 0..10 {
            store.record_query("rag", "query", 600, true).await;
        }
        store
            .record_suggestion_outcome("Add Redis cache service", SuggestionOutcome::Dismissed)
            .await;
        let analysis = store.analyze_performance().await;
        let redis_suggestion = analysis
            .suggestions
            .iter()
            .find(|s| s.action == "Add Redis cache service");
        assert!(matches!(redis_suggestion.map(|s| s.priority), Some(Priority::Low)));
    }
}
