//! Converts (intent, pattern, risk, history, context) into an action verdict.

use tokio::sync::RwLock;

use crate::types::{Entities, Intent, Verdict, VerdictAction};

const HIGH_RISK_PATTERNS: &[&str] = &["delete", "drop", "remove", "modify_production"];
const LOW_RISK_PATTERNS: &[&str] = &["health_check", "analysis", "metrics"];
const SAFE_ZONES: &[&str] = &["playground/", "generated/", "experiments/", "demos/", "examples/"];
const CODE_CREATION_KEYWORDS: &[&str] = &["script", "code", "program", "game", "app", "function"];
const DANGEROUS_TARGETS: &[&str] = &["production", "system", "config", "/etc/", "/var/", "docker-compose"];

const REQUIRE_BACKUP: &[&str] = &["add_service", "add_cache", "modify_config", "modify_production", "create_resource"];
const REQUIRE_VALIDATION: &[&str] = &["generate_config", "modify_architecture", "modify_production"];
const MAX_RETRIES: u32 = 3;

pub struct DecisionContext<'a> {
    pub intent: Intent,
    pub message: &'a str,
    pub pattern: &'a str,
    pub historical_success_rate: f64,
    pub entities: &'a Entities,
    pub retrieval_context_available: bool,
}

struct DecisionRecord {
    action: VerdictAction,
    confidence: f64,
}

pub struct DecisionEngine {
    history: RwLock<Vec<DecisionRecord>>,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(Vec::new()),
        }
    }

    pub async fn make_decision(&self, ctx: &DecisionContext<'_>) -> Verdict {
        let mut reasoning = Vec::new();
        let lower = ctx.message.to_lowercase();
        let (mut action, mut confidence): (VerdictAction, f64);

        if ctx.intent.is_actionable() {
            if ctx.intent == Intent::Create {
                let is_in_safe_zone = SAFE_ZONES.iter().any(|z| lower.contains(z));
                let is_code_creation = CODE_CREATION_KEYWORDS.iter().any(|k| lower.contains(k));
                let is_dangerous = DANGEROUS_TARGETS.iter().any(|t| lower.contains(t));
                if is_in_safe_zone || (is_code_creation && !is_dangerous) {
                    reasoning.push("Code creation without dangerous targets - auto-approved".to_string());
                    return self.finish(VerdictAction::AutoExecute, 0.95, reasoning, ctx).await;
                }
            }

            let is_high_risk = HIGH_RISK_PATTERNS.iter().any(|r| lower.contains(r));
            let is_low_risk = LOW_RISK_PATTERNS.contains(&ctx.pattern);

            if is_high_risk {
                confidence = 0.3;
                reasoning.push("High-risk operation detected - requires manual approval".to_string());
                action = VerdictAction::RequireApproval;
            } else if is_low_risk {
                confidence = 0.9;
                reasoning.push("Low-risk operation - safe for auto-execution".to_string());
                action = VerdictAction::AutoExecute;
            } else if ctx.historical_success_rate >= 90.0 {
                confidence = 0.85;
                reasoning.push(format!(
                    "High historical success rate ({:.0}%)",
                    ctx.historical_success_rate
                ));
                action = VerdictAction::AutoExecute;
            } else if ctx.historical_success_rate >= 70.0 {
                confidence = 0.7;
                reasoning.push(format!(
                    "Moderate success rate ({:.0}%)",
                    ctx.historical_success_rate
                ));
                action = VerdictAction::SuggestExecute;
            } else {
                confidence = 0.5;
                reasoning.push(format!(
                    "Low success rate ({:.0}%) - recommend review",
                    ctx.historical_success_rate
                ));
                action = VerdictAction::RequireApproval;
            }

            if ctx.retrieval_context_available {
                confidence = (confidence + 0.1).min(1.0);
                reasoning.push("Retrieval context available - increased confidence".to_string());
            }
        } else if ctx.intent == Intent::Query {
            confidence = 0.95;
            reasoning.push("Query intent - safe to respond".to_string());
            action = VerdictAction::Respond;
        } else if ctx.intent == Intent::Analyze {
            confidence = 0.9;
            reasoning.push("Analysis intent - safe to execute".to_string());
            action = VerdictAction::AutoExecute;
        } else {
            confidence = 0.6;
            reasoning.push("Generic intent - moderate confidence".to_string());
            action = VerdictAction::SuggestExecute;
        }

        self.finish(action, confidence, reasoning, ctx).await
    }

    async fn finish(
        &self,
        action: VerdictAction,
        confidence: f64,
        mut reasoning: Vec<String>,
        ctx: &DecisionContext<'_>,
    ) -> Verdict {
        let mut safety_steps = Vec::new();
        if REQUIRE_BACKUP.contains(&ctx.pattern) {
            safety_steps.push("backup".to_string());
            reasoning.push("Backup required for this operation type".to_string());
        }
        if REQUIRE_VALIDATION.contains(&ctx.pattern) {
            safety_steps.push("validation".to_string());
            reasoning.push("Validation required for this operation type".to_string());
        }

        let optimization_recommended = ctx.historical_success_rate < 80.0;
        if optimization_recommended {
            reasoning.push("Success rate below threshold - optimization recommended".to_string());
        }

        let mut history = self.history.write().await;
        history.push(DecisionRecord { action, confidence });
        if history.len() > 1000 {
            history.remove(0);
        }

        Verdict {
            action,
            confidence,
            reasoning,
            required_safety_steps: safety_steps,
            optimization_recommended,
        }
    }

    /// Decides whether a step, given the running context, should be skipped,
    /// rewritten, or executed as proposed.
    pub fn evaluate_step(&self, step: &str, backup_created: bool) -> StepDecision {
        let lower = step.to_lowercase();
        if lower.contains("backup") && backup_created {
            return StepDecision::Skip("Backup already created".to_string());
        }
        if lower.contains("delete") || lower.contains("drop") {
            return StepDecision::Modify(format!("Safely {step} with backup"));
        }
        StepDecision::Execute
    }

    pub fn should_retry(&self, attempt: u32, error: &str) -> bool {
        if attempt >= MAX_RETRIES {
            return false;
        }
        let lower = error.to_lowercase();
        let transient = ["timeout", "connection", "temporary", "unavailable"];
        let permanent = ["not found", "invalid", "forbidden", "unauthorized"];
        if transient.iter().any(|e| lower.contains(e)) {
            return true;
        }
        if permanent.iter().any(|e| lower.contains(e)) {
            return false;
        }
        true
    }

    pub async fn insights(&self) -> DecisionInsights {
        let history = self.history.read().await;
        let total = history.len();
        if total == 0 {
            return DecisionInsights {
                total_decisions: 0,
                avg_confidence: 0.0,
            };
        }
        let avg_confidence = history.iter().map(|d| d.confidence).sum::<f64>() / total as f64;
        DecisionInsights {
            total_decisions: total,
            avg_confidence: (avg_confidence * 100.0).round() / 100.0,
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepDecision {
    Execute,
    Skip(String),
    Modify(String),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DecisionInsights {
    pub total_decisions: usize,
    pub avg_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(intent: Intent, message: &'a str, pattern: &'a str, entities: &'a Entities) -> DecisionContext<'a> {
        DecisionContext {
            intent,
            message,
            pattern,
            historical_success_rate: 0.0,
            entities,
            retrieval_context_available: false,
        }
    }

    #[tokio::test]
    async fn high_risk_keyword_requires_approval() {
        let engine = DecisionEngine::new();
        let entities = Entities::default();
        let verdict = engine
            .make_decision(&ctx(Intent::Execute, "delete the production database", "generic", &entities))
            .await;
        assert_eq!(verdict.action, VerdictAction::RequireApproval);
    }

    #[tokio::test]
    async fn low_risk_pattern_auto_executes() {
        let engine = DecisionEngine::new();
        let entities = Entities::default();
        let verdict = engine
            .make_decision(&ctx(Intent::Execute, "check health", "health_check", &entities))
            .await;
        assert_eq!(verdict.action, VerdictAction::AutoExecute);
    }

    #[tokio::test]
    async fn add_service_pattern_requires_backup() {
        let engine = DecisionEngine::new();
        let entities = Entities::default();
        let verdict = engine
            .make_decision(&ctx(Intent::Modify, "add a new service", "add_service", &entities))
            .await;
        assert!(verdict.required_safety_steps.contains(&"backup".to_string()));
    }

    #[test]
    fn retry_policy_distinguishes_transient_from_permanent() {
        let engine = DecisionEngine::new();
        assert!(engine.should_retry(0, "connection timeout"));
        assert!(!engine.should_retry(0, "403 forbidden"));
        assert!(!engine.should_retry(3, "connection timeout"));
    }
}
