//! Composes every subsystem into the single entry point that answers one
//! inbound request: intent, retrieval context, planning, the
//! execute-or-suggest gate, execution, and learning feedback.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::adaptive_planner::AdaptivePlanner;
use crate::backends::Backends;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::OrchestratorConfig;
use crate::decision_engine::{DecisionContext, DecisionEngine};
use crate::decomposer::{decompose_task, extract_target_path};
use crate::execution_engine::ExecutionEngine;
use crate::intent::{classify_intent, derive_pattern, extract_entities};
use crate::knowledge_store::KnowledgeStore;
use crate::meta_learning::{MetaLearningEngine, RecommendationContext};
use crate::metrics::MetricsStore;
use crate::predictive_engine::PredictiveEngine;
use crate::self_improvement::SelfImprovementEngine;
use crate::self_modification::SelfModificationGate;
use crate::tree_of_thought::TreeOfThoughtSolver;
use crate::types::{
    Entities, ExecutionStatus, ExecutionSummary, FailurePrediction, Intent, Message, SafetyLevel,
    Session, StepData, StepResult, Verdict, VerdictAction,
};

const DANGEROUS_KEYWORDS: &[&str] = &["delete", "remove", "drop"];

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub task_id: String,
    pub steps: Vec<String>,
    pub original_steps: Vec<String>,
    pub optimizations_applied: bool,
    pub predicted_failure_points: Vec<FailurePrediction>,
    pub estimated_duration_secs: u64,
    pub requires_approval: bool,
    pub safety_level: SafetyLevel,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub results: Vec<StepResult>,
    pub summary: ExecutionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub conversational: bool,
    pub task_execution: bool,
    pub autonomous: bool,
    pub intelligent_planning: bool,
    pub context_aware: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorResponse {
    pub session_id: String,
    pub response: String,
    pub intent: Intent,
    pub entities: Entities,
    pub retrieval_context_used: usize,
    pub execution_plan: Option<ExecutionPlan>,
    pub task_result: Option<TaskResult>,
    pub latency_ms: f64,
    pub capabilities: Capabilities,
}

/// Every long-lived subsystem the orchestrator composes, plus the session
/// map. One instance lives for the life of the process.
pub struct OrchestratorContainer {
    pub config: OrchestratorConfig,
    pub backends: Arc<Backends>,
    pub breaker: Arc<CircuitBreaker>,
    pub metrics: Arc<MetricsStore>,
    pub execution: Arc<ExecutionEngine>,
    pub planner: Arc<AdaptivePlanner>,
    pub decisions: Arc<DecisionEngine>,
    pub tree_of_thought: Arc<TreeOfThoughtSolver>,
    pub meta_learning: Arc<MetaLearningEngine>,
    pub predictive: Arc<PredictiveEngine>,
    pub self_improvement: Arc<SelfImprovementEngine>,
    pub self_modification: Arc<SelfModificationGate>,
    pub knowledge: Arc<KnowledgeStore>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl OrchestratorContainer {
    pub fn new(config: OrchestratorConfig) -> crate::error::Result<Self> {
        let backends = Arc::new(Backends::new(
            config.backends.clone(),
            config.http_pool.max_idle,
            config.http_pool.max_idle_per_host,
        )?);
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker));
        let metrics = Arc::new(MetricsStore::new(config.metrics));
        let execution = Arc::new(ExecutionEngine::new(backends.clone(), breaker.clone(), metrics.clone()));
        let self_modification = Arc::new(SelfModificationGate::new(config.backup_dir.clone()));

        Ok(Self {
            config,
            backends,
            breaker,
            metrics,
            execution,
            planner: Arc::new(AdaptivePlanner::new()),
            decisions: Arc::new(DecisionEngine::new()),
            tree_of_thought: Arc::new(TreeOfThoughtSolver::new()),
            meta_learning: Arc::new(MetaLearningEngine::new()),
            predictive: Arc::new(PredictiveEngine::new()),
            self_improvement: Arc::new(SelfImprovementEngine::new()),
            self_modification,
            knowledge: Arc::new(KnowledgeStore::new()),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    async fn session(&self, session_id: Option<String>) -> String {
        let mut sessions = self.sessions.write().await;
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        sessions.entry(id.clone()).or_insert_with(Session::new);
        id
    }

    async fn append_messages(&self, session_id: &str, user_text: &str, assistant_text: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.append(Message::user(user_text));
            session.append(Message::assistant(assistant_text));
        }
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Answers one inbound request end to end, per the control-flow spec:
    /// intent, retrieval, planning, the execute-or-suggest gate, execution,
    /// and learning feedback.
    pub async fn handle_request(
        &self,
        message: &str,
        session_id: Option<String>,
        auto_execute: bool,
    ) -> OrchestratorResponse {
        let started = std::time::Instant::now();
        let session_id = self.session(session_id).await;

        let intent = classify_intent(message);
        let entities = extract_entities(message);

        let retrieval_docs = match self.breaker.call("rag", || self.backends.query_retrieval(message, 3)).await {
            Ok(response) => response.documents,
            Err(_) => Vec::new(),
        };

        let mut execution_plan = None;
        let mut verdict: Option<Verdict> = None;
        let mut optimized_steps: Vec<String> = Vec::new();
        let pattern = derive_pattern(message);

        if intent.is_actionable() {
            let task_id = Uuid::new_v4().to_string();
            let original_steps = decompose_task(message);
            let advice = self.planner.suggest_improvements(message, &original_steps).await;

            let decision_ctx = DecisionContext {
                intent,
                message,
                pattern: &advice.pattern,
                historical_success_rate: advice.historical_success_rate,
                entities: &entities,
                retrieval_context_available: !retrieval_docs.is_empty(),
            };
            let plan_verdict = self.decisions.make_decision(&decision_ctx).await;

            let mut steps = self.planner.optimize_steps(&original_steps);
            if plan_verdict.required_safety_steps.iter().any(|s| s == "backup")
                && !steps.iter().any(|s| s.to_lowercase().contains("backup"))
            {
                steps.insert(0, "Create backup point".to_string());
            }
            if plan_verdict.required_safety_steps.iter().any(|s| s == "validation")
                && !steps.iter().any(|s| s.to_lowercase().contains("valid"))
            {
                steps.push("Validate changes".to_string());
            }

            let predicted_failure_points = self.predictive.predict_failure_points(&steps);
            let safety_level = if DANGEROUS_KEYWORDS.iter().any(|k| message.to_lowercase().contains(k)) {
                SafetyLevel::High
            } else {
                SafetyLevel::Medium
            };
            let requires_approval = !auto_execute || plan_verdict.action == VerdictAction::RequireApproval;
            let estimated_duration_secs = steps.len() as u64 * 2;
            let optimizations_applied = steps != original_steps;

            optimized_steps = steps.clone();
            verdict = Some(plan_verdict.clone());

            execution_plan = Some(ExecutionPlan {
                task_id,
                optimizations_applied,
                steps,
                original_steps,
                predicted_failure_points,
                estimated_duration_secs,
                requires_approval,
                safety_level,
                verdict: plan_verdict,
            });
        }

        let should_execute = auto_execute
            && execution_plan.is_some()
            && verdict.as_ref().map(|v| v.action != VerdictAction::RequireApproval).unwrap_or(false);

        let mut task_result = None;
        if should_execute {
            let task_id = execution_plan.as_ref().unwrap().task_id.clone();
            let context = StepData {
                request_text: Some(message.to_string()),
                target_path: if intent == Intent::Create { extract_target_path(message) } else { None },
                ..StepData::default()
            };
            let results = self.execution.execute_task(&optimized_steps, context).await;
            let summary = self.execution.execution_summary(&results);

            self.planner.record_execution(message, &results, &summary).await;

            let learning_ctx = RecommendationContext {
                task_type: &pattern,
                has_errors: summary.failed > 0,
                has_rag_context: !retrieval_docs.is_empty(),
            };
            let strategy = self.meta_learning.recommend_learning_strategy(&learning_ctx).await;
            self.meta_learning
                .record_learning_event(&strategy, summary.status == ExecutionStatus::Completed)
                .await;

            let backends = self.backends.clone();
            let knowledge = self.knowledge.clone();
            let task_id_clone = task_id.clone();
            let message_owned = message.to_string();
            let summary_clone = summary.clone();
            let results_clone = results.clone();
            tokio::spawn(async move {
                let _ = knowledge
                    .store_execution_result(&backends, &task_id_clone, &message_owned, &summary_clone, &results_clone)
                    .await;
            });

            task_result = Some(TaskResult { task_id, results, summary });
        }

        let response_text = match (&task_result, &execution_plan) {
            (Some(result), _) => format!(
                "Task {:?}: {}/{} steps successful ({}%). Task ID: {}",
                result.summary.status, result.summary.successful, result.summary.total, result.summary.success_rate, result.task_id
            ),
            (None, Some(plan)) => format!(
                "Execution plan ready: {} steps. Set auto_execute=true to run.",
                plan.steps.len()
            ),
            (None, None) => {
                if let Some(doc) = retrieval_docs.first() {
                    let preview: String = doc.content.chars().take(200).collect();
                    format!("Based on your history: {preview}... (found {} relevant documents)", retrieval_docs.len())
                } else {
                    format!("Understood your {} request.", intent.as_str())
                }
            }
        };

        self.append_messages(&session_id, message, &response_text).await;

        OrchestratorResponse {
            session_id,
            response: response_text,
            intent,
            entities,
            retrieval_context_used: retrieval_docs.len(),
            execution_plan,
            task_result,
            latency_ms: (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
            capabilities: Capabilities {
                conversational: true,
                task_execution: true,
                autonomous: auto_execute,
                intelligent_planning: true,
                context_aware: !retrieval_docs.is_empty(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> OrchestratorContainer {
        OrchestratorContainer::new(OrchestratorConfig::from_env()).unwrap()
    }

    #[tokio::test]
    async fn query_intent_returns_conversational_response_without_plan() {
        let container = container();
        let response = container.handle_request("what is the current status", None, false).await;
        assert_eq!(response.intent, Intent::Query);
        assert!(response.execution_plan.is_none());
    }

    #[tokio::test]
    async fn actionable_intent_without_auto_execute_yields_plan_preview() {
        let container = container();
        let response = container.handle_request("check system health", None, false).await;
        assert!(response.execution_plan.is_some());
        assert!(response.task_result.is_none());
        assert!(response.response.contains("Execution plan ready"));
    }

    #[tokio::test]
    async fn session_id_is_stable_across_two_requests() {
        let container = container();
        let first = container.handle_request("hello", None, false).await;
        let second = container
            .handle_request("hello again", Some(first.session_id.clone()), false)
            .await;
        assert_eq!(first.session_id, second.session_id);
        let session = container.get_session(&first.session_id).await.unwrap();
        assert_eq!(session.messages.len(), 4);
    }
}
