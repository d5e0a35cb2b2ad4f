//! Warp HTTP surface: one small uniform JSON API in front of the
//! orchestrator container, plus a per-client sliding-window rate limiter
//! and a uniform error-to-status-code mapping.

use std::collections::HashMap as StdHashMap;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::config::RateLimitConfig;
use crate::error::OrchestratorError;
use crate::orchestrator::OrchestratorContainer;
use crate::self_modification::ModificationType;
use crate::types::StepData;

#[derive(Debug)]
struct RateLimited;
impl warp::reject::Reject for RateLimited {}

#[derive(Debug)]
struct OrchestratorRejection(OrchestratorError);
impl warp::reject::Reject for OrchestratorRejection {}

/// Sliding window per client address, matching the circuit breaker's own
/// "count recent events, drop the old ones" shape.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<StdHashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(StdHashMap::new()),
        }
    }

    async fn check(&self, client: &str) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let entry = windows.entry(client.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) > self.config.window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() as u32 >= self.config.max_requests {
            return false;
        }
        entry.push_back(now);
        true
    }
}

fn with_container(
    container: Arc<OrchestratorContainer>,
) -> impl Filter<Extract = (Arc<OrchestratorContainer>,), Error = Infallible> + Clone {
    warp::any().map(move || container.clone())
}

fn rate_limited(
    limiter: Arc<RateLimiter>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::addr::remote()
        .and(warp::any().map(move || limiter.clone()))
        .and_then(|addr: Option<SocketAddr>, limiter: Arc<RateLimiter>| async move {
            let client = addr.map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string());
            if limiter.check(&client).await {
                Ok(())
            } else {
                Err(warp::reject::custom(RateLimited))
            }
        })
        .untuple_one()
}

#[derive(Debug, Deserialize)]
struct AutonomousRequest {
    message: String,
    session_id: Option<String>,
    #[serde(default)]
    auto_execute: bool,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolveRequest {
    task: String,
}

#[derive(Debug, Deserialize)]
struct ResetCircuitRequest {
    target: String,
}

#[derive(Debug, Deserialize)]
struct ProposeRequest {
    file_path: String,
    modification_type: ModificationType,
    description: String,
}

#[derive(Debug, Deserialize)]
struct AutonomousImprovementRequest {
    #[serde(default)]
    decision_errors: u32,
    #[serde(default)]
    avg_latency_ms: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

async fn autonomous_handler(req: AutonomousRequest, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let response = container.handle_request(&req.message, req.session_id, req.auto_execute).await;
    Ok(warp::reply::json(&response))
}

async fn chat_handler(req: ChatRequest, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let response = container.handle_request(&req.message, req.session_id, false).await;
    Ok(warp::reply::json(&response))
}

async fn execute_handler(req: ExecuteRequest, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let results = container.execution.execute_task(&req.steps, StepData::default()).await;
    let summary = container.execution.execution_summary(&results);
    Ok(warp::reply::json(&serde_json::json!({ "results": results, "summary": summary })))
}

async fn status_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let health = container.backends.aggregate_health().await;
    Ok(warp::reply::json(&health))
}

async fn metrics_stats_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.metrics.stats().await))
}

async fn metrics_analysis_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.metrics.analyze_performance().await))
}

async fn metrics_health_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let analysis = container.metrics.analyze_performance().await;
    Ok(warp::reply::json(&serde_json::json!({ "health_score": analysis.health_score, "issues": analysis.issues })))
}

async fn metrics_insights_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.metrics.learning_insights().await))
}

async fn planning_predictions_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.predictive.get_predictive_insights().await))
}

async fn planning_action_plan_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.metrics.generate_action_plan().await))
}

async fn planning_execute_plan_handler(req: ExecuteRequest, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let steps = container.planner.optimize_steps(&req.steps);
    let results = container.execution.execute_task(&steps, StepData::default()).await;
    let summary = container.execution.execution_summary(&results);
    container.planner.record_execution("execute-plan", &results, &summary).await;
    Ok(warp::reply::json(&serde_json::json!({ "steps": steps, "results": results, "summary": summary })))
}

async fn resilience_states_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.breaker.all_states().await))
}

async fn resilience_reset_handler(req: ResetCircuitRequest, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    container.breaker.reset(&req.target).await;
    Ok(warp::reply::json(&serde_json::json!({ "reset": req.target })))
}

async fn tree_status_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.tree_of_thought.get_stats().await))
}

async fn tree_solve_handler(req: SolveRequest, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let result = container
        .tree_of_thought
        .solve_with_tree(&req.task, container.execution.as_ref(), StepData::default())
        .await;
    Ok(warp::reply::json(&result))
}

async fn tree_context_handler(tree_id: String, container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let context = container.tree_of_thought.get_successful_context(&tree_id).await;
    Ok(warp::reply::json(&serde_json::json!({ "tree_id": tree_id, "context": context })))
}

async fn self_modification_status_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.self_modification.get_stats().await))
}

async fn self_modification_propose_handler(
    req: ProposeRequest,
    container: Arc<OrchestratorContainer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let path = PathBuf::from(req.file_path);
    match container
        .self_modification
        .propose_modification(&path, req.modification_type, req.description)
        .await
    {
        Ok(proposal) => Ok(Box::new(warp::reply::json(&proposal))),
        Err(e) => Err(warp::reject::custom(OrchestratorRejection(e))),
    }
}

async fn self_modification_autonomous_handler(
    req: AutonomousImprovementRequest,
    container: Arc<OrchestratorContainer>,
) -> Result<impl Reply, Infallible> {
    let report = container
        .self_modification
        .autonomous_self_improvement(req.decision_errors, req.avg_latency_ms)
        .await;
    Ok(warp::reply::json(&report))
}

async fn learning_insights_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.meta_learning.get_meta_insights().await))
}

async fn learning_adaptive_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.planner.learning_insights().await))
}

async fn decisions_insights_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.decisions.insights().await))
}

async fn meta_learning_insights_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.meta_learning.analyze_learning_effectiveness().await))
}

async fn predictive_analyze_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let stats = container.metrics.stats().await;
    let learning = container.planner.learning_insights().await;
    let predictions = container.predictive.analyze_trends(&stats, &learning).await;
    Ok(warp::reply::json(&predictions))
}

async fn predictive_insights_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.predictive.get_predictive_insights().await))
}

async fn self_improvement_analyze_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    let stats = container.metrics.stats().await;
    let learning = container.planner.learning_insights().await;
    let decisions = container.decisions.insights().await;
    let opportunities = container.self_improvement.analyze_system_performance(&stats, &learning, &decisions).await;
    Ok(warp::reply::json(&opportunities))
}

async fn self_improvement_plan_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.self_improvement.generate_improvement_plan().await))
}

async fn self_improvement_insights_handler(container: Arc<OrchestratorContainer>) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&container.self_improvement.get_improvement_insights().await))
}

fn json_body<T: for<'de> Deserialize<'de> + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(1024 * 64).and(warp::body::json())
}

/// Builds the full route tree. `container` is cloned once per request via
/// the `with_container` filter, never rebuilt.
pub fn routes(
    container: Arc<OrchestratorContainer>,
    limiter: Arc<RateLimiter>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "OPTIONS"]);

    let limited = rate_limited(limiter);
    let api = warp::path("api");
    let with_ctr = with_container(container);

    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({ "status": "healthy", "service": "task-orchestrator-core" }))
    });

    let autonomous = api
        .and(warp::path("autonomous"))
        .and(warp::path::end())
        .and(warp::post())
        .and(limited.clone())
        .and(json_body())
        .and(with_ctr.clone())
        .and_then(autonomous_handler);

    let chat = api
        .and(warp::path("chat"))
        .and(warp::path::end())
        .and(warp::post())
        .and(limited.clone())
        .and(json_body())
        .and(with_ctr.clone())
        .and_then(chat_handler);

    let execute = api
        .and(warp::path("execute"))
        .and(warp::path::end())
        .and(warp::post())
        .and(limited.clone())
        .and(json_body())
        .and(with_ctr.clone())
        .and_then(execute_handler);

    let status = api
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_ctr.clone())
        .and_then(status_handler);

    let metrics = {
        let base = api.and(warp::path("metrics")).and(warp::get());
        base.clone()
            .and(warp::path("stats"))
            .and(with_ctr.clone())
            .and_then(metrics_stats_handler)
            .or(base.clone().and(warp::path("analysis")).and(with_ctr.clone()).and_then(metrics_analysis_handler))
            .or(base.clone().and(warp::path("health")).and(with_ctr.clone()).and_then(metrics_health_handler))
            .or(base.and(warp::path("insights")).and(with_ctr.clone()).and_then(metrics_insights_handler))
    };

    let planning = {
        let base = api.and(warp::path("planning"));
        base.clone()
            .and(warp::path("predictions"))
            .and(warp::get())
            .and(with_ctr.clone())
            .and_then(planning_predictions_handler)
            .or(base
                .clone()
                .and(warp::path("action-plan"))
                .and(warp::get())
                .and(with_ctr.clone())
                .and_then(planning_action_plan_handler))
            .or(base
                .and(warp::path("execute-plan"))
                .and(warp::post())
                .and(limited.clone())
                .and(json_body())
                .and(with_ctr.clone())
                .and_then(planning_execute_plan_handler))
    };

    let resilience = {
        let base = api.and(warp::path("resilience"));
        base.clone()
            .and(warp::path("circuit-breakers"))
            .and(warp::get())
            .and(with_ctr.clone())
            .and_then(resilience_states_handler)
            .or(base
                .and(warp::path("reset-circuit"))
                .and(warp::post())
                .and(limited.clone())
                .and(json_body())
                .and(with_ctr.clone())
                .and_then(resilience_reset_handler))
    };

    let tree_of_thought = {
        let base = api.and(warp::path("tree-of-thought"));
        base.clone()
            .and(warp::path("status"))
            .and(warp::path::end())
            .and(warp::get())
            .and(with_ctr.clone())
            .and_then(tree_status_handler)
            .or(base
                .clone()
                .and(warp::path("solve"))
                .and(warp::path::end())
                .and(warp::post())
                .and(limited.clone())
                .and(json_body())
                .and(with_ctr.clone())
                .and_then(tree_solve_handler))
            .or(base
                .and(warp::path("context"))
                .and(warp::path::param())
                .and(warp::path::end())
                .and(warp::get())
                .and(with_ctr.clone())
                .and_then(tree_context_handler))
    };

    let self_modification = {
        let base = api.and(warp::path("self-modification"));
        base.clone()
            .and(warp::path("status"))
            .and(warp::get())
            .and(with_ctr.clone())
            .and_then(self_modification_status_handler)
            .or(base
                .clone()
                .and(warp::path("propose"))
                .and(warp::post())
                .and(limited.clone())
                .and(json_body())
                .and(with_ctr.clone())
                .and_then(self_modification_propose_handler))
            .or(base
                .and(warp::path("autonomous"))
                .and(warp::post())
                .and(limited.clone())
                .and(json_body())
                .and(with_ctr.clone())
                .and_then(self_modification_autonomous_handler))
    };

    let learning = {
        let base = api.and(warp::path("learning")).and(warp::get());
        base.clone()
            .and(warp::path("insights"))
            .and(with_ctr.clone())
            .and_then(learning_insights_handler)
            .or(base.and(warp::path("adaptive")).and(with_ctr.clone()).and_then(learning_adaptive_handler))
    };

    let decisions = api
        .and(warp::path("decisions"))
        .and(warp::path("insights"))
        .and(warp::get())
        .and(with_ctr.clone())
        .and_then(decisions_insights_handler);

    let meta_learning = api
        .and(warp::path("meta-learning"))
        .and(warp::path("insights"))
        .and(warp::get())
        .and(with_ctr.clone())
        .and_then(meta_learning_insights_handler);

    let predictive = {
        let base = api.and(warp::path("predictive")).and(warp::get());
        base.clone()
            .and(warp::path("analyze"))
            .and(with_ctr.clone())
            .and_then(predictive_analyze_handler)
            .or(base.and(warp::path("insights")).and(with_ctr.clone()).and_then(predictive_insights_handler))
    };

    let self_improvement = {
        let base = api.and(warp::path("self-improvement")).and(warp::get());
        base.clone()
            .and(warp::path("analyze"))
            .and(with_ctr.clone())
            .and_then(self_improvement_analyze_handler)
            .or(base.clone().and(warp::path("plan")).and(with_ctr.clone()).and_then(self_improvement_plan_handler))
            .or(base.and(warp::path("insights")).and(with_ctr.clone()).and_then(self_improvement_insights_handler))
    };

    health
        .or(autonomous)
        .or(chat)
        .or(execute)
        .or(status)
        .or(metrics)
        .or(planning)
        .or(resilience)
        .or(tree_of_thought)
        .or(self_modification)
        .or(learning)
        .or(decisions)
        .or(meta_learning)
        .or(predictive)
        .or(self_improvement)
        .with(cors)
        .recover(handle_rejection)
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if err.find::<RateLimited>().is_some() {
        (StatusCode::TOO_MANY_REQUESTS, "too many requests".to_string())
    } else if let Some(OrchestratorRejection(e)) = err.find::<OrchestratorRejection>() {
        let code = match e {
            OrchestratorError::CircuitOpen { .. } | OrchestratorError::Backend { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, e.to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "invalid request body".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };

    Ok(warp::reply::with_status(warp::reply::json(&ErrorBody { error: message }), code))
}
