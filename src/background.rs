//! Long-lived loops the binary may spawn alongside the request path. Both
//! are read-mostly over the shared container and never block a request.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::orchestrator::OrchestratorContainer;

pub const DEFAULT_OPTIMIZER_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PROACTIVE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Runs the metrics store's auto-heal detector and the self-improvement
/// engine's analysis on a fixed cadence, logging any opportunity it finds.
pub async fn run_autonomous_optimizer(container: Arc<OrchestratorContainer>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let opportunities = container.metrics.detect_auto_healing_opportunities().await;
        for o in &opportunities {
            info!(service = %o.service, action = %o.action, confidence = %o.confidence, "auto-heal opportunity detected");
        }

        let stats = container.metrics.stats().await;
        let learning = container.planner.learning_insights().await;
        let decisions = container.decisions.insights().await;
        let found = container
            .self_improvement
            .analyze_system_performance(&stats, &learning, &decisions)
            .await;
        for o in found.iter().filter(|o| o.confidence >= 0.8) {
            info!(area = %o.area, confidence = o.confidence, "self-improvement opportunity");
        }
    }
}

/// Runs the predictive engine's trend analysis and the metrics store's
/// action-plan generator on a fixed cadence.
pub async fn run_proactive_loop(container: Arc<OrchestratorContainer>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let stats = container.metrics.stats().await;
        let learning = container.planner.learning_insights().await;
        let predictions = container.predictive.analyze_trends(&stats, &learning).await;
        for p in &predictions {
            info!(kind = %p.prediction_type, probability = p.probability, "predictive trend");
        }

        let plan = container.metrics.generate_action_plan().await;
        info!(
            immediate = plan.immediate_actions.len(),
            planned = plan.planned_actions.len(),
            requires_attention = plan.requires_attention,
            "proactive action plan generated"
        );
    }
}
