//! Autonomous task orchestration core: intent analysis, adaptive planning,
//! and risk-graded execution over a small set of pluggable HTTP backends.

pub mod error;
pub mod types;

pub mod config;
pub mod circuit_breaker;
pub mod metrics;

pub mod intent;
pub mod decomposer;
pub mod adaptive_planner;
pub mod decision_engine;

pub mod backends;
pub mod execution_engine;
pub mod tree_of_thought;

pub mod meta_learning;
pub mod predictive_engine;
pub mod self_improvement;
pub mod self_modification;

pub mod knowledge_store;
pub mod orchestrator;
pub mod background;

#[cfg(feature = "web-server")]
pub mod http;

pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::orchestrator::{Capabilities, ExecutionPlan, OrchestratorContainer, OrchestratorResponse, TaskResult};
    pub use crate::types::{Entities, Intent};
}
