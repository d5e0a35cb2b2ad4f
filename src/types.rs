//! Core data model shared across the orchestrator's subsystems.

use std::collections::HashMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// A conversation session. Append-only: messages are never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub context: HashMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
            context: HashMap::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.last_activity = message.timestamp;
        self.messages.push(message);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound request to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub message: String,
    pub session_id: Option<String>,
    pub auto_execute: bool,
}

/// Intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Query,
    Execute,
    Modify,
    Analyze,
    Create,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::Execute => "execute",
            Intent::Modify => "modify",
            Intent::Analyze => "analyze",
            Intent::Create => "create",
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, Intent::Execute | Intent::Modify | Intent::Create)
    }
}

/// Extracted entities, grouped by fixed category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    pub services: Vec<String>,
    pub actions: Vec<String>,
    pub metrics: Vec<String>,
    pub technologies: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.actions.is_empty()
            && self.metrics.is_empty()
            && self.technologies.is_empty()
    }
}

/// A stable short classification of a request, used as the key for adaptive learning.
pub type Pattern = String;

/// Classification of a single step string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Backup,
    Validation,
    Generation,
    Application,
    Verification,
    HealthCheck,
    Metrics,
    Analysis,
    Generic,
}

impl StepType {
    /// Priority band used by the adaptive planner's reordering pass. Lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            StepType::Backup => 0,
            StepType::Validation => 1,
            StepType::Generation => 2,
            StepType::Application => 3,
            StepType::Verification => 4,
            StepType::HealthCheck => 5,
            StepType::Metrics => 6,
            StepType::Analysis => 7,
            StepType::Generic => 8,
        }
    }

    pub fn classify(step: &str) -> StepType {
        let s = step.to_lowercase();
        if s.contains("backup") {
            StepType::Backup
        } else if s.contains("valid") || s.contains("safety") {
            StepType::Validation
        } else if s.contains("generat") || s.contains("design") || s.contains("creat") {
            StepType::Generation
        } else if s.contains("apply") || s.contains("implement") || s.contains("deploy") {
            StepType::Application
        } else if s.contains("verify") || s.contains("confirm") {
            StepType::Verification
        } else if s.contains("health") || s.contains("check status") {
            StepType::HealthCheck
        } else if s.contains("metric") || s.contains("measure") {
            StepType::Metrics
        } else if s.contains("analy") {
            StepType::Analysis
        } else {
            StepType::Generic
        }
    }
}

/// Risk level associated with a plan or a self-modification proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
}

/// Action chosen by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictAction {
    Respond,
    AutoExecute,
    SuggestExecute,
    RequireApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub action: VerdictAction,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub required_safety_steps: Vec<String>,
    pub optimization_recommended: bool,
}

/// A predicted failure point for one step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub step: String,
    pub probability: f64,
    pub mitigation: String,
}

/// An ordered, annotated execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: String,
    pub pattern: Pattern,
    pub steps: Vec<String>,
    pub predicted_failure_points: Vec<FailurePrediction>,
    pub safety_level: SafetyLevel,
    pub verdict: Verdict,
    pub requires_approval: bool,
    pub estimated_duration_secs: u64,
}

/// Status of a single step's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Success,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Completed)
    }
}

/// Fields a successful step may hand forward to later steps in the same plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepData {
    pub change_id: Option<String>,
    pub rollback_id: Option<String>,
    pub generated_code: Option<String>,
    pub target_path: Option<String>,
    pub backup_created: Option<bool>,
    /// Seeded once from the originating request by the orchestrator; no step
    /// produces it, so it isn't part of `merge_into`'s carried-field set.
    pub request_text: Option<String>,
    pub message: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl StepData {
    pub fn merge_into(&self, context: &mut StepData) {
        if self.change_id.is_some() {
            context.change_id = self.change_id.clone();
        }
        if self.rollback_id.is_some() {
            context.rollback_id = self.rollback_id.clone();
        }
        if self.generated_code.is_some() {
            context.generated_code = self.generated_code.clone();
        }
        if self.target_path.is_some() {
            context.target_path = self.target_path.clone();
        }
        if self.backup_created.is_some() {
            context.backup_created = self.backup_created;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub status: StepStatus,
    pub data: StepData,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate status over a plan's StepResults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub status: ExecutionStatus,
}

impl ExecutionSummary {
    pub fn from_results(results: &[StepResult]) -> Self {
        let total = results.len();
        let failed = results.iter().filter(|r| r.status == StepStatus::Failed).count();
        let successful = total - failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            (10.0 * 100.0 * successful as f64 / total as f64).round() / 10.0
        };
        let status = if failed == 0 {
            ExecutionStatus::Completed
        } else if successful > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        };
        Self {
            total,
            successful,
            failed,
            success_rate,
            status,
        }
    }
}

/// One sample recorded by the metrics store for an outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub service: String,
    pub query: String,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Circuit breaker state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateKind {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub state: CircuitStateKind,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<SystemTime>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: CircuitStateKind::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
        }
    }
}

/// Status of one Tree-of-Thought branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtBranch {
    pub id: String,
    pub parent_id: Option<String>,
    pub step: String,
    pub reasoning: String,
    pub confidence: f64,
    pub status: BranchStatus,
    pub result: Option<StepResult>,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtTree {
    pub id: String,
    pub task: String,
    pub branches: HashMap<String, ThoughtBranch>,
    pub successful_path: Vec<String>,
}

impl ThoughtTree {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            branches: HashMap::new(),
            successful_path: Vec::new(),
        }
    }

    pub fn efficiency(&self) -> f64 {
        if self.branches.is_empty() {
            return 0.0;
        }
        let successful = self
            .branches
            .values()
            .filter(|b| b.status == BranchStatus::Success)
            .count();
        successful as f64 / self.branches.len() as f64
    }
}

/// Optional adjunct: a longer-lived goal tracked outside the per-request plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub priority: u8,
    pub status: GoalStatus,
    pub progress: f64,
    pub steps: Vec<String>,
    pub result: Option<String>,
}

impl Goal {
    pub fn new(description: impl Into<String>, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            priority,
            status: GoalStatus::Pending,
            progress: 0.0,
            steps: Vec::new(),
            result: None,
        }
    }
}
