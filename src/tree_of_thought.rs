//! Tree-of-Thought exploratory solver: generates several candidate next
//! steps per depth, evaluates them concurrently, keeps only the best
//! successful branch, and discards the rest before they reach the caller.
//!
//! Philosophy carried over unchanged: only the successful path is ever
//! rendered back into context. Failed branches stay in the tree for stats.

use std::collections::HashMap;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use std::sync::Arc;

use crate::execution_engine::ExecutionEngine;
use crate::types::{BranchStatus, StepData, StepResult, ThoughtBranch, ThoughtTree};

pub const BRANCH_WIDTH: usize = 3;
pub const MAX_DEPTH: u32 = 5;

const STRATEGIES: [&str; 3] = ["direct", "analytical", "creative"];

#[derive(Debug, Clone, Serialize)]
pub struct SolveStats {
    pub total_branches_explored: usize,
    pub successful_branches: usize,
    pub failed_branches: usize,
    pub efficiency: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveResult {
    pub tree_id: String,
    pub task: String,
    pub status: String,
    pub successful_path: Vec<String>,
    pub results: Vec<StepResult>,
    pub depth: usize,
    pub stats: SolveStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeStats {
    pub tree_id: String,
    pub task: String,
    pub total_branches: usize,
    pub successful_branches: usize,
    pub failed_branches: usize,
    pub success_rate: f64,
    pub path_length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_trees: usize,
    pub total_branches_explored: usize,
    pub total_successful_branches: usize,
    pub average_success_rate: f64,
    pub average_branches_per_tree: f64,
}

pub struct TreeOfThoughtSolver {
    trees: RwLock<HashMap<String, ThoughtTree>>,
}

impl TreeOfThoughtSolver {
    pub fn new() -> Self {
        Self {
            trees: RwLock::new(HashMap::new()),
        }
    }

    fn generate_branches(&self, task: &str, parent_id: Option<&str>) -> Vec<ThoughtBranch> {
        STRATEGIES
            .iter()
            .take(BRANCH_WIDTH)
            .enumerate()
            .map(|(i, strategy)| {
                let (step, reasoning) = generate_step(task, strategy);
                ThoughtBranch {
                    id: format!("branch_{}_{i}", Uuid::new_v4()),
                    parent_id: parent_id.map(|p| p.to_string()),
                    step,
                    reasoning,
                    confidence: 0.7 + (i as f64 * 0.1),
                    status: BranchStatus::Pending,
                    result: None,
                    children: Vec::new(),
                }
            })
            .collect()
    }

    async fn evaluate_branch(&self, branch: &mut ThoughtBranch, engine: &ExecutionEngine, context: &StepData) {
        let results = engine.execute_task(std::slice::from_ref(&branch.step), context.clone()).await;
        match results.into_iter().next() {
            Some(result) => {
                let success = result.status.is_ok();
                branch.status = if success { BranchStatus::Success } else { BranchStatus::Failed };
                branch.result = Some(result);
            }
            None => {
                branch.status = BranchStatus::Failed;
            }
        }
    }

    fn select_best_branch(branches: &[ThoughtBranch]) -> Option<usize> {
        branches
            .iter()
            .enumerate()
            .filter(|(_, b)| b.status == BranchStatus::Success)
            .max_by(|(_, a), (_, b)| a.confidence.partial_cmp(&b.confidence).unwrap())
            .map(|(i, _)| i)
    }

    fn is_task_complete(branch: &ThoughtBranch) -> bool {
        branch.status == BranchStatus::Success && branch.result.is_some()
    }

    /// Explores up to `MAX_DEPTH` levels, generating `BRANCH_WIDTH` branches
    /// per level and keeping only the best successful one at each step.
    pub async fn solve_with_tree(&self, task: &str, engine: &ExecutionEngine, context: StepData) -> SolveResult {
        let tree_id = Uuid::new_v4().to_string();
        let mut tree = ThoughtTree::new(task);
        tree.id = tree_id.clone();

        let mut current_parent: Option<String> = None;
        let mut depth = 0u32;

        while depth < MAX_DEPTH {
            let mut branches = self.generate_branches(task, current_parent.as_deref());

            let eval_futures = branches.iter_mut().map(|branch| {
                let context = context.clone();
                async move {
                    self.evaluate_branch(branch, engine, &context).await;
                }
            });
            join_all(eval_futures).await;

            if let Some(parent_id) = &current_parent {
                if let Some(parent) = tree.branches.get_mut(parent_id) {
                    parent.children.extend(branches.iter().map(|b| b.id.clone()));
                }
            }

            let best_index = Self::select_best_branch(&branches);
            let best = best_index.map(|i| branches[i].clone());
            for branch in branches {
                tree.branches.insert(branch.id.clone(), branch);
            }

            let Some(best) = best else {
                break;
            };
            let complete = Self::is_task_complete(&best);
            tree.successful_path.push(best.id.clone());
            current_parent = Some(best.id);

            if complete {
                break;
            }
            depth += 1;
        }

        self.finish_solve(task, tree_id, tree).await
    }

    async fn finish_solve(&self, task: &str, tree_id: String, tree: ThoughtTree) -> SolveResult {
        let successful_steps: Vec<String> = tree
            .successful_path
            .iter()
            .filter_map(|id| tree.branches.get(id).map(|b| b.step.clone()))
            .collect();
        let results: Vec<StepResult> = tree
            .successful_path
            .iter()
            .filter_map(|id| tree.branches.get(id).and_then(|b| b.result.clone()))
            .collect();

        let total_branches = tree.branches.len();
        let successful_branches = tree.successful_path.len();
        let failed_branches = total_branches.saturating_sub(successful_branches);
        let depth = successful_steps.len();
        let status = if tree.successful_path.is_empty() { "failed" } else { "completed" };

        let stats = SolveStats {
            total_branches_explored: total_branches,
            successful_branches,
            failed_branches,
            efficiency: if total_branches > 0 {
                successful_branches as f64 / total_branches as f64
            } else {
                0.0
            },
        };

        self.trees.write().await.insert(tree_id.clone(), tree);

        SolveResult {
            tree_id,
            task: task.to_string(),
            status: status.to_string(),
            successful_path: successful_steps,
            results,
            depth,
            stats,
        }
    }

    pub async fn get_successful_context(&self, tree_id: &str) -> String {
        let trees = self.trees.read().await;
        let Some(tree) = trees.get(tree_id) else {
            return String::new();
        };

        let mut parts = vec![format!("Task: {}", tree.task), "History of successful decisions:".to_string()];
        for (i, branch_id) in tree.successful_path.iter().enumerate() {
            if let Some(branch) = tree.branches.get(branch_id) {
                parts.push(format!("{}. {}", i + 1, branch.step));
                parts.push("   Result: success".to_string());
            }
        }
        parts.join("\n")
    }

    pub async fn get_tree_stats(&self, tree_id: &str) -> Option<TreeStats> {
        let trees = self.trees.read().await;
        let tree = trees.get(tree_id)?;
        let total = tree.branches.len();
        let successful = tree.branches.values().filter(|b| b.status == BranchStatus::Success).count();
        let failed = tree.branches.values().filter(|b| b.status == BranchStatus::Failed).count();
        Some(TreeStats {
            tree_id: tree_id.to_string(),
            task: tree.task.clone(),
            total_branches: total,
            successful_branches: successful,
            failed_branches: failed,
            success_rate: successful as f64 / total.max(1) as f64,
            path_length: tree.successful_path.len(),
        })
    }

    pub async fn get_stats(&self) -> GlobalStats {
        let trees = self.trees.read().await;
        let total_trees = trees.len();
        let total_branches: usize = trees.values().map(|t| t.branches.len()).sum();
        let total_successful: usize = trees
            .values()
            .map(|t| t.branches.values().filter(|b| b.status == BranchStatus::Success).count())
            .sum();
        GlobalStats {
            total_trees,
            total_branches_explored: total_branches,
            total_successful_branches: total_successful,
            average_success_rate: total_successful as f64 / total_branches.max(1) as f64,
            average_branches_per_tree: total_branches as f64 / total_trees.max(1) as f64,
        }
    }
}

impl Default for TreeOfThoughtSolver {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_step(task: &str, strategy: &str) -> (String, String) {
    match strategy {
        "direct" => (
            format!("Execute task directly: {task}"),
            "Direct approach - fastest path to a solution".to_string(),
        ),
        "analytical" => (
            format!("Analyze the task and break it into subtasks: {task}"),
            "Analytical approach - reduces risk of errors".to_string(),
        ),
        _ => (
            format!("Find an alternative solution for: {task}"),
            "Creative approach - may surface non-obvious solutions".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Backends;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::config::{BackendUrls, CircuitBreakerConfig, MetricsConfig};
    use crate::metrics::MetricsStore;
    use std::time::Duration;

    fn engine() -> ExecutionEngine {
        let backends = Backends::new(
            BackendUrls {
                ollama_url: "http://localhost:11434".to_string(),
                qwen_api_url: None,
                qwen_api_key: None,
                retrieval_url: "http://localhost:8001".to_string(),
                arch_service_url: "http://localhost:8002".to_string(),
            },
            20,
            100,
        )
        .unwrap();
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        });
        let metrics = MetricsStore::new(MetricsConfig {
            global_window: 1000,
            per_service_window: 100,
            insights_ttl: Duration::from_secs(4),
        });
        ExecutionEngine::new(Arc::new(backends), Arc::new(breaker), Arc::new(metrics))
    }

    #[test]
    fn generate_branches_produces_three_strategies() {
        let solver = TreeOfThoughtSolver::new();
        let branches = solver.generate_branches("check system health", None);
        assert_eq!(branches.len(), BRANCH_WIDTH);
        assert!(branches[0].step.contains("directly"));
        assert!(branches[2].confidence > branches[0].confidence);
    }

    #[tokio::test]
    async fn solve_with_tree_records_a_tree_even_on_total_failure() {
        let solver = TreeOfThoughtSolver::new();
        let engine = engine();
        let result = solver.solve_with_tree("generic unreachable task", &engine, StepData::default()).await;
        let stats = solver.get_tree_stats(&result.tree_id).await;
        assert!(stats.is_some());
    }
}
