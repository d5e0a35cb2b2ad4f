//! Gate for runtime self-modification: confines writes to a fixed safe-zone
//! file list, backs up before writing, validates Rust syntax after writing,
//! and rolls back on failure. The orchestrator's final level of autonomy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{OrchestratorError, Result};

/// Files the gate is permitted to touch. Paths are matched as substrings of
/// the target path, mirroring the original allowlist's loose matching.
const SAFE_MODIFICATION_ZONES: &[&str] = &[
    "src/adaptive_planner.rs",
    "src/decision_engine.rs",
    "src/meta_learning.rs",
    "src/predictive_engine.rs",
    "src/self_improvement.rs",
    "src/knowledge_store.rs",
];

const PROTECTED_FILES: &[&str] = &["src/main.rs", "Cargo.toml", "Cargo.lock"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    AddFunction,
    AddMethod,
    AddParameter,
    ModifyLogic,
    OptimizeCode,
    Refactor,
    DeleteFunction,
    ChangeApi,
    ModifyCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl ModificationType {
    fn risk(&self) -> RiskLevel {
        match self {
            ModificationType::AddFunction | ModificationType::AddMethod | ModificationType::AddParameter => {
                RiskLevel::Low
            }
            ModificationType::ModifyLogic | ModificationType::OptimizeCode | ModificationType::Refactor => {
                RiskLevel::Medium
            }
            ModificationType::DeleteFunction | ModificationType::ChangeApi | ModificationType::ModifyCore => {
                RiskLevel::High
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CanModify {
    pub allowed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub backup_path: PathBuf,
    pub original_hash: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub file_path: PathBuf,
    pub modification_type: ModificationType,
    pub description: String,
    pub risk_level: RiskLevel,
    pub backup_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub approved: bool,
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub modification_id: usize,
    pub backup_path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModificationRecord {
    pub proposal: Proposal,
    pub applied_at: DateTime<Utc>,
    pub new_hash: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModificationStats {
    pub total_modifications: usize,
    pub successful: usize,
    pub success_rate: f64,
    pub risk_distribution: HashMap<String, usize>,
    pub safe_zones: usize,
    pub protected_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoImprovementCandidate {
    pub kind: String,
    pub proposal: Proposal,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoImprovementReport {
    pub improvements_proposed: usize,
    pub improvements: Vec<AutoImprovementCandidate>,
    pub auto_applied: usize,
}

pub struct SelfModificationGate {
    backup_dir: PathBuf,
    history: RwLock<Vec<ModificationRecord>>,
}

impl SelfModificationGate {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            history: RwLock::new(Vec::new()),
        }
    }

    pub async fn can_modify(&self, file_path: &Path) -> CanModify {
        if !file_path.exists() {
            return CanModify {
                allowed: false,
                reason: "File does not exist".to_string(),
            };
        }

        let path_str = file_path.to_string_lossy();
        if PROTECTED_FILES.iter().any(|p| path_str.contains(p)) {
            return CanModify {
                allowed: false,
                reason: "File is protected from modification".to_string(),
            };
        }
        if !SAFE_MODIFICATION_ZONES.iter().any(|z| path_str.contains(z)) {
            return CanModify {
                allowed: false,
                reason: "File is not in a safe modification zone".to_string(),
            };
        }
        CanModify {
            allowed: true,
            reason: "File can be safely modified".to_string(),
        }
    }

    pub async fn create_backup(&self, file_path: &Path) -> Result<BackupInfo> {
        let content = tokio::fs::read(file_path)
            .await
            .map_err(|e| OrchestratorError::SelfModification(format!("read failed: {e}")))?;

        tokio::fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| OrchestratorError::SelfModification(format!("backup dir creation failed: {e}")))?;

        let timestamp = Utc::now();
        let file_name = file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let backup_path = self
            .backup_dir
            .join(format!("{file_name}.backup.{}", timestamp.format("%Y%m%d_%H%M%S")));

        tokio::fs::write(&backup_path, &content)
            .await
            .map_err(|e| OrchestratorError::SelfModification(format!("backup write failed: {e}")))?;

        Ok(BackupInfo {
            backup_path,
            original_hash: hex_sha256(&content),
            timestamp,
        })
    }

    pub async fn propose_modification(
        &self,
        file_path: &Path,
        modification_type: ModificationType,
        description: impl Into<String>,
    ) -> Result<Proposal> {
        let can_modify = self.can_modify(file_path).await;
        if !can_modify.allowed {
            return Err(OrchestratorError::SelfModification(can_modify.reason));
        }

        let backup = self.create_backup(file_path).await?;
        let risk_level = modification_type.risk();

        Ok(Proposal {
            file_path: file_path.to_path_buf(),
            modification_type,
            description: description.into(),
            risk_level,
            backup_path: backup.backup_path,
            timestamp: Utc::now(),
            approved: matches!(risk_level, RiskLevel::Low | RiskLevel::Medium),
            requires_confirmation: risk_level == RiskLevel::High,
        })
    }

    /// Writes `new_content`, validates it parses as Rust, and rolls back on
    /// a syntax error. Requires `proposal.approved`.
    pub async fn apply_modification(&self, new_content: &str, proposal: Proposal) -> Result<ApplyOutcome> {
        if !proposal.approved {
            return Err(OrchestratorError::SelfModification("modification not approved".to_string()));
        }

        tokio::fs::write(&proposal.file_path, new_content)
            .await
            .map_err(|e| OrchestratorError::SelfModification(format!("write failed: {e}")))?;

        if proposal.file_path.extension().and_then(|e| e.to_str()) == Some("rs") {
            if let Err(parse_err) = syn::parse_file(new_content) {
                self.rollback(&proposal.backup_path, &proposal.file_path).await?;
                return Err(OrchestratorError::SelfModification(format!(
                    "syntax error, rolled back: {parse_err}"
                )));
            }
        }

        let new_hash = hex_sha256(new_content.as_bytes());
        let record = ModificationRecord {
            proposal: proposal.clone(),
            applied_at: Utc::now(),
            new_hash,
            status: "applied".to_string(),
        };

        let mut history = self.history.write().await;
        history.push(record);
        let modification_id = history.len() - 1;

        Ok(ApplyOutcome {
            modification_id,
            backup_path: proposal.backup_path,
            message: "Modification applied successfully".to_string(),
        })
    }

    pub async fn rollback(&self, backup_path: &Path, original_path: &Path) -> Result<()> {
        if !backup_path.exists() {
            return Err(OrchestratorError::SelfModification("backup not found".to_string()));
        }
        tokio::fs::copy(backup_path, original_path)
            .await
            .map_err(|e| OrchestratorError::SelfModification(format!("rollback failed: {e}")))?;
        Ok(())
    }

    pub async fn get_modification_history(&self, limit: usize) -> Vec<ModificationRecord> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).rev().cloned().collect()
    }

    pub async fn get_stats(&self) -> ModificationStats {
        let history = self.history.read().await;
        let total = history.len();
        let successful = history.iter().filter(|m| m.status == "applied").count();
        let mut risk_distribution = HashMap::new();
        for record in history.iter() {
            let key = match record.proposal.risk_level {
                RiskLevel::Low => "low",
                RiskLevel::Medium => "medium",
                RiskLevel::High => "high",
            };
            *risk_distribution.entry(key.to_string()).or_insert(0) += 1;
        }
        ModificationStats {
            total_modifications: total,
            successful,
            success_rate: if total > 0 {
                successful as f64 * 100.0 / total as f64
            } else {
                0.0
            },
            risk_distribution,
            safe_zones: SAFE_MODIFICATION_ZONES.len(),
            protected_files: PROTECTED_FILES.len(),
        }
    }

    /// Proposes (but never auto-applies) fixes for systemic problems the
    /// orchestrator has detected about itself.
    pub async fn autonomous_self_improvement(
        &self,
        decision_errors: u32,
        avg_latency_ms: f64,
    ) -> AutoImprovementReport {
        let mut improvements = Vec::new();

        if decision_errors > 10 {
            if let Ok(proposal) = self
                .propose_modification(
                    Path::new("src/decision_engine.rs"),
                    ModificationType::OptimizeCode,
                    "Optimize decision making to reduce errors",
                )
                .await
            {
                if proposal.approved {
                    improvements.push(AutoImprovementCandidate {
                        kind: "decision_optimization".to_string(),
                        proposal,
                        reason: "High error rate in decision engine".to_string(),
                    });
                }
            }
        }

        if avg_latency_ms > 2000.0 {
            if let Ok(proposal) = self
                .propose_modification(
                    Path::new("src/predictive_engine.rs"),
                    ModificationType::OptimizeCode,
                    "Optimize prediction paths for better performance",
                )
                .await
            {
                if proposal.approved {
                    improvements.push(AutoImprovementCandidate {
                        kind: "performance_optimization".to_string(),
                        proposal,
                        reason: "High latency detected".to_string(),
                    });
                }
            }
        }

        AutoImprovementReport {
            improvements_proposed: improvements.len(),
            improvements,
            auto_applied: 0,
        }
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn protected_file_cannot_be_modified() {
        let gate = SelfModificationGate::new(std::env::temp_dir().join("orchestrator-test-backups"));
        let can = gate.can_modify(Path::new("src/main.rs")).await;
        assert!(!can.allowed);
    }

    #[tokio::test]
    async fn file_outside_safe_zone_is_rejected() {
        let dir = std::env::temp_dir();
        let target = dir.join("some_unrelated_module.rs");
        std::fs::File::create(&target).unwrap().write_all(b"fn main() {}").unwrap();
        let gate = SelfModificationGate::new(dir.join("orchestrator-test-backups"));
        let can = gate.can_modify(&target).await;
        assert!(!can.allowed);
        let _ = std::fs::remove_file(&target);
    }

    #[test]
    fn risk_assessment_matches_modification_type() {
        assert_eq!(ModificationType::AddFunction.risk(), RiskLevel::Low);
        assert_eq!(ModificationType::Refactor.risk(), RiskLevel::Medium);
        assert_eq!(ModificationType::DeleteFunction.risk(), RiskLevel::High);
    }

    #[tokio::test]
    async fn invalid_rust_syntax_triggers_rollback() {
        let dir = std::env::temp_dir().join("orchestrator-test-safe-zone");
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("src");
        std::fs::create_dir_all(&target).unwrap();
        let file_path = target.join("adaptive_planner.rs");
        std::fs::write(&file_path, "fn valid() {}").unwrap();

        let gate = SelfModificationGate::new(dir.join("backups"));
        let proposal = gate
            .propose_modification(&file_path, ModificationType::OptimizeCode, "test edit")
            .await
            .unwrap();
        let result = gate.apply_modification("fn broken( {", proposal).await;
        assert!(result.is_err());
        let restored = std::fs::read_to_string(&file_path).unwrap();
        assert_eq!(restored, "fn valid() {}");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
