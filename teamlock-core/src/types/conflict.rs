use serde::{Deserialize, Serialize};

use super::LockPriority;

/// Categories of contention the resolver recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ConcurrentExecution,
    LockContention,
    ResourceCollision,
    AgentAssignment,
    QualityGateConflict,
    PermissionDispute,
    WorkflowInterference,
}

impl ConflictType {
    /// Conflict priority is derived from the type, not chosen by callers.
    pub fn priority(self) -> LockPriority {
        match self {
            ConflictType::PermissionDispute | ConflictType::QualityGateConflict => {
                LockPriority::High
            }
            ConflictType::ConcurrentExecution | ConflictType::LockContention => {
                LockPriority::Medium
            }
            _ => LockPriority::Low,
        }
    }

    /// Whether this kind of conflict can be resolved without a human.
    pub fn auto_resolvable(self) -> bool {
        matches!(
            self,
            ConflictType::LockContention
                | ConflictType::ResourceCollision
                | ConflictType::AgentAssignment
                | ConflictType::WorkflowInterference
        )
    }

    /// The default strategy applied to this conflict type.
    pub fn default_strategy(self) -> ResolutionStrategy {
        match self {
            ConflictType::LockContention => ResolutionStrategy::PriorityBased,
            ConflictType::ResourceCollision => ResolutionStrategy::FirstWins,
            ConflictType::ConcurrentExecution => ResolutionStrategy::ManualMerge,
            ConflictType::AgentAssignment => ResolutionStrategy::LoadBalance,
            ConflictType::QualityGateConflict => ResolutionStrategy::VoteBased,
            ConflictType::PermissionDispute => ResolutionStrategy::Escalated,
            ConflictType::WorkflowInterference => ResolutionStrategy::SequenceOptimization,
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictType::ConcurrentExecution => "concurrent_execution",
            ConflictType::LockContention => "lock_contention",
            ConflictType::ResourceCollision => "resource_collision",
            ConflictType::AgentAssignment => "agent_assignment",
            ConflictType::QualityGateConflict => "quality_gate_conflict",
            ConflictType::PermissionDispute => "permission_dispute",
            ConflictType::WorkflowInterference => "workflow_interference",
        };
        write!(f, "{}", s)
    }
}

/// Conflict lifecycle states.
///
/// `detected -> resolving -> {resolved, failed}` or `detected -> escalated`.
/// Terminal records are retained for a bounded window, then purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Detected,
    Escalated,
    Resolving,
    Resolved,
    Failed,
}

impl ConflictStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConflictStatus::Resolved | ConflictStatus::Failed | ConflictStatus::Escalated
        )
    }
}

/// Blast radius of a conflict, derived from type and group size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Minor,
    Moderate,
    Major,
    Severe,
}

/// Named resolution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    PriorityBased,
    FirstWins,
    ManualMerge,
    LoadBalance,
    VoteBased,
    SequenceOptimization,
    Escalated,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionStrategy::PriorityBased => "priority_based",
            ResolutionStrategy::FirstWins => "first_wins",
            ResolutionStrategy::ManualMerge => "manual_merge",
            ResolutionStrategy::LoadBalance => "load_balance",
            ResolutionStrategy::VoteBased => "vote_based",
            ResolutionStrategy::SequenceOptimization => "sequence_optimization",
            ResolutionStrategy::Escalated => "escalated",
        };
        write!(f, "{}", s)
    }
}

/// A detected contention between collaborators over one or more resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique conflict ID
    pub id: String,
    pub team_id: String,
    pub project_id: String,
    pub conflict_type: ConflictType,
    pub description: String,
    /// Holder IDs caught up in the contention
    pub involved_members: Vec<String>,
    /// Resource keys under contention
    pub resources: Vec<String>,
    pub detected_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub status: ConflictStatus,
    pub priority: LockPriority,
    pub auto_resolvable: bool,
    pub impact: ImpactLevel,
}

impl Conflict {
    /// Stable identity for "already tracked" checks across detection passes.
    ///
    /// Derived from the conflict type plus the sorted resource set so a
    /// repeated pass over the same contention never re-fires a duplicate.
    pub fn dedup_key(&self) -> String {
        dedup_key(self.conflict_type, &self.resources)
    }
}

/// See [`Conflict::dedup_key`].
pub fn dedup_key(conflict_type: ConflictType, resources: &[String]) -> String {
    let mut sorted: Vec<&str> = resources.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    format!("{:?}|{}", conflict_type, sorted.join(","))
}

/// Audit record of how a conflict was (or was not) put to rest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub strategy: ResolutionStrategy,
    /// "resolver" for automatic strategies, a member ID for manual ones
    pub resolved_by: String,
    /// What was decided (e.g. which holder was retained)
    pub decision: String,
    /// Why the strategy decided what it did
    pub reasoning: String,
    /// Exactly what the resolver did, in order
    pub actions: Vec<ResolutionAction>,
    pub applied_at: u64,
    /// True only when every action succeeded
    pub success: bool,
}

/// Kinds of concrete steps a resolution can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ReleaseLock,
    ReassignAgent,
    MergeChanges,
    RollbackExecution,
    NotifyTeam,
    Escalate,
}

/// One executed step of a resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub action_type: ActionType,
    /// What the action was aimed at (lock ID, resource key, team ID, ...)
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
