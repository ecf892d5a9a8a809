use serde::{Deserialize, Serialize};

/// Kinds of shared resources that can be locked and conflict-checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// A file in the shared working tree
    File,
    /// A tracked task
    Task,
    /// A pipeline/automation execution
    Execution,
    /// An automation agent
    Agent,
    /// A checked-out working copy
    WorkingCopy,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::File => write!(f, "FILE"),
            ResourceType::Task => write!(f, "TASK"),
            ResourceType::Execution => write!(f, "EXECUTION"),
            ResourceType::Agent => write!(f, "AGENT"),
            ResourceType::WorkingCopy => write!(f, "WORKING_COPY"),
        }
    }
}

/// Priority attached to a lock. Ordering is significant:
/// `Critical` outranks `High` outranks `Medium` outranks `Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum LockPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for LockPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockPriority::Low => write!(f, "LOW"),
            LockPriority::Medium => write!(f, "MEDIUM"),
            LockPriority::High => write!(f, "HIGH"),
            LockPriority::Critical => write!(f, "CRITICAL"),
        }
    }
}

pub fn parse_resource_type(s: &str) -> ResourceType {
    match s.to_uppercase().as_str() {
        "TASK" => ResourceType::Task,
        "EXECUTION" => ResourceType::Execution,
        "AGENT" => ResourceType::Agent,
        "WORKING_COPY" => ResourceType::WorkingCopy,
        _ => ResourceType::File, // Safe default
    }
}

pub fn parse_priority(s: &str) -> LockPriority {
    match s.to_uppercase().as_str() {
        "LOW" => LockPriority::Low,
        "HIGH" => LockPriority::High,
        "CRITICAL" => LockPriority::Critical,
        _ => LockPriority::Medium, // Safe default
    }
}
