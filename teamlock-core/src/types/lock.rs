use serde::{Deserialize, Serialize};

use super::{LockPriority, ResourceType};

/// Lock states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Lock is held and valid
    Active,
    /// Lock TTL elapsed without renewal
    Expired,
    /// Lock was explicitly released by its holder
    Released,
    /// Lock was forcibly released (admin or conflict resolution)
    ForceReleased,
}

/// A time-bound exclusive claim on a shared resource.
///
/// At most one `Active`, unexpired lock may exist per `resource_id` in the
/// backing store at any instant; the store's atomic acquire primitive is the
/// only thing that enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    /// Unique lock ID
    pub id: String,
    /// Key of the locked resource (e.g. "file:src/auth.ts")
    pub resource_id: String,
    /// What kind of resource this is
    pub resource_type: ResourceType,
    /// Who holds the lock (member or agent ID)
    pub holder_id: String,
    /// Team scope
    pub team_id: String,
    /// Project scope
    pub project_id: String,
    /// When the lock was acquired
    pub acquired_at: u64,
    /// When the lock will expire unless renewed
    pub expires_at: u64,
    /// Last heartbeat timestamp
    pub last_heartbeat: u64,
    /// Priority of the holder's claim
    pub priority: LockPriority,
    /// Short machine-readable operation tag (e.g. "edit", "workflow:phase:2")
    pub operation: String,
    /// Human-readable description of what the holder is doing
    pub description: String,
    /// Current lock state
    pub status: LockStatus,
}

/// Input to `LockManager::acquire`. Never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub holder_id: String,
    pub team_id: String,
    pub project_id: String,
    /// Lock lifetime; defaults from configuration when absent
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub priority: LockPriority,
    pub operation: String,
    pub description: String,
}

impl Lock {
    /// Build the candidate lock for a request.
    pub fn from_request(request: &LockRequest, id: String, ttl_ms: u64, now: u64) -> Self {
        Self {
            id,
            resource_id: request.resource_id.clone(),
            resource_type: request.resource_type,
            holder_id: request.holder_id.clone(),
            team_id: request.team_id.clone(),
            project_id: request.project_id.clone(),
            acquired_at: now,
            expires_at: now + ttl_ms,
            last_heartbeat: now,
            priority: request.priority,
            operation: request.operation.clone(),
            description: request.description.clone(),
            status: LockStatus::Active,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Result of a lock acquisition attempt.
///
/// Returned synchronously and never raised: ordinary contention is a
/// `success == false` result carrying the current holder in
/// `conflicts_with`, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How long until the current holder's claim lapses on its own
    pub wait_time_ms: u64,
    /// Provisioned for a fairness queue; no queue exists, so never populated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflicts_with: Vec<Lock>,
}

impl LockResult {
    pub fn granted(lock: Lock) -> Self {
        Self {
            success: true,
            lock: Some(lock),
            error: None,
            wait_time_ms: 0,
            queue_position: None,
            conflicts_with: Vec::new(),
        }
    }

    pub fn contended(holder: Lock, wait_time_ms: u64) -> Self {
        Self {
            success: false,
            lock: None,
            error: Some(format!(
                "resource '{}' is locked by '{}'",
                holder.resource_id, holder.holder_id
            )),
            wait_time_ms,
            queue_position: None,
            conflicts_with: vec![holder],
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            lock: None,
            error: Some(message.into()),
            wait_time_ms: 0,
            queue_position: None,
            conflicts_with: Vec::new(),
        }
    }
}
