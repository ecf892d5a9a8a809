use serde::{Deserialize, Serialize};

use teamlock_core::types::{Conflict, Lock};

// ─── Validation Constants ───────────────────────────────────────────────────

const VALID_RESOURCE_TYPES: &[&str] = &["FILE", "TASK", "EXECUTION", "AGENT", "WORKING_COPY"];

const VALID_PRIORITIES: &[&str] = &["LOW", "MEDIUM", "HIGH", "CRITICAL"];

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn validate_resource_type(resource_type: &str) -> Result<(), String> {
    if VALID_RESOURCE_TYPES.contains(&resource_type.to_uppercase().as_str()) {
        Ok(())
    } else {
        Err(format!(
            "Invalid resource_type '{}'. Must be one of: {}",
            resource_type,
            VALID_RESOURCE_TYPES.join(", ")
        ))
    }
}

pub fn validate_priority(priority: &str) -> Result<(), String> {
    if VALID_PRIORITIES.contains(&priority.to_uppercase().as_str()) {
        Ok(())
    } else {
        Err(format!(
            "Invalid priority '{}'. Must be one of: {}",
            priority,
            VALID_PRIORITIES.join(", ")
        ))
    }
}

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AcquireLockRequest {
    pub resource_id: String,
    pub resource_type: String,
    pub holder_id: String,
    pub team_id: String,
    pub project_id: String,
    pub timeout_ms: Option<u64>,
    pub priority: Option<String>,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub description: String,
}

impl AcquireLockRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.resource_id.is_empty() {
            return Err("resource_id is required".to_string());
        }
        if self.holder_id.is_empty() {
            return Err("holder_id is required".to_string());
        }
        if self.team_id.is_empty() {
            return Err("team_id is required".to_string());
        }
        if self.project_id.is_empty() {
            return Err("project_id is required".to_string());
        }
        validate_resource_type(&self.resource_type)?;
        if let Some(priority) = &self.priority {
            validate_priority(priority)?;
        }
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct ExtendLockRequest {
    pub additional_minutes: u64,
}

#[derive(Deserialize)]
pub struct ForceReleaseRequest {
    pub released_by: String,
    pub reason: String,
}

impl ForceReleaseRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.released_by.is_empty() {
            return Err("released_by is required".to_string());
        }
        if self.reason.is_empty() {
            return Err("reason is required".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct LockQuery {
    pub team_id: Option<String>,
    pub project_id: Option<String>,
    pub resource_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ConflictQuery {
    pub team_id: String,
    /// Trailing window in hours (default: 24)
    pub hours: Option<u64>,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_locks: usize,
    pub version: String,
}

#[derive(Serialize)]
pub struct ActiveLockInfo {
    pub id: String,
    pub resource_id: String,
    pub resource_type: String,
    pub holder_id: String,
    pub team_id: String,
    pub project_id: String,
    pub priority: String,
    pub acquired_at: u64,
    pub expires_at: u64,
}

impl From<&Lock> for ActiveLockInfo {
    fn from(lock: &Lock) -> Self {
        Self {
            id: lock.id.clone(),
            resource_id: lock.resource_id.clone(),
            resource_type: lock.resource_type.to_string(),
            holder_id: lock.holder_id.clone(),
            team_id: lock.team_id.clone(),
            project_id: lock.project_id.clone(),
            priority: lock.priority.to_string(),
            acquired_at: lock.acquired_at,
            expires_at: lock.expires_at,
        }
    }
}

#[derive(Serialize)]
pub struct ConflictListResponse {
    pub team_id: String,
    pub window_hours: u64,
    pub conflicts: Vec<Conflict>,
}
