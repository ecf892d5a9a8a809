pub mod conflict;
pub mod lock;
pub mod primitives;

pub use conflict::{
    ActionType, Conflict, ConflictStatus, ConflictType, ImpactLevel, Resolution,
    ResolutionAction, ResolutionStrategy, dedup_key,
};
pub use lock::{Lock, LockRequest, LockResult, LockStatus};
pub use primitives::{LockPriority, ResourceType, parse_priority, parse_resource_type};
