//! Typed outbound events for the Notification Bus.
//!
//! Every lock/conflict transition is announced as one variant of a single
//! enum delivered over a channel. Consumers (the HTTP server's log drain,
//! a pub/sub bridge) subscribe to the receiving end; delivery to
//! human-facing channels is entirely their responsibility.

use std::sync::mpsc::{Receiver, Sender, channel};

use serde::Serialize;

use crate::types::{Conflict, Lock, Resolution};

/// Everything the core announces to the outside world
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinationEvent {
    LockAcquired {
        lock: Lock,
    },
    LockReleased {
        lock: Lock,
    },
    /// A request was rejected; carries both the requester's candidate and
    /// the current holder so the resolver can weigh both claims
    LockConflict {
        requested: Lock,
        holder: Lock,
    },
    /// A heartbeat found ownership gone (e.g. force-released elsewhere)
    LockLost {
        lock: Lock,
    },
    LockExpired {
        lock: Lock,
    },
    LockForceReleased {
        lock: Lock,
        released_by: String,
        reason: String,
    },
    ConflictDetected {
        conflict: Conflict,
    },
    ConflictResolved {
        conflict: Conflict,
        resolution: Resolution,
    },
    ConflictEscalated {
        conflict: Conflict,
    },
}

impl CoordinationEvent {
    /// Short human-readable line for notification channels.
    pub fn summary(&self) -> String {
        match self {
            CoordinationEvent::LockAcquired { lock } => {
                format!("lock acquired on {} by {}", lock.resource_id, lock.holder_id)
            }
            CoordinationEvent::LockReleased { lock } => {
                format!("lock released on {} by {}", lock.resource_id, lock.holder_id)
            }
            CoordinationEvent::LockConflict { requested, holder } => format!(
                "{} wants {} but {} holds it",
                requested.holder_id, holder.resource_id, holder.holder_id
            ),
            CoordinationEvent::LockLost { lock } => {
                format!("lock on {} lost by {}", lock.resource_id, lock.holder_id)
            }
            CoordinationEvent::LockExpired { lock } => {
                format!("lock on {} expired for {}", lock.resource_id, lock.holder_id)
            }
            CoordinationEvent::LockForceReleased {
                lock,
                released_by,
                reason,
            } => format!(
                "lock on {} force-released by {} ({})",
                lock.resource_id, released_by, reason
            ),
            CoordinationEvent::ConflictDetected { conflict } => format!(
                "conflict detected: {:?} on [{}]",
                conflict.conflict_type,
                conflict.resources.join(", ")
            ),
            CoordinationEvent::ConflictResolved { conflict, resolution } => format!(
                "conflict {} resolved via {}",
                conflict.id, resolution.strategy
            ),
            CoordinationEvent::ConflictEscalated { conflict } => {
                format!("conflict {} escalated for manual handling", conflict.id)
            }
        }
    }
}

/// Sending half handed to the manager and resolver.
///
/// Sends are best-effort: a bus nobody is listening to must never fail a
/// lock operation.
#[derive(Clone)]
pub struct EventSender {
    tx: Option<Sender<CoordinationEvent>>,
}

impl EventSender {
    /// A sender wired to nothing; every send is a no-op.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: CoordinationEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Create a connected bus: the sender goes to the core components, the
/// receiver to whatever bridges events onward.
pub fn event_channel() -> (EventSender, Receiver<CoordinationEvent>) {
    let (tx, rx) = channel();
    (EventSender { tx: Some(tx) }, rx)
}
