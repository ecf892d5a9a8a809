//! The backing-store contract.
//!
//! The store is the single source of truth and the only serialization
//! point in the system: every cross-instance guarantee reduces to the
//! atomicity of `try_acquire` and the `*_if_match` operations, which read
//! and conditionally write a key as one indivisible step.
//!
//! Ownership is proven by an opaque fencing token minted at acquisition and
//! stored alongside the lock record; release/extend/heartbeat match on the
//! token alone, never on full record equality.
//!
//! All time-dependent calls take `now` explicitly so tests control the clock.

use crate::error::StoreError;
use crate::types::{Conflict, Lock};

/// Outcome of an atomic acquisition attempt
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// The candidate was written; the caller now holds the resource
    Acquired,
    /// An unexpired lock already exists; the store was left untouched
    Held(Lock),
}

/// Contract for lock-ledger + conflict-log backends.
pub trait LockStore {
    /// Connectivity check. Components refuse all work until this succeeds.
    fn ping(&self) -> Result<(), StoreError>;

    /// Write `candidate` under its resource key only if no unexpired lock
    /// exists there. Exactly one concurrent caller can win.
    fn try_acquire(
        &mut self,
        candidate: &Lock,
        token: &str,
        now: u64,
    ) -> Result<AcquireOutcome, StoreError>;

    /// Delete the resource's lock only if the stored fencing token matches.
    /// Returns false (store untouched) on any mismatch.
    fn release_if_match(&mut self, resource_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Push the expiry out by `additional_ms` if the token matches.
    /// Returns the new expiry, or `None` on mismatch.
    fn extend_if_match(
        &mut self,
        resource_id: &str,
        token: &str,
        additional_ms: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Stamp liveness and renew the full TTL window if the token matches.
    /// Returns the new expiry, or `None` when ownership is gone.
    fn heartbeat_if_match(
        &mut self,
        resource_id: &str,
        token: &str,
        now: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Unconditional delete by lock ID, bypassing token matching.
    /// Returns the removed lock, if any. Force-release only.
    fn remove_lock(&mut self, lock_id: &str) -> Result<Option<Lock>, StoreError>;

    /// The current unexpired lock on a resource, if any.
    fn get_lock(&self, resource_id: &str, now: u64) -> Result<Option<Lock>, StoreError>;

    /// Every unexpired lock in the ledger, across all instances.
    fn active_locks(&self, now: u64) -> Result<Vec<Lock>, StoreError>;

    fn team_locks(&self, team_id: &str, now: u64) -> Result<Vec<Lock>, StoreError> {
        let mut locks = self.active_locks(now)?;
        locks.retain(|l| l.team_id == team_id);
        Ok(locks)
    }

    fn project_locks(&self, project_id: &str, now: u64) -> Result<Vec<Lock>, StoreError> {
        let mut locks = self.active_locks(now)?;
        locks.retain(|l| l.project_id == project_id);
        Ok(locks)
    }

    /// Record a rejected acquisition for observability. Entries carry a
    /// bounded TTL and are swept with everything else.
    fn record_contention(
        &mut self,
        resource_id: &str,
        requester_id: &str,
        now: u64,
        ttl_ms: u64,
    ) -> Result<(), StoreError>;

    /// How many unexpired contention entries a resource has accumulated.
    fn contention_count(&self, resource_id: &str, now: u64) -> Result<usize, StoreError>;

    /// Remove expired lock entries, entries that somehow carry no TTL
    /// (consistency repair), and lapsed contention entries.
    /// Returns the number of lock entries removed.
    fn sweep_expired(&mut self, now: u64) -> Result<usize, StoreError>;

    /// Persist a conflict record with a bounded retention TTL.
    /// Overwrites any previous record with the same conflict ID.
    fn put_conflict(
        &mut self,
        conflict: &Conflict,
        retention_ms: u64,
        now: u64,
    ) -> Result<(), StoreError>;

    /// All unpurged conflict records, terminal or not.
    fn load_conflicts(&self, now: u64) -> Result<Vec<Conflict>, StoreError>;

    /// Drop conflict records past their retention window.
    fn purge_conflicts(&mut self, now: u64) -> Result<usize, StoreError>;
}
