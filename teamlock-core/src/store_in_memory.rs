use std::collections::HashMap;

use crate::error::StoreError;
use crate::store::{AcquireOutcome, LockStore};
use crate::types::{Conflict, Lock};

struct LockEntry {
    token: String,
    lock: Lock,
    /// Full renewal window; heartbeat resets expiry to now + ttl_ms.
    /// Zero means the entry lost its TTL and is removed by the sweep.
    ttl_ms: u64,
}

/// The default backend: a process-local ledger.
///
/// Atomicity falls out of `&mut self` — each call runs to completion before
/// the next one starts, which is exactly the compare-and-mutate guarantee
/// shared backends provide with conditional writes.
pub struct InMemoryLockStore {
    // Map of resource ID -> lock entry
    locks: HashMap<String, LockEntry>,
    // Map of resource ID -> (requester, entry expiry)
    contention: HashMap<String, Vec<(String, u64)>>,
    // Map of conflict ID -> (record, purge deadline)
    conflicts: HashMap<String, (Conflict, u64)>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self {
            locks: HashMap::new(),
            contention: HashMap::new(),
            conflicts: HashMap::new(),
        }
    }

    fn entry_live(entry: &LockEntry, now: u64) -> bool {
        entry.ttl_ms > 0 && entry.lock.expires_at > now
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStore for InMemoryLockStore {
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn try_acquire(
        &mut self,
        candidate: &Lock,
        token: &str,
        now: u64,
    ) -> Result<AcquireOutcome, StoreError> {
        if let Some(existing) = self.locks.get(&candidate.resource_id) {
            if Self::entry_live(existing, now) {
                return Ok(AcquireOutcome::Held(existing.lock.clone()));
            }
        }

        let ttl_ms = candidate.expires_at.saturating_sub(candidate.acquired_at);
        self.locks.insert(
            candidate.resource_id.clone(),
            LockEntry {
                token: token.to_string(),
                lock: candidate.clone(),
                ttl_ms,
            },
        );
        Ok(AcquireOutcome::Acquired)
    }

    fn release_if_match(&mut self, resource_id: &str, token: &str) -> Result<bool, StoreError> {
        match self.locks.get(resource_id) {
            Some(entry) if entry.token == token => {
                self.locks.remove(resource_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn extend_if_match(
        &mut self,
        resource_id: &str,
        token: &str,
        additional_ms: u64,
    ) -> Result<Option<u64>, StoreError> {
        match self.locks.get_mut(resource_id) {
            Some(entry) if entry.token == token => {
                entry.lock.expires_at += additional_ms;
                entry.ttl_ms += additional_ms;
                Ok(Some(entry.lock.expires_at))
            }
            _ => Ok(None),
        }
    }

    fn heartbeat_if_match(
        &mut self,
        resource_id: &str,
        token: &str,
        now: u64,
    ) -> Result<Option<u64>, StoreError> {
        match self.locks.get_mut(resource_id) {
            Some(entry) if entry.token == token && Self::entry_live(entry, now) => {
                entry.lock.last_heartbeat = now;
                entry.lock.expires_at = now + entry.ttl_ms;
                Ok(Some(entry.lock.expires_at))
            }
            _ => Ok(None),
        }
    }

    fn remove_lock(&mut self, lock_id: &str) -> Result<Option<Lock>, StoreError> {
        let resource_id = self
            .locks
            .iter()
            .find(|(_, entry)| entry.lock.id == lock_id)
            .map(|(key, _)| key.clone());

        Ok(resource_id
            .and_then(|key| self.locks.remove(&key))
            .map(|entry| entry.lock))
    }

    fn get_lock(&self, resource_id: &str, now: u64) -> Result<Option<Lock>, StoreError> {
        Ok(self
            .locks
            .get(resource_id)
            .filter(|entry| Self::entry_live(entry, now))
            .map(|entry| entry.lock.clone()))
    }

    fn active_locks(&self, now: u64) -> Result<Vec<Lock>, StoreError> {
        Ok(self
            .locks
            .values()
            .filter(|entry| Self::entry_live(entry, now))
            .map(|entry| entry.lock.clone())
            .collect())
    }

    fn record_contention(
        &mut self,
        resource_id: &str,
        requester_id: &str,
        now: u64,
        ttl_ms: u64,
    ) -> Result<(), StoreError> {
        self.contention
            .entry(resource_id.to_string())
            .or_default()
            .push((requester_id.to_string(), now + ttl_ms));
        Ok(())
    }

    fn contention_count(&self, resource_id: &str, now: u64) -> Result<usize, StoreError> {
        Ok(self
            .contention
            .get(resource_id)
            .map(|entries| entries.iter().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0))
    }

    fn sweep_expired(&mut self, now: u64) -> Result<usize, StoreError> {
        let before = self.locks.len();
        self.locks.retain(|_, entry| Self::entry_live(entry, now));
        let removed = before - self.locks.len();

        for entries in self.contention.values_mut() {
            entries.retain(|(_, exp)| *exp > now);
        }
        self.contention.retain(|_, entries| !entries.is_empty());

        Ok(removed)
    }

    fn put_conflict(
        &mut self,
        conflict: &Conflict,
        retention_ms: u64,
        now: u64,
    ) -> Result<(), StoreError> {
        self.conflicts
            .insert(conflict.id.clone(), (conflict.clone(), now + retention_ms));
        Ok(())
    }

    fn load_conflicts(&self, now: u64) -> Result<Vec<Conflict>, StoreError> {
        Ok(self
            .conflicts
            .values()
            .filter(|(_, purge_at)| *purge_at > now)
            .map(|(conflict, _)| conflict.clone())
            .collect())
    }

    fn purge_conflicts(&mut self, now: u64) -> Result<usize, StoreError> {
        let before = self.conflicts.len();
        self.conflicts.retain(|_, (_, purge_at)| *purge_at > now);
        Ok(before - self.conflicts.len())
    }
}
