//! The distributed lock manager.
//!
//! Owns the lock lifecycle (acquire/release/extend/heartbeat/expire/
//! force-release) against the backing store and keeps a process-local
//! cache of the locks *this instance* created. The cache exists only so
//! the heartbeat and cleanup passes know which locks this process is
//! responsible for renewing; it is never the global view — all read
//! queries go to the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use nanoid::nanoid;

use crate::config::CoordinationConfig;
use crate::error::{CoreError, Result};
use crate::events::{CoordinationEvent, EventSender};
use crate::store::{AcquireOutcome, LockStore};
use crate::types::{Lock, LockRequest, LockResult, LockStatus};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Store handle shared between the manager and the resolver.
pub type SharedStore = Arc<Mutex<dyn LockStore + Send>>;

struct CachedLock {
    token: String,
    lock: Lock,
}

/// Lifecycle owner for locks. The only writer to lock keys in the store.
pub struct LockManager {
    store: SharedStore,
    config: CoordinationConfig,
    events: EventSender,
    /// Locks this instance created, keyed by lock ID
    cache: HashMap<String, CachedLock>,
    initialized: bool,
}

impl LockManager {
    pub fn new(store: SharedStore, config: CoordinationConfig, events: EventSender) -> Self {
        Self {
            store,
            config,
            events,
            cache: HashMap::new(),
            initialized: false,
        }
    }

    /// Ping the store. Every operation refuses to run until this succeeds.
    pub fn initialize(&mut self) -> Result<()> {
        self.store().ping().map_err(CoreError::Store)?;
        self.initialized = true;
        Ok(())
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// The shared store handle, for wiring up the resolver.
    pub fn store_handle(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// How many locks this instance currently believes it holds.
    pub fn held_lock_count(&self) -> usize {
        self.cache.len()
    }

    fn store(&self) -> MutexGuard<'_, dyn LockStore + Send + 'static> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ─── Acquire ────────────────────────────────────────────────────────

    pub fn acquire(&mut self, request: &LockRequest) -> LockResult {
        self.acquire_at(request, now_ms())
    }

    /// One atomic store operation: write the candidate if the resource is
    /// free, otherwise return the current holder untouched. Contention is
    /// an ordinary failed result, never an error.
    pub fn acquire_at(&mut self, request: &LockRequest, now: u64) -> LockResult {
        if !self.initialized {
            return LockResult::failed("lock manager is not initialized");
        }

        let ttl_ms = request.timeout_ms.unwrap_or(self.config.default_ttl_ms);
        let candidate = Lock::from_request(request, format!("lock_{}", nanoid!(12)), ttl_ms, now);
        let token = nanoid!(21);

        let outcome = {
            let mut store = self.store();
            match store.try_acquire(&candidate, &token, now) {
                Ok(outcome) => {
                    if let AcquireOutcome::Held(_) = &outcome {
                        if let Err(e) = store.record_contention(
                            &request.resource_id,
                            &request.holder_id,
                            now,
                            self.config.contention_ttl_ms,
                        ) {
                            tracing::warn!(resource = %request.resource_id, error = %e,
                                "failed to record contention");
                        }
                    }
                    outcome
                }
                Err(e) => {
                    tracing::warn!(resource = %request.resource_id, error = %e,
                        "acquire failed at store");
                    return LockResult::failed(format!("store unavailable: {}", e));
                }
            }
        };

        match outcome {
            AcquireOutcome::Acquired => {
                self.cache.insert(
                    candidate.id.clone(),
                    CachedLock {
                        token,
                        lock: candidate.clone(),
                    },
                );
                self.events.send(CoordinationEvent::LockAcquired {
                    lock: candidate.clone(),
                });
                LockResult::granted(candidate)
            }
            AcquireOutcome::Held(holder) => {
                let wait_time_ms = holder.expires_at.saturating_sub(now);
                self.events.send(CoordinationEvent::LockConflict {
                    requested: candidate,
                    holder: holder.clone(),
                });
                LockResult::contended(holder, wait_time_ms)
            }
        }
    }

    // ─── Release / extend ───────────────────────────────────────────────

    pub fn release(&mut self, lock_id: &str) -> bool {
        if !self.initialized {
            return false;
        }

        // Release is only possible from the instance that created the lock
        // (or via force_release).
        let Some(cached) = self.cache.get(lock_id) else {
            return false;
        };
        let resource_id = cached.lock.resource_id.clone();
        let token = cached.token.clone();

        let released = {
            let mut store = self.store();
            match store.release_if_match(&resource_id, &token) {
                Ok(released) => released,
                Err(e) => {
                    tracing::warn!(lock_id, error = %e, "release failed at store");
                    return false;
                }
            }
        };

        if released {
            if let Some(cached) = self.cache.remove(lock_id) {
                let mut lock = cached.lock;
                lock.status = LockStatus::Released;
                self.events.send(CoordinationEvent::LockReleased { lock });
            }
        }
        released
    }

    pub fn extend(&mut self, lock_id: &str, additional_minutes: u64) -> bool {
        if !self.initialized {
            return false;
        }

        let Some(cached) = self.cache.get(lock_id) else {
            return false;
        };
        let resource_id = cached.lock.resource_id.clone();
        let token = cached.token.clone();
        let additional_ms = additional_minutes * 60 * 1000;

        let new_expiry = {
            let mut store = self.store();
            match store.extend_if_match(&resource_id, &token, additional_ms) {
                Ok(new_expiry) => new_expiry,
                Err(e) => {
                    tracing::warn!(lock_id, error = %e, "extend failed at store");
                    return false;
                }
            }
        };

        match new_expiry {
            Some(expires_at) => {
                if let Some(cached) = self.cache.get_mut(lock_id) {
                    cached.lock.expires_at = expires_at;
                }
                true
            }
            None => false,
        }
    }

    // ─── Background passes ──────────────────────────────────────────────

    pub fn run_heartbeat_pass(&mut self) -> usize {
        self.run_heartbeat_pass_at(now_ms())
    }

    /// Renew liveness on every cached lock. A heartbeat the store rejects
    /// means ownership is gone (force-released or taken over elsewhere);
    /// the lock is dropped from the cache and surfaced as `LockLost`.
    /// Store connectivity failures leave the cache untouched.
    pub fn run_heartbeat_pass_at(&mut self, now: u64) -> usize {
        if !self.initialized {
            return 0;
        }

        let lock_ids: Vec<String> = self.cache.keys().cloned().collect();
        let mut renewed = 0;

        for lock_id in lock_ids {
            let Some(cached) = self.cache.get(&lock_id) else {
                continue;
            };
            let resource_id = cached.lock.resource_id.clone();
            let token = cached.token.clone();

            let outcome = {
                let mut store = self.store();
                store.heartbeat_if_match(&resource_id, &token, now)
            };

            match outcome {
                Ok(Some(expires_at)) => {
                    if let Some(cached) = self.cache.get_mut(&lock_id) {
                        cached.lock.last_heartbeat = now;
                        cached.lock.expires_at = expires_at;
                    }
                    renewed += 1;
                }
                Ok(None) => {
                    if let Some(cached) = self.cache.remove(&lock_id) {
                        self.events
                            .send(CoordinationEvent::LockLost { lock: cached.lock });
                    }
                }
                Err(e) => {
                    tracing::warn!(lock_id, error = %e, "heartbeat failed at store");
                }
            }
        }
        renewed
    }

    pub fn run_cleanup_pass(&mut self) -> usize {
        self.run_cleanup_pass_at(now_ms())
    }

    /// Purge locally cached locks whose expiry has passed, then sweep the
    /// store for expired or TTL-less entries.
    pub fn run_cleanup_pass_at(&mut self, now: u64) -> usize {
        if !self.initialized {
            return 0;
        }

        let expired_ids: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, cached)| cached.lock.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        let expired = expired_ids.len();
        for lock_id in expired_ids {
            if let Some(cached) = self.cache.remove(&lock_id) {
                let mut lock = cached.lock;
                lock.status = LockStatus::Expired;
                self.events.send(CoordinationEvent::LockExpired { lock });
            }
        }

        if let Err(e) = self.store().sweep_expired(now) {
            tracing::warn!(error = %e, "store sweep failed");
        }
        expired
    }

    // ─── Force release ──────────────────────────────────────────────────

    /// Unconditional delete bypassing ownership matching. Used by
    /// administrators and by the conflict resolver when breaking
    /// contention. Emits the reason for audit.
    pub fn force_release(&mut self, lock_id: &str, released_by: &str, reason: &str) -> bool {
        if !self.initialized {
            return false;
        }

        let removed = {
            let mut store = self.store();
            match store.remove_lock(lock_id) {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::warn!(lock_id, error = %e, "force release failed at store");
                    return false;
                }
            }
        };

        let lock = match removed {
            Some(lock) => {
                self.cache.remove(lock_id);
                lock
            }
            // Not in the store, but still cached here: clean up our copy.
            None => match self.cache.remove(lock_id) {
                Some(cached) => cached.lock,
                None => return false,
            },
        };

        let mut lock = lock;
        lock.status = LockStatus::ForceReleased;
        self.events.send(CoordinationEvent::LockForceReleased {
            lock,
            released_by: released_by.to_string(),
            reason: reason.to_string(),
        });
        true
    }

    // ─── Queries (store-backed) ─────────────────────────────────────────

    pub fn team_locks(&self, team_id: &str) -> Vec<Lock> {
        self.team_locks_at(team_id, now_ms())
    }

    pub fn team_locks_at(&self, team_id: &str, now: u64) -> Vec<Lock> {
        self.query(|store| store.team_locks(team_id, now))
    }

    pub fn project_locks(&self, project_id: &str) -> Vec<Lock> {
        self.project_locks_at(project_id, now_ms())
    }

    pub fn project_locks_at(&self, project_id: &str, now: u64) -> Vec<Lock> {
        self.query(|store| store.project_locks(project_id, now))
    }

    pub fn resource_locks(&self, resource_id: &str) -> Vec<Lock> {
        self.resource_locks_at(resource_id, now_ms())
    }

    pub fn resource_locks_at(&self, resource_id: &str, now: u64) -> Vec<Lock> {
        self.query(|store| Ok(store.get_lock(resource_id, now)?.into_iter().collect()))
    }

    pub fn active_locks_at(&self, now: u64) -> Vec<Lock> {
        self.query(|store| store.active_locks(now))
    }

    fn query<F>(&self, f: F) -> Vec<Lock>
    where
        F: FnOnce(&(dyn LockStore + Send)) -> crate::error::StoreResult<Vec<Lock>>,
    {
        if !self.initialized {
            return Vec::new();
        }
        let store = self.store();
        match f(&*store) {
            Ok(locks) => locks,
            Err(e) => {
                tracing::warn!(error = %e, "lock query failed at store");
                Vec::new()
            }
        }
    }

    // ─── Shutdown ───────────────────────────────────────────────────────

    /// Best-effort release of every lock this instance holds. Individual
    /// failures are logged and skipped so shutdown never wedges.
    pub fn shutdown(&mut self) {
        let lock_ids: Vec<String> = self.cache.keys().cloned().collect();
        for lock_id in lock_ids {
            if !self.release(&lock_id) {
                tracing::warn!(lock_id, "could not release lock during shutdown");
                self.cache.remove(&lock_id);
            }
        }
        self.initialized = false;
    }
}
