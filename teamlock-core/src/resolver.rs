//! The conflict resolver.
//!
//! Consumes lock-conflict events (reactive path), independently scans
//! active locks on a timer (proactive path), classifies contention into
//! typed conflicts, applies resolution strategies, and escalates what it
//! cannot resolve. Owns the Conflict/Resolution lifecycle exclusively; it
//! commands the lock manager for force-releases but never touches lock
//! keys itself.

use std::collections::HashMap;
use std::sync::MutexGuard;

use serde::Serialize;

use crate::config::CoordinationConfig;
use crate::detect::ConflictDetector;
use crate::error::{CoreError, Result};
use crate::events::{CoordinationEvent, EventSender};
use crate::manager::{LockManager, SharedStore, now_ms};
use crate::store::LockStore;
use crate::strategies::{PlanVerdict, PlannedAction, ResolutionPlan, StrategyPlanner};
use crate::types::{
    ActionType, Conflict, ConflictStatus, ConflictType, Lock, Resolution, ResolutionAction,
    ResolutionStrategy, dedup_key,
};

/// Smoothing factor for the running mean resolution time
const RESOLUTION_TIME_ALPHA: f64 = 0.2;

/// Running counters exposed for the dashboard
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolverMetrics {
    pub total_conflicts: u64,
    pub resolved: u64,
    pub failed: u64,
    pub escalated: u64,
    pub by_type: HashMap<String, u64>,
    pub by_strategy: HashMap<String, u64>,
    /// Exponentially smoothed mean time from detection to resolution
    pub avg_resolution_ms: f64,
}

impl ResolverMetrics {
    fn record_detected(&mut self, conflict_type: ConflictType) {
        self.total_conflicts += 1;
        *self.by_type.entry(conflict_type.to_string()).or_insert(0) += 1;
    }

    fn record_resolved(&mut self, strategy: ResolutionStrategy, elapsed_ms: u64) {
        self.resolved += 1;
        *self.by_strategy.entry(strategy.to_string()).or_insert(0) += 1;
        let sample = elapsed_ms as f64;
        if self.resolved == 1 {
            self.avg_resolution_ms = sample;
        } else {
            self.avg_resolution_ms = RESOLUTION_TIME_ALPHA * sample
                + (1.0 - RESOLUTION_TIME_ALPHA) * self.avg_resolution_ms;
        }
    }
}

pub struct ConflictResolver {
    store: SharedStore,
    config: CoordinationConfig,
    events: EventSender,
    /// Every tracked conflict, terminal ones included until retention purge
    conflicts: HashMap<String, Conflict>,
    metrics: ResolverMetrics,
    initialized: bool,
}

impl ConflictResolver {
    pub fn new(store: SharedStore, config: CoordinationConfig, events: EventSender) -> Self {
        Self {
            store,
            config,
            events,
            conflicts: HashMap::new(),
            metrics: ResolverMetrics::default(),
            initialized: false,
        }
    }

    /// Ping the store and reload persisted conflict records so tracking of
    /// anything still detected/escalated/resolving resumes across restarts.
    pub fn initialize(&mut self) -> Result<()> {
        self.initialize_at(now_ms())
    }

    pub fn initialize_at(&mut self, now: u64) -> Result<()> {
        let loaded = {
            let store = self.store();
            store.ping().map_err(CoreError::Store)?;
            store.load_conflicts(now).map_err(CoreError::Store)?
        };
        for conflict in loaded {
            self.conflicts.insert(conflict.id.clone(), conflict);
        }
        self.initialized = true;
        Ok(())
    }

    pub fn metrics(&self) -> &ResolverMetrics {
        &self.metrics
    }

    fn store(&self) -> MutexGuard<'_, dyn LockStore + Send + 'static> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether a tracked conflict already covers this contention. A
    /// resolved conflict frees its key (the contention may genuinely
    /// recur); escalated and failed ones keep suppressing re-detection
    /// until the retention purge drops them.
    fn already_tracked(&self, key: &str) -> bool {
        self.conflicts
            .values()
            .any(|c| c.status != ConflictStatus::Resolved && c.dedup_key() == key)
    }

    fn persist(&self, conflict: &Conflict, now: u64) {
        let mut store = self.store();
        if let Err(e) = store.put_conflict(conflict, self.config.conflict_retention_ms, now) {
            tracing::warn!(conflict_id = %conflict.id, error = %e, "failed to persist conflict");
        }
    }

    // ─── Reactive path ──────────────────────────────────────────────────

    pub fn on_lock_conflict(
        &mut self,
        requested: &Lock,
        holder: &Lock,
        manager: &mut LockManager,
    ) -> Option<String> {
        self.on_lock_conflict_at(requested, holder, manager, now_ms())
    }

    /// Invoked off the manager's lock-conflict event: synthesize a
    /// `LockContention` conflict from the two competing claims and try
    /// priority-based resolution immediately. Both the requester's and the
    /// holder's claims populate the conflict so the strategy has something
    /// to weigh.
    ///
    /// Returns the conflict ID, or `None` when the contention is already
    /// tracked.
    pub fn on_lock_conflict_at(
        &mut self,
        requested: &Lock,
        holder: &Lock,
        manager: &mut LockManager,
        now: u64,
    ) -> Option<String> {
        if !self.initialized {
            return None;
        }

        let resources = vec![holder.resource_id.clone()];
        let key = dedup_key(ConflictType::LockContention, &resources);
        if self.already_tracked(&key) {
            return None;
        }

        let mut involved = vec![requested.holder_id.clone(), holder.holder_id.clone()];
        involved.sort_unstable();
        involved.dedup();

        let conflict = Conflict {
            id: format!("conflict_{}", nanoid::nanoid!(12)),
            team_id: holder.team_id.clone(),
            project_id: holder.project_id.clone(),
            conflict_type: ConflictType::LockContention,
            description: format!(
                "{} requested {} already held by {}",
                requested.holder_id, holder.resource_id, holder.holder_id
            ),
            involved_members: involved,
            resources,
            detected_at: now,
            resolved_at: None,
            resolution: None,
            status: ConflictStatus::Detected,
            priority: ConflictType::LockContention.priority(),
            auto_resolvable: ConflictType::LockContention.auto_resolvable(),
            impact: crate::detect::impact_for(ConflictType::LockContention, 2),
        };

        let id = conflict.id.clone();
        self.track_detected(conflict, now);

        let claims = vec![requested.clone(), holder.clone()];
        self.resolve_at(&id, &claims, manager, now);
        Some(id)
    }

    // ─── Proactive path ─────────────────────────────────────────────────

    pub fn run_detection_pass(&mut self, manager: &mut LockManager) -> usize {
        self.run_detection_pass_at(manager, now_ms())
    }

    /// Enumerate active locks, group by team then project, evaluate the
    /// rule table per group, and resolve (or escalate) whatever is new.
    /// Returns the number of newly tracked conflicts.
    pub fn run_detection_pass_at(&mut self, manager: &mut LockManager, now: u64) -> usize {
        if !self.initialized {
            return 0;
        }

        let locks = manager.active_locks_at(now);
        let mut groups: Vec<((String, String), Vec<Lock>)> = Vec::new();
        for lock in locks {
            let key = (lock.team_id.clone(), lock.project_id.clone());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(lock),
                None => groups.push((key, vec![lock])),
            }
        }

        let mut new_conflicts = 0;
        for ((team_id, project_id), group) in groups {
            for seed in ConflictDetector::scan_group(&group) {
                let key = dedup_key(seed.conflict_type, &seed.resources);
                if self.already_tracked(&key) {
                    continue;
                }

                let conflict = ConflictDetector::build_conflict(seed, &team_id, &project_id, now);
                let id = conflict.id.clone();
                let involved: Vec<Lock> = group
                    .iter()
                    .filter(|l| conflict.resources.contains(&l.resource_id))
                    .cloned()
                    .collect();

                self.track_detected(conflict, now);
                new_conflicts += 1;
                self.resolve_at(&id, &involved, manager, now);
            }
        }
        new_conflicts
    }

    fn track_detected(&mut self, conflict: Conflict, now: u64) {
        self.metrics.record_detected(conflict.conflict_type);
        self.persist(&conflict, now);
        self.events.send(CoordinationEvent::ConflictDetected {
            conflict: conflict.clone(),
        });
        self.conflicts.insert(conflict.id.clone(), conflict);
    }

    // ─── Resolution ─────────────────────────────────────────────────────

    /// Apply the conflict's strategy to a snapshot of the contending
    /// claims. The conflict ends `Resolved` only when every executed
    /// action succeeded; any action failure (or an inapplicable strategy)
    /// escalates instead — contention is never silently dropped.
    pub fn resolve_at(
        &mut self,
        conflict_id: &str,
        claims: &[Lock],
        manager: &mut LockManager,
        now: u64,
    ) -> bool {
        let Some(conflict) = self.conflicts.get_mut(conflict_id) else {
            return false;
        };
        if conflict.status.is_terminal() {
            return conflict.status == ConflictStatus::Resolved;
        }

        conflict.status = ConflictStatus::Resolving;
        let strategy = conflict.conflict_type.default_strategy();
        let detected_at = conflict.detected_at;

        match StrategyPlanner::plan(strategy, claims) {
            PlanVerdict::Plan(plan) => {
                let actions = self.execute_plan(&plan, manager, now);
                let all_succeeded = actions.iter().all(|a| a.success);

                let resolution = Resolution {
                    strategy: plan.strategy,
                    resolved_by: "conflict-resolver".to_string(),
                    decision: plan.decision,
                    reasoning: plan.reasoning,
                    actions,
                    applied_at: now,
                    success: all_succeeded,
                };

                let conflict = match self.conflicts.get_mut(conflict_id) {
                    Some(c) => c,
                    None => return false,
                };
                conflict.resolution = Some(resolution.clone());

                if all_succeeded {
                    conflict.status = ConflictStatus::Resolved;
                    conflict.resolved_at = Some(now);
                    let snapshot = conflict.clone();
                    self.metrics
                        .record_resolved(strategy, now.saturating_sub(detected_at));
                    self.persist(&snapshot, now);
                    self.events.send(CoordinationEvent::ConflictResolved {
                        conflict: snapshot,
                        resolution,
                    });
                    true
                } else {
                    self.escalate(conflict_id, now);
                    false
                }
            }
            PlanVerdict::Escalate { reason } => {
                tracing::debug!(conflict_id, %reason, "strategy not applicable");
                self.escalate(conflict_id, now);
                false
            }
        }
    }

    fn execute_plan(
        &mut self,
        plan: &ResolutionPlan,
        manager: &mut LockManager,
        now: u64,
    ) -> Vec<ResolutionAction> {
        let mut executed = Vec::with_capacity(plan.actions.len());

        for action in &plan.actions {
            let record = match action {
                PlannedAction::ForceRelease {
                    lock_id,
                    resource_id,
                    holder_id,
                } => {
                    let released = manager.force_release(
                        lock_id,
                        "conflict-resolver",
                        &format!("released {}'s claim to break contention", holder_id),
                    );
                    // A claim that is already gone from the ledger (e.g. a
                    // rejected request that never held anything) is in the
                    // goal state; only a live claim we failed to break
                    // counts as a failure.
                    let success = released || self.claim_gone(resource_id, lock_id, now);
                    ResolutionAction {
                        action_type: ActionType::ReleaseLock,
                        target: lock_id.clone(),
                        success,
                        error: (!success).then(|| "lock could not be released".to_string()),
                    }
                }
                PlannedAction::Reassign {
                    lock_id,
                    resource_id,
                    from_holder,
                    to_holder,
                } => {
                    let released = manager.force_release(
                        lock_id,
                        "conflict-resolver",
                        &format!("reassigning {} from {} to {}", resource_id, from_holder, to_holder),
                    );
                    let success = released || self.claim_gone(resource_id, lock_id, now);
                    ResolutionAction {
                        action_type: ActionType::ReassignAgent,
                        target: format!("{} -> {}", resource_id, to_holder),
                        success,
                        error: (!success).then(|| "assignment could not be broken".to_string()),
                    }
                }
                PlannedAction::Notify { message } => ResolutionAction {
                    action_type: ActionType::NotifyTeam,
                    target: message.clone(),
                    success: true,
                    error: None,
                },
            };
            executed.push(record);
        }
        executed
    }

    /// Whether a specific claim no longer exists in the ledger.
    /// Store failures count as "still there" — fail closed.
    fn claim_gone(&self, resource_id: &str, lock_id: &str, now: u64) -> bool {
        match self.store().get_lock(resource_id, now) {
            Ok(Some(current)) => current.id != lock_id,
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Hand the conflict to a human. Terminal, but retained until the
    /// retention window lapses.
    pub fn escalate(&mut self, conflict_id: &str, now: u64) {
        let Some(conflict) = self.conflicts.get_mut(conflict_id) else {
            return;
        };
        conflict.status = ConflictStatus::Escalated;
        self.metrics.escalated += 1;
        let snapshot = conflict.clone();
        self.persist(&snapshot, now);
        self.events
            .send(CoordinationEvent::ConflictEscalated { conflict: snapshot });
    }

    /// Mark a conflict as failed outright (infrastructure failure during
    /// resolution, distinct from escalation).
    pub fn mark_failed(&mut self, conflict_id: &str, now: u64) {
        let Some(conflict) = self.conflicts.get_mut(conflict_id) else {
            return;
        };
        conflict.status = ConflictStatus::Failed;
        conflict.resolved_at = Some(now);
        self.metrics.failed += 1;
        let snapshot = conflict.clone();
        self.persist(&snapshot, now);
    }

    // ─── Queries and retention ──────────────────────────────────────────

    pub fn recent_conflicts(&self, team_id: &str, hours: u64) -> Vec<Conflict> {
        self.recent_conflicts_at(team_id, hours, now_ms())
    }

    /// Conflicts for a team within a trailing window, newest first.
    pub fn recent_conflicts_at(&self, team_id: &str, hours: u64, now: u64) -> Vec<Conflict> {
        let cutoff = now.saturating_sub(hours * 60 * 60 * 1000);
        let mut conflicts: Vec<Conflict> = self
            .conflicts
            .values()
            .filter(|c| c.team_id == team_id && c.detected_at >= cutoff)
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        conflicts
    }

    pub fn tracked_conflict(&self, conflict_id: &str) -> Option<&Conflict> {
        self.conflicts.get(conflict_id)
    }

    pub fn run_retention_pass(&mut self) -> usize {
        self.run_retention_pass_at(now_ms())
    }

    /// Drop terminal conflicts older than the retention window, locally
    /// and from the durable log.
    pub fn run_retention_pass_at(&mut self, now: u64) -> usize {
        let retention = self.config.conflict_retention_ms;
        let before = self.conflicts.len();
        self.conflicts.retain(|_, c| {
            !(c.status.is_terminal() && c.detected_at + retention <= now)
        });
        let purged = before - self.conflicts.len();

        if let Err(e) = self.store().purge_conflicts(now) {
            tracing::warn!(error = %e, "conflict log purge failed");
        }
        purged
    }
}
