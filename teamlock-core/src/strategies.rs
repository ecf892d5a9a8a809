//! Resolution strategy planners.
//!
//! Pure functions: a snapshot of the contending locks goes in, a concrete
//! plan (or an escalation verdict) comes out. Executing the plan — actually
//! force-releasing and notifying — is the resolver's job, so every planner
//! stays deterministic and unit-testable without a store.

use crate::types::{Lock, ResolutionStrategy};

/// One concrete step a plan wants taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Break the loser's claim so the winner proceeds
    ForceRelease {
        lock_id: String,
        resource_id: String,
        holder_id: String,
    },
    /// Move an over-assigned agent resource to a less-loaded holder
    Reassign {
        lock_id: String,
        resource_id: String,
        from_holder: String,
        to_holder: String,
    },
    /// Broadcast a decision to the team
    Notify { message: String },
}

/// A fully-decided course of action
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    pub strategy: ResolutionStrategy,
    pub decision: String,
    pub reasoning: String,
    pub actions: Vec<PlannedAction>,
}

/// Planner output: either an executable plan or a reasoned escalation
#[derive(Debug, Clone)]
pub enum PlanVerdict {
    Plan(ResolutionPlan),
    Escalate { reason: String },
}

pub struct StrategyPlanner;

impl StrategyPlanner {
    pub fn plan(strategy: ResolutionStrategy, locks: &[Lock]) -> PlanVerdict {
        match strategy {
            ResolutionStrategy::PriorityBased => Self::priority_based(locks),
            ResolutionStrategy::FirstWins => Self::first_wins(locks),
            ResolutionStrategy::LoadBalance => Self::load_balance(locks),
            ResolutionStrategy::SequenceOptimization => Self::sequence_optimization(locks),
            ResolutionStrategy::ManualMerge => PlanVerdict::Escalate {
                reason: "merge decisions require a human".to_string(),
            },
            ResolutionStrategy::VoteBased => PlanVerdict::Escalate {
                reason: "vote collection is a manual process".to_string(),
            },
            ResolutionStrategy::Escalated => PlanVerdict::Escalate {
                reason: "conflict type always escalates".to_string(),
            },
        }
    }

    /// Retain the single highest-priority claim (earliest acquisition
    /// breaks ties); every other holder is force-released.
    fn priority_based(locks: &[Lock]) -> PlanVerdict {
        if locks.len() < 2 {
            return PlanVerdict::Escalate {
                reason: "priority comparison needs at least two claims".to_string(),
            };
        }

        let winner = match locks
            .iter()
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.acquired_at.cmp(&a.acquired_at))
            }) {
            Some(winner) => winner,
            None => {
                return PlanVerdict::Escalate {
                    reason: "no claims to compare".to_string(),
                };
            }
        };

        let actions = release_losers(locks, &winner.id);
        PlanVerdict::Plan(ResolutionPlan {
            strategy: ResolutionStrategy::PriorityBased,
            decision: format!(
                "retain {} ({} priority) on {}",
                winner.holder_id, winner.priority, winner.resource_id
            ),
            reasoning: format!(
                "{} outranks {} other claim(s); lower-priority holders release",
                winner.holder_id,
                locks.len() - 1
            ),
            actions,
        })
    }

    /// Retain the earliest-acquired claim. The comparison is on
    /// `acquired_at` timestamps, never on identifier ordering.
    fn first_wins(locks: &[Lock]) -> PlanVerdict {
        if locks.len() < 2 {
            return PlanVerdict::Escalate {
                reason: "first-wins needs at least two claims".to_string(),
            };
        }

        let winner = match locks
            .iter()
            .min_by(|a, b| a.acquired_at.cmp(&b.acquired_at).then(a.id.cmp(&b.id)))
        {
            Some(winner) => winner,
            None => {
                return PlanVerdict::Escalate {
                    reason: "no claims to compare".to_string(),
                };
            }
        };

        let actions = release_losers(locks, &winner.id);
        PlanVerdict::Plan(ResolutionPlan {
            strategy: ResolutionStrategy::FirstWins,
            decision: format!(
                "retain {} (acquired at {}) on {}",
                winner.holder_id, winner.acquired_at, winner.resource_id
            ),
            reasoning: "earliest acquisition wins; later claims release".to_string(),
            actions,
        })
    }

    /// Redistribute over-assigned agent resources across less-loaded
    /// holders until the per-holder spread is at most one.
    fn load_balance(locks: &[Lock]) -> PlanVerdict {
        let mut loads: Vec<(String, Vec<&Lock>)> = Vec::new();
        for lock in locks {
            match loads.iter_mut().find(|(holder, _)| *holder == lock.holder_id) {
                Some((_, held)) => held.push(lock),
                None => loads.push((lock.holder_id.clone(), vec![lock])),
            }
        }

        if loads.len() < 2 {
            return PlanVerdict::Escalate {
                reason: "no alternate holder available to take reassigned work".to_string(),
            };
        }

        let mut counts: Vec<(String, usize)> = loads
            .iter()
            .map(|(holder, held)| (holder.clone(), held.len()))
            .collect();
        let mut movable: Vec<&Lock> = loads
            .iter()
            .flat_map(|(_, held)| held.iter().copied())
            .collect();
        let mut actions = Vec::new();
        let mut moves = Vec::new();

        loop {
            counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let (busiest, max) = counts[0].clone();
            let (idlest, min) = counts[counts.len() - 1].clone();
            if max - min <= 1 {
                break;
            }

            let Some(pos) = movable.iter().position(|l| l.holder_id == busiest) else {
                break;
            };
            let lock = movable.remove(pos);
            actions.push(PlannedAction::Reassign {
                lock_id: lock.id.clone(),
                resource_id: lock.resource_id.clone(),
                from_holder: busiest.clone(),
                to_holder: idlest.clone(),
            });
            moves.push(format!("{}: {} -> {}", lock.resource_id, busiest, idlest));
            counts[0].1 -= 1;
            let last = counts.len() - 1;
            counts[last].1 += 1;
        }

        if actions.is_empty() {
            return PlanVerdict::Escalate {
                reason: "assignments already balanced; overload has another cause".to_string(),
            };
        }

        PlanVerdict::Plan(ResolutionPlan {
            strategy: ResolutionStrategy::LoadBalance,
            decision: format!("reassign {} agent resource(s): {}", moves.len(), moves.join("; ")),
            reasoning: "spread agent assignments so no holder carries more than one extra"
                .to_string(),
            actions,
        })
    }

    /// Recompute an execution order for contending workflow steps: phase
    /// tags order first, acquisition time breaks ties. The recomputed
    /// sequence is the decision; the team is notified of the new order.
    fn sequence_optimization(locks: &[Lock]) -> PlanVerdict {
        if locks.len() < 2 {
            return PlanVerdict::Escalate {
                reason: "sequencing needs at least two steps".to_string(),
            };
        }

        let mut ordered: Vec<&Lock> = locks.iter().collect();
        ordered.sort_by(|a, b| {
            let pa = phase_of(a).unwrap_or(u64::MAX);
            let pb = phase_of(b).unwrap_or(u64::MAX);
            pa.cmp(&pb).then(a.acquired_at.cmp(&b.acquired_at))
        });

        let sequence: Vec<String> = ordered
            .iter()
            .map(|l| format!("{} ({})", l.resource_id, l.holder_id))
            .collect();
        let decision = format!("execution order: {}", sequence.join(" -> "));

        PlanVerdict::Plan(ResolutionPlan {
            strategy: ResolutionStrategy::SequenceOptimization,
            decision: decision.clone(),
            reasoning: "steps reordered by phase tag, then acquisition time, to remove the \
                        ordering dependency"
                .to_string(),
            actions: vec![PlannedAction::Notify { message: decision }],
        })
    }
}

fn release_losers(locks: &[Lock], winner_id: &str) -> Vec<PlannedAction> {
    locks
        .iter()
        .filter(|l| l.id != winner_id)
        .map(|l| PlannedAction::ForceRelease {
            lock_id: l.id.clone(),
            resource_id: l.resource_id.clone(),
            holder_id: l.holder_id.clone(),
        })
        .collect()
}

/// Extract a numeric phase from an operation tag like "workflow:phase:2"
/// or "phase-3".
pub fn phase_of(lock: &Lock) -> Option<u64> {
    let operation = lock.operation.to_lowercase();
    let idx = operation.find("phase")?;
    operation[idx + "phase".len()..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()
}
