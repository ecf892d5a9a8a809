//! Rule-based contention detection.
//!
//! A pure engine: given the set of active locks for one team/project group,
//! an ordered table of rules decides which typed conflicts are present.
//! Building full `Conflict` records (IDs, priority, impact) happens here
//! too so the resolver only orchestrates.

use nanoid::nanoid;

use crate::types::{Conflict, ConflictStatus, ConflictType, ImpactLevel, Lock, ResourceType};

/// A rule verdict before it becomes a tracked `Conflict`
#[derive(Debug, Clone)]
pub struct ConflictSeed {
    pub conflict_type: ConflictType,
    pub description: String,
    pub involved_members: Vec<String>,
    pub resources: Vec<String>,
}

/// Operation tags that mark a lock as part of a quality/review gate
const QUALITY_TAGS: &[&str] = &["quality", "review", "gate"];

/// Operation tags that mark a lock as a sequenced workflow step
const WORKFLOW_TAGS: &[&str] = &["workflow", "phase"];

pub struct ConflictDetector;

impl ConflictDetector {
    /// Evaluate the full rule table against one group of locks.
    /// Each matched rule yields at most one seed per contended cluster.
    pub fn scan_group(locks: &[Lock]) -> Vec<ConflictSeed> {
        let mut seeds = Vec::new();
        seeds.extend(Self::check_lock_contention(locks));
        seeds.extend(Self::check_resource_collision(locks));
        seeds.extend(Self::check_concurrent_execution(locks));
        seeds.extend(Self::check_agent_assignment(locks));
        seeds.extend(Self::check_quality_gate(locks));
        seeds.extend(Self::check_permission_dispute(locks));
        seeds.extend(Self::check_workflow_interference(locks));
        seeds
    }

    /// More than one lock on the same resource key. A healthy store never
    /// admits this, so a match means ledger damage worth resolving.
    fn check_lock_contention(locks: &[Lock]) -> Vec<ConflictSeed> {
        let mut by_resource: Vec<(&str, Vec<&Lock>)> = Vec::new();
        for lock in locks {
            match by_resource.iter_mut().find(|(key, _)| *key == lock.resource_id) {
                Some((_, group)) => group.push(lock),
                None => by_resource.push((&lock.resource_id, vec![lock])),
            }
        }

        by_resource
            .into_iter()
            .filter(|(_, group)| group.len() > 1)
            .map(|(resource, group)| ConflictSeed {
                conflict_type: ConflictType::LockContention,
                description: format!("{} holders contend for {}", group.len(), resource),
                involved_members: members_of(&group),
                resources: vec![resource.to_string()],
            })
            .collect()
    }

    /// File locks whose paths overlap (same path or one contains the other).
    fn check_resource_collision(locks: &[Lock]) -> Vec<ConflictSeed> {
        let files: Vec<&Lock> = locks
            .iter()
            .filter(|l| l.resource_type == ResourceType::File)
            .collect();

        let mut colliding: Vec<&Lock> = Vec::new();
        for (i, a) in files.iter().enumerate() {
            for b in files.iter().skip(i + 1) {
                if a.resource_id != b.resource_id
                    && paths_related(&a.resource_id, &b.resource_id)
                {
                    for lock in [*a, *b] {
                        if !colliding.iter().any(|c| c.id == lock.id) {
                            colliding.push(lock);
                        }
                    }
                }
            }
        }

        if colliding.is_empty() {
            return Vec::new();
        }
        vec![ConflictSeed {
            conflict_type: ConflictType::ResourceCollision,
            description: "file locks cover overlapping paths".to_string(),
            involved_members: members_of(&colliding),
            resources: resources_of(&colliding),
        }]
    }

    /// More than one pipeline execution running in the same project.
    fn check_concurrent_execution(locks: &[Lock]) -> Vec<ConflictSeed> {
        let executions: Vec<&Lock> = locks
            .iter()
            .filter(|l| l.resource_type == ResourceType::Execution)
            .collect();

        if executions.len() <= 1 {
            return Vec::new();
        }
        vec![ConflictSeed {
            conflict_type: ConflictType::ConcurrentExecution,
            description: format!(
                "{} executions running concurrently in one project",
                executions.len()
            ),
            involved_members: members_of(&executions),
            resources: resources_of(&executions),
        }]
    }

    /// More than three agent resources claimed at once: the agent pool is
    /// over-assigned and work should be spread out.
    fn check_agent_assignment(locks: &[Lock]) -> Vec<ConflictSeed> {
        let agents: Vec<&Lock> = locks
            .iter()
            .filter(|l| l.resource_type == ResourceType::Agent)
            .collect();

        if agents.len() <= 3 {
            return Vec::new();
        }
        vec![ConflictSeed {
            conflict_type: ConflictType::AgentAssignment,
            description: format!("{} concurrent agent assignments (overload)", agents.len()),
            involved_members: members_of(&agents),
            resources: resources_of(&agents),
        }]
    }

    /// More than two simultaneous quality/review-tagged locks.
    fn check_quality_gate(locks: &[Lock]) -> Vec<ConflictSeed> {
        let gated: Vec<&Lock> = locks
            .iter()
            .filter(|l| has_tag(l, QUALITY_TAGS))
            .collect();

        if gated.len() <= 2 {
            return Vec::new();
        }
        vec![ConflictSeed {
            conflict_type: ConflictType::QualityGateConflict,
            description: format!("{} simultaneous quality-gate locks", gated.len()),
            involved_members: members_of(&gated),
            resources: resources_of(&gated),
        }]
    }

    /// More than one simultaneous critical/high-priority lock.
    fn check_permission_dispute(locks: &[Lock]) -> Vec<ConflictSeed> {
        let elevated: Vec<&Lock> = locks
            .iter()
            .filter(|l| l.priority >= crate::types::LockPriority::High)
            .collect();

        if elevated.len() <= 1 {
            return Vec::new();
        }
        vec![ConflictSeed {
            conflict_type: ConflictType::PermissionDispute,
            description: format!(
                "{} simultaneous high/critical-priority locks",
                elevated.len()
            ),
            involved_members: members_of(&elevated),
            resources: resources_of(&elevated),
        }]
    }

    /// Two or more workflow/phase-tagged locks whose ordering can interfere.
    fn check_workflow_interference(locks: &[Lock]) -> Vec<ConflictSeed> {
        let steps: Vec<&Lock> = locks
            .iter()
            .filter(|l| has_tag(l, WORKFLOW_TAGS))
            .collect();

        if steps.len() < 2 {
            return Vec::new();
        }
        vec![ConflictSeed {
            conflict_type: ConflictType::WorkflowInterference,
            description: format!("{} workflow steps with ordering dependency", steps.len()),
            involved_members: members_of(&steps),
            resources: resources_of(&steps),
        }]
    }

    /// Promote a seed to a tracked conflict record. Priority, impact, and
    /// auto-resolvability derive from the conflict type and group size.
    pub fn build_conflict(
        seed: ConflictSeed,
        team_id: &str,
        project_id: &str,
        now: u64,
    ) -> Conflict {
        let group_size = seed.involved_members.len().max(seed.resources.len());
        Conflict {
            id: format!("conflict_{}", nanoid!(12)),
            team_id: team_id.to_string(),
            project_id: project_id.to_string(),
            conflict_type: seed.conflict_type,
            description: seed.description,
            involved_members: seed.involved_members,
            resources: seed.resources,
            detected_at: now,
            resolved_at: None,
            resolution: None,
            status: ConflictStatus::Detected,
            priority: seed.conflict_type.priority(),
            auto_resolvable: seed.conflict_type.auto_resolvable(),
            impact: impact_for(seed.conflict_type, group_size),
        }
    }
}

/// Impact derives from type, bumped one level for large groups.
pub fn impact_for(conflict_type: ConflictType, group_size: usize) -> ImpactLevel {
    let base = match conflict_type {
        ConflictType::PermissionDispute => ImpactLevel::Major,
        ConflictType::ConcurrentExecution
        | ConflictType::QualityGateConflict
        | ConflictType::LockContention => ImpactLevel::Moderate,
        _ => ImpactLevel::Minor,
    };
    if group_size > 5 {
        match base {
            ImpactLevel::Minor => ImpactLevel::Moderate,
            ImpactLevel::Moderate => ImpactLevel::Major,
            _ => ImpactLevel::Severe,
        }
    } else {
        base
    }
}

/// Whether two file resource keys cover the same or nested paths.
pub fn paths_related(a: &str, b: &str) -> bool {
    let a = a.strip_prefix("file:").unwrap_or(a).trim_end_matches('/');
    let b = b.strip_prefix("file:").unwrap_or(b).trim_end_matches('/');
    if a == b {
        return true;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    longer.starts_with(shorter) && longer[shorter.len()..].starts_with('/')
}

fn has_tag(lock: &Lock, tags: &[&str]) -> bool {
    let operation = lock.operation.to_lowercase();
    tags.iter().any(|tag| operation.contains(tag))
}

fn members_of(group: &[&Lock]) -> Vec<String> {
    let mut members: Vec<String> = group.iter().map(|l| l.holder_id.clone()).collect();
    members.sort_unstable();
    members.dedup();
    members
}

fn resources_of(group: &[&Lock]) -> Vec<String> {
    let mut resources: Vec<String> = group.iter().map(|l| l.resource_id.clone()).collect();
    resources.sort_unstable();
    resources.dedup();
    resources
}
