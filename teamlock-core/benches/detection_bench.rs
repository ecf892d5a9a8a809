use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use teamlock_core::detect::{ConflictDetector, paths_related};
use teamlock_core::strategies::StrategyPlanner;
use teamlock_core::types::*;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn make_lock(i: usize, resource_type: ResourceType, priority: LockPriority) -> Lock {
    Lock {
        id: format!("lock_{}", i),
        resource_id: format!("file:src/module_{}/mod.rs", i),
        resource_type,
        holder_id: format!("member_{}", i % 7),
        team_id: "team1".to_string(),
        project_id: "proj1".to_string(),
        acquired_at: 1000 + i as u64,
        expires_at: 1_000_000,
        last_heartbeat: 1000 + i as u64,
        priority,
        operation: "edit".to_string(),
        description: "benchmark lock".to_string(),
        status: LockStatus::Active,
    }
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_paths_related(c: &mut Criterion) {
    c.bench_function("paths_related", |b| {
        b.iter(|| {
            paths_related(
                black_box("file:src/auth"),
                black_box("file:src/auth/token.rs"),
            )
        })
    });
}

fn bench_scan_with_varying_group_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_scan_group");

    for count in [10, 100, 1000] {
        let locks: Vec<Lock> = (0..count)
            .map(|i| make_lock(i, ResourceType::File, LockPriority::Medium))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| ConflictDetector::scan_group(black_box(&locks)))
        });
    }

    group.finish();
}

fn bench_scan_agent_overload(c: &mut Criterion) {
    let locks: Vec<Lock> = (0..50)
        .map(|i| make_lock(i, ResourceType::Agent, LockPriority::Medium))
        .collect();

    c.bench_function("detect_agent_overload", |b| {
        b.iter(|| ConflictDetector::scan_group(black_box(&locks)))
    });
}

fn bench_priority_plan(c: &mut Criterion) {
    let locks: Vec<Lock> = (0..20)
        .map(|i| {
            let priority = match i % 4 {
                0 => LockPriority::Low,
                1 => LockPriority::Medium,
                2 => LockPriority::High,
                _ => LockPriority::Critical,
            };
            make_lock(i, ResourceType::Task, priority)
        })
        .collect();

    c.bench_function("plan_priority_based", |b| {
        b.iter(|| StrategyPlanner::plan(ResolutionStrategy::PriorityBased, black_box(&locks)))
    });
}

fn bench_load_balance_plan(c: &mut Criterion) {
    let locks: Vec<Lock> = (0..40)
        .map(|i| {
            let mut lock = make_lock(i, ResourceType::Agent, LockPriority::Medium);
            // skewed assignment so the planner has moves to make
            lock.holder_id = if i < 30 { "busy".to_string() } else { format!("idle_{}", i) };
            lock
        })
        .collect();

    c.bench_function("plan_load_balance", |b| {
        b.iter(|| StrategyPlanner::plan(ResolutionStrategy::LoadBalance, black_box(&locks)))
    });
}

criterion_group!(
    benches,
    bench_paths_related,
    bench_scan_with_varying_group_size,
    bench_scan_agent_overload,
    bench_priority_plan,
    bench_load_balance_plan,
);
criterion_main!(benches);
