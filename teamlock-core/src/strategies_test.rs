#[cfg(test)]
mod tests {
    use crate::strategies::{PlanVerdict, PlannedAction, StrategyPlanner, phase_of};
    use crate::types::{Lock, LockPriority, LockStatus, ResolutionStrategy, ResourceType};

    fn make_lock(id: &str, holder_id: &str, priority: LockPriority, acquired_at: u64) -> Lock {
        Lock {
            id: id.to_string(),
            resource_id: format!("res:{}", id),
            resource_type: ResourceType::Task,
            holder_id: holder_id.to_string(),
            team_id: "team1".to_string(),
            project_id: "proj1".to_string(),
            acquired_at,
            expires_at: acquired_at + 100_000,
            last_heartbeat: acquired_at,
            priority,
            operation: "edit".to_string(),
            description: "working".to_string(),
            status: LockStatus::Active,
        }
    }

    fn expect_plan(verdict: PlanVerdict) -> crate::strategies::ResolutionPlan {
        match verdict {
            PlanVerdict::Plan(plan) => plan,
            PlanVerdict::Escalate { reason } => panic!("expected a plan, escalated: {}", reason),
        }
    }

    #[test]
    fn test_priority_based_keeps_highest_claim() {
        let locks = vec![
            make_lock("l1", "alice", LockPriority::Medium, 1000),
            make_lock("l2", "bob", LockPriority::Critical, 2000),
            make_lock("l3", "carol", LockPriority::Low, 500),
        ];

        let plan = expect_plan(StrategyPlanner::plan(ResolutionStrategy::PriorityBased, &locks));
        assert_eq!(plan.strategy, ResolutionStrategy::PriorityBased);
        assert_eq!(plan.actions.len(), 2);
        for action in &plan.actions {
            match action {
                PlannedAction::ForceRelease { holder_id, .. } => {
                    assert_ne!(holder_id, "bob");
                }
                other => panic!("expected ForceRelease, got {:?}", other),
            }
        }
        assert!(plan.decision.contains("bob"));
    }

    #[test]
    fn test_priority_tie_breaks_on_earliest_acquisition() {
        let locks = vec![
            make_lock("l1", "alice", LockPriority::High, 5000),
            make_lock("l2", "bob", LockPriority::High, 1000),
        ];

        let plan = expect_plan(StrategyPlanner::plan(ResolutionStrategy::PriorityBased, &locks));
        assert!(plan.decision.contains("bob"));
        assert_eq!(plan.actions.len(), 1);
    }

    #[test]
    fn test_priority_based_needs_two_claims() {
        let locks = vec![make_lock("l1", "alice", LockPriority::High, 1000)];
        assert!(matches!(
            StrategyPlanner::plan(ResolutionStrategy::PriorityBased, &locks),
            PlanVerdict::Escalate { .. }
        ));
    }

    #[test]
    fn test_first_wins_compares_timestamps_not_ids() {
        // "zz" sorts after "aa" lexicographically, but acquired first
        let mut early = make_lock("zz", "bob", LockPriority::Medium, 1000);
        early.resource_id = "res:shared".to_string();
        let mut late = make_lock("aa", "alice", LockPriority::Medium, 2000);
        late.resource_id = "res:shared".to_string();

        let plan = expect_plan(StrategyPlanner::plan(
            ResolutionStrategy::FirstWins,
            &[late, early],
        ));
        assert!(plan.decision.contains("bob"));
        match &plan.actions[0] {
            PlannedAction::ForceRelease { lock_id, .. } => assert_eq!(lock_id, "aa"),
            other => panic!("expected ForceRelease, got {:?}", other),
        }
    }

    #[test]
    fn test_load_balance_moves_from_busiest_to_idlest() {
        let locks = vec![
            make_lock("l1", "alice", LockPriority::Medium, 1000),
            make_lock("l2", "alice", LockPriority::Medium, 1000),
            make_lock("l3", "alice", LockPriority::Medium, 1000),
            make_lock("l4", "bob", LockPriority::Medium, 1000),
        ];

        let plan = expect_plan(StrategyPlanner::plan(ResolutionStrategy::LoadBalance, &locks));
        assert_eq!(plan.actions.len(), 1);
        match &plan.actions[0] {
            PlannedAction::Reassign {
                from_holder,
                to_holder,
                ..
            } => {
                assert_eq!(from_holder, "alice");
                assert_eq!(to_holder, "bob");
            }
            other => panic!("expected Reassign, got {:?}", other),
        }
    }

    #[test]
    fn test_load_balance_escalates_when_already_balanced() {
        let locks = vec![
            make_lock("l1", "alice", LockPriority::Medium, 1000),
            make_lock("l2", "alice", LockPriority::Medium, 1000),
            make_lock("l3", "bob", LockPriority::Medium, 1000),
            make_lock("l4", "bob", LockPriority::Medium, 1000),
        ];
        assert!(matches!(
            StrategyPlanner::plan(ResolutionStrategy::LoadBalance, &locks),
            PlanVerdict::Escalate { .. }
        ));
    }

    #[test]
    fn test_load_balance_escalates_with_single_holder() {
        let locks = vec![
            make_lock("l1", "alice", LockPriority::Medium, 1000),
            make_lock("l2", "alice", LockPriority::Medium, 1000),
        ];
        assert!(matches!(
            StrategyPlanner::plan(ResolutionStrategy::LoadBalance, &locks),
            PlanVerdict::Escalate { .. }
        ));
    }

    #[test]
    fn test_sequence_optimization_orders_by_phase() {
        let mut a = make_lock("l1", "alice", LockPriority::Medium, 1000);
        a.operation = "workflow:phase:3".to_string();
        let mut b = make_lock("l2", "bob", LockPriority::Medium, 5000);
        b.operation = "workflow:phase:1".to_string();
        let mut c = make_lock("l3", "carol", LockPriority::Medium, 2000);
        c.operation = "workflow:phase:2".to_string();

        let plan = expect_plan(StrategyPlanner::plan(
            ResolutionStrategy::SequenceOptimization,
            &[a, b, c],
        ));
        // phase order, not acquisition order
        let bob = plan.decision.find("bob").unwrap();
        let carol = plan.decision.find("carol").unwrap();
        let alice = plan.decision.find("alice").unwrap();
        assert!(bob < carol && carol < alice);
        assert!(matches!(plan.actions[0], PlannedAction::Notify { .. }));
    }

    #[test]
    fn test_sequence_falls_back_to_acquisition_order() {
        let a = make_lock("l1", "alice", LockPriority::Medium, 5000);
        let b = make_lock("l2", "bob", LockPriority::Medium, 1000);

        let plan = expect_plan(StrategyPlanner::plan(
            ResolutionStrategy::SequenceOptimization,
            &[a, b],
        ));
        let bob = plan.decision.find("bob").unwrap();
        let alice = plan.decision.find("alice").unwrap();
        assert!(bob < alice);
    }

    #[test]
    fn test_manual_strategies_escalate() {
        let locks = vec![
            make_lock("l1", "alice", LockPriority::Medium, 1000),
            make_lock("l2", "bob", LockPriority::Medium, 2000),
        ];
        for strategy in [
            ResolutionStrategy::ManualMerge,
            ResolutionStrategy::VoteBased,
            ResolutionStrategy::Escalated,
        ] {
            assert!(matches!(
                StrategyPlanner::plan(strategy, &locks),
                PlanVerdict::Escalate { .. }
            ));
        }
    }

    #[test]
    fn test_phase_extraction() {
        let mut lock = make_lock("l1", "alice", LockPriority::Medium, 1000);
        lock.operation = "workflow:phase:2".to_string();
        assert_eq!(phase_of(&lock), Some(2));

        lock.operation = "phase-17".to_string();
        assert_eq!(phase_of(&lock), Some(17));

        lock.operation = "edit".to_string();
        assert_eq!(phase_of(&lock), None);
    }
}
