#[cfg(test)]
mod tests {
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, Mutex};

    use crate::config::CoordinationConfig;
    use crate::events::{CoordinationEvent, EventSender, event_channel};
    use crate::manager::{LockManager, SharedStore};
    use crate::store_in_memory::InMemoryLockStore;
    use crate::types::{LockPriority, LockRequest, LockStatus, ResourceType};

    const MINUTE: u64 = 60 * 1000;

    fn make_request(resource_id: &str, holder_id: &str) -> LockRequest {
        LockRequest {
            resource_id: resource_id.to_string(),
            resource_type: ResourceType::File,
            holder_id: holder_id.to_string(),
            team_id: "team1".to_string(),
            project_id: "proj1".to_string(),
            timeout_ms: None,
            priority: LockPriority::Medium,
            operation: "edit".to_string(),
            description: "editing".to_string(),
        }
    }

    fn make_manager() -> (LockManager, Receiver<CoordinationEvent>) {
        let store: SharedStore = Arc::new(Mutex::new(InMemoryLockStore::new()));
        let (events, rx) = event_channel();
        let mut manager = LockManager::new(store, CoordinationConfig::default(), events);
        manager.initialize().unwrap();
        (manager, rx)
    }

    fn drain(rx: &Receiver<CoordinationEvent>) -> Vec<CoordinationEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_acquire_grants_free_resource() {
        let (mut manager, rx) = make_manager();

        let result = manager.acquire_at(&make_request("file:src/app.ts", "alice"), 1000);
        assert!(result.success);
        let lock = result.lock.unwrap();
        assert_eq!(lock.holder_id, "alice");
        assert_eq!(lock.status, LockStatus::Active);
        assert_eq!(lock.acquired_at, 1000);
        assert_eq!(
            lock.expires_at,
            1000 + CoordinationConfig::default().default_ttl_ms
        );
        assert_eq!(manager.held_lock_count(), 1);

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CoordinationEvent::LockAcquired { .. }));
    }

    #[test]
    fn test_acquire_contended_returns_holder() {
        let (mut manager, rx) = make_manager();
        manager.acquire_at(&make_request("file:src/app.ts", "alice"), 1000);
        drain(&rx);

        let result = manager.acquire_at(&make_request("file:src/app.ts", "bob"), 2000);
        assert!(!result.success);
        assert!(result.lock.is_none());
        assert_eq!(result.conflicts_with.len(), 1);
        assert_eq!(result.conflicts_with[0].holder_id, "alice");
        // wait time is the holder's remaining TTL
        assert_eq!(
            result.wait_time_ms,
            CoordinationConfig::default().default_ttl_ms - 1000
        );
        // the loser holds nothing
        assert_eq!(manager.held_lock_count(), 1);

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CoordinationEvent::LockConflict { requested, holder } => {
                assert_eq!(requested.holder_id, "bob");
                assert_eq!(holder.holder_id, "alice");
            }
            other => panic!("expected LockConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_contention_is_recorded_for_observability() {
        let (mut manager, _rx) = make_manager();
        manager.acquire_at(&make_request("file:src/app.ts", "alice"), 1000);
        manager.acquire_at(&make_request("file:src/app.ts", "bob"), 2000);
        manager.acquire_at(&make_request("file:src/app.ts", "carol"), 3000);

        let store = manager.store_handle();
        let count = store
            .lock()
            .unwrap()
            .contention_count("file:src/app.ts", 4000)
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_release_is_creator_only_and_idempotent() {
        let (mut manager, rx) = make_manager();
        let result = manager.acquire_at(&make_request("file:src/app.ts", "alice"), 1000);
        let lock_id = result.lock.unwrap().id;
        drain(&rx);

        assert!(manager.release(&lock_id));
        assert_eq!(manager.held_lock_count(), 0);
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CoordinationEvent::LockReleased { lock } => {
                assert_eq!(lock.status, LockStatus::Released);
            }
            other => panic!("expected LockReleased, got {:?}", other),
        }

        // second release: lock is gone, quietly false
        assert!(!manager.release(&lock_id));
        assert!(drain(&rx).is_empty());

        // unknown lock ID (e.g. created by another instance)
        assert!(!manager.release("lock_someone_elses"));
    }

    #[test]
    fn test_expired_lock_is_reacquirable_by_another_holder() {
        let (mut manager, _rx) = make_manager();
        let request = make_request("file:src/app.ts", "alice");
        let short = LockRequest {
            timeout_ms: Some(5000),
            ..request
        };
        assert!(manager.acquire_at(&short, 1000).success);

        // before expiry: contended
        assert!(!manager.acquire_at(&make_request("file:src/app.ts", "bob"), 5000).success);
        // at expiry: granted
        assert!(manager.acquire_at(&make_request("file:src/app.ts", "bob"), 6000).success);
    }

    #[test]
    fn test_extend_adds_minutes() {
        let (mut manager, _rx) = make_manager();
        let result = manager.acquire_at(&make_request("file:src/app.ts", "alice"), 0);
        let lock_id = result.lock.unwrap().id;
        let base_expiry = CoordinationConfig::default().default_ttl_ms;

        assert!(manager.extend(&lock_id, 15));

        let locks = manager.resource_locks_at("file:src/app.ts", 1000);
        assert_eq!(locks[0].expires_at, base_expiry + 15 * MINUTE);

        assert!(!manager.extend("lock_unknown", 15));
    }

    #[test]
    fn test_heartbeats_keep_lock_alive_past_original_ttl() {
        let (mut manager, _rx) = make_manager();
        let request = LockRequest {
            timeout_ms: Some(60 * MINUTE),
            ..make_request("file:src/app.ts", "alice")
        };
        assert!(manager.acquire_at(&request, 0).success);

        // heartbeat every 15 minutes for two hours
        for i in 1..=8 {
            let now = i * 15 * MINUTE;
            assert_eq!(manager.run_heartbeat_pass_at(now), 1);
        }

        // alive at t=2h, well past the original 60-minute window
        let locks = manager.resource_locks_at("file:src/app.ts", 120 * MINUTE);
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].last_heartbeat, 120 * MINUTE);

        // heartbeats stop; one full TTL later the lock has lapsed
        assert!(manager.resource_locks_at("file:src/app.ts", 180 * MINUTE).is_empty());
    }

    #[test]
    fn test_heartbeat_detects_lost_ownership() {
        let (mut manager, rx) = make_manager();
        let result = manager.acquire_at(&make_request("file:src/app.ts", "alice"), 1000);
        let lock_id = result.lock.unwrap().id;
        drain(&rx);

        // force-released out from under us (as an admin elsewhere would)
        let store = manager.store_handle();
        store.lock().unwrap().remove_lock(&lock_id).unwrap();

        assert_eq!(manager.run_heartbeat_pass_at(2000), 0);
        assert_eq!(manager.held_lock_count(), 0);

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CoordinationEvent::LockLost { .. }));
    }

    #[test]
    fn test_cleanup_pass_emits_expired_and_sweeps() {
        let (mut manager, rx) = make_manager();
        let request = LockRequest {
            timeout_ms: Some(5000),
            ..make_request("file:src/app.ts", "alice")
        };
        manager.acquire_at(&request, 1000);
        drain(&rx);

        assert_eq!(manager.run_cleanup_pass_at(10_000), 1);
        assert_eq!(manager.held_lock_count(), 0);
        assert!(manager.active_locks_at(10_000).is_empty());

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CoordinationEvent::LockExpired { lock } => {
                assert_eq!(lock.status, LockStatus::Expired);
            }
            other => panic!("expected LockExpired, got {:?}", other),
        }
    }

    #[test]
    fn test_force_release_frees_resource_immediately() {
        let (mut manager, rx) = make_manager();
        let result = manager.acquire_at(&make_request("file:src/app.ts", "alice"), 1000);
        let lock_id = result.lock.unwrap().id;
        drain(&rx);

        assert!(manager.force_release(&lock_id, "admin", "stale session"));
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CoordinationEvent::LockForceReleased {
                lock,
                released_by,
                reason,
            } => {
                assert_eq!(lock.status, LockStatus::ForceReleased);
                assert_eq!(released_by, "admin");
                assert_eq!(reason, "stale session");
            }
            other => panic!("expected LockForceReleased, got {:?}", other),
        }

        // no grace period: the next acquire wins at once
        assert!(manager.acquire_at(&make_request("file:src/app.ts", "bob"), 2000).success);

        assert!(!manager.force_release(&lock_id, "admin", "again"));
    }

    #[test]
    fn test_queries_are_store_backed() {
        let (mut manager, _rx) = make_manager();
        manager.acquire_at(&make_request("file:a.ts", "alice"), 1000);
        manager.acquire_at(&make_request("file:b.ts", "bob"), 1000);

        assert_eq!(manager.team_locks_at("team1", 2000).len(), 2);
        assert_eq!(manager.project_locks_at("proj1", 2000).len(), 2);
        assert!(manager.team_locks_at("other", 2000).is_empty());
        assert_eq!(manager.resource_locks_at("file:a.ts", 2000).len(), 1);
        assert_eq!(manager.active_locks_at(2000).len(), 2);
    }

    #[test]
    fn test_shutdown_releases_held_locks() {
        let (mut manager, _rx) = make_manager();
        manager.acquire_at(&make_request("file:a.ts", "alice"), 1000);
        manager.acquire_at(&make_request("file:b.ts", "alice"), 1000);

        manager.shutdown();
        assert_eq!(manager.held_lock_count(), 0);

        let store = manager.store_handle();
        assert!(store.lock().unwrap().active_locks(2000).unwrap().is_empty());
    }

    #[test]
    fn test_operations_refuse_before_initialize() {
        let store: SharedStore = Arc::new(Mutex::new(InMemoryLockStore::new()));
        let mut manager =
            LockManager::new(store, CoordinationConfig::default(), EventSender::disconnected());

        let result = manager.acquire_at(&make_request("file:a.ts", "alice"), 1000);
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(!manager.release("lock_x"));
        assert!(manager.team_locks_at("team1", 2000).is_empty());
    }
}
