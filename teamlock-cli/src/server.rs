use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;

use teamlock_core::config::CoordinationConfig;
use teamlock_core::events::{CoordinationEvent, event_channel};
use teamlock_core::manager::{LockManager, SharedStore};
use teamlock_core::resolver::ConflictResolver;
use teamlock_core::store_in_memory::InMemoryLockStore;
use teamlock_core::types::{parse_priority, parse_resource_type, LockRequest};

use crate::handlers::*;

/// Manager and resolver share one store and one event bus; the HTTP layer
/// serializes access to both behind a single async mutex.
pub struct Coordinator {
    pub manager: LockManager,
    pub resolver: ConflictResolver,
}

pub type AppState = Arc<Mutex<Coordinator>>;

pub async fn run(host: &str, port: u16, storage: &str, ttl_minutes: u64) {
    let store = create_store(storage);
    let config = CoordinationConfig {
        default_ttl_ms: ttl_minutes * 60 * 1000,
        ..CoordinationConfig::default()
    };
    let (events, rx) = event_channel();

    let mut manager = LockManager::new(Arc::clone(&store), config.clone(), events.clone());
    manager
        .initialize()
        .expect("Failed to initialize lock manager");
    let mut resolver = ConflictResolver::new(store, config.clone(), events);
    resolver
        .initialize()
        .expect("Failed to initialize conflict resolver");

    let state: AppState = Arc::new(Mutex::new(Coordinator { manager, resolver }));

    spawn_event_drain(Arc::clone(&state), rx);
    spawn_background_passes(Arc::clone(&state), &config);
    let shutdown_state = Arc::clone(&state);

    // NOTE: Rate limiting should be handled at the infrastructure level
    // (nginx, envoy, cloud load balancer) for production deployments.

    let app = Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        // Protected routes
        .route("/locks", post(acquire_lock))
        .route("/locks", get(list_locks))
        .route("/locks/{id}", delete(release_lock))
        .route("/locks/{id}/extend", post(extend_lock))
        .route("/locks/{id}/force-release", post(force_release_lock))
        .route("/conflicts", get(list_conflicts))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", host, port);

    if std::env::var("TEAMLOCK_API_KEY").is_ok() {
        tracing::info!("🔐 API key authentication enabled");
    } else {
        tracing::warn!("⚠️  No TEAMLOCK_API_KEY set — server is open (dev mode)");
    }

    tracing::info!("🔒 Teamlock server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down; releasing held locks");
        })
        .await
        .expect("Server error");

    shutdown_state.lock().await.manager.shutdown();
}

// ─── Event Bus Drain ────────────────────────────────────────────────────────

/// One dedicated thread consumes the event bus: every event is logged, and
/// lock-conflict events are fed straight into the resolver's reactive path.
fn spawn_event_drain(
    state: AppState,
    rx: std::sync::mpsc::Receiver<CoordinationEvent>,
) {
    std::thread::spawn(move || {
        for event in rx {
            tracing::info!(target: "teamlock::events", "{}", event.summary());
            if let CoordinationEvent::LockConflict { requested, holder } = event {
                let mut coordinator = state.blocking_lock();
                let Coordinator { manager, resolver } = &mut *coordinator;
                resolver.on_lock_conflict(&requested, &holder, manager);
            }
        }
    });
}

// ─── Background Passes ──────────────────────────────────────────────────────

fn spawn_background_passes(state: AppState, config: &CoordinationConfig) {
    let heartbeat_every = Duration::from_millis(config.heartbeat_interval_ms());
    let cleanup_every = Duration::from_millis(config.cleanup_interval_ms);
    let detection_every = Duration::from_millis(config.detection_interval_ms);

    let heartbeat_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_every);
        loop {
            interval.tick().await;
            let renewed = heartbeat_state.lock().await.manager.run_heartbeat_pass();
            if renewed > 0 {
                tracing::debug!(renewed, "heartbeat pass");
            }
        }
    });

    let cleanup_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            let mut coordinator = cleanup_state.lock().await;
            let expired = coordinator.manager.run_cleanup_pass();
            let purged = coordinator.resolver.run_retention_pass();
            if expired > 0 || purged > 0 {
                tracing::info!(expired, purged, "cleanup pass");
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(detection_every);
        loop {
            interval.tick().await;
            let mut coordinator = state.lock().await;
            let Coordinator { manager, resolver } = &mut *coordinator;
            let detected = resolver.run_detection_pass(manager);
            if detected > 0 {
                tracing::info!(detected, "conflict detection pass");
            }
        }
    });
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // If no API key is configured, allow all requests (dev mode)
    let expected_key = match std::env::var("TEAMLOCK_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(next.run(request).await),
    };

    // Always allow health check without auth
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth_header.strip_prefix("Bearer ").unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("🚫 Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let coordinator = state.lock().await;
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        active_locks: coordinator.manager.active_locks_at(now_ms()).len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn acquire_lock(
    State(state): State<AppState>,
    Json(req): Json<AcquireLockRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(e) = req.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": e,
            })),
        );
    }

    let request = LockRequest {
        resource_id: req.resource_id.clone(),
        resource_type: parse_resource_type(&req.resource_type),
        holder_id: req.holder_id.clone(),
        team_id: req.team_id.clone(),
        project_id: req.project_id.clone(),
        timeout_ms: req.timeout_ms,
        priority: req.priority.as_deref().map(parse_priority).unwrap_or_default(),
        operation: req.operation.clone(),
        description: req.description.clone(),
    };

    let result = state.lock().await.manager.acquire(&request);

    match result.lock {
        Some(lock) => {
            tracing::info!(
                holder_id = %lock.holder_id,
                lock_id = %lock.id,
                resource = %lock.resource_id,
                "Lock acquired"
            );
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "success": true,
                    "data": lock,
                })),
            )
        }
        None if !result.conflicts_with.is_empty() => {
            tracing::info!(
                holder_id = %req.holder_id,
                resource = %req.resource_id,
                "Lock denied (held)"
            );
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "success": false,
                    "error": result.error,
                    "wait_time_ms": result.wait_time_ms,
                    "conflicts_with": result.conflicts_with,
                })),
            )
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "success": false,
                "error": result.error,
            })),
        ),
    }
}

async fn list_locks(
    State(state): State<AppState>,
    Query(query): Query<LockQuery>,
) -> Json<ApiResponse<Vec<ActiveLockInfo>>> {
    let coordinator = state.lock().await;
    let locks = if let Some(team_id) = &query.team_id {
        coordinator.manager.team_locks(team_id)
    } else if let Some(project_id) = &query.project_id {
        coordinator.manager.project_locks(project_id)
    } else if let Some(resource_id) = &query.resource_id {
        coordinator.manager.resource_locks(resource_id)
    } else {
        coordinator.manager.active_locks_at(now_ms())
    };

    Json(ApiResponse::ok(
        locks.iter().map(ActiveLockInfo::from).collect(),
    ))
}

async fn release_lock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    let mut coordinator = state.lock().await;
    if coordinator.manager.release(&id) {
        tracing::info!(lock_id = %id, "Lock released");
        (
            StatusCode::OK,
            Json(ApiResponse::ok(format!("Lock '{}' released", id))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!(
                "Lock '{}' not found or not owned by this instance",
                id
            ))),
        )
    }
}

async fn extend_lock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExtendLockRequest>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    if req.additional_minutes == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("additional_minutes must be greater than 0")),
        );
    }

    let mut coordinator = state.lock().await;
    if coordinator.manager.extend(&id, req.additional_minutes) {
        tracing::info!(lock_id = %id, minutes = req.additional_minutes, "Lock extended");
        (
            StatusCode::OK,
            Json(ApiResponse::ok(format!(
                "Lock '{}' extended by {} minute(s)",
                id, req.additional_minutes
            ))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("Lock '{}' not found or expired", id))),
        )
    }
}

async fn force_release_lock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ForceReleaseRequest>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    if let Err(e) = req.validate() {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::err(e)));
    }

    let mut coordinator = state.lock().await;
    if coordinator
        .manager
        .force_release(&id, &req.released_by, &req.reason)
    {
        tracing::warn!(
            lock_id = %id,
            released_by = %req.released_by,
            reason = %req.reason,
            "Lock force-released"
        );
        (
            StatusCode::OK,
            Json(ApiResponse::ok(format!("Lock '{}' force-released", id))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("Lock '{}' not found", id))),
        )
    }
}

async fn list_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictQuery>,
) -> Json<ApiResponse<ConflictListResponse>> {
    let hours = query.hours.unwrap_or(24);
    let coordinator = state.lock().await;
    let conflicts = coordinator.resolver.recent_conflicts(&query.team_id, hours);

    Json(ApiResponse::ok(ConflictListResponse {
        team_id: query.team_id,
        window_hours: hours,
        conflicts,
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let coordinator = state.lock().await;
    Json(serde_json::json!({
        "resolver": coordinator.resolver.metrics(),
        "held_locks": coordinator.manager.held_lock_count(),
        "active_locks": coordinator.manager.active_locks_at(now_ms()).len(),
    }))
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

fn create_store(storage: &str) -> SharedStore {
    if storage == "memory" {
        tracing::info!("💾 Storage backend: in-memory (locks will not persist)");
        Arc::new(std::sync::Mutex::new(InMemoryLockStore::new()))
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("💾 Storage backend: SQLite ({})", path);
            match teamlock_core::store_sqlite::SqliteLockStore::open(path) {
                Ok(store) => Arc::new(std::sync::Mutex::new(store)),
                Err(e) => {
                    tracing::error!("Failed to open SQLite: {}. Falling back to in-memory.", e);
                    Arc::new(std::sync::Mutex::new(InMemoryLockStore::new()))
                }
            }
        }
        #[cfg(not(feature = "sqlite"))]
        {
            tracing::error!(
                "SQLite storage requested but `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
            );
            tracing::warn!("Falling back to in-memory storage.");
            let _ = path;
            Arc::new(std::sync::Mutex::new(InMemoryLockStore::new()))
        }
    } else {
        tracing::error!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'",
            storage
        );
        tracing::warn!("Falling back to in-memory storage.");
        Arc::new(std::sync::Mutex::new(InMemoryLockStore::new()))
    }
}
