//! Tunables shared by the lock manager and the conflict resolver.

/// Timing configuration. All values are milliseconds.
#[derive(Debug, Clone)]
pub struct CoordinationConfig {
    /// Default lock lifetime when a request carries no timeout
    pub default_ttl_ms: u64,
    /// How often cached locks are purged and the store swept
    pub cleanup_interval_ms: u64,
    /// How often the proactive conflict-detection pass runs
    pub detection_interval_ms: u64,
    /// How long terminal conflict records are retained before purge
    pub conflict_retention_ms: u64,
    /// TTL of entries in the contention-observability set
    pub contention_ttl_ms: u64,
}

impl CoordinationConfig {
    /// Liveness renewal cadence: a quarter of the lock TTL.
    pub fn heartbeat_interval_ms(&self) -> u64 {
        (self.default_ttl_ms / 4).max(1)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 30 * 60 * 1000,
            cleanup_interval_ms: 60 * 1000,
            detection_interval_ms: 30 * 1000,
            conflict_retention_ms: 7 * 24 * 60 * 60 * 1000,
            contention_ttl_ms: 60 * 60 * 1000,
        }
    }
}
