//! SQLite-backed LockStore implementation.
//! Provides a durable lock ledger and conflict log across restarts.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! teamlock-core = { path = "../teamlock-core", features = ["sqlite"] }
//! ```

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::store::{AcquireOutcome, LockStore};
use crate::types::{Conflict, Lock, LockPriority, LockStatus, ResourceType};

/// A persistent lock store backed by SQLite.
///
/// Uses WAL mode for concurrent read performance. Mutations run inside
/// transactions, which is what makes `try_acquire` and the `*_if_match`
/// operations single indivisible steps.
pub struct SqliteLockStore {
    conn: Connection,
}

impl SqliteLockStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS locks (
                resource_id    TEXT PRIMARY KEY,
                token          TEXT NOT NULL,
                lock_id        TEXT NOT NULL,
                res_type       TEXT NOT NULL,
                holder_id      TEXT NOT NULL,
                team_id        TEXT NOT NULL,
                project_id     TEXT NOT NULL,
                acquired_at    INTEGER NOT NULL,
                expires_at     INTEGER NOT NULL,
                last_heartbeat INTEGER NOT NULL,
                priority       TEXT NOT NULL,
                operation      TEXT NOT NULL,
                description    TEXT NOT NULL,
                ttl_ms         INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_locks_lock_id ON locks(lock_id);
            CREATE INDEX IF NOT EXISTS idx_locks_team ON locks(team_id);
            CREATE INDEX IF NOT EXISTS idx_locks_project ON locks(project_id);

            CREATE TABLE IF NOT EXISTS contention (
                resource_id  TEXT NOT NULL,
                requester_id TEXT NOT NULL,
                expires_at   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contention_resource ON contention(resource_id);

            CREATE TABLE IF NOT EXISTS conflicts (
                id       TEXT PRIMARY KEY,
                payload  TEXT NOT NULL,
                purge_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self { conn })
    }

    fn parse_resource_type(s: &str) -> ResourceType {
        match s {
            "Task" => ResourceType::Task,
            "Execution" => ResourceType::Execution,
            "Agent" => ResourceType::Agent,
            "WorkingCopy" => ResourceType::WorkingCopy,
            _ => ResourceType::File,
        }
    }

    fn parse_priority(s: &str) -> LockPriority {
        match s {
            "Low" => LockPriority::Low,
            "High" => LockPriority::High,
            "Critical" => LockPriority::Critical,
            _ => LockPriority::Medium,
        }
    }

    fn row_to_lock(row: &rusqlite::Row) -> rusqlite::Result<Lock> {
        let res_type_str: String = row.get(3)?;
        let priority_str: String = row.get(10)?;

        Ok(Lock {
            id: row.get(2)?,
            resource_id: row.get(0)?,
            resource_type: Self::parse_resource_type(&res_type_str),
            holder_id: row.get(4)?,
            team_id: row.get(5)?,
            project_id: row.get(6)?,
            acquired_at: row.get(7)?,
            expires_at: row.get(8)?,
            last_heartbeat: row.get(9)?,
            priority: Self::parse_priority(&priority_str),
            operation: row.get(11)?,
            description: row.get(12)?,
            status: LockStatus::Active,
        })
    }

    const LOCK_COLUMNS: &'static str = "resource_id, token, lock_id, res_type, holder_id, \
         team_id, project_id, acquired_at, expires_at, last_heartbeat, \
         priority, operation, description, ttl_ms";
}

impl LockStore for SqliteLockStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn try_acquire(
        &mut self,
        candidate: &Lock,
        token: &str,
        now: u64,
    ) -> Result<AcquireOutcome, StoreError> {
        let tx = self.conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {} FROM locks WHERE resource_id = ?1 AND expires_at > ?2 AND ttl_ms > 0",
                    Self::LOCK_COLUMNS
                ),
                params![candidate.resource_id, now],
                |row| Self::row_to_lock(row),
            )
            .optional()?;

        if let Some(holder) = existing {
            tx.commit()?;
            return Ok(AcquireOutcome::Held(holder));
        }

        let ttl_ms = candidate.expires_at.saturating_sub(candidate.acquired_at);
        tx.execute(
            "INSERT OR REPLACE INTO locks (resource_id, token, lock_id, res_type, holder_id, \
             team_id, project_id, acquired_at, expires_at, last_heartbeat, priority, operation, \
             description, ttl_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                candidate.resource_id,
                token,
                candidate.id,
                format!("{:?}", candidate.resource_type),
                candidate.holder_id,
                candidate.team_id,
                candidate.project_id,
                candidate.acquired_at,
                candidate.expires_at,
                candidate.last_heartbeat,
                format!("{:?}", candidate.priority),
                candidate.operation,
                candidate.description,
                ttl_ms,
            ],
        )?;
        tx.commit()?;

        Ok(AcquireOutcome::Acquired)
    }

    fn release_if_match(&mut self, resource_id: &str, token: &str) -> Result<bool, StoreError> {
        let rows = self.conn.execute(
            "DELETE FROM locks WHERE resource_id = ?1 AND token = ?2",
            params![resource_id, token],
        )?;
        Ok(rows > 0)
    }

    fn extend_if_match(
        &mut self,
        resource_id: &str,
        token: &str,
        additional_ms: u64,
    ) -> Result<Option<u64>, StoreError> {
        let tx = self.conn.transaction()?;
        let rows = tx.execute(
            "UPDATE locks SET expires_at = expires_at + ?1, ttl_ms = ttl_ms + ?1 \
             WHERE resource_id = ?2 AND token = ?3",
            params![additional_ms, resource_id, token],
        )?;

        let new_expiry = if rows > 0 {
            tx.query_row(
                "SELECT expires_at FROM locks WHERE resource_id = ?1",
                params![resource_id],
                |row| row.get::<_, u64>(0),
            )
            .optional()?
        } else {
            None
        };
        tx.commit()?;
        Ok(new_expiry)
    }

    fn heartbeat_if_match(
        &mut self,
        resource_id: &str,
        token: &str,
        now: u64,
    ) -> Result<Option<u64>, StoreError> {
        let tx = self.conn.transaction()?;
        let ttl_ms: Option<u64> = tx
            .query_row(
                "SELECT ttl_ms FROM locks \
                 WHERE resource_id = ?1 AND token = ?2 AND expires_at > ?3 AND ttl_ms > 0",
                params![resource_id, token, now],
                |row| row.get(0),
            )
            .optional()?;

        let renewed = match ttl_ms {
            Some(ttl_ms) => {
                let new_expiry = now + ttl_ms;
                tx.execute(
                    "UPDATE locks SET last_heartbeat = ?1, expires_at = ?2 \
                     WHERE resource_id = ?3 AND token = ?4",
                    params![now, new_expiry, resource_id, token],
                )?;
                Some(new_expiry)
            }
            None => None,
        };
        tx.commit()?;
        Ok(renewed)
    }

    fn remove_lock(&mut self, lock_id: &str) -> Result<Option<Lock>, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx
            .query_row(
                &format!("SELECT {} FROM locks WHERE lock_id = ?1", Self::LOCK_COLUMNS),
                params![lock_id],
                |row| Self::row_to_lock(row),
            )
            .optional()?;

        if removed.is_some() {
            tx.execute("DELETE FROM locks WHERE lock_id = ?1", params![lock_id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn get_lock(&self, resource_id: &str, now: u64) -> Result<Option<Lock>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM locks WHERE resource_id = ?1 AND expires_at > ?2 AND ttl_ms > 0",
                    Self::LOCK_COLUMNS
                ),
                params![resource_id, now],
                |row| Self::row_to_lock(row),
            )
            .optional()?)
    }

    fn active_locks(&self, now: u64) -> Result<Vec<Lock>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM locks WHERE expires_at > ?1 AND ttl_ms > 0",
            Self::LOCK_COLUMNS
        ))?;

        let locks = stmt
            .query_map(params![now], |row| Self::row_to_lock(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(locks)
    }

    fn record_contention(
        &mut self,
        resource_id: &str,
        requester_id: &str,
        now: u64,
        ttl_ms: u64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO contention (resource_id, requester_id, expires_at) VALUES (?1, ?2, ?3)",
            params![resource_id, requester_id, now + ttl_ms],
        )?;
        Ok(())
    }

    fn contention_count(&self, resource_id: &str, now: u64) -> Result<usize, StoreError> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM contention WHERE resource_id = ?1 AND expires_at > ?2",
            params![resource_id, now],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn sweep_expired(&mut self, now: u64) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM locks WHERE expires_at <= ?1 OR ttl_ms <= 0",
            params![now],
        )?;
        self.conn.execute(
            "DELETE FROM contention WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(removed)
    }

    fn put_conflict(
        &mut self,
        conflict: &Conflict,
        retention_ms: u64,
        now: u64,
    ) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(conflict).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO conflicts (id, payload, purge_at) VALUES (?1, ?2, ?3)",
            params![conflict.id, payload, now + retention_ms],
        )?;
        Ok(())
    }

    fn load_conflicts(&self, now: u64) -> Result<Vec<Conflict>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM conflicts WHERE purge_at > ?1")?;

        let rows = stmt
            .query_map(params![now], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, payload)| {
                serde_json::from_str(&payload).map_err(|e| StoreError::CorruptRecord {
                    key: id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn purge_conflicts(&mut self, now: u64) -> Result<usize, StoreError> {
        let purged = self
            .conn
            .execute("DELETE FROM conflicts WHERE purge_at <= ?1", params![now])?;
        Ok(purged)
    }
}
