use std::collections::HashSet;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use lease_core::{LeaseError, PortRegistry};
use sqlx::MySqlPool;
use tokio::time::sleep;

/// `SELECT ... FOR UPDATE SKIP LOCKED` backed port registry. Concurrent
/// `allocate` calls each either return a distinct port or observe
/// no-row-available; this is never relaxed to optimistic concurrency with
/// retry-on-conflict, since at saturation a thundering herd would be
/// user-visible as request failures.
pub struct SqlPortRegistry {
    pool: MySqlPool,
    max_attempts: u32,
}

impl SqlPortRegistry {
    pub fn new(pool: MySqlPool, max_attempts: u32) -> Self {
        Self { pool, max_attempts }
    }

    /// Populates the slot table from the configured range on first
    /// startup. A process restart must not reset allocation state, so
    /// this only inserts ports that are not already present.
    pub async fn initialize_range(&self, range: std::ops::Range<u16>) -> Result<(), LeaseError> {
        for port in range {
            sqlx::query(
                "INSERT IGNORE INTO port_allocations (port, allocated) VALUES (?, FALSE)",
            )
            .bind(port as i32)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn try_allocate_once(
        &self,
        holder_id: &str,
        blocked: &HashSet<u16>,
    ) -> Result<Option<u16>, LeaseError> {
        let mut tx = self.pool.begin().await?;

        let blocked_list: Vec<i32> = blocked.iter().map(|p| *p as i32).collect();
        let placeholders = if blocked_list.is_empty() {
            String::new()
        } else {
            format!(
                "AND port NOT IN ({})",
                blocked_list.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
            )
        };

        let query_str = format!(
            "SELECT port FROM port_allocations WHERE allocated = FALSE {} ORDER BY port ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
            placeholders
        );

        let mut query = sqlx::query_scalar::<_, i32>(&query_str);
        for p in &blocked_list {
            query = query.bind(p);
        }

        let candidate: Option<i32> = query.fetch_optional(&mut *tx).await?;

        let Some(port) = candidate else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE port_allocations SET allocated = TRUE, container_id = ?, allocated_time = ? WHERE port = ?",
        )
        .bind(holder_id)
        .bind(Utc::now())
        .bind(port)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(port as u16))
    }
}

#[async_trait]
impl PortRegistry for SqlPortRegistry {
    async fn allocate(
        &self,
        holder_id: &str,
        blocked: &HashSet<u16>,
    ) -> Result<Option<u16>, LeaseError> {
        let mut backoff_ms = 500u64;
        for attempt in 1..=self.max_attempts {
            if let Some(port) = self.try_allocate_once(holder_id, blocked).await? {
                return Ok(Some(port));
            }
            if attempt == self.max_attempts {
                break;
            }
            sleep(StdDuration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
        Ok(None)
    }

    async fn set_holder(&self, port: u16, holder_id: &str) -> Result<(), LeaseError> {
        sqlx::query("UPDATE port_allocations SET container_id = ? WHERE port = ?")
            .bind(holder_id)
            .bind(port as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release(&self, port: u16) -> Result<(), LeaseError> {
        sqlx::query(
            "UPDATE port_allocations SET allocated = FALSE, container_id = NULL, allocated_time = NULL WHERE port = ?",
        )
        .bind(port as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_allocated(&self, port: u16) -> Result<bool, LeaseError> {
        let allocated: Option<bool> = sqlx::query_scalar(
            "SELECT allocated FROM port_allocations WHERE port = ?",
        )
        .bind(port as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(allocated.unwrap_or(false))
    }

    async fn sweep_stale(&self, max_age: chrono::Duration) -> Result<u32, LeaseError> {
        let cutoff = Utc::now() - max_age;

        // A slot is orphaned if reserved before the cutoff and its holder
        // has no matching row in `containers`. `container_id` is
        // repointed to the runtime handle id via `set_holder` once it is
        // known, so this join key matches `containers.id` the same way
        // `Lease.id` does.
        let result = sqlx::query(
            r#"
            UPDATE port_allocations pa
            LEFT JOIN containers c ON c.id = pa.container_id
            SET pa.allocated = FALSE, pa.container_id = NULL, pa.allocated_time = NULL
            WHERE pa.allocated = TRUE
              AND pa.allocated_time < ?
              AND c.id IS NULL
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as u32)
    }
}
