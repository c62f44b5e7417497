use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lease_core::{Lease, LeaseError, LeaseStore};
use sqlx::MySqlPool;

use crate::retry::retry_transient;

pub struct SqlLeaseStore {
    pool: MySqlPool,
}

impl SqlLeaseStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseStore for SqlLeaseStore {
    async fn insert_lease(&self, lease: &Lease) -> Result<(), LeaseError> {
        retry_transient(|| async {
            sqlx::query(
                "INSERT INTO containers (id, port, start_time, expiration_time, user_uuid, ip_address) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&lease.id)
            .bind(lease.port)
            .bind(lease.started_at)
            .bind(lease.expires_at)
            .bind(&lease.owner)
            .bind(&lease.client_addr)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
        .map_err(LeaseError::from)
    }

    async fn get_lease_by_owner(&self, owner: &str) -> Result<Option<Lease>, LeaseError> {
        let lease = sqlx::query_as::<_, Lease>(
            "SELECT id, port, user_uuid AS owner, ip_address AS client_addr, start_time AS started_at, expiration_time AS expires_at FROM containers WHERE user_uuid = ?",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lease)
    }

    async fn get_lease_by_id(&self, id: &str) -> Result<Option<Lease>, LeaseError> {
        let lease = sqlx::query_as::<_, Lease>(
            "SELECT id, port, user_uuid AS owner, ip_address AS client_addr, start_time AS started_at, expiration_time AS expires_at FROM containers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lease)
    }

    async fn update_expires_at(&self, id: &str, new_ts: DateTime<Utc>) -> Result<(), LeaseError> {
        retry_transient(|| async {
            sqlx::query("UPDATE containers SET expiration_time = ? WHERE id = ?")
                .bind(new_ts)
                .bind(id)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await
        .map_err(LeaseError::from)
    }

    async fn delete_lease(&self, id: &str) -> Result<(), LeaseError> {
        retry_transient(|| async {
            sqlx::query("DELETE FROM containers WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await
        .map_err(LeaseError::from)
    }

    async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<Lease>, LeaseError> {
        let leases = sqlx::query_as::<_, Lease>(
            "SELECT id, port, user_uuid AS owner, ip_address AS client_addr, start_time AS started_at, expiration_time AS expires_at FROM containers WHERE expiration_time < ? ORDER BY expiration_time ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(leases)
    }

    async fn scan_all(&self) -> Result<Vec<Lease>, LeaseError> {
        let leases = sqlx::query_as::<_, Lease>(
            "SELECT id, port, user_uuid AS owner, ip_address AS client_addr, start_time AS started_at, expiration_time AS expires_at FROM containers",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(leases)
    }

    async fn count_leases(&self) -> Result<u32, LeaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM containers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    async fn count_leases_by_client(&self, client_addr: &str) -> Result<u32, LeaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE ip_address = ?")
            .bind(client_addr)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    async fn record_rate_event(&self, client_addr: &str, ts: DateTime<Utc>) -> Result<(), LeaseError> {
        // Duplicate-key collisions on (ip_address, request_time) are
        // expected under concurrent identical-second requests and are
        // ignored silently, per the store contract.
        let result = sqlx::query(
            "INSERT IGNORE INTO ip_requests (ip_address, request_time) VALUES (?, ?)",
        )
        .bind(client_addr)
        .bind(ts)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => Err(LeaseError::from(err)),
        }
    }

    async fn count_rate_events(&self, client_addr: &str, since: DateTime<Utc>) -> Result<u32, LeaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ip_requests WHERE ip_address = ? AND request_time > ?",
        )
        .bind(client_addr)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn prune_rate_events(&self, before: DateTime<Utc>) -> Result<(), LeaseError> {
        // Best-effort; failures here are not worth retrying since the next
        // prune pass will catch up.
        let _ = sqlx::query("DELETE FROM ip_requests WHERE request_time < ? LIMIT 1000")
            .bind(before)
            .execute(&self.pool)
            .await;
        Ok(())
    }
}
