//! Database connection management.
//!
//! Two pools are kept deliberately separate: one for request-path
//! operations, a smaller dedicated one for the maintenance sweep, so a
//! long-running sweep under contention cannot starve user requests.

use anyhow::Result;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use std::time::Duration;

pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionSettings {
    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .statement_cache_capacity(100)
    }
}

pub async fn create_request_pool(
    settings: &ConnectionSettings,
    min_connections: u32,
    max_connections: u32,
) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(300)))
        .max_lifetime(Some(Duration::from_secs(1800)))
        .test_before_acquire(true)
        .connect_with(settings.connect_options())
        .await?;

    Ok(pool)
}

pub async fn create_maintenance_pool(
    settings: &ConnectionSettings,
    min_connections: u32,
    max_connections: u32,
) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(300)))
        .max_lifetime(Some(Duration::from_secs(1800)))
        .test_before_acquire(true)
        .connect_with(settings.connect_options())
        .await?;

    Ok(pool)
}
