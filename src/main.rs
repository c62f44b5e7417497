//! Entry point for the sandbox lease manager.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use lease_api::{app, AppState};
use lease_config::Settings;
use lease_core::{
    AdmissionController, AdmissionSnapshot, InMemoryCaptchaProvider, LeaseManager, ManagerConfig,
};
use lease_runtime::{DockerRuntimeAdapter, HostSampler, PortAuthority, PortClass, PortPolicy};
use lease_store::{
    create_maintenance_pool, create_request_pool, ConnectionSettings, SqlLeaseStore,
    SqlPortRegistry,
};
use secrecy::ExposeSecret;
use tokio::sync::RwLock;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = lease_config::load()?;

    lease_telemetry::init_tracing("lease_manager=info,lease_core=info,tower_http=info")?;
    let metrics_handle = lease_telemetry::metrics::install_recorder()?;

    info!(
        project = %settings.compose_project_name,
        port_range = ?settings.port_range(),
        "starting sandbox lease manager"
    );

    let connection_settings = ConnectionSettings {
        host: settings.db_host.clone(),
        port: settings.db_port,
        database: settings.db_name.clone(),
        user: settings.db_user.clone(),
        password: settings.db_password.expose_secret().to_string(),
    };

    let request_pool = create_request_pool(
        &connection_settings,
        settings.db_pool_min,
        settings.db_pool_max,
    )
    .await?;
    let maintenance_pool = create_maintenance_pool(
        &connection_settings,
        settings.maintenance_pool_min,
        settings.maintenance_pool_max,
    )
    .await?;

    sqlx::migrate!("./crates/lease-store/migrations")
        .run(&request_pool)
        .await?;

    let port_registry = Arc::new(SqlPortRegistry::new(
        request_pool.clone(),
        settings.port_allocation_max_attempts,
    ));
    port_registry.initialize_range(settings.port_range()).await?;

    // The maintenance pool gets its own `PortRegistry`/`LeaseStore` pair so
    // the expiration sweep never borrows a request-pool connection; under
    // contention a sweep pass must not be able to stall user requests.
    let maintenance_port_registry: Arc<dyn lease_core::PortRegistry> = Arc::new(
        SqlPortRegistry::new(maintenance_pool.clone(), settings.port_allocation_max_attempts),
    );

    let lease_store: Arc<dyn lease_core::LeaseStore> =
        Arc::new(SqlLeaseStore::new(request_pool.clone()));
    let maintenance_store: Arc<dyn lease_core::LeaseStore> =
        Arc::new(SqlLeaseStore::new(maintenance_pool));

    let runtime: Arc<dyn lease_core::RuntimeAdapter> = Arc::new(DockerRuntimeAdapter::connect()?);
    let captcha: Arc<dyn lease_core::CaptchaProvider> = Arc::new(InMemoryCaptchaProvider::new(
        chrono::Duration::seconds(settings.captcha_ttl as i64),
    ));

    let snapshot: Arc<RwLock<Option<AdmissionSnapshot>>> = Arc::new(RwLock::new(None));

    let resource_monitor = Arc::new(lease_core::ResourceMonitor::new(
        maintenance_store.clone(),
        runtime.clone(),
        snapshot.clone(),
        settings.compose_project_name.clone(),
        settings.max_total_containers,
        settings.max_total_cpu_percent,
        settings.max_total_memory_gb,
        settings.resource_soft_limit_percent,
    ));

    let admission = Arc::new(AdmissionController::new(
        lease_store.clone(),
        captcha.clone(),
        snapshot.clone(),
        resource_monitor.clone(),
        settings.bypass_captcha,
        settings.enable_resource_quotas,
        settings.max_containers_per_hour,
        chrono::Duration::seconds(settings.rate_limit_window as i64),
        chrono::Duration::seconds(settings.resource_check_interval as i64),
    ));

    let manager_config = ManagerConfig {
        compose_project_name: settings.compose_project_name.clone(),
        image: settings.images_name.clone(),
        flag: settings.flag.expose_secret().to_string(),
        port_in_container: settings.port_in_container,
        network_name: settings.network_name.clone(),
        leave_time: chrono::Duration::seconds(settings.leave_time as i64),
        add_time: chrono::Duration::seconds(settings.add_time as i64),
        port_allocation_max_attempts: settings.port_allocation_max_attempts,
        memory_limit_bytes: lease_config::parse_memory_string(&settings.container_memory_limit)
            .unwrap_or(0),
        memory_swap_limit_bytes: lease_config::parse_memory_string(&settings.container_swap_limit)
            .unwrap_or(0),
        cpu_period: 100_000,
        cpu_quota: (settings.container_cpu_limit * 100_000.0) as i64,
        pids_limit: settings.container_pids_limit,
        read_only_rootfs: settings.enable_read_only,
        no_new_privileges: settings.enable_no_new_privileges,
        cap_drop: if settings.drop_all_capabilities {
            vec!["ALL".to_string()]
        } else {
            vec![]
        },
        cap_add: cap_add_list(&settings),
        tmpfs: if settings.enable_tmpfs {
            Some(("/tmp".to_string(), format!("size={}", settings.tmpfs_size)))
        } else {
            None
        },
        maintenance_batch_size: settings.maintenance_batch_size,
        stale_port_max_age: chrono::Duration::seconds(settings.stale_port_max_age as i64),
        shutdown_deadline: chrono::Duration::seconds(30),
    };

    let manager = Arc::new(LeaseManager::new(
        port_registry.clone(),
        lease_store.clone(),
        runtime.clone(),
        admission.clone(),
        manager_config.clone(),
    ));

    // Bound to the maintenance pool end to end so a sweep pass never takes
    // a request-pool connection away from a user-facing handler.
    let maintenance_manager = Arc::new(LeaseManager::new(
        maintenance_port_registry,
        maintenance_store.clone(),
        runtime.clone(),
        admission,
        manager_config,
    ));

    spawn_maintenance_sweep(maintenance_manager, settings.maintenance_interval);
    spawn_resource_monitor(resource_monitor, settings.resource_check_interval);

    let state = AppState {
        manager: manager.clone(),
        store: lease_store.clone(),
        captcha,
        snapshot,
        metrics_handle,
        admin_key: settings.admin_key.clone(),
        images_name: settings.images_name.clone(),
        compose_project_name: settings.compose_project_name.clone(),
        cookie_secure: true,
        enable_logs_endpoint: settings.enable_logs_endpoint,
    };

    let router = app(state);

    let port_authority = PortAuthority::new()?;
    let policy = PortPolicy::new(settings.app_port, PortClass::Public, "lease-manager")
        .with_fallback_range((settings.app_port + 1)..=(settings.app_port + 9));
    let managed_listener = port_authority.acquire(&policy, "0.0.0.0").await?;
    let bound_port = managed_listener.port();
    info!(port = bound_port, "listening");

    let listener = managed_listener.into_tokio_listener()?;

    tokio::select! {
        result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result?;
        }
        _ = lease_runtime::shutdown_signal() => {
            info!("shutdown signal received, draining leases");
            if let Err(err) = manager.shutdown().await {
                tracing::warn!(error = %err, "graceful shutdown did not fully drain leases");
            }
            if let Err(err) = port_authority.release(bound_port).await {
                tracing::warn!(error = %err, "failed to release listener port lease");
            }
        }
    }

    Ok(())
}

fn cap_add_list(settings: &Settings) -> Vec<String> {
    let mut caps = Vec::new();
    if settings.cap_net_bind_service {
        caps.push("NET_BIND_SERVICE".to_string());
    }
    if settings.cap_chown {
        caps.push("CHOWN".to_string());
    }
    caps
}

fn spawn_maintenance_sweep(manager: Arc<LeaseManager>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match manager.sweep_once().await {
                Ok(reclaimed) => {
                    if reclaimed > 0 {
                        info!(reclaimed, "expiration sweep reclaimed leases");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "expiration sweep pass failed"),
            }
        }
    });
}

fn spawn_resource_monitor(monitor: Arc<lease_core::ResourceMonitor>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut host = HostSampler::new();
        let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let host_sample = Some(host.sample());
            if let Err(err) = monitor.tick(host_sample).await {
                tracing::warn!(error = %err, "resource monitor tick failed");
            }
        }
    });
}
