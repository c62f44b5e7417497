use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::LeaseError;
use crate::models::AdmissionSnapshot;
use crate::resource_monitor::ResourceMonitor;
use crate::traits::{CaptchaProvider, LeaseStore};

/// Request to admit a new lease. `captcha_solution` is `None` when the
/// bypass flag is on.
pub struct AdmitRequest<'a> {
    pub owner: &'a str,
    pub client_addr: &'a str,
    pub captcha_id: Option<&'a str>,
    pub captcha_answer: Option<&'a str>,
}

/// Gates new-lease requests through, in strict order: session present,
/// captcha, rate limit, duplicate owner, resource quota. Every rejected
/// check short-circuits the rest.
pub struct AdmissionController {
    store: Arc<dyn LeaseStore>,
    captcha: Arc<dyn CaptchaProvider>,
    snapshot: Arc<RwLock<Option<AdmissionSnapshot>>>,
    monitor: Arc<ResourceMonitor>,
    bypass_captcha: bool,
    enable_resource_quotas: bool,
    max_containers_per_hour: u32,
    rate_limit_window: chrono::Duration,
    resource_check_interval: chrono::Duration,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        captcha: Arc<dyn CaptchaProvider>,
        snapshot: Arc<RwLock<Option<AdmissionSnapshot>>>,
        monitor: Arc<ResourceMonitor>,
        bypass_captcha: bool,
        enable_resource_quotas: bool,
        max_containers_per_hour: u32,
        rate_limit_window: chrono::Duration,
        resource_check_interval: chrono::Duration,
    ) -> Self {
        Self {
            store,
            captcha,
            snapshot,
            monitor,
            bypass_captcha,
            enable_resource_quotas,
            max_containers_per_hour,
            rate_limit_window,
            resource_check_interval,
        }
    }

    /// Runs checks 1-5 for a create request. Records a rate event for
    /// every request that passes check 2, regardless of whether a later
    /// check rejects it, matching the source's "admitted to the rate-limit
    /// stage" bookkeeping.
    pub async fn admit(&self, req: AdmitRequest<'_>) -> Result<(), LeaseError> {
        if req.owner.is_empty() {
            return Err(LeaseError::InvalidSession);
        }

        if !self.bypass_captcha {
            let (Some(id), Some(answer)) = (req.captcha_id, req.captcha_answer) else {
                return Err(LeaseError::CaptchaInvalid);
            };
            if !self.captcha.verify(id, answer).await {
                return Err(LeaseError::CaptchaInvalid);
            }
        }

        if !is_loopback(req.client_addr) {
            let now = Utc::now();
            let since = now - self.rate_limit_window;
            let events = self.store.count_rate_events(req.client_addr, since).await?;
            let active = self.store.count_leases_by_client(req.client_addr).await?;
            if events + active >= self.max_containers_per_hour {
                return Err(LeaseError::RateLimited);
            }
        }

        if self.store.get_lease_by_owner(req.owner).await?.is_some() {
            return Err(LeaseError::DuplicateLease);
        }

        if self.enable_resource_quotas {
            let mut snapshot = self.current_snapshot().await;
            let stale = snapshot
                .as_ref()
                .map_or(true, |s| s.is_stale(Utc::now(), self.resource_check_interval));

            if stale {
                if let Err(err) = self.monitor.tick(None).await {
                    tracing::warn!(error = %err, "on-demand resource refresh failed");
                }
                snapshot = self.current_snapshot().await;
            }

            match snapshot {
                Some(snapshot)
                    if !snapshot.is_stale(Utc::now(), self.resource_check_interval) =>
                {
                    if let Some(dimension) = snapshot.would_exceed() {
                        return Err(LeaseError::ResourceExhausted {
                            dimension: dimension.to_string(),
                        });
                    }
                }
                _ => {
                    // Still no fresh reading after an on-demand refresh: fail
                    // closed rather than admit past a quota we can't check.
                    return Err(LeaseError::ResourceExhausted {
                        dimension: "unknown".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Records that a request reached check 3 (this is done separately
    /// from `admit` so the caller can decide when the event becomes
    /// durable relative to the rest of the create path).
    pub async fn record_attempt(&self, client_addr: &str) -> Result<(), LeaseError> {
        if is_loopback(client_addr) {
            return Ok(());
        }
        self.store.record_rate_event(client_addr, Utc::now()).await
    }

    async fn current_snapshot(&self) -> Option<AdmissionSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Checks 1 and ownership only, for the extend/stop/restart paths.
    pub async fn authorize_owner(&self, owner: &str) -> Result<(), LeaseError> {
        if owner.is_empty() {
            return Err(LeaseError::InvalidSession);
        }
        Ok(())
    }
}

fn is_loopback(client_addr: &str) -> bool {
    let addr_only = client_addr.split(':').next().unwrap_or(client_addr);
    match addr_only.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("127.0.0.1"));
        assert!(!is_loopback("10.0.0.5"));
        assert!(!is_loopback("192.168.1.1"));
        assert!(!is_loopback("8.8.8.8"));
        assert!(is_loopback("::1"));
    }
}
