use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

fn default_leave_time() -> u64 {
    1800
}
fn default_add_time() -> u64 {
    600
}
fn default_port_in_container() -> u16 {
    80
}
fn default_max_containers_per_hour() -> u32 {
    10
}
fn default_rate_limit_window() -> u64 {
    3600
}
fn default_thread_pool_size() -> usize {
    16
}
fn default_maintenance_interval() -> u64 {
    300
}
fn default_maintenance_batch_size() -> usize {
    25
}
fn default_captcha_ttl() -> u64 {
    300
}
fn default_port_allocation_max_attempts() -> u32 {
    5
}
fn default_stale_port_max_age() -> u64 {
    600
}
fn default_max_total_containers() -> u32 {
    100
}
fn default_max_total_cpu_percent() -> u32 {
    80
}
fn default_max_total_memory_gb() -> f64 {
    16.0
}
fn default_resource_check_interval() -> u64 {
    30
}
fn default_resource_soft_limit_percent() -> u32 {
    80
}
fn default_enable_resource_quotas() -> bool {
    true
}
fn default_bypass_captcha() -> bool {
    false
}
fn default_db_pool_min() -> u32 {
    2
}
fn default_db_pool_max() -> u32 {
    20
}
fn default_maintenance_pool_min() -> u32 {
    1
}
fn default_maintenance_pool_max() -> u32 {
    4
}
fn default_container_cpu_limit() -> f64 {
    1.0
}
fn default_container_pids_limit() -> i64 {
    256
}
fn default_enable_no_new_privileges() -> bool {
    true
}
fn default_enable_read_only() -> bool {
    false
}
fn default_enable_tmpfs() -> bool {
    true
}
fn default_tmpfs_size() -> String {
    "64m".to_string()
}
fn default_drop_all_capabilities() -> bool {
    true
}
fn default_cap_net_bind_service() -> bool {
    false
}
fn default_cap_chown() -> bool {
    false
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_enable_logs_endpoint() -> bool {
    false
}
fn default_app_port() -> u16 {
    8080
}

/// Every field name mirrors an environment variable named in the external
/// contract; do not rename them without updating the deployment manifests.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub compose_project_name: String,
    pub images_name: String,
    pub flag: SecretString,

    #[serde(default = "default_leave_time")]
    pub leave_time: u64,
    #[serde(default = "default_add_time")]
    pub add_time: u64,

    #[serde(default = "default_port_in_container")]
    pub port_in_container: u16,
    pub start_range: u16,
    pub stop_range: u16,

    pub network_name: String,
    pub network_subnet: String,

    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: SecretString,
    #[serde(default = "default_db_pool_min")]
    pub db_pool_min: u32,
    #[serde(default = "default_db_pool_max")]
    pub db_pool_max: u32,
    #[serde(default = "default_maintenance_pool_min")]
    pub maintenance_pool_min: u32,
    #[serde(default = "default_maintenance_pool_max")]
    pub maintenance_pool_max: u32,

    pub container_memory_limit: String,
    pub container_swap_limit: String,
    #[serde(default = "default_container_cpu_limit")]
    pub container_cpu_limit: f64,
    #[serde(default = "default_container_pids_limit")]
    pub container_pids_limit: i64,

    #[serde(default = "default_enable_no_new_privileges")]
    pub enable_no_new_privileges: bool,
    #[serde(default = "default_enable_read_only")]
    pub enable_read_only: bool,
    #[serde(default = "default_enable_tmpfs")]
    pub enable_tmpfs: bool,
    #[serde(default = "default_tmpfs_size")]
    pub tmpfs_size: String,
    #[serde(default = "default_drop_all_capabilities")]
    pub drop_all_capabilities: bool,
    #[serde(default = "default_cap_net_bind_service")]
    pub cap_net_bind_service: bool,
    #[serde(default = "default_cap_chown")]
    pub cap_chown: bool,

    #[serde(default = "default_max_containers_per_hour")]
    pub max_containers_per_hour: u32,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u64,

    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval: u64,
    #[serde(default = "default_maintenance_batch_size")]
    pub maintenance_batch_size: usize,
    #[serde(default = "default_captcha_ttl")]
    pub captcha_ttl: u64,

    #[serde(default = "default_port_allocation_max_attempts")]
    pub port_allocation_max_attempts: u32,
    #[serde(default = "default_stale_port_max_age")]
    pub stale_port_max_age: u64,

    #[serde(default = "default_max_total_containers")]
    pub max_total_containers: u32,
    #[serde(default = "default_max_total_cpu_percent")]
    pub max_total_cpu_percent: u32,
    #[serde(default = "default_max_total_memory_gb")]
    pub max_total_memory_gb: f64,
    #[serde(default = "default_resource_check_interval")]
    pub resource_check_interval: u64,
    #[serde(default = "default_resource_soft_limit_percent")]
    pub resource_soft_limit_percent: u32,
    #[serde(default = "default_enable_resource_quotas")]
    pub enable_resource_quotas: bool,

    #[serde(default = "default_bypass_captcha")]
    pub bypass_captcha: bool,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    #[serde(default = "default_enable_logs_endpoint")]
    pub enable_logs_endpoint: bool,
    pub admin_key: SecretString,

    #[serde(default = "default_app_port")]
    pub app_port: u16,
}

impl Settings {
    /// Fail-fast checks that must hold before the server starts accepting
    /// traffic. Mirrors the validation block at the end of the source
    /// deployment's config module.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_range >= self.stop_range {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "start_range ({}) must be less than stop_range ({})",
                    self.start_range, self.stop_range
                ),
            });
        }
        if self.leave_time == 0 {
            return Err(ConfigError::Invalid {
                reason: "leave_time must be positive".to_string(),
            });
        }
        if self.add_time == 0 {
            return Err(ConfigError::Invalid {
                reason: "add_time must be positive".to_string(),
            });
        }
        if self.max_containers_per_hour == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_containers_per_hour must be positive".to_string(),
            });
        }
        if self.max_total_containers == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_total_containers must be positive".to_string(),
            });
        }
        if self.max_total_cpu_percent == 0 || self.max_total_memory_gb <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: "resource quota limits must be positive".to_string(),
            });
        }
        parse_memory_string(&self.container_memory_limit).ok_or_else(|| ConfigError::Invalid {
            reason: format!(
                "container_memory_limit '{}' does not parse as a K/M/G memory string",
                self.container_memory_limit
            ),
        })?;
        parse_memory_string(&self.container_swap_limit).ok_or_else(|| ConfigError::Invalid {
            reason: format!(
                "container_swap_limit '{}' does not parse as a K/M/G memory string",
                self.container_swap_limit
            ),
        })?;
        Ok(())
    }

    pub fn port_range(&self) -> std::ops::Range<u16> {
        self.start_range..self.stop_range
    }
}

/// Parses a memory string such as "512M" or "2G" into a byte count.
pub fn parse_memory_string(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        _ => return None,
    };
    digits.parse::<u64>().ok().map(|n| n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_strings() {
        assert_eq!(parse_memory_string("512M"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_string("2G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_string("1024K"), Some(1024 * 1024));
        assert_eq!(parse_memory_string("bogus"), None);
        assert_eq!(parse_memory_string(""), None);
    }
}
