//! Server Configuration
//!
//! Everything the host process needs to serve and to register itself,
//! with environment variable overrides.

use std::time::Duration;
use svcreg_core::{
    AdvertisedValue, ConfigError, ManagerConfig, ServiceNamespace,
};

/// Server configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    // Coordination store
    /// Etcd endpoints (env: ETCD_ENDPOINTS, comma-separated)
    pub etcd_endpoints: Vec<String>,

    /// Timeout for establishing an etcd connection (env: ETCD_DIAL_TIMEOUT_MS)
    pub dial_timeout: Duration,

    // Registration
    /// Service namespace the instance registers under (env: SERVICE_NAMESPACE)
    pub service_namespace: String,

    /// Value published for this instance (env: ADVERTISE_ADDR).
    /// Defaults to the bound listener address.
    pub advertise_addr: Option<String>,

    /// TTL for the registration lease (env: LEASE_TTL_SECS)
    pub lease_ttl: Duration,

    /// Delay between keep-alives, must stay below the TTL (env: RENEW_INTERVAL_MS)
    pub renew_interval: Duration,

    // Service
    /// Listen address of the hello service (env: BIND_ADDR)
    pub bind_addr: String,

    // Etcd backoff settings
    /// Initial interval for etcd connection retry
    pub etcd_backoff_initial: Duration,

    /// Maximum interval for etcd connection retry
    pub etcd_backoff_max: Duration,

    /// Maximum elapsed time for etcd connection retries
    pub etcd_backoff_max_elapsed: Duration,

    /// Multiplier for etcd backoff
    pub etcd_backoff_multiplier: f64,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            etcd_endpoints: vec!["http://127.0.0.1:2379".to_string()],
            dial_timeout: Duration::from_secs(5),

            service_namespace: "Hello".to_string(),
            advertise_addr: None,
            lease_ttl: Duration::from_secs(10),
            renew_interval: Duration::from_secs(1),

            bind_addr: "0.0.0.0:1234".to_string(),

            etcd_backoff_initial: Duration::from_secs(1),
            etcd_backoff_max: Duration::from_secs(10),
            etcd_backoff_max_elapsed: Duration::from_secs(30),
            etcd_backoff_multiplier: 2.0,
        }
    }
}

impl RegistrarConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoints) = lookup("ETCD_ENDPOINTS") {
            config.etcd_endpoints = split_endpoints(&endpoints);
        }

        if let Some(ms) = lookup("ETCD_DIAL_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.dial_timeout = Duration::from_millis(ms);
        }

        if let Some(namespace) = lookup("SERVICE_NAMESPACE") {
            config.service_namespace = namespace;
        }

        if let Some(addr) = lookup("ADVERTISE_ADDR") {
            config.advertise_addr = Some(addr);
        }

        if let Some(secs) = lookup("LEASE_TTL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.lease_ttl = Duration::from_secs(secs);
        }

        if let Some(ms) = lookup("RENEW_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.renew_interval = Duration::from_millis(ms);
        }

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }

        config
    }

    /// Lease timing for the manager, rejected if renewals could arrive after expiry
    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        ManagerConfig::new(self.lease_ttl, self.renew_interval)
    }

    pub fn namespace(&self) -> Result<ServiceNamespace, ConfigError> {
        ServiceNamespace::new(&self.service_namespace)
    }

    /// Configured advertise address, or the address the listener ended up on
    pub fn advertised_value(&self, bound: std::net::SocketAddr) -> AdvertisedValue {
        match &self.advertise_addr {
            Some(addr) => AdvertisedValue::new(addr.clone()),
            None => AdvertisedValue::from(bound),
        }
    }
}

/// Split a comma-separated endpoint list, skipping blanks
pub fn split_endpoints(endpoints: &str) -> Vec<String> {
    endpoints
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = RegistrarConfig::default();
        assert!(config.manager_config().is_ok());
        assert_eq!(config.namespace().unwrap().as_str(), "Hello/");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ETCD_ENDPOINTS", "http://etcd-0:2379, http://etcd-1:2379,"),
            ("LEASE_TTL_SECS", "30"),
            ("RENEW_INTERVAL_MS", "5000"),
            ("SERVICE_NAMESPACE", "/services/hello"),
            ("ADVERTISE_ADDR", "remote_host:1234"),
            ("ETCD_DIAL_TIMEOUT_MS", "not-a-number"),
        ]);
        let config = RegistrarConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(
            config.etcd_endpoints,
            vec!["http://etcd-0:2379".to_string(), "http://etcd-1:2379".to_string()]
        );
        assert_eq!(config.lease_ttl, Duration::from_secs(30));
        assert_eq!(config.renew_interval, Duration::from_secs(5));
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.namespace().unwrap().as_str(), "/services/hello/");

        let bound: std::net::SocketAddr = "0.0.0.0:1234".parse().unwrap();
        assert_eq!(config.advertised_value(bound).as_str(), "remote_host:1234");
    }

    #[test]
    fn test_interval_must_stay_below_ttl() {
        let config = RegistrarConfig {
            lease_ttl: Duration::from_secs(2),
            renew_interval: Duration::from_secs(3),
            ..Default::default()
        };
        assert!(matches!(
            config.manager_config(),
            Err(ConfigError::IntervalNotBelowTtl { .. })
        ));
    }
}
