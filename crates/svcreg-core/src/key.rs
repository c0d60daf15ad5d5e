//! Registry Keys
//!
//! Builds the keys under which service instances announce themselves.
//! A key is the normalized service namespace followed by the decimal lease ID,
//! e.g. `Hello/7587869431541212456`. Every lease generation therefore writes a
//! fresh key, and discovery clients list instances by reading the namespace prefix.

use crate::error::ConfigError;
use std::fmt;

/// Separator between namespace segments
pub const SEPARATOR: char = '/';

/// Normalize a namespace so it ends with exactly one separator.
///
/// Runs of separators collapse to one and a leading separator is preserved,
/// so `"svc"`, `"svc/"` and `"svc//"` all become `"svc/"`.
pub fn normalize(namespace: &str) -> String {
    let mut normalized = String::with_capacity(namespace.len() + 1);
    if namespace.starts_with(SEPARATOR) {
        normalized.push(SEPARATOR);
    }

    for segment in namespace.split(SEPARATOR).filter(|s| !s.is_empty()) {
        normalized.push_str(segment);
        normalized.push(SEPARATOR);
    }

    if normalized.is_empty() {
        normalized.push(SEPARATOR);
    }
    normalized
}

/// Concatenate the normalized namespace with the decimal form of the lease ID
pub fn build_key(namespace: &str, lease_id: LeaseId) -> String {
    format!("{}{}", normalize(namespace), lease_id)
}

/// Lease identifier handed out by the coordination store.
///
/// `0` is reserved and means "no lease currently held".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeaseId(i64);

impl LeaseId {
    /// Sentinel for "no lease held"
    pub const NONE: LeaseId = LeaseId(0);

    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<i64> for LeaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Prefix identifying a class of service, always ending in one separator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceNamespace(String);

impl ServiceNamespace {
    /// Trim surrounding whitespace and normalize.
    ///
    /// Fails when nothing but separators (or nothing at all) is left.
    pub fn new(namespace: &str) -> Result<Self, ConfigError> {
        let trimmed = namespace.trim();
        if trimmed.trim_matches(SEPARATOR).is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(Self(normalize(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key this namespace produces for the given lease
    pub fn key_for(&self, lease_id: LeaseId) -> RegistryKey {
        RegistryKey(build_key(&self.0, lease_id))
    }
}

impl fmt::Display for ServiceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full registry key for one lease generation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey(String);

impl RegistryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload published under the registry key, usually `host:port`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AdvertisedValue(String);

impl AdvertisedValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self(format!("{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<std::net::SocketAddr> for AdvertisedValue {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for AdvertisedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_appends_single_separator() {
        assert_eq!(normalize("Hello"), "Hello/");
        assert_eq!(normalize("Hello/"), "Hello/");
        assert_eq!(normalize("Hello///"), "Hello/");
        assert_eq!(normalize("/services//hello/"), "/services/hello/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_build_key() {
        assert_eq!(build_key("svc/", LeaseId::new(42)), "svc/42");
        assert_eq!(build_key("svc", LeaseId::new(42)), "svc/42");
        assert_eq!(
            build_key("Hello", LeaseId::new(7587869431541212456)),
            "Hello/7587869431541212456"
        );
    }

    #[test]
    fn test_namespace_rejects_empty() {
        assert!(matches!(
            ServiceNamespace::new(""),
            Err(ConfigError::EmptyNamespace)
        ));
        assert!(matches!(
            ServiceNamespace::new(" // "),
            Err(ConfigError::EmptyNamespace)
        ));
    }

    #[test]
    fn test_namespace_key_matches_build_key() {
        let namespace = ServiceNamespace::new(" svc ").unwrap();
        assert_eq!(namespace.as_str(), "svc/");
        assert_eq!(namespace.key_for(LeaseId::new(43)).as_str(), "svc/43");

        let nested = ServiceNamespace::new("/services//hello").unwrap();
        assert_eq!(
            nested.key_for(LeaseId::new(7)).as_str(),
            build_key("/services//hello", LeaseId::new(7))
        );
    }

    #[test]
    fn test_lease_id_sentinel() {
        assert!(LeaseId::NONE.is_none());
        assert!(LeaseId::default().is_none());
        assert!(!LeaseId::new(1).is_none());
    }

    #[test]
    fn test_advertised_value_from_host_port() {
        let value = AdvertisedValue::from_host_port("remote_host", 1234);
        assert_eq!(value.as_str(), "remote_host:1234");

        let addr: std::net::SocketAddr = "10.0.0.5:8080".parse().unwrap();
        assert_eq!(AdvertisedValue::from(addr).as_str(), "10.0.0.5:8080");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(namespace in "[a-z/]{0,24}") {
            let once = normalize(&namespace);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert!(once.ends_with(SEPARATOR));
            prop_assert!(!once.contains("//"));
        }

        #[test]
        fn prop_keys_distinct_for_distinct_leases(
            namespace in "[a-zA-Z]{1,12}/?",
            a in 1i64..,
            b in 1i64..,
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(
                build_key(&namespace, LeaseId::new(a)),
                build_key(&namespace, LeaseId::new(b))
            );
        }
    }
}
