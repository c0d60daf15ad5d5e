//! What `svcreg-server version` prints and what the startup log carries

use std::fmt;
use std::time::Duration;
use svcreg_core::ManagerConfig;

/// Backends `run --store` accepts
pub const STORES: &[&str] = &["etcd", "memory"];

/// Identity of this binary plus the registration defaults it was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_sha: &'static str,
    pub dirty: bool,
    pub lease_ttl: Duration,
    pub renew_interval: Duration,
}

impl BuildInfo {
    pub fn current() -> Self {
        let defaults = ManagerConfig::default();
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_sha: env!("VERGEN_GIT_SHA"),
            dirty: env!("VERGEN_GIT_DIRTY") == "true",
            lease_ttl: defaults.lease_ttl(),
            renew_interval: defaults.renew_interval(),
        }
    }

    /// `<version> (<sha>[ dirty])`, used as the `version` field at startup
    pub fn short(&self) -> String {
        let dirty = if self.dirty { " dirty" } else { "" };
        format!("{} ({}{})", self.version, self.git_sha, dirty)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "svcreg-server {}", self.short())?;
        writeln!(f, "stores: {}", STORES.join(", "))?;
        write!(
            f,
            "lease:  ttl {}s, keep-alive every {}ms",
            self.lease_ttl.as_secs(),
            self.renew_interval.as_millis()
        )
    }
}
