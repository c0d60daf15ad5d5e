//! Svcreg Server Library
//!
//! Hello service that announces itself in etcd through a background lease manager

pub mod config;
pub mod etcd;
pub mod hello;
pub mod observability;
pub mod version;

pub use config::RegistrarConfig;
pub use etcd::EtcdLeaseStore;
