//! Svcreg Server - hello service with etcd self-registration

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use svcreg_core::{
    AdvertisedValue, LeaseStore, ManagerConfig, MemoryLeaseStore, RegistrationError, Registrar,
    ServiceNamespace,
};
use svcreg_server::{
    hello,
    observability::{init_tracing, TracingConfig},
    version::BuildInfo,
    EtcdLeaseStore, RegistrarConfig,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "svcreg-server")]
#[command(about = "Hello service that registers itself in etcd")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve and keep this instance registered
    Run(RunArgs),
    /// Print build information
    Version,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    /// etcd cluster from ETCD_ENDPOINTS / --etcd-endpoints
    Etcd,
    /// Process-local store, for trying things out without etcd
    Memory,
}

/// Overrides applied on top of the environment configuration
#[derive(Args)]
struct RunArgs {
    /// Lease store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Etcd)]
    store: StoreKind,

    /// etcd endpoints (comma-separated)
    #[arg(long)]
    etcd_endpoints: Option<String>,

    /// Service namespace to register under
    #[arg(long)]
    namespace: Option<String>,

    /// Value to publish, defaults to the bound address
    #[arg(long)]
    advertise: Option<String>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// Lease TTL in seconds
    #[arg(long)]
    lease_ttl_secs: Option<u64>,

    /// Keep-alive interval in milliseconds
    #[arg(long)]
    renew_interval_ms: Option<u64>,
}

impl RunArgs {
    fn apply(&self, config: &mut RegistrarConfig) {
        if let Some(endpoints) = &self.etcd_endpoints {
            config.etcd_endpoints = svcreg_server::config::split_endpoints(endpoints);
        }
        if let Some(namespace) = &self.namespace {
            config.service_namespace = namespace.clone();
        }
        if let Some(addr) = &self.advertise {
            config.advertise_addr = Some(addr.clone());
        }
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(secs) = self.lease_ttl_secs {
            config.lease_ttl = std::time::Duration::from_secs(secs);
        }
        if let Some(ms) = self.renew_interval_ms {
            config.renew_interval = std::time::Duration::from_millis(ms);
        }
    }
}

/// Why the server stopped
enum Exit {
    Server(anyhow::Result<()>),
    Registration(Result<(), RegistrationError>),
    Signal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("{}", BuildInfo::current());
            Ok(())
        }
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    init_tracing(&TracingConfig::from_env())?;
    info!(version = %BuildInfo::current().short(), "Starting svcreg-server");

    let mut config = RegistrarConfig::from_env();
    args.apply(&mut config);
    let manager_config = config.manager_config()?;
    let namespace = config.namespace()?;

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let value = config.advertised_value(listener.local_addr()?);

    info!(
        namespace = %namespace,
        value = %value,
        ttl_secs = manager_config.lease_ttl().as_secs(),
        "Registration configured"
    );

    match args.store {
        StoreKind::Etcd => {
            info!(endpoints = ?config.etcd_endpoints, "Connecting to etcd");
            let store = EtcdLeaseStore::connect(&config).await?;
            serve(store, manager_config, namespace, value, listener).await
        }
        StoreKind::Memory => {
            warn!("Using in-memory lease store, registration is invisible to other processes");
            serve(MemoryLeaseStore::new(), manager_config, namespace, value, listener).await
        }
    }
}

async fn serve<S>(
    store: S,
    manager_config: ManagerConfig,
    namespace: ServiceNamespace,
    value: AdvertisedValue,
    listener: TcpListener,
) -> anyhow::Result<()>
where
    S: LeaseStore + Clone + 'static,
{
    let registrar = Registrar::new(store, manager_config);
    let mut registration = registrar.spawn(namespace, value);

    let exit = tokio::select! {
        result = hello::serve(listener) => Exit::Server(result),
        result = registration.wait() => Exit::Registration(result),
        _ = tokio::signal::ctrl_c() => Exit::Signal,
    };

    match exit {
        Exit::Signal => {
            info!("Received shutdown signal");
            registration.shutdown().await?;
            Ok(())
        }
        Exit::Server(result) => {
            if let Err(e) = registration.shutdown().await {
                warn!(error = %e, "Registration stopped with error");
            }
            result.context("Hello service failed")
        }
        Exit::Registration(result) => {
            // The instance is no longer discoverable; stop rather than serve unannounced
            if let Err(e) = &result {
                error!(error = %e, "Registration failed, shutting down");
            }
            result.context("Service registration stopped")
        }
    }
}
