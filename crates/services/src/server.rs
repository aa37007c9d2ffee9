//! Process startup and shutdown.

use std::future::Future;
use std::sync::Arc;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use registry::{Directory, Discovery, NacosDirectory, Registry, RegistryError};
use rpc::ServiceClient;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to set up directory client: {0}")]
    Directory(#[from] RegistryError),

    #[error("failed to install Prometheus recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Runs one service until SIGINT/SIGTERM, registered with the configured
/// Nacos server.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    let directory: Arc<dyn Directory> = Arc::new(NacosDirectory::new(config.nacos.clone())?);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    serve(config, listener, directory, metrics_handle, shutdown_signal()).await
}

/// Serves one service on `listener` until `shutdown` resolves.
///
/// Self-registration runs after `register_delay`, off the request path; a
/// failed registration leaves the service running but undiscoverable. On
/// shutdown a pending registration is skipped, one in flight is awaited, the
/// reconciler is stopped and every registered instance is removed from the
/// directory.
pub async fn serve(
    config: Config,
    listener: TcpListener,
    directory: Arc<dyn Directory>,
    metrics_handle: PrometheusHandle,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let port = listener.local_addr().map_err(ServerError::Serve)?.port();
    let ip = registry::local_ip(config.node_ip.as_deref());
    let registry = Arc::new(
        Registry::new(Arc::clone(&directory), ip)
            .with_heartbeat_interval(config.heartbeat_interval),
    );
    let client = ServiceClient::new(Discovery::new(directory)).with_timeout(config.rpc_timeout);

    let assembled = crate::assemble(config.kind, client);
    let app = crate::create_app(assembled.routes, &config.service_name, metrics_handle);

    let (stop_tx, stop_rx) = watch::channel(false);
    let reconciler = match (assembled.payments, config.reconcile_interval) {
        (Some(flow), Some(interval)) => {
            tracing::info!(?interval, "payment reconciliation enabled");
            Some(saga::spawn_reconciler(flow, interval, stop_rx.clone()))
        }
        _ => None,
    };

    let registration = {
        let registry = Arc::clone(&registry);
        let service_name = config.service_name.clone();
        let metadata = config.instance_metadata();
        let delay = config.register_delay;
        let mut stop = stop_rx;
        tokio::spawn(async move {
            // Once the register call starts it runs to completion, so shutdown
            // always sees its heartbeat.
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.changed() => {
                    tracing::info!("shutdown before registration, skipping it");
                    return;
                }
            }
            if !registry.register(&service_name, port, metadata).await {
                tracing::warn!("continuing without registry presence");
            }
        })
    };

    tracing::info!(
        service = %config.service_name,
        ip = registry.local_ip(),
        port,
        "starting service"
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve);

    let _ = stop_tx.send(true);
    if let Err(e) = registration.await {
        tracing::warn!(error = %e, "registration task ended abnormally");
    }
    if let Some(handle) = reconciler
        && let Err(e) = handle.await
    {
        tracing::warn!(error = %e, "reconciler ended abnormally");
    }
    if !registry.deregister_all().await {
        tracing::warn!("some instances could not be deregistered; they will expire");
    }

    tracing::info!("server shut down gracefully");
    served
}
