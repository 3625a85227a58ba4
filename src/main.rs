use std::fs::{File, OpenOptions};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docktainer::config::Config;
use docktainer::notify::ConfiguredNotifier;
use docktainer::pipeline::{Deployer, reconcile};
use docktainer::process::TokioProcessRunner;
use docktainer::server::{AppState, Scheme, build_router};
use docktainer::worker::Dispatcher;

type ProdDispatcher = Dispatcher<TokioProcessRunner, ConfiguredNotifier>;

/// How long in-flight requests get once shutdown starts.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let log_error = init_tracing(&config.paths.log_file);
    if let Some(e) = log_error {
        warn!(path = %config.paths.log_file.display(), error = %e, "Logging to stdout only");
    }
    if config.webhook_secret.is_empty() {
        warn!("WEBHOOK_SECRET is empty; only deliveries signed with an empty key will verify");
    }

    for dir in [&config.paths.repos_root, &config.paths.html_root] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let config = Arc::new(config);
    let deployer = Deployer::new(
        Arc::clone(&config),
        TokioProcessRunner,
        ConfiguredNotifier::from_config(&config),
    );
    match deployer.store().sweep_leftovers() {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Removed leftovers of interrupted publishes"),
        Err(e) => warn!(error = %e, "Failed to sweep html root"),
    }

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(deployer),
        config.max_concurrent_builds,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let served = if config.paths.has_tls() {
        serve_https(&config, Arc::clone(&dispatcher), shutdown.clone()).await
    } else {
        serve_http(&config, Arc::clone(&dispatcher), shutdown.clone()).await
    };

    shutdown.cancel();
    info!("Server stopped, waiting for running jobs");
    dispatcher.close().await;
    served
}

async fn serve_http(
    config: &Config,
    dispatcher: Arc<ProdDispatcher>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "No TLS certificate found, serving HTTP");

    start_reconciler(config, &dispatcher, &shutdown);

    let app = build_router(AppState::new(dispatcher, Scheme::Http));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}

async fn serve_https(
    config: &Config,
    dispatcher: Arc<ProdDispatcher>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("TLS crypto provider was already installed");
    }

    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
        &config.paths.tls_cert,
        &config.paths.tls_key,
    )
    .await
    .context("failed to load TLS certificate")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.https_port));
    let handle = axum_server::Handle::new();

    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
        }
    });

    tokio::spawn({
        let handle = handle.clone();
        let config = config.clone();
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown.clone();
        async move {
            if let Some(addr) = handle.listening().await {
                info!(%addr, "Found TLS certificate, serving HTTPS");
                start_reconciler(&config, &dispatcher, &shutdown);
            }
        }
    });

    let app = build_router(AppState::new(dispatcher, Scheme::Https));
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("HTTPS server failed")
}

/// Spawns the startup reconciliation pass if a base repository is set.
fn start_reconciler(config: &Config, dispatcher: &Arc<ProdDispatcher>, shutdown: &CancellationToken) {
    let Some(url) = config.base_repository.clone() else {
        info!("BASE_REPOSITORY not set, skipping reconciliation");
        return;
    };
    let dispatcher = Arc::clone(dispatcher);
    let shutdown = shutdown.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => info!("Reconciliation cancelled"),
            result = reconcile(&dispatcher, &url) => {
                if let Err(e) = result {
                    error!(error = %e, "Reconciliation failed");
                }
            }
        }
    });
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}

/// Installs stdout and log-file layers. Returns the error if the log file
/// could not be opened; stdout logging is installed regardless.
fn init_tracing(log_path: &Path) -> Option<std::io::Error> {
    let (file_layer, error) = match open_log_file(log_path) {
        Ok(file) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docktainer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    error
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
