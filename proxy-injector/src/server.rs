//! TLS admission server, built on `axum_server::tls_rustls` the way
//! `examples/kube-rs-kube/examples/admission_controller.rs` binds its
//! `/mutate` route, plus the two concerns that example leaves to the
//! operator: certificate rotation and graceful shutdown (`spec.md` §4.6).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use notify::{RecursiveMode, Watcher};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn, Level};

use crate::admission::{mutate_handler, AppState};
use crate::error::{Error, Result};
use crate::metrics::encode_text;

const CERT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Runs the admission server and the metrics server until a shutdown signal
/// arrives, then drains in-flight admissions for up to [`SHUTDOWN_GRACE`].
pub async fn serve(
    addr: SocketAddr,
    metrics_addr: SocketAddr,
    tls_cert_file: PathBuf,
    tls_key_file: PathBuf,
    state: Arc<AppState>,
) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(&tls_cert_file, &tls_key_file)
        .await
        .map_err(Error::Tls)?;

    spawn_cert_watcher(tls_cert_file, tls_key_file, tls_config.clone());

    let admission_app = Router::new()
        .route("/mutate", post(mutate_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(state.clone());

    let metrics_app = Router::new().route("/metrics", get(metrics_handler)).with_state(state);

    let admission_handle = Handle::new();
    let metrics_handle = Handle::new();

    let admission_server = axum_server::bind_rustls(addr, tls_config)
        .handle(admission_handle.clone())
        .serve(admission_app.into_make_service());
    let metrics_server = axum_server::bind(metrics_addr)
        .handle(metrics_handle.clone())
        .serve(metrics_app.into_make_service());

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received; draining in-flight admissions");
        admission_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        metrics_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let (admission_result, metrics_result) = tokio::join!(admission_server, metrics_server);
    admission_result.map_err(|err| Error::Bind(addr, err))?;
    metrics_result.map_err(|err| Error::Bind(metrics_addr, err))?;
    Ok(())
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> String {
    encode_text(&state.metrics_registry)
}

/// Watches the cert/key files for changes via `notify`, reloading
/// `tls_config` in place on every event (debounced by polling alongside it:
/// some CSI-mounted secret volumes update files via an atomic rename that
/// `notify` sometimes misses on overlay filesystems).
fn spawn_cert_watcher(cert_file: PathBuf, key_file: PathBuf, tls_config: RustlsConfig) {
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);

    let watch_cert = cert_file.clone();
    let watch_key = key_file.clone();
    let tx_for_watcher = tx.clone();
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = tx_for_watcher.try_send(());
        }
    }) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(%err, "failed to start filesystem watcher for TLS cert/key; relying on periodic poll only");
            tokio::spawn(async move { poll_loop(cert_file, key_file, tls_config).await });
            return;
        }
    };

    for path in [&watch_cert, &watch_key] {
        if let Some(parent) = path.parent() {
            if let Err(err) = watcher.watch(parent, RecursiveMode::NonRecursive) {
                warn!(%err, path = %parent.display(), "failed to watch TLS cert/key directory");
            }
        }
    }

    tokio::spawn(async move {
        // Keep the watcher alive for the task's lifetime.
        let _watcher = watcher;
        loop {
            tokio::select! {
                _ = rx.recv() => {
                    reload(&cert_file, &key_file, &tls_config).await;
                }
                _ = tokio::time::sleep(CERT_POLL_INTERVAL) => {
                    reload(&cert_file, &key_file, &tls_config).await;
                }
            }
        }
    });
}

async fn poll_loop(cert_file: PathBuf, key_file: PathBuf, tls_config: RustlsConfig) {
    loop {
        tokio::time::sleep(CERT_POLL_INTERVAL).await;
        reload(&cert_file, &key_file, &tls_config).await;
    }
}

async fn reload(cert_file: &Path, key_file: &Path, tls_config: &RustlsConfig) {
    match tls_config.reload_from_pem_file(cert_file, key_file).await {
        Ok(()) => info!("TLS certificate reloaded"),
        Err(err) => warn!(%err, "TLS certificate reload failed; continuing with the previous certificate"),
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
