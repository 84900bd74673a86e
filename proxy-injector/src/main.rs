//! Entry point: wires the CLI, the namespace cache, the webhook-config
//! reconciler, and the TLS admission server together (`spec.md` §4.5-§4.8,
//! `SPEC_FULL.md` §4.9). Mirrors the shape of
//! `examples/kube-rs-kube/examples/admission_controller.rs`'s `main`, minus
//! the things that example leaves as an exercise for the operator.

mod admission;
mod cli;
mod error;
mod inject_cmd;
mod metrics;
mod namespace;
mod owner_lookup;
mod reconciler;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use prometheus_client::registry::Registry;

use crate::cli::{Cli, Command, ServeArgs};

const INJECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cluster = proxy_injector_core::ClusterConfig::from(&cli.defaults);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    match cli.command.unwrap_or(Command::Serve(default_serve_args())) {
        Command::Serve(args) => runtime.block_on(serve(args, cluster)),
        Command::Inject(args) => inject_cmd::run(&args, &cluster, INJECTOR_VERSION).map_err(Into::into),
    }
}

fn default_serve_args() -> ServeArgs {
    ServeArgs {
        addr: ":8443".to_string(),
        metrics_addr: ":9995".to_string(),
        tls_cert_file: "tls.crt".into(),
        tls_key_file: "tls.key".into(),
        fail_closed: false,
        admission_deadline: Duration::from_secs(10),
        reconcile_interval: Duration::from_secs(0),
        webhook_config_name: "linkerd-proxy-injector-webhook-config".to_string(),
        webhook_service_dns_name: None,
    }
}

async fn serve(args: ServeArgs, cluster: proxy_injector_core::ClusterConfig) -> anyhow::Result<()> {
    let client = Client::try_default().await?;

    let (namespaces, watch_fut) = namespace::NamespaceCache::spawn(client.clone());
    tokio::spawn(watch_fut);
    namespaces.wait_until_ready().await;

    let owner_lookup = owner_lookup::KubeOwnerLookup::new(client.clone());

    let mut metrics_registry = Registry::default();
    let metrics = Arc::new(metrics::Metrics::new(&mut metrics_registry));

    let ca_bundle = std::fs::read(&args.tls_cert_file)?;
    let reconciler_cfg = reconciler::ReconcilerConfig {
        webhook_config_name: args.webhook_config_name.clone(),
        service_namespace: cluster.linkerd_namespace.clone(),
        service_name: "linkerd-proxy-injector".to_string(),
        service_port: 443,
        ca_bundle,
        fail_policy_ignore: !args.fail_closed,
    };
    reconciler::reconcile(client.clone(), &reconciler_cfg).await?;

    if !args.reconcile_interval.is_zero() {
        let client = client.clone();
        let interval = args.reconcile_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = reconciler::reconcile(client.clone(), &reconciler_cfg).await {
                    tracing::warn!(%err, "periodic webhook configuration reconcile failed");
                }
            }
        });
    }

    let state = Arc::new(admission::AppState {
        cluster,
        namespaces,
        owner_lookup,
        metrics,
        metrics_registry,
        admission_deadline: args.admission_deadline,
        fail_open_on_internal_error: !args.fail_closed,
        injector_version: INJECTOR_VERSION.to_string(),
    });

    let addr = parse_listen_addr(&args.addr, 8443)?;
    let metrics_addr = parse_listen_addr(&args.metrics_addr, 9995)?;

    server::serve(addr, metrics_addr, args.tls_cert_file, args.tls_key_file, state).await?;
    Ok(())
}

fn parse_listen_addr(s: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    let s = if let Some(port) = s.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else if s.is_empty() {
        format!("0.0.0.0:{default_port}")
    } else {
        s.to_string()
    };
    Ok(s.parse()?)
}
