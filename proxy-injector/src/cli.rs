//! Command-line surface (`spec.md` §6, `SPEC_FULL.md` §6). Mirrors the
//! teacher's own `clap` derive style (see `kube`'s own examples, which all
//! take flags the same shape: plain `#[derive(Parser)]` structs, no builder
//! API).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use proxy_injector_core::config::{ClusterConfig, InjectToggle, PortRanges};

#[derive(Debug, Parser)]
#[command(name = "proxy-injector", about = "Linkerd mutating admission webhook for sidecar injection")]
pub struct Cli {
    #[command(flatten)]
    pub defaults: ClusterDefaults,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the TLS admission webhook server (the default when no subcommand is given).
    Serve(ServeArgs),
    /// Run the same decision/patch pipeline over a local manifest, CLI-side (`Origin::Cli`).
    Inject(InjectArgs),
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Admission webhook listen address.
    #[arg(long, default_value = ":8443")]
    pub addr: String,
    /// Prometheus scrape endpoint address.
    #[arg(long, default_value = ":9995")]
    pub metrics_addr: String,
    #[arg(long)]
    pub tls_cert_file: PathBuf,
    #[arg(long)]
    pub tls_key_file: PathBuf,
    /// Fail closed (deny) on internal failures other than decode errors, instead of the default fail-open.
    #[arg(long, default_value_t = false)]
    pub fail_closed: bool,
    /// Per-admission deadline; on elapse the handler fails open with no patch.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub admission_deadline: std::time::Duration,
    /// How often to re-check the MutatingWebhookConfiguration after the startup reconcile. 0 disables the periodic check.
    #[arg(long, default_value = "0s", value_parser = parse_duration)]
    pub reconcile_interval: std::time::Duration,
    /// Name of the MutatingWebhookConfiguration this process owns.
    #[arg(long, default_value = "linkerd-proxy-injector-webhook-config")]
    pub webhook_config_name: String,
    /// DNS name under which the webhook service is reachable from the API server.
    #[arg(long)]
    pub webhook_service_dns_name: Option<String>,
}

#[derive(Debug, Parser)]
pub struct InjectArgs {
    /// YAML manifest to inject, containing one or more documents. `-` reads stdin.
    #[arg(short = 'f', long = "filename")]
    pub filename: PathBuf,
}

/// Cluster defaults (`spec.md` §6 "`--init-image-version`, `--proxy-image-version`, … all
/// cluster defaults"). Shared between `serve` and `inject` since both need a `ClusterConfig`
/// to seed the merge in `proxy_injector_core::config::merge`.
#[derive(Debug, Parser)]
pub struct ClusterDefaults {
    #[arg(long, default_value = "disabled")]
    pub inject: InjectToggle,
    #[arg(long, default_value = "cr.l5d.io/linkerd/proxy")]
    pub proxy_image: String,
    #[arg(long, default_value = "stable")]
    pub proxy_version: String,
    #[arg(long = "init-image", default_value = "cr.l5d.io/linkerd/proxy-init")]
    pub proxy_init_image: String,
    #[arg(long = "init-image-version", default_value = "stable")]
    pub proxy_init_version: String,
    #[arg(long, default_value_t = 4190)]
    pub control_port: u16,
    #[arg(long, default_value_t = 4143)]
    pub inbound_port: u16,
    #[arg(long, default_value_t = 4140)]
    pub outbound_port: u16,
    #[arg(long, default_value_t = 4191)]
    pub admin_port: u16,
    #[arg(long, default_value = "")]
    pub ignore_inbound_ports: PortRanges,
    #[arg(long, default_value = "")]
    pub ignore_outbound_ports: PortRanges,
    #[arg(long, default_value = "")]
    pub opaque_ports: PortRanges,
    #[arg(long, default_value_t = 2102)]
    pub proxy_uid: i64,
    #[arg(long, default_value = "warn,linkerd=info")]
    pub proxy_log_level: String,
    #[arg(long, default_value = "plain")]
    pub proxy_log_format: String,
    #[arg(long, default_value_t = false)]
    pub enable_external_profiles: bool,
    #[arg(long, default_value_t = false)]
    pub disable_identity: bool,
    #[arg(long, default_value_t = false)]
    pub disable_tap: bool,
    #[arg(long, default_value_t = 0)]
    pub wait_before_exit_seconds: u32,
    /// Suppress the init container unconditionally; redirection is assumed to be programmed
    /// out-of-band by a CNI plugin (`spec.md` §4.4, §9 Open Question — resolved unconditional).
    #[arg(long, default_value_t = false)]
    pub cni_enabled: bool,
    #[arg(long, default_value = "linkerd")]
    pub linkerd_namespace: String,
    #[arg(long, default_value = "cluster.local")]
    pub cluster_domain: String,
    #[arg(long, default_value = "cluster.local")]
    pub identity_trust_domain: String,
    #[arg(long, default_value = "linkerd-identity.linkerd.svc.cluster.local:8080")]
    pub identity_svc_addr: String,
    #[arg(long, default_value = "linkerd-identity-trust-roots")]
    pub trust_anchor_configmap: String,
}

impl From<&ClusterDefaults> for ClusterConfig {
    fn from(d: &ClusterDefaults) -> Self {
        ClusterConfig {
            inject: d.inject,
            proxy_image: d.proxy_image.clone(),
            proxy_version: d.proxy_version.clone(),
            proxy_init_image: d.proxy_init_image.clone(),
            proxy_init_version: d.proxy_init_version.clone(),
            control_port: d.control_port,
            inbound_port: d.inbound_port,
            outbound_port: d.outbound_port,
            admin_port: d.admin_port,
            ignore_inbound_ports: d.ignore_inbound_ports.clone(),
            ignore_outbound_ports: d.ignore_outbound_ports.clone(),
            opaque_ports: d.opaque_ports.clone(),
            proxy_uid: d.proxy_uid,
            proxy_log_level: d.proxy_log_level.clone(),
            proxy_log_format: d.proxy_log_format.clone(),
            enable_external_profiles: d.enable_external_profiles,
            disable_identity: d.disable_identity,
            disable_tap: d.disable_tap,
            wait_before_exit_seconds: d.wait_before_exit_seconds,
            cni_enabled: d.cni_enabled,
            linkerd_namespace: d.linkerd_namespace.clone(),
            cluster_domain: d.cluster_domain.clone(),
            identity_trust_domain: d.identity_trust_domain.clone(),
            identity_svc_addr: d.identity_svc_addr.clone(),
            trust_anchor_configmap: d.trust_anchor_configmap.clone(),
            // CLI flags never carry `cpu-request` style resource overrides at cluster scope
            // today; operators set those via namespace/workload annotations (spec.md §3).
            proxy_cpu_request: None,
            proxy_cpu_limit: None,
            proxy_memory_request: None,
            proxy_memory_limit: None,
        }
    }
}

fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    let s = s.trim();
    let (num, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let num: u64 = num.parse().map_err(|_| format!("invalid duration {s:?}"))?;
    let secs = match unit {
        "s" | "" => num,
        "m" => num * 60,
        "h" => num * 3600,
        other => return Err(format!("unrecognized duration unit {other:?}")),
    };
    Ok(std::time::Duration::from_secs(secs))
}
