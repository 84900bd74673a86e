//! Typed, merged configuration: cluster defaults, namespace annotations, and
//! workload annotations combine into one [`EffectiveConfig`] per admission.
//!
//! See `spec.md` §3 for the recognized option table and precedence rules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::labels::{ANNOTATION_INJECT, CONFIG_ANNOTATION_PREFIX};

/// The primary `linkerd.io/inject` toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectToggle {
    Enabled,
    Disabled,
}

impl FromStr for InjectToggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(InjectToggle::Enabled),
            "disabled" => Ok(InjectToggle::Disabled),
            other => Err(format!("expected \"enabled\" or \"disabled\", got {other:?}")),
        }
    }
}

/// Where an effective `inject` decision was sourced from, used by the decision
/// engine to pick the right skip/inject reason string (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectSource {
    Workload,
    Namespace,
    ClusterDefault,
}

/// A single inclusive port range, `N` or `N-M`, both within `[0, 65535]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        PortRange {
            start: port,
            end: port,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('-') {
            Some((a, b)) => {
                let start: u16 = a
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid port range {s:?}"))?;
                let end: u16 = b
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid port range {s:?}"))?;
                if start > end {
                    return Err(format!("range start {start} is greater than end {end}"));
                }
                Ok(PortRange { start, end })
            }
            None => {
                let port: u16 = s.parse().map_err(|_| format!("invalid port {s:?}"))?;
                Ok(PortRange::single(port))
            }
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A comma-separated list of [`PortRange`]s, e.g. `"8080,9000-9005"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortRanges(pub Vec<PortRange>);

impl PortRanges {
    pub fn contains(&self, port: u16) -> bool {
        self.0.iter().any(|r| r.contains(port))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for PortRanges {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(PortRanges::default());
        }
        s.split(',')
            .map(|part| part.parse())
            .collect::<Result<Vec<_>, _>>()
            .map(PortRanges)
    }
}

impl fmt::Display for PortRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// One item in a not-yet-resolved port list: a literal port/range, or a
/// container port name that must be resolved against the pod template's
/// containers before it becomes a numeric [`PortRange`] (`spec.md` §3, §8
/// "named ports").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortToken {
    Range(PortRange),
    Named(String),
}

impl FromStr for PortToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty port token".to_string());
        }
        match s.parse::<PortRange>() {
            Ok(range) => Ok(PortToken::Range(range)),
            Err(_) => Ok(PortToken::Named(s.to_string())),
        }
    }
}

impl fmt::Display for PortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortToken::Range(r) => write!(f, "{r}"),
            PortToken::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A comma-separated port list as written in an annotation, before any
/// named entries have been resolved, e.g. `"8080,http,9000-9005"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSpecs(pub Vec<PortToken>);

impl PortSpecs {
    fn from_ranges(ranges: &PortRanges) -> Self {
        PortSpecs(ranges.0.iter().copied().map(PortToken::Range).collect())
    }

    /// Resolves every [`PortToken::Named`] entry against `named_ports`
    /// (container port name -> numeric `containerPort`). An unresolved name
    /// is dropped from the result, not the whole option: it is instead
    /// returned so the caller can turn it into a [`ConfigWarning`]
    /// (`spec.md` §3, §8 scenario 4: "named ports resolved; unresolved
    /// names dropped with a warning").
    pub fn resolve(&self, named_ports: &BTreeMap<String, u16>) -> (PortRanges, Vec<String>) {
        let mut ranges = Vec::new();
        let mut unresolved = Vec::new();
        for token in &self.0 {
            match token {
                PortToken::Range(r) => ranges.push(*r),
                PortToken::Named(name) => match named_ports.get(name) {
                    Some(port) => ranges.push(PortRange::single(*port)),
                    None => unresolved.push(name.clone()),
                },
            }
        }
        (PortRanges(ranges), unresolved)
    }
}

impl FromStr for PortSpecs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(PortSpecs::default());
        }
        s.split(',')
            .map(|part| part.parse())
            .collect::<Result<Vec<_>, _>>()
            .map(PortSpecs)
    }
}

impl fmt::Display for PortSpecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// A warning emitted while parsing annotations: unknown key, or a recognized
/// key with a value that failed to parse. Never fatal — spec.md §9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub message: String,
}

/// Cluster-wide defaults, immutable for the lifetime of the process once
/// loaded from CLI flags at startup (spec.md §5 "Shared resources").
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub inject: InjectToggle,
    pub proxy_image: String,
    pub proxy_version: String,
    pub proxy_init_image: String,
    pub proxy_init_version: String,
    pub control_port: u16,
    pub inbound_port: u16,
    pub outbound_port: u16,
    pub admin_port: u16,
    pub ignore_inbound_ports: PortRanges,
    pub ignore_outbound_ports: PortRanges,
    pub opaque_ports: PortRanges,
    pub proxy_uid: i64,
    pub proxy_log_level: String,
    pub proxy_log_format: String,
    pub proxy_cpu_request: Option<Quantity>,
    pub proxy_cpu_limit: Option<Quantity>,
    pub proxy_memory_request: Option<Quantity>,
    pub proxy_memory_limit: Option<Quantity>,
    pub enable_external_profiles: bool,
    pub disable_identity: bool,
    pub disable_tap: bool,
    pub wait_before_exit_seconds: u32,
    pub cni_enabled: bool,
    pub linkerd_namespace: String,
    pub cluster_domain: String,
    pub identity_trust_domain: String,
    pub identity_svc_addr: String,
    pub trust_anchor_configmap: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            inject: InjectToggle::Disabled,
            proxy_image: "cr.l5d.io/linkerd/proxy".to_string(),
            proxy_version: "stable".to_string(),
            proxy_init_image: "cr.l5d.io/linkerd/proxy-init".to_string(),
            proxy_init_version: "stable".to_string(),
            control_port: 4190,
            inbound_port: 4143,
            outbound_port: 4140,
            admin_port: 4191,
            ignore_inbound_ports: PortRanges::default(),
            ignore_outbound_ports: PortRanges::default(),
            opaque_ports: PortRanges::default(),
            proxy_uid: 2102,
            proxy_log_level: "warn,linkerd=info".to_string(),
            proxy_log_format: "plain".to_string(),
            proxy_cpu_request: None,
            proxy_cpu_limit: None,
            proxy_memory_request: Some(Quantity("20Mi".to_string())),
            proxy_memory_limit: Some(Quantity("250Mi".to_string())),
            enable_external_profiles: false,
            disable_identity: false,
            disable_tap: false,
            wait_before_exit_seconds: 0,
            cni_enabled: false,
            linkerd_namespace: "linkerd".to_string(),
            cluster_domain: "cluster.local".to_string(),
            identity_trust_domain: "cluster.local".to_string(),
            identity_svc_addr: "linkerd-identity.linkerd.svc.cluster.local:8080".to_string(),
            trust_anchor_configmap: "linkerd-identity-trust-roots".to_string(),
        }
    }
}

/// Partial overrides parsed from one annotation map (namespace or workload).
/// Every field absent means "not overridden at this level".
#[derive(Debug, Clone, Default)]
pub struct AnnotationOverrides {
    pub inject: Option<InjectToggle>,
    pub proxy_image: Option<String>,
    pub proxy_version: Option<String>,
    pub proxy_init_image: Option<String>,
    pub proxy_init_version: Option<String>,
    pub control_port: Option<u16>,
    pub inbound_port: Option<u16>,
    pub outbound_port: Option<u16>,
    pub admin_port: Option<u16>,
    pub ignore_inbound_ports: Option<PortSpecs>,
    pub ignore_outbound_ports: Option<PortSpecs>,
    pub opaque_ports: Option<PortSpecs>,
    pub proxy_uid: Option<i64>,
    pub proxy_log_level: Option<String>,
    pub proxy_log_format: Option<String>,
    pub proxy_cpu_request: Option<Quantity>,
    pub proxy_cpu_limit: Option<Quantity>,
    pub proxy_memory_request: Option<Quantity>,
    pub proxy_memory_limit: Option<Quantity>,
    pub enable_external_profiles: Option<bool>,
    pub disable_identity: Option<bool>,
    pub disable_tap: Option<bool>,
    pub wait_before_exit_seconds: Option<u32>,
}

impl AnnotationOverrides {
    /// Parses the recognized option keys out of an arbitrary annotation (or
    /// label) map. Unrecognized `config.linkerd.io/*` keys, and recognized
    /// keys with unparsable values, produce a [`ConfigWarning`] and are
    /// otherwise ignored — they are never partially applied or stored.
    pub fn from_map(map: &BTreeMap<String, String>) -> (InjectFromMap, Vec<ConfigWarning>) {
        let mut overrides = AnnotationOverrides::default();
        let mut warnings = Vec::new();
        let mut inject = None;

        if let Some(v) = map.get(ANNOTATION_INJECT) {
            match v.parse::<InjectToggle>() {
                Ok(toggle) => inject = Some(toggle),
                Err(reason) => warnings.push(ConfigWarning {
                    key: ANNOTATION_INJECT.to_string(),
                    message: reason,
                }),
            }
        }

        for (key, value) in map {
            let Some(opt) = key.strip_prefix(CONFIG_ANNOTATION_PREFIX) else {
                continue;
            };
            if let Err(message) = overrides.apply_option(opt, value) {
                warnings.push(ConfigWarning {
                    key: key.clone(),
                    message,
                });
            }
        }

        (InjectFromMap { inject, overrides }, warnings)
    }

    fn apply_option(&mut self, opt: &str, value: &str) -> Result<(), String> {
        match opt {
            "proxy-image" => self.proxy_image = Some(value.to_string()),
            "proxy-version" => self.proxy_version = Some(value.to_string()),
            "proxy-init-image" => self.proxy_init_image = Some(value.to_string()),
            "proxy-init-version" => self.proxy_init_version = Some(value.to_string()),
            "control-port" => self.control_port = Some(parse_port(value)?),
            "inbound-port" => self.inbound_port = Some(parse_port(value)?),
            "outbound-port" => self.outbound_port = Some(parse_port(value)?),
            "admin-port" => self.admin_port = Some(parse_port(value)?),
            "ignore-inbound-ports" => self.ignore_inbound_ports = Some(value.parse()?),
            "ignore-outbound-ports" => self.ignore_outbound_ports = Some(value.parse()?),
            "opaque-ports" => self.opaque_ports = Some(value.parse()?),
            "proxy-uid" => {
                self.proxy_uid = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid proxy-uid {value:?}"))?,
                )
            }
            "proxy-log-level" => self.proxy_log_level = Some(value.to_string()),
            "proxy-log-format" => self.proxy_log_format = Some(value.to_string()),
            "proxy-cpu-request" => self.proxy_cpu_request = Some(Quantity(value.to_string())),
            "proxy-cpu-limit" => self.proxy_cpu_limit = Some(Quantity(value.to_string())),
            "proxy-memory-request" => self.proxy_memory_request = Some(Quantity(value.to_string())),
            "proxy-memory-limit" => self.proxy_memory_limit = Some(Quantity(value.to_string())),
            "enable-external-profiles" => self.enable_external_profiles = Some(parse_bool(value)?),
            "disable-identity" => self.disable_identity = Some(parse_bool(value)?),
            "disable-tap" => self.disable_tap = Some(parse_bool(value)?),
            "wait-before-exit-seconds" => {
                self.wait_before_exit_seconds = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid wait-before-exit-seconds {value:?}"))?,
                )
            }
            // Unknown key under the recognized prefix: ignored with a warning.
            _ => return Err(format!("unrecognized option {opt:?}")),
        }
        Ok(())
    }
}

fn parse_port(value: &str) -> Result<u16, String> {
    value.parse().map_err(|_| format!("invalid port {value:?}"))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected \"true\" or \"false\", got {other:?}")),
    }
}

/// Result of parsing one annotation map: the primary toggle (kept separate
/// because its absence, not just its value, matters to the decision engine)
/// plus the rest of the recognized options.
pub struct InjectFromMap {
    pub inject: Option<InjectToggle>,
    pub overrides: AnnotationOverrides,
}

/// The fully merged configuration for one admission, plus a record of which
/// level resolved the primary `inject` toggle.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub inject: InjectToggle,
    pub inject_source: InjectSource,
    pub proxy_image: String,
    pub proxy_version: String,
    pub proxy_init_image: String,
    pub proxy_init_version: String,
    pub control_port: u16,
    pub inbound_port: u16,
    pub outbound_port: u16,
    pub admin_port: u16,
    pub ignore_inbound_ports: PortRanges,
    pub ignore_outbound_ports: PortRanges,
    pub opaque_ports: PortRanges,
    pub proxy_uid: i64,
    pub proxy_log_level: String,
    pub proxy_log_format: String,
    pub proxy_cpu_request: Option<Quantity>,
    pub proxy_cpu_limit: Option<Quantity>,
    pub proxy_memory_request: Option<Quantity>,
    pub proxy_memory_limit: Option<Quantity>,
    pub enable_external_profiles: bool,
    pub disable_identity: bool,
    pub disable_tap: bool,
    pub wait_before_exit_seconds: u32,
    pub cni_enabled: bool,
}

fn pick_port_spec(
    workload: &Option<PortSpecs>,
    namespace: &Option<PortSpecs>,
    cluster: &PortRanges,
) -> PortSpecs {
    workload
        .clone()
        .or_else(|| namespace.clone())
        .unwrap_or_else(|| PortSpecs::from_ranges(cluster))
}

/// Resolves a merged [`PortSpecs`] against the pod template's named
/// container ports, turning any unresolved name into a [`ConfigWarning`]
/// keyed by the owning option (`spec.md` §3, §8 scenario 4).
fn resolve_port_spec(
    option: &str,
    spec: PortSpecs,
    named_ports: &BTreeMap<String, u16>,
    warnings: &mut Vec<ConfigWarning>,
) -> PortRanges {
    let (ranges, unresolved) = spec.resolve(named_ports);
    for name in unresolved {
        warnings.push(ConfigWarning {
            key: format!("{CONFIG_ANNOTATION_PREFIX}{option}"),
            message: format!("named port {name:?} not found on the pod template's containers; dropped"),
        });
    }
    ranges
}

/// Merges cluster defaults, namespace overrides, and workload overrides in
/// that precedence (workload highest) into one [`EffectiveConfig`], and
/// resolves any named port tokens in the port-range options against
/// `named_ports` (the pod template's own container ports).
///
/// `spec.md` §3: "Workload pod-template annotations ≻ Namespace annotations
/// ≻ Cluster defaults".
pub fn merge(
    cluster: &ClusterConfig,
    namespace: &InjectFromMap,
    workload: &InjectFromMap,
    named_ports: &BTreeMap<String, u16>,
) -> (EffectiveConfig, Vec<ConfigWarning>) {
    let (inject, inject_source) = match (workload.inject, namespace.inject) {
        (Some(v), _) => (v, InjectSource::Workload),
        (None, Some(v)) => (v, InjectSource::Namespace),
        (None, None) => (cluster.inject, InjectSource::ClusterDefault),
    };

    macro_rules! pick {
        ($field:ident) => {
            workload
                .overrides
                .$field
                .clone()
                .or_else(|| namespace.overrides.$field.clone())
                .unwrap_or_else(|| cluster.$field.clone())
        };
    }
    macro_rules! pick_opt {
        ($field:ident) => {
            workload
                .overrides
                .$field
                .clone()
                .or_else(|| namespace.overrides.$field.clone())
                .or_else(|| cluster.$field.clone())
        };
    }

    let mut warnings = Vec::new();
    let ignore_inbound_ports = resolve_port_spec(
        "ignore-inbound-ports",
        pick_port_spec(
            &workload.overrides.ignore_inbound_ports,
            &namespace.overrides.ignore_inbound_ports,
            &cluster.ignore_inbound_ports,
        ),
        named_ports,
        &mut warnings,
    );
    let ignore_outbound_ports = resolve_port_spec(
        "ignore-outbound-ports",
        pick_port_spec(
            &workload.overrides.ignore_outbound_ports,
            &namespace.overrides.ignore_outbound_ports,
            &cluster.ignore_outbound_ports,
        ),
        named_ports,
        &mut warnings,
    );
    let opaque_ports = resolve_port_spec(
        "opaque-ports",
        pick_port_spec(
            &workload.overrides.opaque_ports,
            &namespace.overrides.opaque_ports,
            &cluster.opaque_ports,
        ),
        named_ports,
        &mut warnings,
    );

    let effective = EffectiveConfig {
        inject,
        inject_source,
        proxy_image: pick!(proxy_image),
        proxy_version: pick!(proxy_version),
        proxy_init_image: pick!(proxy_init_image),
        proxy_init_version: pick!(proxy_init_version),
        control_port: pick!(control_port),
        inbound_port: pick!(inbound_port),
        outbound_port: pick!(outbound_port),
        admin_port: pick!(admin_port),
        ignore_inbound_ports,
        ignore_outbound_ports,
        opaque_ports,
        proxy_uid: pick!(proxy_uid),
        proxy_log_level: pick!(proxy_log_level),
        proxy_log_format: pick!(proxy_log_format),
        proxy_cpu_request: pick_opt!(proxy_cpu_request),
        proxy_cpu_limit: pick_opt!(proxy_cpu_limit),
        proxy_memory_request: pick_opt!(proxy_memory_request),
        proxy_memory_limit: pick_opt!(proxy_memory_limit),
        enable_external_profiles: pick!(enable_external_profiles),
        disable_identity: pick!(disable_identity),
        disable_tap: pick!(disable_tap),
        wait_before_exit_seconds: pick!(wait_before_exit_seconds),
        cni_enabled: cluster.cni_enabled,
    };

    (effective, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_parses_single_and_range() {
        assert_eq!("0".parse(), Ok(PortRange::single(0)));
        assert_eq!("65535".parse(), Ok(PortRange::single(65535)));
        assert_eq!(
            "9000-9005".parse(),
            Ok(PortRange {
                start: 9000,
                end: 9005
            })
        );
    }

    #[test]
    fn port_range_rejects_out_of_u16_range_and_backwards_ranges() {
        assert!("65536".parse::<PortRange>().is_err());
        assert!("-1".parse::<PortRange>().is_err());
        assert!("9005-9000".parse::<PortRange>().is_err());
    }

    #[test]
    fn port_ranges_csv_contains() {
        let ranges: PortRanges = "8080,9000-9005".parse().unwrap();
        assert!(ranges.contains(8080));
        assert!(ranges.contains(9003));
        assert!(!ranges.contains(9006));
    }

    #[test]
    fn unknown_config_key_is_a_warning_not_an_error() {
        let mut map = BTreeMap::new();
        map.insert(
            "config.linkerd.io/made-up-option".to_string(),
            "123".to_string(),
        );
        let (from_map, warnings) = AnnotationOverrides::from_map(&map);
        assert!(from_map.inject.is_none());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "config.linkerd.io/made-up-option");
    }

    #[test]
    fn workload_overrides_beat_namespace_beat_cluster() {
        let cluster = ClusterConfig {
            proxy_version: "cluster-version".to_string(),
            ..ClusterConfig::default()
        };
        let mut ns_map = BTreeMap::new();
        ns_map.insert(
            "config.linkerd.io/proxy-version".to_string(),
            "ns-version".to_string(),
        );
        ns_map.insert(
            "config.linkerd.io/opaque-ports".to_string(),
            "3306".to_string(),
        );
        let (ns, ns_warnings) = AnnotationOverrides::from_map(&ns_map);
        assert!(ns_warnings.is_empty());

        let mut wl_map = BTreeMap::new();
        wl_map.insert(
            "config.linkerd.io/proxy-version".to_string(),
            "wl-version".to_string(),
        );
        let (wl, _) = AnnotationOverrides::from_map(&wl_map);

        let (effective, warnings) = merge(&cluster, &ns, &wl, &BTreeMap::new());
        assert!(warnings.is_empty());
        assert_eq!(effective.proxy_version, "wl-version");
        assert!(effective.opaque_ports.contains(3306));
    }

    #[test]
    fn namespace_label_inject_enabled_pod_annotation_disabled_workload_wins() {
        let cluster = ClusterConfig::default();
        let mut ns_map = BTreeMap::new();
        ns_map.insert(ANNOTATION_INJECT.to_string(), "enabled".to_string());
        let (ns, _) = AnnotationOverrides::from_map(&ns_map);

        let mut wl_map = BTreeMap::new();
        wl_map.insert(ANNOTATION_INJECT.to_string(), "disabled".to_string());
        let (wl, _) = AnnotationOverrides::from_map(&wl_map);

        let (effective, _) = merge(&cluster, &ns, &wl, &BTreeMap::new());
        assert_eq!(effective.inject, InjectToggle::Disabled);
        assert_eq!(effective.inject_source, InjectSource::Workload);
    }

    #[test]
    fn named_ports_resolve_and_unresolved_names_are_dropped_with_a_warning() {
        let mut wl_map = BTreeMap::new();
        wl_map.insert(
            "config.linkerd.io/opaque-ports".to_string(),
            "http,9000,made-up-name".to_string(),
        );
        let (wl, parse_warnings) = AnnotationOverrides::from_map(&wl_map);
        // The raw value parses fine: "made-up-name" is a syntactically valid
        // token, just not (yet) a known container port name.
        assert!(parse_warnings.is_empty());

        let (ns, _) = AnnotationOverrides::from_map(&BTreeMap::new());
        let mut named_ports = BTreeMap::new();
        named_ports.insert("http".to_string(), 8080u16);

        let (effective, merge_warnings) = merge(&ClusterConfig::default(), &ns, &wl, &named_ports);

        assert!(effective.opaque_ports.contains(8080));
        assert!(effective.opaque_ports.contains(9000));
        assert!(!effective.opaque_ports.contains(9001));

        assert_eq!(merge_warnings.len(), 1);
        assert_eq!(merge_warnings[0].key, "config.linkerd.io/opaque-ports");
        assert!(merge_warnings[0].message.contains("made-up-name"));
    }
}
