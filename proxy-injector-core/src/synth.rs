//! Builds the proxy container, init container, and identity volumes from an
//! [`EffectiveConfig`] (`spec.md` §4.4).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    ObjectFieldSelector, Probe, ResourceRequirements, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::config::{ClusterConfig, EffectiveConfig};
use crate::error::{CoreError, Result};
use crate::labels::{
    IDENTITY_MOUNT_PATH, IDENTITY_VOLUME_NAME, PROXY_CONTAINER_NAME, PROXY_INIT_CONTAINER_NAME,
    TRUST_ANCHOR_MOUNT_PATH, TRUST_ANCHOR_VOLUME_NAME,
};
use crate::meta::ParsedObject;

/// Everything the patch builder needs to append to the template.
pub struct SynthesizedResources {
    pub proxy_container: Container,
    /// `None` when `cni-enabled`: redirection is programmed out-of-band.
    pub init_container: Option<Container>,
    pub trust_anchor_volume: Volume,
    pub identity_volume: Volume,
}

/// Builds the sidecar/init container and volume specs, or fails with
/// [`CoreError::PathCollision`] if a user container already mounts one of the
/// paths the proxy needs (`spec.md` §4.4 edge case; we pick "reject", the
/// documented alternative to silently re-homing paths).
pub fn synthesize(
    parsed: &ParsedObject,
    cluster: &ClusterConfig,
    effective: &EffectiveConfig,
) -> Result<SynthesizedResources> {
    for path in parsed.used_mount_paths() {
        if path == TRUST_ANCHOR_MOUNT_PATH || path == IDENTITY_MOUNT_PATH {
            return Err(CoreError::PathCollision(path));
        }
    }

    let trust_anchor_volume = Volume {
        name: TRUST_ANCHOR_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: cluster.trust_anchor_configmap.clone(),
            optional: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };

    let identity_volume = Volume {
        name: IDENTITY_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let proxy_container = proxy_container(cluster, effective);
    let init_container = if effective.cni_enabled {
        None
    } else {
        Some(init_container(effective))
    };

    Ok(SynthesizedResources {
        proxy_container,
        init_container,
        trust_anchor_volume,
        identity_volume,
    })
}

fn proxy_container(cluster: &ClusterConfig, effective: &EffectiveConfig) -> Container {
    let mut env = vec![
        env_var("LINKERD2_PROXY_CONTROL_LISTEN_ADDR", format!("0.0.0.0:{}", effective.control_port)),
        env_var("LINKERD2_PROXY_INBOUND_LISTEN_ADDR", format!("0.0.0.0:{}", effective.inbound_port)),
        env_var("LINKERD2_PROXY_OUTBOUND_LISTEN_ADDR", format!("127.0.0.1:{}", effective.outbound_port)),
        env_var("LINKERD2_PROXY_ADMIN_LISTEN_ADDR", format!("0.0.0.0:{}", effective.admin_port)),
        env_var("LINKERD2_PROXY_LOG", effective.proxy_log_level.clone()),
        env_var("LINKERD2_PROXY_LOG_FORMAT", effective.proxy_log_format.clone()),
        env_var("LINKERD2_PROXY_DESTINATION_CONTEXT", "ns:$(_pod_ns)".to_string()),
        env_var_from_field("_pod_ns", "metadata.namespace"),
    ];
    if !effective.opaque_ports.is_empty() {
        env.push(env_var(
            "LINKERD2_PROXY_INBOUND_OPAQUE_PORTS",
            effective.opaque_ports.to_string(),
        ));
    }
    if effective.enable_external_profiles {
        env.push(env_var("LINKERD2_PROXY_DESTINATION_PROFILE_SUFFIXES", ".".to_string()));
    } else {
        env.push(env_var(
            "LINKERD2_PROXY_DESTINATION_PROFILE_SUFFIXES",
            format!("svc.{}.", cluster.cluster_domain),
        ));
    }
    if effective.disable_identity {
        env.push(env_var("LINKERD2_PROXY_IDENTITY_DISABLED", "disabled".to_string()));
    } else {
        env.push(env_var("LINKERD2_PROXY_IDENTITY_DIR", IDENTITY_MOUNT_PATH.to_string()));
        env.push(env_var(
            "LINKERD2_PROXY_IDENTITY_TRUST_DOMAIN",
            cluster.identity_trust_domain.clone(),
        ));
        env.push(env_var(
            "LINKERD2_PROXY_IDENTITY_SVC_ADDR",
            cluster.identity_svc_addr.clone(),
        ));
    }
    if effective.disable_tap {
        env.push(env_var("LINKERD2_PROXY_TAP_DISABLED", "true".to_string()));
    }
    if effective.wait_before_exit_seconds > 0 {
        env.push(env_var(
            "LINKERD2_PROXY_SHUTDOWN_GRACE_PERIOD",
            format!("{}s", effective.wait_before_exit_seconds),
        ));
    }

    Container {
        name: PROXY_CONTAINER_NAME.to_string(),
        image: Some(format!("{}:{}", effective.proxy_image, effective.proxy_version)),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(env),
        ports: Some(vec![
            container_port("linkerd-admin", effective.admin_port as i32),
            container_port("linkerd-proxy", effective.inbound_port as i32),
        ]),
        resources: Some(resource_requirements(effective)),
        security_context: Some(SecurityContext {
            run_as_user: Some(effective.proxy_uid),
            read_only_root_filesystem: Some(true),
            allow_privilege_escalation: Some(false),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            read_only_mount(TRUST_ANCHOR_VOLUME_NAME, TRUST_ANCHOR_MOUNT_PATH),
            read_only_mount(IDENTITY_VOLUME_NAME, IDENTITY_MOUNT_PATH),
        ]),
        liveness_probe: Some(admin_probe("/live", effective.admin_port)),
        readiness_probe: Some(admin_probe("/ready", effective.admin_port)),
        ..Default::default()
    }
}

fn init_container(effective: &EffectiveConfig) -> Container {
    let mut args = vec![
        "--incoming-proxy-port".to_string(),
        effective.inbound_port.to_string(),
        "--outgoing-proxy-port".to_string(),
        effective.outbound_port.to_string(),
        "--proxy-uid".to_string(),
        effective.proxy_uid.to_string(),
    ];
    if !effective.ignore_inbound_ports.is_empty() {
        args.push("--ignore-ports-incoming".to_string());
        args.push(effective.ignore_inbound_ports.to_string());
    }
    if !effective.ignore_outbound_ports.is_empty() {
        args.push("--ignore-ports-outgoing".to_string());
        args.push(effective.ignore_outbound_ports.to_string());
    }

    Container {
        name: PROXY_INIT_CONTAINER_NAME.to_string(),
        image: Some(format!(
            "{}:{}",
            effective.proxy_init_image, effective.proxy_init_version
        )),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(args),
        security_context: Some(SecurityContext {
            run_as_user: Some(0),
            allow_privilege_escalation: Some(true),
            capabilities: Some(Capabilities {
                add: Some(vec!["NET_ADMIN".to_string(), "NET_RAW".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_var(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    }
}

fn env_var_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> k8s_openapi::api::core::v1::ContainerPort {
    k8s_openapi::api::core::v1::ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        ..Default::default()
    }
}

fn read_only_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn admin_probe(path: &str, admin_port: u16) -> Probe {
    Probe {
        http_get: Some(k8s_openapi::api::core::v1::HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(admin_port as i32),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        ..Default::default()
    }
}

fn resource_requirements(effective: &EffectiveConfig) -> ResourceRequirements {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();

    // Limits are only ever emitted if configured, never synthesized
    // (`spec.md` §4.4 edge case).
    if let Some(q) = &effective.proxy_cpu_request {
        requests.insert("cpu".to_string(), q.clone());
    }
    if let Some(q) = &effective.proxy_memory_request {
        requests.insert("memory".to_string(), q.clone());
    } else {
        requests.insert("memory".to_string(), Quantity("20Mi".to_string()));
    }
    if let Some(q) = &effective.proxy_cpu_limit {
        limits.insert("cpu".to_string(), q.clone());
    }
    if let Some(q) = &effective.proxy_memory_limit {
        limits.insert("memory".to_string(), q.clone());
    }

    ResourceRequirements {
        requests: if requests.is_empty() { None } else { Some(requests) },
        limits: if limits.is_empty() { None } else { Some(limits) },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{merge, AnnotationOverrides, ClusterConfig};
    use crate::meta::{Origin, ParsedObject};
    use kube::core::metadata::{ObjectMeta, TypeMeta};
    use kube::core::DynamicObject;
    use std::collections::BTreeMap;

    fn parsed_deployment(containers: serde_json::Value) -> ParsedObject {
        let obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("emojivoto".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({
                "spec": {"template": {"metadata": {}, "spec": {"containers": containers}}}
            }),
        };
        ParsedObject::parse(Origin::Webhook, obj).unwrap()
    }

    fn effective() -> crate::config::EffectiveConfig {
        let (ns, _) = AnnotationOverrides::from_map(&BTreeMap::new());
        let (wl, _) = AnnotationOverrides::from_map(&BTreeMap::new());
        let (effective, _) = merge(&ClusterConfig::default(), &ns, &wl, &BTreeMap::new());
        effective
    }

    #[test]
    fn cni_mode_omits_init_container() {
        let parsed = parsed_deployment(serde_json::json!([{"name": "web"}]));
        let mut eff = effective();
        eff.cni_enabled = true;
        let resources = synthesize(&parsed, &ClusterConfig::default(), &eff).unwrap();
        assert!(resources.init_container.is_none());
    }

    #[test]
    fn default_mode_includes_init_container_with_net_admin() {
        let parsed = parsed_deployment(serde_json::json!([{"name": "web"}]));
        let resources = synthesize(&parsed, &ClusterConfig::default(), &effective()).unwrap();
        let init = resources.init_container.expect("init container");
        let caps = init.security_context.unwrap().capabilities.unwrap();
        assert_eq!(caps.add.unwrap(), vec!["NET_ADMIN", "NET_RAW"]);
    }

    #[test]
    fn path_collision_is_rejected() {
        let parsed = parsed_deployment(serde_json::json!([
            {"name": "web", "volumeMounts": [{"name": "x", "mountPath": TRUST_ANCHOR_MOUNT_PATH}]}
        ]));
        let result = synthesize(&parsed, &ClusterConfig::default(), &effective());
        assert!(matches!(result, Err(CoreError::PathCollision(_))));
    }

    #[test]
    fn enable_external_profiles_widens_the_destination_profile_suffix() {
        let parsed = parsed_deployment(serde_json::json!([{"name": "web"}]));
        let mut eff = effective();
        eff.enable_external_profiles = true;
        let resources = synthesize(&parsed, &ClusterConfig::default(), &eff).unwrap();
        let env = resources.proxy_container.env.unwrap();
        let suffixes = env
            .iter()
            .find(|e| e.name == "LINKERD2_PROXY_DESTINATION_PROFILE_SUFFIXES")
            .expect("suffix env var present");
        assert_eq!(suffixes.value.as_deref(), Some("."));
    }

    #[test]
    fn limits_are_never_synthesized_only_requests_default() {
        let parsed = parsed_deployment(serde_json::json!([{"name": "web"}]));
        let resources = synthesize(&parsed, &ClusterConfig::default(), &effective()).unwrap();
        let reqs = resources.proxy_container.resources.unwrap();
        assert!(reqs.requests.unwrap().contains_key("memory"));
        assert!(reqs.limits.is_none());
    }
}
