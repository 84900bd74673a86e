//! `Decide(rc) -> {action, reason}` (`spec.md` §4.1).

use crate::config::{EffectiveConfig, InjectSource, InjectToggle};
use crate::meta::ParsedObject;
use crate::owner::RootOwner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Inject,
    Skip,
}

/// Stable skip/inject reason strings, also used as the `skip_reason` /
/// `annotation_at` metric label values (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    UnsupportedResource,
    AlreadyInjected,
    Disabled,
    InjectionDisabled,
    AnnotationEnabled,
    NsAnnotationEnabled,
    JobComplete,
    PathCollision,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::UnsupportedResource => "unsupported-resource",
            Reason::AlreadyInjected => "already-injected",
            Reason::Disabled => "disabled",
            Reason::InjectionDisabled => "injection-disabled",
            Reason::AnnotationEnabled => "annotation-enabled",
            Reason::NsAnnotationEnabled => "ns-annotation-enabled",
            Reason::JobComplete => "job-complete",
            Reason::PathCollision => "path-collision",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: Reason,
}

impl Decision {
    fn inject(reason: Reason) -> Self {
        Decision {
            action: Action::Inject,
            reason,
        }
    }

    fn skip(reason: Reason) -> Self {
        Decision {
            action: Action::Skip,
            reason,
        }
    }

    pub fn is_inject(&self) -> bool {
        self.action == Action::Inject
    }
}

/// Whether a Job's root owner is already terminal, needed for step 5
/// (`spec.md` §4.1). `None` when the object has no Job ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Complete,
    Failed,
    Active,
}

/// Produces the injection decision for one parsed object. Deterministic:
/// the same inputs always produce the same output (`spec.md` §4.1
/// "Determinism").
pub fn decide(
    parsed: &ParsedObject,
    effective: &EffectiveConfig,
    owner: Option<&RootOwner>,
    job_status: Option<JobStatus>,
) -> Decision {
    // Step 2: idempotence guard.
    if parsed.already_injected() {
        return Decision::skip(Reason::AlreadyInjected);
    }

    // Step 3/4: resolve `inject` by precedence.
    match effective.inject {
        InjectToggle::Disabled => {
            let reason = match effective.inject_source {
                InjectSource::ClusterDefault => Reason::InjectionDisabled,
                _ => Reason::Disabled,
            };
            return Decision::skip(reason);
        }
        InjectToggle::Enabled => {
            let reason = match effective.inject_source {
                InjectSource::Namespace => Reason::NsAnnotationEnabled,
                _ => Reason::AnnotationEnabled,
            };

            // Step 5: Pod whose root owner is a terminal Job is still skipped.
            if parsed.kind.is_pod() {
                if let (Some(RootOwner { kind, .. }), Some(status)) = (owner, job_status) {
                    if kind == "Job" && matches!(status, JobStatus::Complete | JobStatus::Failed) {
                        return Decision::skip(Reason::JobComplete);
                    }
                }
            }

            Decision::inject(reason)
        }
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

    fn deployment_with_containers(containers: serde_json::Value) -> ParsedObject {
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

    fn effective(cluster: ClusterConfig, ns_map: &BTreeMap<String, String>, wl_map: &BTreeMap<String, String>) -> crate::config::EffectiveConfig {
        let (ns, _) = AnnotationOverrides::from_map(ns_map);
        let (wl, _) = AnnotationOverrides::from_map(wl_map);
        let (effective, _) = merge(&cluster, &ns, &wl, &BTreeMap::new());
        effective
    }

    #[test]
    fn baseline_inject_via_workload_annotation() {
        let parsed = deployment_with_containers(serde_json::json!([{"name": "web"}]));
        let mut wl = BTreeMap::new();
        wl.insert("linkerd.io/inject".to_string(), "enabled".to_string());
        let eff = effective(ClusterConfig::default(), &BTreeMap::new(), &wl);
        let decision = decide(&parsed, &eff, None, None);
        assert_eq!(decision, Decision::inject(Reason::AnnotationEnabled));
    }

    #[test]
    fn already_injected_short_circuits() {
        let parsed = deployment_with_containers(serde_json::json!([{"name": "linkerd-proxy"}]));
        let mut wl = BTreeMap::new();
        wl.insert("linkerd.io/inject".to_string(), "enabled".to_string());
        let eff = effective(ClusterConfig::default(), &BTreeMap::new(), &wl);
        let decision = decide(&parsed, &eff, None, None);
        assert_eq!(decision, Decision::skip(Reason::AlreadyInjected));
    }

    #[test]
    fn namespace_disabled_workload_enabled_injects() {
        let parsed = deployment_with_containers(serde_json::json!([{"name": "web"}]));
        let mut ns = BTreeMap::new();
        ns.insert("linkerd.io/inject".to_string(), "disabled".to_string());
        let mut wl = BTreeMap::new();
        wl.insert("linkerd.io/inject".to_string(), "enabled".to_string());
        let eff = effective(ClusterConfig::default(), &ns, &wl);
        let decision = decide(&parsed, &eff, None, None);
        assert_eq!(decision, Decision::inject(Reason::AnnotationEnabled));
    }

    #[test]
    fn cluster_default_disabled_with_no_annotations_skips() {
        let parsed = deployment_with_containers(serde_json::json!([{"name": "web"}]));
        let eff = effective(ClusterConfig::default(), &BTreeMap::new(), &BTreeMap::new());
        let decision = decide(&parsed, &eff, None, None);
        assert_eq!(decision, Decision::skip(Reason::InjectionDisabled));
    }

    #[test]
    fn terminal_job_owned_pod_is_skipped() {
        let obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".to_string(),
                kind: "Pod".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("batch-job-xyz".to_string()),
                namespace: Some("emojivoto".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({"spec": {"containers": [{"name": "worker"}]}}),
        };
        let parsed = ParsedObject::parse(Origin::Webhook, obj).unwrap();
        let mut wl = BTreeMap::new();
        wl.insert("linkerd.io/inject".to_string(), "enabled".to_string());
        let eff = effective(ClusterConfig::default(), &BTreeMap::new(), &wl);
        let owner = RootOwner {
            kind: "Job".to_string(),
            name: "batch-job".to_string(),
        };
        let decision = decide(&parsed, &eff, Some(&owner), Some(JobStatus::Complete));
        assert_eq!(decision, Decision::skip(Reason::JobComplete));
    }
}
