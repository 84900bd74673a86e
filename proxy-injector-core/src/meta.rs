//! Decodes the submitted object into the subset of shape the injector cares
//! about: kind, namespace/name, owner references, and (if the kind has one)
//! a pod template's labels/annotations/containers/volumes.

use std::collections::BTreeMap;

use kube::core::DynamicObject;
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Workload kinds the webhook is registered for (`spec.md` §4.1 step 1).
/// Anything else hits the `unsupported-resource` skip branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
    ReplicaSet,
    ReplicationController,
    Job,
    CronJob,
    Pod,
}

impl WorkloadKind {
    pub fn from_kind_str(kind: &str) -> Option<Self> {
        Some(match kind {
            "Deployment" => WorkloadKind::Deployment,
            "DaemonSet" => WorkloadKind::DaemonSet,
            "StatefulSet" => WorkloadKind::StatefulSet,
            "ReplicaSet" => WorkloadKind::ReplicaSet,
            "ReplicationController" => WorkloadKind::ReplicationController,
            "Job" => WorkloadKind::Job,
            "CronJob" => WorkloadKind::CronJob,
            "Pod" => WorkloadKind::Pod,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::ReplicationController => "ReplicationController",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
            WorkloadKind::Pod => "Pod",
        }
    }

    pub fn is_pod(&self) -> bool {
        matches!(self, WorkloadKind::Pod)
    }

    /// CronJob nests its pod template one level deeper, under `.spec.jobTemplate.spec.template`.
    fn template_spec_pointer(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "/spec",
            WorkloadKind::CronJob => "/spec/jobTemplate/spec/template/spec",
            _ => "/spec/template/spec",
        }
    }

    fn template_meta_pointer(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "/metadata",
            WorkloadKind::CronJob => "/spec/jobTemplate/spec/template/metadata",
            _ => "/spec/template/metadata",
        }
    }
}

/// Whether a `ResourceConfig` originated from a live admission request or
/// from the `inject` CLI subcommand running over a local manifest
/// (`spec.md` §3 `Origin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Webhook,
    Cli,
}

/// The decoded view of one submitted object (`ResourceConfig` in `spec.md` §3),
/// minus the effective config and namespace context, which are attached by
/// the caller once resolved.
#[derive(Debug, Clone)]
pub struct ParsedObject {
    pub origin: Origin,
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub object: DynamicObject,
}

impl ParsedObject {
    pub fn parse(origin: Origin, object: DynamicObject) -> Result<Self> {
        let kind = object
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .unwrap_or_default();
        let Some(kind) = WorkloadKind::from_kind_str(kind) else {
            return Err(CoreError::UnsupportedResource(kind.to_string()));
        };
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        Ok(ParsedObject {
            origin,
            kind,
            namespace,
            name,
            object,
        })
    }

    /// JSON pointer to the pod template's `metadata` object (or, for a bare
    /// `Pod`, the object's own `metadata`).
    pub fn template_meta_pointer(&self) -> &'static str {
        self.kind.template_meta_pointer()
    }

    /// JSON pointer to the pod template's `spec` object.
    pub fn template_spec_pointer(&self) -> &'static str {
        self.kind.template_spec_pointer()
    }

    fn pointer(&self, suffix: &str) -> String {
        format!("{}{}", self.template_spec_pointer(), suffix)
    }

    fn value_at(&self, json_pointer: &str) -> Option<&Value> {
        self.object.data.pointer(json_pointer)
    }

    pub fn containers(&self) -> Vec<Value> {
        self.array_at(&self.pointer("/containers"))
    }

    pub fn init_containers(&self) -> Vec<Value> {
        self.array_at(&self.pointer("/initContainers"))
    }

    pub fn volumes(&self) -> Vec<Value> {
        self.array_at(&self.pointer("/volumes"))
    }

    fn array_at(&self, json_pointer: &str) -> Vec<Value> {
        self.value_at(json_pointer)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_init_containers_array(&self) -> bool {
        self.value_at(&self.pointer("/initContainers")).is_some()
    }

    pub fn has_volumes_array(&self) -> bool {
        self.value_at(&self.pointer("/volumes")).is_some()
    }

    /// `true` if any container in the template is already named
    /// [`crate::labels::PROXY_CONTAINER_NAME`] — the idempotence guard.
    pub fn already_injected(&self) -> bool {
        self.containers()
            .iter()
            .chain(self.init_containers().iter())
            .any(|c| {
                c.get("name").and_then(Value::as_str) == Some(crate::labels::PROXY_CONTAINER_NAME)
            })
    }

    /// Any `volumeMounts[].mountPath` already used by a user container,
    /// across every container in the template — used to detect the
    /// path-collision edge case in `spec.md` §4.4.
    pub fn used_mount_paths(&self) -> Vec<String> {
        self.containers()
            .iter()
            .flat_map(|c| {
                c.get("volumeMounts")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            })
            .filter_map(|m| {
                m.get("mountPath")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect()
    }

    pub fn template_labels(&self) -> BTreeMap<String, String> {
        string_map_at(
            self.object
                .data
                .pointer(&format!("{}/labels", self.template_meta_pointer())),
        )
    }

    pub fn template_annotations(&self) -> BTreeMap<String, String> {
        let annotations = string_map_at(
            self.object
                .data
                .pointer(&format!("{}/annotations", self.template_meta_pointer())),
        );
        if self.kind.is_pod() {
            // For a bare Pod the "pod template" metadata is the object's own
            // metadata, which DynamicObject has already pulled out of `data`.
            let mut merged = self.object.metadata.annotations.clone().unwrap_or_default();
            merged.extend(annotations);
            merged.into_iter().collect()
        } else {
            annotations
        }
    }

    /// Labels on the submitted object's own `metadata`, as opposed to
    /// [`Self::template_labels`] which reads the pod template's. Used for the
    /// patch builder's step 9 (`spec.md` §4.3), which only applies to
    /// workload controllers.
    pub fn object_labels(&self) -> BTreeMap<String, String> {
        self.object.metadata.labels.clone().unwrap_or_default()
    }

    pub fn owner_references(&self) -> Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference> {
        self.object.metadata.owner_references.clone().unwrap_or_default()
    }

    /// Container port name -> numeric `containerPort`, scanned across every
    /// container in the template. Used to resolve named port tokens in the
    /// port-range config options (`spec.md` §3, §8 scenario 4).
    pub fn named_container_ports(&self) -> BTreeMap<String, u16> {
        self.containers()
            .iter()
            .flat_map(|c| {
                c.get("ports")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            })
            .filter_map(|p| {
                let name = p.get("name").and_then(Value::as_str)?.to_string();
                let port: u16 = p.get("containerPort").and_then(Value::as_u64)?.try_into().ok()?;
                Some((name, port))
            })
            .collect()
    }
}

fn string_map_at(value: Option<&Value>) -> BTreeMap<String, String> {
    match value.and_then(Value::as_object) {
        Some(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        None => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::metadata::{ObjectMeta, TypeMeta};

    fn deployment(containers: serde_json::Value) -> DynamicObject {
        DynamicObject {
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
                "spec": {
                    "template": {
                        "metadata": {"labels": {"app": "web"}},
                        "spec": {"containers": containers},
                    }
                }
            }),
        }
    }

    #[test]
    fn unsupported_kind_is_rejected() {
        let obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".to_string(),
                kind: "ConfigMap".to_string(),
            }),
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        assert!(matches!(
            ParsedObject::parse(Origin::Webhook, obj),
            Err(CoreError::UnsupportedResource(_))
        ));
    }

    #[test]
    fn already_injected_detects_reserved_container_name() {
        let obj = deployment(serde_json::json!([{"name": "linkerd-proxy"}]));
        let parsed = ParsedObject::parse(Origin::Webhook, obj).unwrap();
        assert!(parsed.already_injected());
    }

    #[test]
    fn missing_init_containers_array_is_detected() {
        let obj = deployment(serde_json::json!([{"name": "web"}]));
        let parsed = ParsedObject::parse(Origin::Webhook, obj).unwrap();
        assert!(!parsed.has_init_containers_array());
        assert!(!parsed.already_injected());
    }
}
