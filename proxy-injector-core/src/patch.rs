//! Produces the ordered RFC 6902 JSON Patch document for one injection
//! (`spec.md` §4.3). Emission order is a contract, not an implementation
//! detail: the API server applies `add` operations sequentially, and later
//! operations (`/-` array appends) depend on earlier ones having already run.

use std::collections::BTreeMap;

use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::PointerBuf;
use serde_json::Value;

use crate::config::{ClusterConfig, EffectiveConfig};
use crate::error::{CoreError, Result};
use crate::labels::{
    ANNOTATION_CREATED_BY, ANNOTATION_IDENTITY_MODE, ANNOTATION_OPAQUE_PORTS,
    ANNOTATION_PROXY_VERSION, LABEL_CONTROL_PLANE_NS, LABEL_PROXY_OWNER_PREFIX, LABEL_WORKLOAD_NS,
};
use crate::meta::{Origin, ParsedObject};
use crate::owner::RootOwner;
use crate::synth::SynthesizedResources;

/// Splits a `"/a/b/c"`-shaped static pointer into the tokens
/// [`PointerBuf::from_tokens`] expects, then appends `extra`.
fn pointer(base: &str, extra: &[&str]) -> PointerBuf {
    let tokens = base.split('/').filter(|s| !s.is_empty()).chain(extra.iter().copied());
    PointerBuf::from_tokens(tokens)
}

fn add(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation { path, value })
}

fn to_value<T: serde::Serialize>(v: &T) -> Result<Value> {
    serde_json::to_value(v).map_err(CoreError::PatchSerialize)
}

/// Builds the ordered patch for one injection. `owner` is the root
/// controlling workload: for a bare `Pod` this is the result of owner
/// resolution (`spec.md` §4.2); for a workload controller it is the object
/// itself, since there is nothing further to resolve.
///
/// `injector_version` feeds `linkerd.io/created-by`, which also encodes
/// whether the patch was produced by the live webhook or the `inject` CLI
/// (`spec.md` §3 `Origin`).
pub fn build_pod_patch(
    parsed: &ParsedObject,
    cluster: &ClusterConfig,
    effective: &EffectiveConfig,
    resources: &SynthesizedResources,
    owner: &RootOwner,
    injector_version: &str,
) -> Result<Patch> {
    let spec_ptr = parsed.template_spec_pointer();
    let meta_ptr = parsed.template_meta_pointer();
    let mut ops = Vec::new();

    // Steps 1-2: init container (omitted entirely in CNI mode).
    if let Some(init_container) = &resources.init_container {
        if !parsed.has_init_containers_array() {
            ops.push(add(pointer(spec_ptr, &["initContainers"]), Value::Array(vec![])));
        }
        ops.push(add(
            pointer(spec_ptr, &["initContainers", "-"]),
            to_value(init_container)?,
        ));
    }

    // Steps 3-5: volumes, trust anchor before identity, fixed order.
    if !parsed.has_volumes_array() {
        ops.push(add(pointer(spec_ptr, &["volumes"]), Value::Array(vec![])));
    }
    ops.push(add(
        pointer(spec_ptr, &["volumes", "-"]),
        to_value(&resources.trust_anchor_volume)?,
    ));
    ops.push(add(
        pointer(spec_ptr, &["volumes", "-"]),
        to_value(&resources.identity_volume)?,
    ));

    // Step 6: proxy container, appended (never replaces an existing index).
    ops.push(add(
        pointer(spec_ptr, &["containers", "-"]),
        to_value(&resources.proxy_container)?,
    ));

    // Step 7: merged pod-template labels.
    let mut labels = parsed.template_labels();
    labels.insert(LABEL_CONTROL_PLANE_NS.to_string(), cluster.linkerd_namespace.clone());
    labels.insert(LABEL_WORKLOAD_NS.to_string(), parsed.namespace.clone());
    labels.insert(
        format!("{LABEL_PROXY_OWNER_PREFIX}{}", owner.kind.to_lowercase()),
        owner.name.clone(),
    );
    ops.push(add(pointer(meta_ptr, &["labels"]), to_value(&labels)?));

    // Step 8: merged pod-template annotations.
    let mut annotations = parsed.template_annotations();
    annotations.insert(ANNOTATION_CREATED_BY.to_string(), created_by(parsed.origin, injector_version));
    annotations.insert(ANNOTATION_PROXY_VERSION.to_string(), effective.proxy_version.clone());
    annotations.insert(
        ANNOTATION_IDENTITY_MODE.to_string(),
        identity_mode(effective.disable_identity).to_string(),
    );
    if !effective.opaque_ports.is_empty() {
        annotations.insert(ANNOTATION_OPAQUE_PORTS.to_string(), effective.opaque_ports.to_string());
    }
    ops.push(add(pointer(meta_ptr, &["annotations"]), to_value(&annotations)?));

    // Step 9: object-level labels, only when the submitted object is itself
    // a workload controller. For a bare Pod, `meta_ptr == "/metadata"`
    // already covered the same location in step 7; re-emitting it here
    // would be a redundant (if harmless) duplicate operation.
    if !parsed.kind.is_pod() {
        let mut object_labels = parsed.object_labels();
        object_labels.insert(LABEL_CONTROL_PLANE_NS.to_string(), cluster.linkerd_namespace.clone());
        ops.push(add(pointer("/metadata", &["labels"]), to_value(&object_labels)?));
    }

    Ok(Patch(ops))
}

fn created_by(origin: Origin, injector_version: &str) -> String {
    match origin {
        Origin::Webhook => format!("linkerd/proxy-injector {injector_version}"),
        Origin::Cli => format!("linkerd/cli {injector_version}"),
    }
}

fn identity_mode(disable_identity: bool) -> &'static str {
    if disable_identity {
        "disabled"
    } else {
        "default"
    }
}

/// Helper retained for call sites that want a plain `BTreeMap` without going
/// through `serde_json::Value` first, e.g. tests asserting on merged keys.
pub fn merge_maps(base: &BTreeMap<String, String>, additions: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    for (k, v) in additions {
        merged.insert((*k).to_string(), (*v).to_string());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{merge, AnnotationOverrides, ClusterConfig};
    use crate::meta::{Origin, ParsedObject};
    use crate::synth::synthesize;
    use json_patch::PatchOperation;
    use kube::core::metadata::{ObjectMeta, TypeMeta};
    use kube::core::DynamicObject;
    use std::collections::BTreeMap;

    fn deployment(containers: serde_json::Value) -> ParsedObject {
        let obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("emojivoto".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
                ..Default::default()
            },
            data: serde_json::json!({
                "spec": {"template": {"metadata": {"labels": {"app": "web"}}, "spec": {"containers": containers}}}
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

    fn owner_self(parsed: &ParsedObject) -> RootOwner {
        RootOwner {
            kind: parsed.kind.as_str().to_string(),
            name: parsed.name.clone(),
        }
    }

    #[test]
    fn baseline_inject_emits_ops_in_spec_order() {
        let parsed = deployment(serde_json::json!([{"name": "web"}]));
        let cluster = ClusterConfig::default();
        let eff = effective();
        let resources = synthesize(&parsed, &cluster, &eff).unwrap();
        let owner = owner_self(&parsed);
        let patch = build_pod_patch(&parsed, &cluster, &eff, &resources, &owner, "stable-1.2.3").unwrap();

        let paths: Vec<String> = patch
            .0
            .iter()
            .map(|op| match op {
                PatchOperation::Add(a) => a.path.to_string(),
                _ => panic!("only add ops are emitted"),
            })
            .collect();

        assert_eq!(
            paths,
            vec![
                "/spec/template/spec/initContainers",
                "/spec/template/spec/initContainers/-",
                "/spec/template/spec/volumes",
                "/spec/template/spec/volumes/-",
                "/spec/template/spec/volumes/-",
                "/spec/template/spec/containers/-",
                "/spec/template/metadata/labels",
                "/spec/template/metadata/annotations",
                "/metadata/labels",
            ]
        );
    }

    #[test]
    fn existing_arrays_skip_the_materializing_add() {
        // A template that already carries both arrays.
        let obj = DynamicObject {
            types: Some(kube::core::metadata::TypeMeta {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("emojivoto".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({
                "spec": {"template": {"metadata": {}, "spec": {
                    "containers": [{"name": "web"}],
                    "initContainers": [],
                    "volumes": [],
                }}}
            }),
        };
        let parsed = ParsedObject::parse(Origin::Webhook, obj).unwrap();
        let cluster = ClusterConfig::default();
        let eff = effective();
        let resources = synthesize(&parsed, &cluster, &eff).unwrap();
        let owner = owner_self(&parsed);
        let patch = build_pod_patch(&parsed, &cluster, &eff, &resources, &owner, "stable").unwrap();
        let paths: Vec<String> = patch
            .0
            .iter()
            .map(|op| match op {
                PatchOperation::Add(a) => a.path.to_string(),
                _ => panic!(),
            })
            .collect();
        assert!(!paths.contains(&"/spec/template/spec/initContainers".to_string()));
        assert!(!paths.contains(&"/spec/template/spec/volumes".to_string()));
    }

    #[test]
    fn pre_existing_labels_are_preserved_not_clobbered() {
        let parsed = deployment(serde_json::json!([{"name": "web"}]));
        let cluster = ClusterConfig::default();
        let eff = effective();
        let resources = synthesize(&parsed, &cluster, &eff).unwrap();
        let owner = owner_self(&parsed);
        let patch = build_pod_patch(&parsed, &cluster, &eff, &resources, &owner, "stable").unwrap();
        let labels_op = patch
            .0
            .iter()
            .find_map(|op| match op {
                PatchOperation::Add(a) if a.path.to_string() == "/spec/template/metadata/labels" => {
                    Some(a.value.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(labels_op["app"], "web");
        assert_eq!(labels_op["linkerd.io/proxy-deployment"], "web");
    }

    #[test]
    fn opaque_ports_annotation_only_present_when_configured() {
        let parsed = deployment(serde_json::json!([{"name": "web"}]));
        let cluster = ClusterConfig::default();
        let mut eff = effective();
        eff.opaque_ports = "3306".parse().unwrap();
        let resources = synthesize(&parsed, &cluster, &eff).unwrap();
        let owner = owner_self(&parsed);
        let patch = build_pod_patch(&parsed, &cluster, &eff, &resources, &owner, "stable").unwrap();
        let annotations = patch
            .0
            .iter()
            .find_map(|op| match op {
                PatchOperation::Add(a) if a.path.to_string() == "/spec/template/metadata/annotations" => {
                    Some(a.value.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(annotations["config.linkerd.io/opaque-ports"], "3306");
    }
}
