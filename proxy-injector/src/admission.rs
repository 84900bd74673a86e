//! HTTP POST `/mutate` admission handler (`spec.md` §4.5), built the way
//! `examples/kube-rs-kube/examples/admission_controller.rs` builds its
//! `mutate_handler`: decode `AdmissionReview`, drive business logic, encode
//! `AdmissionReview` back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, Json};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use prometheus_client::registry::Registry;
use tracing::{info, info_span, warn, Instrument};

use proxy_injector_core::config::{merge, AnnotationOverrides, ClusterConfig};
use proxy_injector_core::decision::{decide, Action};
use proxy_injector_core::meta::{Origin, ParsedObject};
use proxy_injector_core::owner::resolve_root;
use proxy_injector_core::patch::build_pod_patch;
use proxy_injector_core::synth::synthesize;

use crate::metrics::Metrics;
use crate::namespace::NamespaceCache;
use crate::owner_lookup::KubeOwnerLookup;

pub struct AppState {
    pub cluster: ClusterConfig,
    pub namespaces: NamespaceCache,
    pub owner_lookup: KubeOwnerLookup,
    pub metrics: Arc<Metrics>,
    pub metrics_registry: Registry,
    pub admission_deadline: Duration,
    pub fail_open_on_internal_error: bool,
    pub injector_version: String,
}

pub async fn mutate_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<_> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            // §7: decode errors fail closed — `uid` is empty because there
            // was no request to recover one from.
            warn!(%err, "malformed AdmissionReview body");
            return Json(AdmissionResponse::invalid(err.to_string()).into_review());
        }
    };

    let namespace = req.namespace.clone().unwrap_or_default();
    let kind = req.kind.kind.clone();
    let span = info_span!("admission", uid = %req.uid, namespace = %namespace, kind = %kind);

    let response = tokio::time::timeout(state.admission_deadline, handle(&state, &req).instrument(span)).await;

    match response {
        Ok(res) => Json(res),
        Err(_) => {
            // §5 Cancellation: deadline exceeded, fail open with a warning.
            // `req` was only borrowed by `handle`, so it's still here to
            // build a response correctly carrying its `uid`/`types`.
            warn!(uid = %req.uid, namespace, kind, "admission deadline exceeded; allowing without a patch");
            state.metrics.record_response(&kind, &namespace, true, "timeout", "none");
            let mut res = AdmissionResponse::from(&req);
            res.warnings = Some(vec!["proxy-injector: admission deadline exceeded, no patch applied".to_string()]);
            Json(res.into_review())
        }
    }
}

async fn handle(state: &AppState, req: &AdmissionRequest<DynamicObject>) -> AdmissionReview<DynamicObject> {
    let mut res = AdmissionResponse::from(req);
    let Some(object) = req.object.clone() else {
        return res.into_review();
    };

    let owner_kind_for_metrics = object.types.clone().unwrap_or_default().kind;
    let namespace = req.namespace.clone().unwrap_or_default();

    let parsed = match ParsedObject::parse(Origin::Webhook, object) {
        Ok(parsed) => parsed,
        Err(err) => {
            // Unsupported resource kinds are a config error on the webhook
            // registration side, not a malformed request; fail open with no patch.
            info!(%err, "skip: unsupported resource");
            state
                .metrics
                .record_response(&owner_kind_for_metrics, &namespace, true, "unsupported-resource", "none");
            return res.into_review();
        }
    };

    let ns_annotations = state.namespaces.annotations(&parsed.namespace).unwrap_or_else(|| {
        warn!(namespace = %parsed.namespace, "namespace not found in cache; treating as unannotated");
        BTreeMap::new()
    });
    let (ns_from_map, ns_warnings) = AnnotationOverrides::from_map(&ns_annotations);
    let (wl_from_map, wl_warnings) = AnnotationOverrides::from_map(&parsed.template_annotations());
    for warning in ns_warnings.iter().chain(wl_warnings.iter()) {
        warn!(key = %warning.key, message = %warning.message, "ignoring unrecognized/invalid option");
        state.metrics.record_config_warning(&warning.key);
    }

    let named_ports = parsed.named_container_ports();
    let (effective, port_warnings) = merge(&state.cluster, &ns_from_map, &wl_from_map, &named_ports);
    for warning in port_warnings.iter() {
        warn!(key = %warning.key, message = %warning.message, "ignoring unrecognized/invalid option");
        state.metrics.record_config_warning(&warning.key);
    }
    let annotation_at = annotation_at_label(&ns_from_map, &wl_from_map);

    state
        .metrics
        .record_request(parsed.kind.as_str(), &parsed.namespace, &annotation_at);

    let owner = if parsed.kind.is_pod() {
        match resolve_root(
            &state.owner_lookup,
            &parsed.namespace,
            parsed.kind.as_str(),
            &parsed.name,
            &parsed.owner_references(),
        ) {
            Ok(owner) => Some(owner),
            Err(err) => {
                warn!(%err, "owner lookup failed; continuing without job-terminal check");
                None
            }
        }
    } else {
        None
    };

    let job_status = owner
        .as_ref()
        .filter(|o| o.kind == "Job")
        .and_then(|o| state.owner_lookup.job_status(&parsed.namespace, &o.name));

    let decision = decide(&parsed, &effective, owner.as_ref(), job_status);

    if decision.action != Action::Inject {
        state.metrics.record_response(
            parsed.kind.as_str(),
            &parsed.namespace,
            true,
            decision.reason.as_str(),
            &annotation_at,
        );
        return res.into_review();
    }

    let fallback_owner = owner.unwrap_or_else(|| proxy_injector_core::owner::RootOwner {
        kind: parsed.kind.as_str().to_string(),
        name: parsed.name.clone(),
    });

    let resources = match synthesize(&parsed, &state.cluster, &effective) {
        Ok(resources) => resources,
        Err(err) => {
            warn!(%err, "resource synthesis failed");
            state.metrics.record_response(
                parsed.kind.as_str(),
                &parsed.namespace,
                true,
                "path-collision",
                &annotation_at,
            );
            if state.fail_open_on_internal_error {
                return res.into_review();
            }
            return res.deny(err.to_string()).into_review();
        }
    };

    let patch = match build_pod_patch(
        &parsed,
        &state.cluster,
        &effective,
        &resources,
        &fallback_owner,
        &state.injector_version,
    ) {
        Ok(patch) => patch,
        Err(err) => {
            // §7: "Patch marshal error (should be impossible)" — fail closed, it indicates a bug.
            warn!(%err, "patch marshal failed");
            state
                .metrics
                .record_response(parsed.kind.as_str(), &parsed.namespace, false, "marshal-error", &annotation_at);
            return res.deny(err.to_string()).into_review();
        }
    };

    res = match res.with_patch(patch) {
        Ok(res) => res,
        Err(err) => {
            warn!(%err, "failed to serialize patch onto response");
            return res.deny(err.to_string()).into_review();
        }
    };

    state
        .metrics
        .record_response(parsed.kind.as_str(), &parsed.namespace, false, decision.reason.as_str(), &annotation_at);

    res.into_review()
}

fn annotation_at_label(
    ns: &proxy_injector_core::config::InjectFromMap,
    wl: &proxy_injector_core::config::InjectFromMap,
) -> String {
    if wl.inject.is_some() {
        "workload".to_string()
    } else if ns.inject.is_some() {
        "namespace".to_string()
    } else {
        "cluster-default".to_string()
    }
}
