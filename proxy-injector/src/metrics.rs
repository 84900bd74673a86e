//! Operational metrics (`spec.md` §4.5, `SPEC_FULL.md` §4.8), grounded on
//! `examples/vishalbelsare-agentgateway`'s `prometheus_client` usage — the
//! teacher's own dependency set has no metrics-export crate.

use prometheus_client::encoding::{text::encode, EncodeLabelSet};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub owner_kind: String,
    pub namespace: String,
    pub annotation_at: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub owner_kind: String,
    pub namespace: String,
    pub skip: bool,
    pub skip_reason: String,
    pub annotation_at: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ConfigWarningLabels {
    pub key: String,
}

pub struct Metrics {
    requests: Family<RequestLabels, Counter>,
    responses: Family<ResponseLabels, Counter>,
    config_warnings: Family<ConfigWarningLabels, Counter>,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let requests = Family::default();
        registry.register(
            "proxy_inject_admission_requests",
            "Admission requests seen by the proxy injector",
            requests.clone(),
        );
        let responses = Family::default();
        registry.register(
            "proxy_inject_admission_responses",
            "Admission responses returned by the proxy injector",
            responses.clone(),
        );
        let config_warnings = Family::default();
        registry.register(
            "proxy_inject_admission_config_warnings",
            "Recognized-option annotations that failed to parse",
            config_warnings.clone(),
        );
        Self {
            requests,
            responses,
            config_warnings,
        }
    }

    pub fn record_request(&self, owner_kind: &str, namespace: &str, annotation_at: &str) {
        self.requests
            .get_or_create(&RequestLabels {
                owner_kind: owner_kind.to_string(),
                namespace: namespace.to_string(),
                annotation_at: annotation_at.to_string(),
            })
            .inc();
    }

    pub fn record_response(
        &self,
        owner_kind: &str,
        namespace: &str,
        skip: bool,
        skip_reason: &str,
        annotation_at: &str,
    ) {
        self.responses
            .get_or_create(&ResponseLabels {
                owner_kind: owner_kind.to_string(),
                namespace: namespace.to_string(),
                skip,
                skip_reason: skip_reason.to_string(),
                annotation_at: annotation_at.to_string(),
            })
            .inc();
    }

    pub fn record_config_warning(&self, key: &str) {
        self.config_warnings
            .get_or_create(&ConfigWarningLabels { key: key.to_string() })
            .inc();
    }
}

pub fn encode_text(registry: &Registry) -> String {
    let mut buffer = String::new();
    encode(&mut buffer, registry).expect("prometheus text encoding is infallible for our metric types");
    buffer
}
