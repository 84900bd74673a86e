//! Idempotent reconciliation of the `MutatingWebhookConfiguration` this
//! process owns (`spec.md` §4.7). Unlike a CRD, there's no controller loop to
//! drive this over — a hand-rolled delete-recreate on startup, optionally
//! repeated on an interval, is enough (`SPEC_FULL.md` §4.7).

use backon::{ExponentialBuilder, Retryable};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, RuleWithOperations, ServiceReference, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::{info, warn};

use crate::error::{Error, Result};

const WEBHOOK_PATH: &str = "/mutate";
const ADMISSION_REVIEW_VERSIONS: &[&str] = &["v1", "v1beta1"];
const SIDE_EFFECTS_NONE: &str = "None";
const FAILURE_POLICY_IGNORE: &str = "Ignore";

pub struct ReconcilerConfig {
    pub webhook_config_name: String,
    pub service_namespace: String,
    pub service_name: String,
    pub service_port: i32,
    pub ca_bundle: Vec<u8>,
    pub fail_policy_ignore: bool,
}

fn desired_config(cfg: &ReconcilerConfig) -> MutatingWebhookConfiguration {
    let client_config = WebhookClientConfig {
        service: Some(ServiceReference {
            namespace: cfg.service_namespace.clone(),
            name: cfg.service_name.clone(),
            path: Some(WEBHOOK_PATH.to_string()),
            port: Some(cfg.service_port),
        }),
        ca_bundle: Some(k8s_openapi::ByteString(cfg.ca_bundle.clone())),
        url: None,
    };

    let rule = RuleWithOperations {
        api_groups: Some(vec!["apps".to_string(), "batch".to_string(), "".to_string()]),
        api_versions: Some(vec!["v1".to_string()]),
        operations: Some(vec!["CREATE".to_string()]),
        resources: Some(vec![
            "deployments".to_string(),
            "daemonsets".to_string(),
            "statefulsets".to_string(),
            "replicasets".to_string(),
            "replicationcontrollers".to_string(),
            "jobs".to_string(),
            "cronjobs".to_string(),
            "pods".to_string(),
        ]),
        scope: Some("Namespaced".to_string()),
    };

    let failure_policy = if cfg.fail_policy_ignore {
        FAILURE_POLICY_IGNORE.to_string()
    } else {
        "Fail".to_string()
    };

    let webhook = k8s_openapi::api::admissionregistration::v1::MutatingWebhook {
        name: format!("{}.linkerd.io", cfg.webhook_config_name),
        client_config,
        rules: Some(vec![rule]),
        admission_review_versions: ADMISSION_REVIEW_VERSIONS.iter().map(|s| s.to_string()).collect(),
        side_effects: SIDE_EFFECTS_NONE.to_string(),
        failure_policy: Some(failure_policy),
        namespace_selector: Some(LabelSelector {
            match_expressions: Some(vec![k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement {
                key: "linkerd.io/control-plane-ns".to_string(),
                operator: "DoesNotExist".to_string(),
                values: None,
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(cfg.webhook_config_name.clone()),
            ..Default::default()
        },
        webhooks: Some(vec![webhook]),
    }
}

/// Creates or replaces the `MutatingWebhookConfiguration`. Replacement is
/// delete-then-recreate rather than a patch: webhook rules/CA bundles are
/// small and owned entirely by this process, so there's no concurrent writer
/// to preserve fields from (`SPEC_FULL.md` §9).
pub async fn reconcile(client: Client, cfg: &ReconcilerConfig) -> Result<()> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(std::time::Duration::from_millis(100))
        .with_max_delay(std::time::Duration::from_millis(1600))
        .with_max_times(5);

    (|| reconcile_once(client.clone(), cfg))
        .retry(&backoff)
        .notify(|err, dur| {
            warn!(%err, delay_ms = dur.as_millis() as u64, "webhook configuration reconcile attempt failed; retrying");
        })
        .await
        .map_err(Error::Reconcile)
}

async fn reconcile_once(client: Client, cfg: &ReconcilerConfig) -> std::result::Result<(), kube::Error> {
    let api: Api<MutatingWebhookConfiguration> = Api::all(client);
    let desired = desired_config(cfg);

    match api.get(&cfg.webhook_config_name).await {
        Ok(_) => {
            info!(name = %cfg.webhook_config_name, "existing webhook configuration found; recreating");
            api.delete(&cfg.webhook_config_name, &DeleteParams::default()).await?;
        }
        Err(kube::Error::Api(resp)) if resp.code == 404 => {
            info!(name = %cfg.webhook_config_name, "no existing webhook configuration; creating");
        }
        Err(err) => return Err(err),
    }

    api.create(&PostParams::default(), &desired).await?;
    info!(name = %cfg.webhook_config_name, "webhook configuration reconciled");
    Ok(())
}
