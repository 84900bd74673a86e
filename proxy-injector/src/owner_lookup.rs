//! Cluster-backed implementation of [`proxy_injector_core::owner::OwnerLookup`].
//! The resolver only ever needs to hop across the synthetic `ReplicaSet`
//! intermediate (`spec.md` §4.2), so this is the only kind we fetch.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Api, Client};

use proxy_injector_core::decision::JobStatus;
use proxy_injector_core::owner::{LookupFailed, OwnerLookup};

pub struct KubeOwnerLookup {
    client: Client,
}

impl KubeOwnerLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl OwnerLookup for KubeOwnerLookup {
    fn owner_references(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<Vec<OwnerReference>>, LookupFailed> {
        if kind != "ReplicaSet" {
            // Resolver only ever asks about the synthetic intermediate kind.
            return Ok(None);
        }
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        // `OwnerLookup` is a synchronous trait so the pure core stays free of
        // an async runtime dependency; block on the one-shot GET here, on the
        // binary crate's side of the seam.
        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(api.get(name))
        });
        match result {
            Ok(rs) => Ok(Some(rs.metadata.owner_references.unwrap_or_default())),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(err) => Err(LookupFailed {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

impl KubeOwnerLookup {
    /// Fetches the Job's `status.conditions` and maps them to [`JobStatus`]
    /// (`spec.md` §4.1 step 5). `None` on lookup failure — the caller treats
    /// that the same as "not terminal" and injects, per §7's fail-open
    /// policy for lookup errors.
    pub fn job_status(&self, namespace: &str, name: &str) -> Option<JobStatus> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let result =
            tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(api.get(name)));
        let job = result.ok()?;
        let conditions = job.status?.conditions?;
        for condition in conditions {
            if condition.status != "True" {
                continue;
            }
            match condition.type_.as_str() {
                "Complete" => return Some(JobStatus::Complete),
                "Failed" => return Some(JobStatus::Failed),
                _ => {}
            }
        }
        Some(JobStatus::Active)
    }
}
