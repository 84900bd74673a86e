//! A concurrency-safe, read-only cache of `Namespace` annotations, backed by
//! `kube::runtime::reflector` (`spec.md` §5 "Shared resources": "The
//! namespace lister ... is shared across all workers; it is concurrency-safe
//! by construction").

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tracing::warn;

/// Cloneable handle onto the reflector's `Store`. Readers snapshot; the
/// background watcher task owns the writer half.
#[derive(Clone)]
pub struct NamespaceCache {
    store: reflector::Store<Namespace>,
}

impl NamespaceCache {
    /// Spawns the background watch loop and returns a ready-to-use cache.
    /// The returned future must be polled to drive the watch; callers
    /// `tokio::spawn` it and keep the `NamespaceCache` handle.
    pub fn spawn(client: Client) -> (Self, impl std::future::Future<Output = ()>) {
        let api: Api<Namespace> = Api::all(client);
        let (reader, writer) = reflector::store::<Namespace>();

        let watch = async move {
            let stream = watcher(api, watcher::Config::default())
                .default_backoff()
                .reflect(writer)
                .applied_objects();
            futures::pin_mut!(stream);
            use futures::TryStreamExt;
            loop {
                match stream.try_next().await {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(err) => warn!(%err, "namespace watch stream error; backing off and retrying"),
                }
            }
        };

        (Self { store: reader }, watch)
    }

    /// Returns the recognized-option annotations for `namespace`, or `None`
    /// if the cache has no entry — the caller falls back to treating the
    /// namespace as unannotated rather than failing the admission
    /// (`spec.md` §7 "Lookup error ... Fail-open; retry on next admission").
    pub fn annotations(&self, namespace: &str) -> Option<BTreeMap<String, String>> {
        self.store
            .state()
            .into_iter()
            .find(|ns| ns.name_any() == namespace)
            .map(|ns| ns.annotations().clone())
    }

    pub async fn wait_until_ready(&self) {
        let _ = self.store.wait_until_ready().await;
    }
}
