//! Walks `ownerReferences` up to the controlling workload (`spec.md` §4.2).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::warn;

const MAX_HOPS: usize = 5;
const SYNTHETIC_INTERMEDIATE: &str = "ReplicaSet";

/// The root controller's kind and name, used to label the pod
/// (`linkerd.io/proxy-<kind>=<name>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootOwner {
    pub kind: String,
    pub name: String,
}

/// Error surfaced when a cached lister returns something other than
/// "not found" while resolving an intermediate owner (`spec.md` §4.2,
/// §7 "Lookup error").
#[derive(Debug, thiserror::Error)]
#[error("owner lookup failed for {kind}/{name} in {namespace}: {message}")]
pub struct LookupFailed {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub message: String,
}

/// Resolves an intermediate owner's own `ownerReferences`, so the resolver
/// can hop past a synthetic `ReplicaSet` to the `Deployment` that owns it.
///
/// Implemented against a real cluster by the binary crate (via a cached
/// lister/`Api::get`); kept as a trait here so `proxy-injector-core` never
/// touches a network client, and so the resolver is unit-testable with a
/// fake.
pub trait OwnerLookup {
    /// Returns `Ok(None)` if the named object does not exist (chain
    /// terminus); `Err` for any other lookup failure.
    fn owner_references(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<Vec<OwnerReference>>, LookupFailed>;
}

fn controller_ref(refs: &[OwnerReference]) -> Option<&OwnerReference> {
    refs.iter().find(|r| r.controller == Some(true)).or_else(|| refs.first())
}

/// Resolves the root controlling workload for an object given its own
/// `ownerReferences`. Bounded to [`MAX_HOPS`]; on exceeding the bound, falls
/// back to the object's own kind/name and logs a warning rather than erroring
/// (`spec.md` §4.2 "Cycle guard").
pub fn resolve_root(
    lookup: &dyn OwnerLookup,
    namespace: &str,
    self_kind: &str,
    self_name: &str,
    self_owner_refs: &[OwnerReference],
) -> Result<RootOwner, LookupFailed> {
    let mut refs = self_owner_refs.to_vec();

    for hop in 0..MAX_HOPS {
        let Some(owner) = controller_ref(&refs) else {
            return Ok(RootOwner {
                kind: self_kind.to_string(),
                name: self_name.to_string(),
            });
        };
        if owner.kind != SYNTHETIC_INTERMEDIATE {
            return Ok(RootOwner {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            });
        }
        match lookup.owner_references(namespace, &owner.kind, &owner.name)? {
            Some(next) => refs = next,
            None => {
                // The ReplicaSet itself is gone; it's the terminus we have.
                return Ok(RootOwner {
                    kind: owner.kind.clone(),
                    name: owner.name.clone(),
                });
            }
        }
        if hop == MAX_HOPS - 1 {
            warn!(
                namespace,
                self_kind, self_name, "owner reference hop limit exceeded; using object's own identity"
            );
        }
    }

    warn!(
        namespace,
        self_kind, self_name, "owner reference hop limit exceeded; using object's own identity"
    );
    Ok(RootOwner {
        kind: self_kind.to_string(),
        name: self_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeLookup(HashMap<(String, String, String), Vec<OwnerReference>>);

    impl OwnerLookup for FakeLookup {
        fn owner_references(
            &self,
            namespace: &str,
            kind: &str,
            name: &str,
        ) -> Result<Option<Vec<OwnerReference>>, LookupFailed> {
            Ok(self
                .0
                .get(&(namespace.to_string(), kind.to_string(), name.to_string()))
                .cloned())
        }
    }

    fn owner_ref(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.to_string(),
            name: name.to_string(),
            controller: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn no_owner_refs_returns_self() {
        let lookup = FakeLookup(HashMap::new());
        let root = resolve_root(&lookup, "ns", "Pod", "standalone", &[]).unwrap();
        assert_eq!(root, RootOwner {
            kind: "Pod".to_string(),
            name: "standalone".to_string()
        });
    }

    #[test]
    fn replica_set_owned_by_deployment_hops_once() {
        let lookup = FakeLookup(HashMap::new());
        let refs = vec![owner_ref("Deployment", "web")];
        let root = resolve_root(&lookup, "ns", "ReplicaSet", "web-abc123", &refs).unwrap();
        assert_eq!(root, RootOwner {
            kind: "Deployment".to_string(),
            name: "web".to_string()
        });
    }

    #[test]
    fn pod_owned_by_replica_set_owned_by_deployment_hops_twice() {
        let mut table = HashMap::new();
        table.insert(
            ("ns".to_string(), "ReplicaSet".to_string(), "web-abc123".to_string()),
            vec![owner_ref("Deployment", "web")],
        );
        let lookup = FakeLookup(table);
        let refs = vec![owner_ref("ReplicaSet", "web-abc123")];
        let root = resolve_root(&lookup, "ns", "Pod", "web-abc123-xyz", &refs).unwrap();
        assert_eq!(root, RootOwner {
            kind: "Deployment".to_string(),
            name: "web".to_string()
        });
    }

    #[test]
    fn missing_replica_set_terminates_chain() {
        let lookup = FakeLookup(HashMap::new());
        let refs = vec![owner_ref("ReplicaSet", "gone")];
        let root = resolve_root(&lookup, "ns", "Pod", "gone-xyz", &refs).unwrap();
        assert_eq!(root, RootOwner {
            kind: "ReplicaSet".to_string(),
            name: "gone".to_string()
        });
    }

    #[test]
    fn lookup_cycle_falls_back_to_self_after_hop_limit() {
        // Every ReplicaSet points at another ReplicaSet forever.
        let mut table = HashMap::new();
        for i in 0..10 {
            table.insert(
                ("ns".to_string(), "ReplicaSet".to_string(), format!("rs-{i}")),
                vec![owner_ref("ReplicaSet", &format!("rs-{}", i + 1))],
            );
        }
        let lookup = FakeLookup(table);
        let refs = vec![owner_ref("ReplicaSet", "rs-0")];
        let root = resolve_root(&lookup, "ns", "Pod", "self", &refs).unwrap();
        assert_eq!(root, RootOwner {
            kind: "Pod".to_string(),
            name: "self".to_string()
        });
    }
}
