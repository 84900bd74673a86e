//! The binary crate's error taxonomy: everything [`proxy_injector_core::CoreError`]
//! doesn't cover because it requires I/O (`spec.md` §7, `SPEC_FULL.md` §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] proxy_injector_core::CoreError),

    #[error("owner reference lookup failed: {0}")]
    OwnerLookup(#[from] proxy_injector_core::owner::LookupFailed),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to load TLS certificate/key: {0}")]
    Tls(std::io::Error),

    #[error("failed to bind listener on {0}: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),

    #[error("webhook configuration reconcile failed after retries: {0}")]
    Reconcile(kube::Error),

    #[error("failed to read manifest {0}: {1}")]
    ReadManifest(String, std::io::Error),

    #[error("failed to parse YAML manifest: {0}")]
    ParseManifest(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
