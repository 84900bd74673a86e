use thiserror::Error;

/// Errors produced by the pure decision/synthesis pipeline.
///
/// None of these variants wrap I/O: cluster lookups live in the binary
/// crate, behind the [`crate::owner::OwnerLookup`] trait.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported resource kind {0:?}: no pod template")]
    UnsupportedResource(String),

    #[error("container already mounts a volume at a path the proxy needs: {0}")]
    PathCollision(String),

    #[error("failed to serialize patch value: {0}")]
    PatchSerialize(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
