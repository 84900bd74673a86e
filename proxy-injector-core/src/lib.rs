//! Pure, no-I/O core of the Linkerd proxy injector: the config model, owner
//! resolution algorithm, injection decision engine, resource synthesizer,
//! and RFC 6902 patch builder.
//!
//! Nothing in this crate touches a `kube::Client`. The binary crate
//! (`proxy-injector`) supplies the networked collaborators — a cached
//! namespace lister and an [`owner::OwnerLookup`] implementation — and
//! drives this crate's pure functions from the admission handler.

pub mod config;
pub mod decision;
pub mod error;
pub mod labels;
pub mod meta;
pub mod owner;
pub mod patch;
pub mod synth;

pub use config::{ClusterConfig, EffectiveConfig};
pub use decision::{decide, Action, Decision, JobStatus, Reason};
pub use error::{CoreError, Result};
pub use meta::{Origin, ParsedObject, WorkloadKind};
pub use owner::{resolve_root, OwnerLookup, RootOwner};
pub use patch::build_pod_patch;
pub use synth::{synthesize, SynthesizedResources};
