//! Well-known container/label/annotation names the injector reads and writes.

/// Name of the sidecar proxy container. Its presence on a pod template is the
/// idempotence guard: a workload carrying it is treated as already injected.
pub const PROXY_CONTAINER_NAME: &str = "linkerd-proxy";
/// Name of the init container that programs traffic redirection.
pub const PROXY_INIT_CONTAINER_NAME: &str = "linkerd-init";

/// Annotation namespace for the primary inject toggle.
pub const ANNOTATION_INJECT: &str = "linkerd.io/inject";
/// Annotation/label prefix for per-option overrides, e.g. `config.linkerd.io/proxy-image`.
pub const CONFIG_ANNOTATION_PREFIX: &str = "config.linkerd.io/";

pub const LABEL_CONTROL_PLANE_NS: &str = "linkerd.io/control-plane-ns";
pub const LABEL_WORKLOAD_NS: &str = "linkerd.io/workload-ns";
pub const LABEL_PROXY_OWNER_PREFIX: &str = "linkerd.io/proxy-";

pub const ANNOTATION_CREATED_BY: &str = "linkerd.io/created-by";
pub const ANNOTATION_PROXY_VERSION: &str = "linkerd.io/proxy-version";
pub const ANNOTATION_IDENTITY_MODE: &str = "linkerd.io/identity-mode";
pub const ANNOTATION_OPAQUE_PORTS: &str = "config.linkerd.io/opaque-ports";

/// Volume names the synthesizer attaches, in the fixed order the patch builder emits them.
pub const TRUST_ANCHOR_VOLUME_NAME: &str = "linkerd-identity-trust-roots";
pub const IDENTITY_VOLUME_NAME: &str = "linkerd-identity-end-entity";

pub const TRUST_ANCHOR_MOUNT_PATH: &str = "/var/run/linkerd/identity/trust-anchors";
pub const IDENTITY_MOUNT_PATH: &str = "/var/run/linkerd/identity/end-entity";
