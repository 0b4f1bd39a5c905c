//! Well-known file and path names shared across the engine.

/// Name of the Manifest file carried at the root of every component's `basepath`.
pub(crate) const MANIFEST_NAME: &str = "Nuleculefile";

/// Legacy/alternate manifest file name also accepted when `MANIFEST_NAME` is absent.
pub(crate) const MANIFEST_NAME_ALT: &str = "manifest.yaml";

/// Default on-disk answer file name, relative to a component's `basepath`.
pub(crate) const ANSWERS_NAME: &str = "answers.conf";

/// Sample answer file written by `fetch`.
pub(crate) const ANSWERS_SAMPLE: &str = "answers.conf.sample";

/// Effective answer file written by `run`, re-read by `stop`.
pub(crate) const ANSWERS_RUNTIME: &str = "answers.conf.gen";

/// Subdirectory under a component's `basepath` that holds unpacked external children.
pub(crate) const EXTERNAL_DIR: &str = "external";

/// Subdirectory under a component's `basepath` that holds provider artifact sources.
pub(crate) const ARTIFACTS_DIR: &str = "artifacts";

/// Reserved answer-store namespace for cross-cutting keys.
pub(crate) const GENERAL_NAMESPACE: &str = "general";

/// Path inside an application image that is extracted for an external child.
pub(crate) const APPLICATION_ENTITY_PATH: &str = "/application-entity";

/// Host-wide lock file path, used to prevent concurrent invocations from racing.
pub(crate) const LOCK_PATH: &str = "/var/run/atomicapp.lock";

/// Default provider imputed into `general.provider` when the user supplied none.
pub(crate) const DEFAULT_PROVIDER: &str = "kubernetes";

/// Environment variable carrying a fallback `APP_SPEC` (set by container runtime labels).
pub(crate) const ENV_IMAGE: &str = "IMAGE";

/// Environment variable that, when set, replaces the command line entirely.
pub(crate) const ENV_ARGS: &str = "ATOMICAPP_ARGS";

/// Environment variable whose contents are appended to the command line.
pub(crate) const ENV_APPEND_ARGS: &str = "ATOMICAPP_APPEND_ARGS";

/// Presence indicates the process is running inside a Kubernetes/OpenShift pod.
pub(crate) const ENV_KUBERNETES_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";

/// Cross-cutting answer keys reserved under `general`.
pub(crate) const GENERAL_RESERVED_KEYS: &[&str] = &[
    "provider",
    "namespace",
    "provider-api",
    "provider-auth",
    "provider-cafile",
    "provider-tlsverify",
    "provider-config",
];
