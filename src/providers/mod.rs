//! Provider Plug-in Registry and contract: deployment backends are
//! `Box<dyn Trait + Send + Sync>` objects selected by name at runtime, with
//! default method bodies kept minimal.

mod docker;
mod kubernetes;
mod openshift;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::answers::AnswerValue;
use crate::error::AppError;

/// Context handed to a provider at `init` time: the merged `general` +
/// component-namespace answer values relevant to provider configuration.
pub(crate) type ProviderContext = BTreeMap<String, AnswerValue>;

/// Contract every provider plug-in implements.
pub(crate) trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validates configuration (API endpoint, credentials, CA trust,
    /// namespace existence). May mutate internal state.
    fn init(&mut self, context: &ProviderContext, basepath: &Path, dry_run: bool) -> Result<(), AppError>;

    /// Applies each rendered artifact, in the order given modulo kind
    /// precedence. Fails fast on the first error; no rollback.
    fn run(&mut self, artifacts: &[PathBuf]) -> Result<(), AppError>;

    /// Undeploys each artifact. Providers managing hierarchical resources
    /// must cascade deletion.
    fn stop(&mut self, artifacts: &[PathBuf]) -> Result<(), AppError>;

    /// Whether this provider can satisfy requirement `kind`.
    fn supports_requirement(&self, _kind: &str) -> bool {
        false
    }

    /// Satisfies one `requirements` entry for `component_id`. Only called when `supports_requirement` is true.
    fn persistent_storage(&mut self, _kind: &str, _component_id: &str, _dry_run: bool) -> Result<(), AppError> {
        Ok(())
    }
}

/// Supported provider names.
pub(crate) const SUPPORTED_PROVIDERS: &[&str] = &["docker", "kubernetes", "openshift"];

/// Instantiates the provider named `name`, or the OpenShift plug-in if the
/// process detects it is running inside an OpenShift-style pod.
pub(crate) fn resolve(name: &str) -> Result<Box<dyn Provider>, AppError> {
    let effective_name = if crate::container_source::running_inside_cluster() {
        "openshift"
    } else {
        name
    };

    match effective_name {
        "docker" => Ok(Box::new(docker::DockerProvider::new())),
        "kubernetes" => Ok(Box::new(kubernetes::KubernetesProvider::new())),
        "openshift" => Ok(Box::new(openshift::OpenShiftProvider::new())),
        other => Err(AppError::ProviderInitError {
            provider: other.to_owned(),
            source: anyhow::anyhow!(
                "unsupported provider '{other}', must be one of {SUPPORTED_PROVIDERS:?}"
            ),
        }),
    }
}

/// Kind precedence used by the Kubernetes-family providers when ordering
/// artifact dispatch within one `run` call.
pub(crate) const KIND_PRECEDENCE: &[&str] = &[
    "Namespace",
    "PersistentVolumeClaim",
    "ConfigMap",
    "Secret",
    "Service",
    "Deployment",
    "ReplicaSet",
    "Pod",
    "Route",
];

pub(crate) fn kind_rank(kind: &str) -> usize {
    KIND_PRECEDENCE
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(KIND_PRECEDENCE.len())
}

/// Reads the top-level `kind:` field out of a rendered artifact file.
/// Missing `kind` is a `ProviderApplyError` for providers that require it.
pub(crate) fn read_kind(path: &Path) -> Result<String, AppError> {
    let contents = std::fs::read_to_string(path).map_err(|err| AppError::ProviderApplyError {
        provider: "kubernetes".to_owned(),
        artifact: path.to_owned(),
        source: anyhow::anyhow!(err),
    })?;

    let value: serde_yaml::Value = serde_yaml::from_str(&contents).map_err(|err| AppError::ProviderApplyError {
        provider: "kubernetes".to_owned(),
        artifact: path.to_owned(),
        source: anyhow::anyhow!(err),
    })?;

    value
        .get("kind")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| AppError::ProviderApplyError {
            provider: "kubernetes".to_owned(),
            artifact: path.to_owned(),
            source: anyhow::anyhow!("artifact is missing required 'kind' field"),
        })
}

/// Sorts artifacts by kind precedence for `run` (children-of-children, e.g.
/// services before pods), stable otherwise.
pub(crate) fn order_by_kind(mut artifacts: Vec<(PathBuf, String)>) -> Vec<(PathBuf, String)> {
    artifacts.sort_by_key(|(_, kind)| kind_rank(kind));
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_unknown_provider() {
        let err = resolve("nonexistent").unwrap_err();
        assert!(matches!(err, AppError::ProviderInitError { .. }));
    }

    #[test]
    fn kind_rank_orders_services_before_pods() {
        assert!(kind_rank("Service") < kind_rank("Pod"));
        assert!(kind_rank("Namespace") < kind_rank("Service"));
    }

    #[test]
    fn read_kind_errors_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.yaml");
        std::fs::write(&path, "metadata:\n  name: x\n").unwrap();
        let err = read_kind(&path).unwrap_err();
        assert!(matches!(err, AppError::ProviderApplyError { .. }));
    }
}
