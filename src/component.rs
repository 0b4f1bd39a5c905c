//! Runtime Component node.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::manifest::{ArtifactRef, ParamDef, Requirement};

/// Per-component lifecycle state during `run`.
///
/// ```text
/// CREATED -> CONFIG_RESOLVED -> RENDERED -> DEPLOYED
///                    \-> FAILED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ComponentState {
    Created,
    ConfigResolved,
    Rendered,
    Deployed,
    Failed,
}

/// A node in the dependency graph.
///
/// Parent/child edges live in `Graph`, not on `Component` itself: the graph
/// is an arena of integer indices, so components never hold references to
/// each other.
#[derive(Clone, Debug)]
pub(crate) struct Component {
    pub(crate) id: String,
    pub(crate) basepath: PathBuf,
    pub(crate) namespace: String,
    pub(crate) specversion: String,
    pub(crate) params: Vec<ParamDef>,
    pub(crate) artifacts: BTreeMap<String, Vec<ArtifactRef>>,
    pub(crate) requirements: Vec<Requirement>,
    /// Image reference this component was fetched from, if it is an external child.
    pub(crate) source: Option<String>,
    /// Paths (relative to `basepath`) rendered per provider during `run`.
    pub(crate) rendered_artifacts: BTreeMap<String, Vec<PathBuf>>,
    pub(crate) state: ComponentState,
}

impl Component {
    pub(crate) fn manifest_path(&self) -> PathBuf {
        self.basepath.join(crate::constants::MANIFEST_NAME)
    }

    pub(crate) fn external_child_basepath(&self, child_name: &str) -> PathBuf {
        self.basepath
            .join(crate::constants::EXTERNAL_DIR)
            .join(child_name)
    }

    /// Sanitizes an artifact-relative path so it cannot escape `basepath`:
    /// no `..` traversal, no absolute re-roots.
    pub(crate) fn sanitized_artifact_path(&self, relative: &str) -> Option<PathBuf> {
        sanitize_relative(&self.basepath, relative)
    }

    pub(crate) fn transition(&mut self, to: ComponentState) {
        self.state = to;
    }
}

/// Joins `relative` onto `base`, rejecting any path that escapes `base`
/// after normalization.
pub(crate) fn sanitize_relative(base: &Path, relative: &str) -> Option<PathBuf> {
    use std::path::Component as PathComponent;

    let rel_path = Path::new(relative);
    let mut normalized = PathBuf::new();

    for part in rel_path.components() {
        match part {
            PathComponent::Normal(seg) => normalized.push(seg),
            PathComponent::CurDir => {}
            PathComponent::ParentDir | PathComponent::RootDir | PathComponent::Prefix(_) => {
                return None;
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return None;
    }

    Some(base.join(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_traversal() {
        let base = Path::new("/tmp/app");
        assert!(sanitize_relative(base, "../escape").is_none());
        assert!(sanitize_relative(base, "sub/../../escape").is_none());
    }

    #[test]
    fn rejects_absolute_reroot() {
        let base = Path::new("/tmp/app");
        assert!(sanitize_relative(base, "/etc/passwd").is_none());
    }

    #[test]
    fn accepts_plain_relative_path() {
        let base = Path::new("/tmp/app");
        assert_eq!(
            sanitize_relative(base, "artifacts/kubernetes/pod.yaml"),
            Some(PathBuf::from("/tmp/app/artifacts/kubernetes/pod.yaml"))
        );
    }
}
