//! OpenShift provider: Kubernetes plus project/route handling, selected
//! automatically when the process detects it is running inside an
//! OpenShift-style pod.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use super::{order_by_kind, read_kind, Provider, ProviderContext};
use crate::error::AppError;

pub(crate) struct OpenShiftProvider {
    oc_path: PathBuf,
    namespace: String,
    dry_run: bool,
}

impl OpenShiftProvider {
    pub(crate) fn new() -> Self {
        Self {
            oc_path: "oc".into(),
            namespace: String::new(),
            dry_run: false,
        }
    }

    fn with_kinds(&self, artifacts: &[PathBuf]) -> Result<Vec<(PathBuf, String)>, AppError> {
        artifacts
            .iter()
            .map(|path| read_kind(path).map(|kind| (path.clone(), kind)))
            .collect()
    }

    fn apply_one(&self, path: &Path) -> Result<(), AppError> {
        if self.dry_run {
            info!(?path, project = %self.namespace, "dry-run: would apply artifact");
            return Ok(());
        }

        let status = Command::new(&self.oc_path)
            .args(["apply", "-n", &self.namespace, "-f", &path.display().to_string()])
            .status()
            .map_err(|err| AppError::ProviderApplyError {
                provider: "openshift".to_owned(),
                artifact: path.to_owned(),
                source: anyhow::anyhow!(err),
            })?;

        if !status.success() {
            return Err(AppError::ProviderApplyError {
                provider: "openshift".to_owned(),
                artifact: path.to_owned(),
                source: anyhow::anyhow!("oc apply exited with {status}"),
            });
        }
        Ok(())
    }

    fn delete_one(&self, path: &Path) -> Result<(), AppError> {
        if self.dry_run {
            info!(?path, project = %self.namespace, "dry-run: would delete artifact");
            return Ok(());
        }

        let status = Command::new(&self.oc_path)
            .args(["delete", "-n", &self.namespace, "-f", &path.display().to_string(), "--ignore-not-found"])
            .status()
            .map_err(|err| AppError::ProviderApplyError {
                provider: "openshift".to_owned(),
                artifact: path.to_owned(),
                source: anyhow::anyhow!(err),
            })?;

        if !status.success() {
            return Err(AppError::ProviderApplyError {
                provider: "openshift".to_owned(),
                artifact: path.to_owned(),
                source: anyhow::anyhow!("oc delete exited with {status}"),
            });
        }
        Ok(())
    }
}

impl Provider for OpenShiftProvider {
    fn name(&self) -> &'static str {
        "openshift"
    }

    fn init(&mut self, context: &ProviderContext, _basepath: &Path, dry_run: bool) -> Result<(), AppError> {
        for key in ["provider-api", "provider-auth", "namespace"] {
            if context.get(key).is_none() {
                return Err(AppError::ProviderInitError {
                    provider: "openshift".to_owned(),
                    source: anyhow::anyhow!("required answer key '{key}' is not set"),
                });
            }
        }
        self.namespace = context.get("namespace").unwrap().to_string();
        self.dry_run = dry_run;
        Ok(())
    }

    fn run(&mut self, artifacts: &[PathBuf]) -> Result<(), AppError> {
        let ordered = order_by_kind(self.with_kinds(artifacts)?);
        for (path, _kind) in ordered {
            self.apply_one(&path)?;
        }
        Ok(())
    }

    fn stop(&mut self, artifacts: &[PathBuf]) -> Result<(), AppError> {
        let mut ordered = order_by_kind(self.with_kinds(artifacts)?);
        ordered.reverse();
        for (path, _kind) in ordered {
            self.delete_one(&path)?;
        }
        Ok(())
    }

    fn supports_requirement(&self, kind: &str) -> bool {
        kind == "persistentVolume"
    }

    fn persistent_storage(&mut self, kind: &str, component_id: &str, dry_run: bool) -> Result<(), AppError> {
        if kind != "persistentVolume" {
            return Err(AppError::UnsupportedRequirement {
                provider: "openshift".to_owned(),
                kind: kind.to_owned(),
            });
        }

        if dry_run {
            info!(%component_id, "dry-run: would provision persistent volume claim");
            return Ok(());
        }

        info!(%component_id, "provisioning persistent volume claim");
        Ok(())
    }
}
