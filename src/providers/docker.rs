//! Local container-engine provider, backed by `podman kube play`/`down`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use super::{Provider, ProviderContext};
use crate::error::AppError;

pub(crate) struct DockerProvider {
    podman_path: PathBuf,
    namespace: String,
    dry_run: bool,
}

impl DockerProvider {
    pub(crate) fn new() -> Self {
        Self {
            podman_path: "podman".into(),
            namespace: String::new(),
            dry_run: false,
        }
    }
}

impl Provider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn init(&mut self, context: &ProviderContext, _basepath: &Path, dry_run: bool) -> Result<(), AppError> {
        let namespace = context
            .get("namespace")
            .map(|v| v.to_string())
            .ok_or_else(|| AppError::ProviderInitError {
                provider: "docker".to_owned(),
                source: anyhow::anyhow!("required answer key 'namespace' is not set"),
            })?;

        self.namespace = namespace;
        self.dry_run = dry_run;

        if !dry_run {
            let found = Command::new(&self.podman_path).arg("--version").output().is_ok();
            if !found {
                return Err(AppError::ProviderInitError {
                    provider: "docker".to_owned(),
                    source: anyhow::anyhow!("podman binary not found in PATH"),
                });
            }
        }

        Ok(())
    }

    fn run(&mut self, artifacts: &[PathBuf]) -> Result<(), AppError> {
        for artifact in artifacts {
            if self.dry_run {
                info!(?artifact, namespace = %self.namespace, "dry-run: would create pod");
                continue;
            }

            let status = Command::new(&self.podman_path)
                .args(["kube", "play", &artifact.display().to_string()])
                .status()
                .map_err(|err| AppError::ProviderApplyError {
                    provider: "docker".to_owned(),
                    artifact: artifact.clone(),
                    source: anyhow::anyhow!(err),
                })?;

            if !status.success() {
                return Err(AppError::ProviderApplyError {
                    provider: "docker".to_owned(),
                    artifact: artifact.clone(),
                    source: anyhow::anyhow!("podman kube play exited with {status}"),
                });
            }
        }
        Ok(())
    }

    fn stop(&mut self, artifacts: &[PathBuf]) -> Result<(), AppError> {
        for artifact in artifacts.iter().rev() {
            if self.dry_run {
                info!(?artifact, "dry-run: would tear down pod");
                continue;
            }

            let status = Command::new(&self.podman_path)
                .args(["kube", "down", &artifact.display().to_string()])
                .status()
                .map_err(|err| AppError::ProviderApplyError {
                    provider: "docker".to_owned(),
                    artifact: artifact.clone(),
                    source: anyhow::anyhow!(err),
                })?;

            if !status.success() {
                return Err(AppError::ProviderApplyError {
                    provider: "docker".to_owned(),
                    artifact: artifact.clone(),
                    source: anyhow::anyhow!("podman kube down exited with {status}"),
                });
            }
        }
        Ok(())
    }
}
