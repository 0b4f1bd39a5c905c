//! Host-wide non-blocking invocation lock: an `O_EXCL`-created file holding
//! the owning PID, released on `Drop` so every exit path (including
//! `?`-propagated errors) gives it back.

use std::fs::{self, File};
use std::io::Write as _;
use std::os::unix::fs::OpenOptionsExt as _;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub(crate) struct Lock {
    path: PathBuf,
}

impl Lock {
    /// Attempts to acquire the lock at `path`, failing immediately (no
    /// waiting) if another process already holds it.
    pub(crate) fn acquire(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let result = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path);

        let mut file = match result {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AppError::Busy(path.to_owned()));
            }
            Err(err) => return Err(AppError::Other(anyhow::anyhow!(err))),
        };

        let _ = write!(file, "{}", std::process::id());

        Ok(Self { path: path.to_owned() })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atomicapp.lock");

        let first = Lock::acquire(&path).expect("should acquire");
        let err = Lock::acquire(&path).unwrap_err();
        assert!(matches!(err, AppError::Busy(_)));

        drop(first);
        Lock::acquire(&path).expect("should acquire after release");
    }
}
