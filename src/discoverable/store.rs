use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::debug;

use crate::{config::DiscoverabilityConfig, error::StoreError};

/// File-system backed discoverability state: an flock-guarded lock file and
/// an activation marker whose mtime records when discoverability was enabled.
#[derive(Debug, Clone)]
pub struct DiscoverabilityStore {
    lock_path: PathBuf,
    marker_path: PathBuf,
}

/// Holds the exclusive discoverability token until dropped.
///
/// The kernel drops an flock when its file description closes, so the token
/// is also released if the holding process dies.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // SAFETY: the descriptor is owned by `self.file` and still open.
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            debug!(
                "Explicit unlock of {} failed ({}), relying on close",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
    }
}

impl DiscoverabilityStore {
    pub fn new(lock_path: impl Into<PathBuf>, marker_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
            marker_path: marker_path.into(),
        }
    }

    pub fn from_config(config: &DiscoverabilityConfig) -> Self {
        Self::new(&config.lock_path, &config.marker_path)
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Take the exclusive token without waiting.
    ///
    /// Returns [`StoreError::WouldBlock`] if any other open description of the
    /// lock file holds it, whether in this process or another.
    pub fn try_acquire_exclusive(&self) -> Result<LockGuard, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))?;

        // SAFETY: flock only reads the descriptor, which `file` keeps open.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(code) if code == libc::EWOULDBLOCK => Err(StoreError::WouldBlock),
                _ => Err(StoreError::io(&self.lock_path, err)),
            };
        }

        debug!("Acquired discoverability lock {}", self.lock_path.display());
        Ok(LockGuard {
            file,
            path: self.lock_path.clone(),
        })
    }

    /// Create the marker, or refresh it, with its mtime set to `now`
    pub fn write_activation_marker(&self, now: SystemTime) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.marker_path)
            .map_err(|e| StoreError::io(&self.marker_path, e))?;
        file.set_modified(now)
            .map_err(|e| StoreError::io(&self.marker_path, e))?;
        Ok(())
    }

    /// When the marker was last written, or `None` if there is no marker
    pub fn activated_at(&self) -> Result<Option<SystemTime>, StoreError> {
        match std::fs::metadata(&self.marker_path) {
            Ok(metadata) => metadata
                .modified()
                .map(Some)
                .map_err(|e| StoreError::io(&self.marker_path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&self.marker_path, e)),
        }
    }

    /// Age of the marker at `now`. A marker dated after `now` is age zero.
    pub fn read_activation_marker_age(
        &self,
        now: SystemTime,
    ) -> Result<Option<Duration>, StoreError> {
        Ok(self
            .activated_at()?
            .map(|at| now.duration_since(at).unwrap_or(Duration::ZERO)))
    }

    pub fn activation_marker_exists(&self) -> Result<bool, StoreError> {
        Ok(self.activated_at()?.is_some())
    }

    /// Delete the marker. Removing an absent marker succeeds.
    pub fn remove_activation_marker(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.marker_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.marker_path, e)),
        }
    }
}
