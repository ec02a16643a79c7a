//! Local file backend
//!
//! State lives in a JSON file (default `nimbus.state.json`); a sibling
//! `.lock` file holds the `LockInfo` of the current owner.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::{DEFAULT_LOCK_TIMEOUT_SECS, LockInfo};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout_secs: i64,
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> BackendError {
    BackendError::Io(format!("Failed to {} {}: {}", action, path.display(), e))
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "nimbus.state.json";

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }

    /// Reads `path` and `lock_timeout_secs`
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config.get_string("path").unwrap_or(Self::DEFAULT_STATE_FILE);
        if path.is_empty() {
            return Err(BackendError::configuration("path must not be empty"));
        }

        let mut backend = Self::with_path(path);
        if let Some(secs) = config.get_int("lock_timeout_secs") {
            if secs <= 0 {
                return Err(BackendError::configuration(
                    "lock_timeout_secs must be positive",
                ));
            }
            backend.lock_timeout_secs = secs;
        }
        Ok(backend)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                BackendError::InvalidState(format!("Failed to parse lock file: {}", e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &self.lock_path, e)),
        }
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| io_error("remove", &self.lock_path, e))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::with_path(Self::DEFAULT_STATE_FILE)
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &self.state_path, e)),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "state version {} is newer than supported version {}",
                state.version,
                StateFile::CURRENT_VERSION
            )));
        }

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        if let Some(dir) = self.state_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error("create", dir, e))?;
        }

        // Write to a temporary file, then rename over the state file
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| io_error("write", &tmp_path, e))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| io_error("write", &self.state_path, e))?;

        debug!("wrote state serial {} to {}", state.serial, self.state_path.display());
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock().await? {
            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }
            warn!(
                "taking over expired lock {} held by {} since {}",
                existing.id, existing.who, existing.created
            );
            self.remove_lock().await?;
        }

        let lock = LockInfo::with_timeout(operation, self.lock_timeout_secs);
        let content = serde_json::to_string_pretty(&lock)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))?;

        // Fails if another run created the lock in the meantime
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return match self.read_lock().await? {
                    Some(other) => Err(BackendError::locked(&other)),
                    None => Err(io_error("create", &self.lock_path, e)),
                };
            }
            Err(e) => return Err(io_error("create", &self.lock_path, e)),
        };
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_error("write", &self.lock_path, e))?;
        file.flush()
            .await
            .map_err(|e| io_error("write", &self.lock_path, e))?;

        debug!("acquired lock {} for {}", lock.id, operation);
        Ok(lock)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.remove_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;

        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }

        warn!("force-unlocking {} held by {}", existing.id, existing.who);
        self.remove_lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::resource::Value;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_write() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("nested/test.state.json"));

        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.lineage, state.lineage);
    }

    #[tokio::test]
    async fn test_corrupt_state_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = LocalBackend::with_path(path).read_state().await;
        assert!(matches!(result, Err(BackendError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_locking() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_eq!(lock.operation, "apply");

        let result = backend.acquire_lock("destroy").await;
        assert!(matches!(result, Err(BackendError::Locked { .. })));

        backend.release_lock(&lock).await.unwrap();

        let lock2 = backend.acquire_lock("destroy").await.unwrap();
        assert_eq!(lock2.operation, "destroy");
        backend.release_lock(&lock2).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        let stale = LockInfo::with_timeout("apply", -60);
        std::fs::write(&backend.lock_path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_ne!(lock.id, stale.id);
    }

    #[tokio::test]
    async fn test_release_with_wrong_lock_fails() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        let held = backend.acquire_lock("apply").await.unwrap();
        let other = LockInfo::new("apply");

        assert!(matches!(
            backend.release_lock(&other).await,
            Err(BackendError::LockMismatch { .. })
        ));
        assert!(matches!(
            backend.force_unlock(&other.id).await,
            Err(BackendError::LockMismatch { .. })
        ));
        backend.force_unlock(&held.id).await.unwrap();
        assert!(matches!(
            backend.release_lock(&held).await,
            Err(BackendError::LockNotFound(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let backend = LocalBackend::from_config(&BackendConfig::default()).unwrap();
        assert_eq!(backend.state_path(), Path::new("nimbus.state.json"));
        assert_eq!(backend.lock_path, PathBuf::from("nimbus.state.lock"));

        let mut config = BackendConfig::local("custom.state.json");
        config
            .attributes
            .insert("lock_timeout_secs".to_string(), Value::Int(60));
        let backend = LocalBackend::from_config(&config).unwrap();
        assert_eq!(backend.state_path(), Path::new("custom.state.json"));
        assert_eq!(backend.lock_timeout_secs, 60);

        let config = BackendConfig {
            backend_type: "local".to_string(),
            attributes: HashMap::from([("lock_timeout_secs".to_string(), Value::Int(0))]),
        };
        assert!(LocalBackend::from_config(&config).is_err());
    }
}
