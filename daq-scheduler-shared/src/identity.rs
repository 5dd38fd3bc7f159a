//! # Framework Identity Store (C1)
//!
//! Persists the single opaque framework identity string handed back by the
//! outer resource manager on first registration, so a restarted scheduler
//! re-presents it on subscribe instead of registering as a new framework.
//! `remember` is idempotent: writing the same identity twice is a no-op
//! write, and writing a different identity simply replaces it (the outer
//! manager is the source of truth on conflict, we just cache its answer).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::errors::{SchedulerError, SchedulerResult};

/// A framework identity store backed by a single file on disk.
///
/// Reads are served from an in-memory cache populated at construction time;
/// `remember` updates both the cache and the file so a concurrent reader
/// never observes a partially-written value.
#[derive(Debug)]
pub struct FrameworkIdentityStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FrameworkIdentityStore {
    /// Open (or create) the identity store at `path`. Missing files are
    /// treated as "no identity yet", not an error.
    pub fn open(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cached = match fs::read_to_string(&path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(SchedulerError::Repository(format!(
                    "failed to read framework identity file {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    /// Current identity, or `None` if the framework has never registered.
    pub fn current(&self) -> Option<String> {
        self.cached
            .read()
            .expect("framework identity lock poisoned")
            .clone()
    }

    /// Persist `identity` as the current framework identity. Idempotent: a
    /// call with the already-current identity performs no I/O.
    pub fn remember(&self, identity: impl Into<String>) -> SchedulerResult<()> {
        let identity = identity.into();

        {
            let existing = self.cached.read().expect("framework identity lock poisoned");
            if existing.as_deref() == Some(identity.as_str()) {
                return Ok(());
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SchedulerError::Repository(format!(
                        "failed to create directory for framework identity file {}: {e}",
                        self.path.display()
                    ))
                })?;
            }
        }

        fs::write(&self.path, &identity).map_err(|e| {
            SchedulerError::Repository(format!(
                "failed to write framework identity file {}: {e}",
                self.path.display()
            ))
        })?;

        *self.cached.write().expect("framework identity lock poisoned") = Some(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_empty_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameworkIdentityStore::open(dir.path().join("nope")).unwrap();
        assert_eq!(store.current(), None);
    }

    #[test]
    fn remember_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameworkIdentityStore::open(dir.path().join("id")).unwrap();
        store.remember("framework-abc-123").unwrap();
        assert_eq!(store.current().as_deref(), Some("framework-abc-123"));
    }

    #[test]
    fn remember_is_idempotent_for_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id");
        let store = FrameworkIdentityStore::open(&path).unwrap();
        store.remember("framework-abc-123").unwrap();
        let written_at = fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        store.remember("framework-abc-123").unwrap();
        let written_at_again = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(written_at, written_at_again);
    }

    #[test]
    fn remember_replaces_a_different_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameworkIdentityStore::open(dir.path().join("id")).unwrap();
        store.remember("framework-abc-123").unwrap();
        store.remember("framework-xyz-999").unwrap();
        assert_eq!(store.current().as_deref(), Some("framework-xyz-999"));
    }

    #[test]
    fn reopening_picks_up_persisted_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id");
        {
            let store = FrameworkIdentityStore::open(&path).unwrap();
            store.remember("framework-abc-123").unwrap();
        }
        let reopened = FrameworkIdentityStore::open(&path).unwrap();
        assert_eq!(reopened.current().as_deref(), Some("framework-abc-123"));
    }
}
