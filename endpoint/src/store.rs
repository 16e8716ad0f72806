// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Directory-backed endpoint record store.
//!
//! One file per endpoint key, `<dir>/<key>.ep`. Writes go through a temporary
//! file in the same directory and are renamed into place, so a concurrent
//! reader never observes a partially-written record.

use crate::EndpointDescriptor;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Suffix of every record file this store manages.
pub const RECORD_SUFFIX: &str = "ep";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create record directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode endpoint record {path:?}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write endpoint record {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read endpoint record {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode endpoint record {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to delete endpoint record {path:?}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Store for endpoint records under one base directory.
///
/// Keys are opaque, path-safe tokens (port ids or external-segment names);
/// the key-to-path mapping is the identity plus the record suffix, which
/// keeps it deterministic and collision-free.
#[derive(Debug, Clone)]
pub struct EndpointFileStore {
    dir: PathBuf,
}

impl EndpointFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_SUFFIX}"))
    }

    /// Write (or overwrite) the record for `key`.
    pub fn write(&self, key: &str, endpoint: &EndpointDescriptor) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        serde_json::to_writer(tmp.as_file_mut(), endpoint).map_err(|source| {
            StoreError::Encode {
                path: path.clone(),
                source,
            }
        })?;
        tmp.persist(&path).map_err(|err| StoreError::Write {
            path: path.clone(),
            source: err.error,
        })?;
        debug!("wrote endpoint record for '{key}'");
        Ok(())
    }

    /// Read the record for `key` back. Used by tests and recovery tooling;
    /// the mapper itself treats its in-memory state as authoritative.
    pub fn read(&self, key: &str) -> Result<EndpointDescriptor, StoreError> {
        let path = self.path_for(key);
        let bytes = fs::read(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { path, source })
    }

    /// Remove the record for `key`. Absence is not an error.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("deleted endpoint record for '{key}'");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Delete { path, source }),
        }
    }

    /// Remove every record in the directory. Startup recovery: after a
    /// restart the in-memory state is the sole source of truth, so stale
    /// records from the previous run must go. Per-file failures are logged
    /// and skipped. Returns the number of records removed.
    pub fn purge_all(&self) -> Result<usize, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Read {
            path: self.dir.clone(),
            source,
        })?;
        let mut removed = 0;
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != RECORD_SUFFIX) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!("failed to remove stale endpoint record {}: {err}", path.display());
                }
            }
        }
        if removed > 0 {
            info!("purged {removed} stale endpoint record(s) from {}", self.dir.display());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint_group_name;
    use pretty_assertions::assert_eq;

    fn sample(uuid: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            policy_space: "common".to_string(),
            endpoint_group: endpoint_group_name("app1", "web"),
            interface: "tapvif1".to_string(),
            ip: vec!["10.0.0.4".parse().unwrap(), "fd00::4".parse().unwrap()],
            mac: "fa:16:3e:aa:bb:cc".to_string(),
            uuid: uuid.to_string(),
            promiscuous: false,
            attributes: None,
            ip_address_mapping: Vec::new(),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointFileStore::new(dir.path()).unwrap();
        let endpoint = sample("eth0vif1");
        store.write("eth0vif1", &endpoint).unwrap();
        assert_eq!(store.read("eth0vif1").unwrap(), endpoint);

        // rewriting identical content produces byte-identical records
        let first = fs::read(store.path_for("eth0vif1")).unwrap();
        store.write("eth0vif1", &endpoint).unwrap();
        let second = fs::read(store.path_for("eth0vif1")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn write_leaves_no_temporary_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointFileStore::new(dir.path()).unwrap();
        store.write("a", &sample("a")).unwrap();
        store.write("b", &sample("b")).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".ep")));
    }

    #[test]
    fn overwrite_replaces_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointFileStore::new(dir.path()).unwrap();
        store.write("k", &sample("one")).unwrap();
        store.write("k", &sample("two")).unwrap();
        assert_eq!(store.read("k").unwrap().uuid, "two");
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointFileStore::new(dir.path()).unwrap();
        store.write("k", &sample("k")).unwrap();
        store.delete("k").unwrap();
        assert!(store.read("k").is_err());
        store.delete("k").unwrap();
    }

    #[test]
    fn purge_removes_only_record_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EndpointFileStore::new(dir.path()).unwrap();
        store.write("a", &sample("a")).unwrap();
        store.write("b", &sample("b")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
        assert_eq!(store.purge_all().unwrap(), 2);
        assert!(store.read("a").is_err());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(store.purge_all().unwrap(), 0);
    }

    #[test]
    fn new_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("endpoints");
        let store = EndpointFileStore::new(&nested).unwrap();
        assert!(nested.is_dir());
        store.write("k", &sample("k")).unwrap();
        assert!(store.path_for("k").exists());
    }
}
