//! Backup recorder: durable snapshots of resource metadata, written before
//! the first destructive removal of a run.
//!
//! A backup is a single JSON file carrying the full resource list plus a
//! SHA-256 digest of that list. Filenames embed the run mode, a wall-clock
//! timestamp and a process-wide sequence number, so two snapshots taken
//! within the same second still land in distinct files.

#![allow(missing_docs)]

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::core::errors::{DswError, Result};
use crate::core::resource::{Resource, RunMode};
use crate::scanner::sizing;

/// One persisted pre-removal snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backup {
    pub created_at: DateTime<Utc>,
    pub resource_count: usize,
    pub total_size_bytes: u64,
    /// SHA-256 over the canonical JSON encoding of `resources`.
    pub digest: String,
    pub resources: Vec<Resource>,
}

static BACKUP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes and reads backup snapshots under a fixed directory.
#[derive(Debug, Clone)]
pub struct BackupRecorder {
    dir: PathBuf,
}

impl BackupRecorder {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot the given resources to a new backup file.
    ///
    /// Every failure maps to [`DswError::BackupFailure`] so the caller can
    /// treat it as run-fatal without inspecting the cause.
    pub fn create_backup(&self, mode: RunMode, resources: &[Resource]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|err| DswError::BackupFailure {
            details: format!("cannot create backup dir {}: {err}", self.dir.display()),
        })?;

        let backup = Backup {
            created_at: Utc::now(),
            resource_count: resources.len(),
            total_size_bytes: sizing::total_size(resources),
            digest: resources_digest(resources)?,
            resources: resources.to_vec(),
        };
        let payload =
            serde_json::to_vec_pretty(&backup).map_err(|err| DswError::BackupFailure {
                details: format!("cannot serialize backup: {err}"),
            })?;

        let stamp = backup.created_at.format("%Y%m%dT%H%M%S");
        // The sequence keeps names unique within a second; create_new turns
        // any remaining collision into an error instead of an overwrite.
        for _ in 0..8 {
            let seq = BACKUP_SEQ.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join(format!("backup-{mode}-{stamp}-{seq:04}.json"));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(&payload)
                        .map_err(|err| DswError::BackupFailure {
                            details: format!("cannot write {}: {err}", path.display()),
                        })?;
                    info!(
                        path = %path.display(),
                        resources = backup.resource_count,
                        bytes = backup.total_size_bytes,
                        "backup written"
                    );
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => {
                    return Err(DswError::BackupFailure {
                        details: format!("cannot create {}: {err}", path.display()),
                    });
                }
            }
        }

        Err(DswError::BackupFailure {
            details: format!("no free backup filename under {}", self.dir.display()),
        })
    }

    /// Paths of all backups in this directory, oldest first.
    ///
    /// The timestamp-plus-sequence naming makes lexicographic order
    /// chronological.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(DswError::io(&self.dir, err)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("backup-") && n.ends_with(".json"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

/// Reload a backup file, verifying its digest against the stored resources.
pub fn load_backup(path: &Path) -> Result<Backup> {
    let raw = fs::read_to_string(path).map_err(|err| DswError::io(path, err))?;
    let backup: Backup = serde_json::from_str(&raw).map_err(|err| DswError::BackupCorrupt {
        path: path.to_path_buf(),
        details: format!("not a valid backup: {err}"),
    })?;

    let expected = resources_digest(&backup.resources)?;
    if backup.digest != expected {
        return Err(DswError::BackupCorrupt {
            path: path.to_path_buf(),
            details: "digest mismatch, resource list was altered".to_string(),
        });
    }
    Ok(backup)
}

fn resources_digest(resources: &[Resource]) -> Result<String> {
    let canonical = serde_json::to_vec(resources).map_err(|err| DswError::BackupFailure {
        details: format!("cannot serialize resources for digest: {err}"),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use crate::core::resource::ResourceDetails;

    fn volume(name: &str, size_bytes: u64) -> Resource {
        Resource {
            id: name.to_string(),
            name: name.to_string(),
            size_bytes,
            created_at: Utc::now(),
            last_used_at: None,
            tags: BTreeSet::new(),
            details: ResourceDetails::Volume {
                mount_point: format!("/var/lib/docker/volumes/{name}/_data"),
                used_by: vec![],
            },
        }
    }

    #[test]
    fn backup_roundtrip_preserves_count_and_size() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path());
        let resources = vec![volume("a", 100), volume("b", 250)];

        let path = recorder
            .create_backup(RunMode::Destructive, &resources)
            .expect("create");
        assert!(path.exists());

        let loaded = load_backup(&path).expect("load");
        assert_eq!(loaded.resource_count, 2);
        assert_eq!(loaded.total_size_bytes, 350);
        assert_eq!(loaded.resources, resources);
    }

    #[test]
    fn rapid_backups_get_distinct_paths() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path());
        let resources = vec![volume("a", 1)];

        let first = recorder
            .create_backup(RunMode::Destructive, &resources)
            .expect("first");
        let second = recorder
            .create_backup(RunMode::Destructive, &resources)
            .expect("second");
        let third = recorder
            .create_backup(RunMode::Destructive, &resources)
            .expect("third");

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(recorder.list_backups().expect("list").len(), 3);
    }

    #[test]
    fn filenames_carry_mode_stamp_and_sequence() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path());

        let path = recorder
            .create_backup(RunMode::Destructive, &[volume("a", 1)])
            .expect("create");

        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("backup-destructive-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn empty_resource_list_is_a_valid_backup() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path());

        let path = recorder.create_backup(RunMode::Destructive, &[]).expect("create");
        let loaded = load_backup(&path).expect("load");
        assert_eq!(loaded.resource_count, 0);
        assert_eq!(loaded.total_size_bytes, 0);
    }

    #[test]
    fn create_backup_bootstraps_missing_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let nested = tmp.path().join("deep").join("backups");
        let recorder = BackupRecorder::new(&nested);

        recorder
            .create_backup(RunMode::Destructive, &[volume("a", 1)])
            .expect("create");
        assert!(nested.is_dir());
    }

    #[test]
    fn unwritable_directory_fails_closed() {
        // A regular file where the directory should be.
        let tmp = TempDir::new().expect("tempdir");
        let blocker = tmp.path().join("backups");
        fs::write(&blocker, b"file, not dir").expect("write blocker");

        let recorder = BackupRecorder::new(&blocker);
        let err = recorder
            .create_backup(RunMode::Destructive, &[volume("a", 1)])
            .expect_err("must fail");
        assert_eq!(err.code(), "DSW-3001");
        assert!(err.is_run_fatal());
    }

    #[test]
    fn load_missing_file_reports_io() {
        let err = load_backup(Path::new("/nonexistent/backup-x.json")).expect_err("must fail");
        assert_eq!(err.code(), "DSW-5002");
    }

    #[test]
    fn load_garbage_reports_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("backup-garbage.json");
        fs::write(&path, "{not-json").expect("write");

        let err = load_backup(&path).expect_err("must fail");
        assert_eq!(err.code(), "DSW-3002");
    }

    #[test]
    fn tampered_resources_fail_digest_check() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path());
        let path = recorder
            .create_backup(RunMode::Destructive, &[volume("a", 100)])
            .expect("create");

        let raw = fs::read_to_string(&path).expect("read");
        let tampered = raw.replace("\"size_bytes\": 100", "\"size_bytes\": 999");
        assert_ne!(raw, tampered, "replacement must hit");
        fs::write(&path, tampered).expect("rewrite");

        let err = load_backup(&path).expect_err("must fail");
        assert_eq!(err.code(), "DSW-3002");
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn list_backups_on_missing_directory_is_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path().join("never-created"));
        assert!(recorder.list_backups().expect("list").is_empty());
    }

    #[test]
    fn list_backups_ignores_foreign_files() {
        let tmp = TempDir::new().expect("tempdir");
        let recorder = BackupRecorder::new(tmp.path());
        recorder
            .create_backup(RunMode::Destructive, &[volume("a", 1)])
            .expect("create");
        fs::write(tmp.path().join("notes.txt"), b"x").expect("write");
        fs::write(tmp.path().join("report-1.json"), b"{}").expect("write");

        assert_eq!(recorder.list_backups().expect("list").len(), 1);
    }
}
