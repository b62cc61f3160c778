// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backup retention: count- and age-based pruning.

use crate::config::RotationPolicy;
use crate::fs_ops::FileOps;
use crate::index::BackupIndex;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;

/// Outcome of one pruning pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Backups deleted (or already gone).
    pub removed: Vec<PathBuf>,
    /// Backups that could not be deleted.
    pub failed: Vec<PathBuf>,
}

/// Delete backups that violate `policy`.
///
/// Victims are claimed from the index under its lock and deleted after the
/// lock is released. A failed deletion is logged and the backup is put back
/// into the index, so the next pass tries again.
pub fn prune(
    index: &Mutex<BackupIndex>,
    policy: &RotationPolicy,
    now: DateTime<Utc>,
    ops: &dyn FileOps,
) -> PruneReport {
    if !policy.has_retention() {
        return PruneReport::default();
    }

    let victims = index.lock().claim_expired(policy, now);
    let mut report = PruneReport::default();
    let mut retained = Vec::new();

    for backup in victims {
        match ops.remove_file(&backup.path) {
            Ok(()) => {
                tracing::debug!(path = %backup.path.display(), "Removed expired backup");
                report.removed.push(backup.path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report.removed.push(backup.path);
            }
            Err(e) => {
                tracing::warn!(
                    path = %backup.path.display(),
                    error = %e,
                    "Failed to remove expired backup"
                );
                report.failed.push(backup.path.clone());
                retained.push(backup);
            }
        }
    }

    if !retained.is_empty() {
        index.lock().restore(retained);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::StdFileOps;
    use crate::naming::{BackupFile, BackupPattern, OrderingKey};
    use crate::testing::{FaultPoint, FaultyFileOps};
    use tempfile::TempDir;

    fn seeded(dir: &TempDir, count: u64) -> Mutex<BackupIndex> {
        let pattern = BackupPattern::new(&dir.path().join("app.log"), "gz");
        let mut index = BackupIndex::new(pattern);
        for n in 1..=count {
            let key = OrderingKey::Sequence(n);
            let path = index.pattern().backup_path(&key);
            std::fs::write(&path, format!("backup {n}")).unwrap();
            index.push(BackupFile {
                path,
                key,
                compressed: false,
                mod_time: Utc::now(),
            });
        }
        Mutex::new(index)
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir, 5);
        let policy = RotationPolicy::default().with_max_backups(2);

        let report = prune(&index, &policy, Utc::now(), &StdFileOps);

        assert_eq!(report.removed.len(), 3);
        assert!(report.failed.is_empty());
        assert!(!dir.path().join("app.log.000003").exists());
        assert!(dir.path().join("app.log.000004").exists());
        assert!(dir.path().join("app.log.000005").exists());
        assert_eq!(index.lock().len(), 2);
    }

    #[test]
    fn test_prune_without_retention_is_noop() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir, 3);

        let report = prune(&index, &RotationPolicy::default(), Utc::now(), &StdFileOps);

        assert_eq!(report, PruneReport::default());
        assert_eq!(index.lock().len(), 3);
    }

    #[test]
    fn test_prune_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir, 4);
        let policy = RotationPolicy::default().with_max_backups(1);
        let ops = FaultyFileOps::new();
        ops.fail(FaultPoint::Remove, 1);

        let report = prune(&index, &policy, Utc::now(), &ops);

        assert_eq!(report.failed, vec![dir.path().join("app.log.000001")]);
        assert_eq!(report.removed.len(), 2);
        assert!(dir.path().join("app.log.000001").exists());
        assert!(!dir.path().join("app.log.000002").exists());
        assert!(!dir.path().join("app.log.000003").exists());
        assert_eq!(index.lock().len(), 2);

        // The backup that could not be deleted is retried on the next pass.
        let report = prune(&index, &policy, Utc::now(), &ops);
        assert_eq!(report.removed, vec![dir.path().join("app.log.000001")]);
        assert!(report.failed.is_empty());
        assert!(!dir.path().join("app.log.000001").exists());
        assert_eq!(index.lock().len(), 1);
    }

    #[test]
    fn test_prune_tolerates_missing_files() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir, 2);
        std::fs::remove_file(dir.path().join("app.log.000001")).unwrap();
        let policy = RotationPolicy::default().with_max_backups(1);

        let report = prune(&index, &policy, Utc::now(), &StdFileOps);

        assert_eq!(report.removed, vec![dir.path().join("app.log.000001")]);
        assert!(report.failed.is_empty());
    }
}
