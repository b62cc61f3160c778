// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory index of backup files.
//!
//! The index is the source of truth for ordering, retention and key
//! allocation while the writer runs. The rotator appends to it, the
//! compressor updates entries in place and retention claims entries out of
//! it. The directory is only listed once, at startup, to rebuild it.

use crate::config::{BackupNaming, RotationPolicy};
use crate::naming::{BackupFile, BackupPattern, EntryKind, OrderingKey};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// Result of the startup directory scan.
#[derive(Debug)]
pub struct ScanResult {
    /// Rebuilt index.
    pub index: BackupIndex,
    /// Files to delete: interrupted compression output, and originals whose
    /// archive was completed before a crash.
    pub leftovers: Vec<PathBuf>,
}

/// Ordered (oldest first) list of known backups.
#[derive(Debug)]
pub struct BackupIndex {
    pattern: BackupPattern,
    entries: Vec<BackupFile>,
    last_issued: Option<OrderingKey>,
}

impl BackupIndex {
    /// Empty index for `pattern`.
    pub fn new(pattern: BackupPattern) -> Self {
        Self {
            pattern,
            entries: Vec::new(),
            last_issued: None,
        }
    }

    /// Rebuild the index from the backup directory.
    pub fn scan(pattern: BackupPattern) -> io::Result<ScanResult> {
        let mut entries: Vec<BackupFile> = Vec::new();
        let mut leftovers = Vec::new();

        let dir = match std::fs::read_dir(pattern.dir()) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ScanResult {
                    index: Self::new(pattern),
                    leftovers,
                });
            }
            Err(e) => return Err(e),
        };

        for entry in dir {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let path = entry.path();

            match pattern.classify(&name) {
                EntryKind::Unrelated => {}
                EntryKind::TempArchive => leftovers.push(path),
                EntryKind::Backup { key, compressed } => {
                    let meta = entry.metadata()?;
                    if !meta.is_file() {
                        continue;
                    }
                    let mod_time = meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    entries.push(BackupFile {
                        path,
                        key,
                        compressed,
                        mod_time,
                    });
                }
            }
        }

        // A key present both plain and compressed means the process stopped
        // between publishing the archive and removing the original.
        entries.sort_by(|a, b| a.key.cmp(&b.key).then(b.compressed.cmp(&a.compressed)));
        let mut deduped: Vec<BackupFile> = Vec::with_capacity(entries.len());
        for backup in entries {
            match deduped.last() {
                Some(prev) if prev.key == backup.key => leftovers.push(backup.path),
                _ => deduped.push(backup),
            }
        }

        let mixed = deduped
            .windows(2)
            .any(|w| w[0].key.is_timestamp() != w[1].key.is_timestamp());
        if mixed {
            // Sequence and timestamp keys do not compare; use mtime.
            deduped.sort_by(|a, b| a.mod_time.cmp(&b.mod_time).then(a.key.cmp(&b.key)));
        }

        Ok(ScanResult {
            index: Self {
                pattern,
                entries: deduped,
                last_issued: None,
            },
            leftovers,
        })
    }

    /// Naming pattern for this index.
    pub fn pattern(&self) -> &BackupPattern {
        &self.pattern
    }

    /// Allocate the key for the next backup.
    ///
    /// The key is strictly greater than any key issued or indexed so far, and
    /// neither its plain nor its compressed path exists according to `exists`.
    pub fn next_key(
        &mut self,
        naming: BackupNaming,
        now: NaiveDateTime,
        exists: impl Fn(&Path) -> bool,
    ) -> OrderingKey {
        let mut key = match naming {
            BackupNaming::Timestamp => {
                let now = now.with_nanosecond(0).unwrap_or(now);
                match self.highest(true) {
                    Some(OrderingKey::Timestamp { at, sub }) if now <= at => {
                        OrderingKey::Timestamp { at, sub: sub + 1 }
                    }
                    _ => OrderingKey::Timestamp { at: now, sub: 0 },
                }
            }
            BackupNaming::Sequence => match self.highest(false) {
                Some(OrderingKey::Sequence(n)) => OrderingKey::Sequence(n + 1),
                _ => OrderingKey::Sequence(1),
            },
        };

        loop {
            let path = self.pattern.backup_path(&key);
            if !exists(&path) && !exists(&self.pattern.compressed_path(&path)) {
                break;
            }
            key = match key {
                OrderingKey::Timestamp { at, sub } => OrderingKey::Timestamp { at, sub: sub + 1 },
                OrderingKey::Sequence(n) => OrderingKey::Sequence(n + 1),
            };
        }

        self.last_issued = Some(key);
        key
    }

    fn highest(&self, timestamp: bool) -> Option<OrderingKey> {
        self.entries
            .iter()
            .map(|b| b.key)
            .chain(self.last_issued)
            .filter(|k| k.is_timestamp() == timestamp)
            .max()
    }

    /// Register a freshly rotated backup as the newest entry.
    pub fn push(&mut self, backup: BackupFile) {
        self.entries.push(backup);
    }

    /// True if a backup with `key` is indexed.
    pub fn contains(&self, key: &OrderingKey) -> bool {
        self.entries.iter().any(|b| &b.key == key)
    }

    /// Point the entry for `key` at its compressed archive.
    ///
    /// Returns false if the entry is gone (pruned meanwhile).
    pub fn mark_compressed(&mut self, key: &OrderingKey, archive: PathBuf) -> bool {
        match self.entries.iter_mut().find(|b| &b.key == key) {
            Some(entry) => {
                entry.path = archive;
                entry.compressed = true;
                true
            }
            None => false,
        }
    }

    /// Backups still waiting for compression, oldest first.
    pub fn uncompressed(&self) -> Vec<BackupFile> {
        self.entries.iter().filter(|b| !b.compressed).cloned().collect()
    }

    /// Remove and return the backups that violate the retention policy.
    ///
    /// A backup is claimed if it is beyond `max_backups` (oldest first) or
    /// older than `max_backup_age`. Claimed entries are no longer indexed,
    /// so a compression finishing later discards its archive.
    pub fn claim_expired(&mut self, policy: &RotationPolicy, now: DateTime<Utc>) -> Vec<BackupFile> {
        let len = self.entries.len();
        let over_count = if policy.max_backups > 0 {
            len.saturating_sub(policy.max_backups as usize)
        } else {
            0
        };
        let cutoff = policy
            .max_backup_age()
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| now.checked_sub_signed(age));

        let (victims, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .enumerate()
            .partition(|(i, backup)| {
                *i < over_count
                    || cutoff.is_some_and(|c| backup.age_reference(policy.local_time) < c)
            });

        self.entries = keep.into_iter().map(|(_, b)| b).collect();
        victims.into_iter().map(|(_, b)| b).collect()
    }

    /// Put back claimed backups that could not be deleted.
    ///
    /// They were the oldest entries when claimed, so they go back in front,
    /// in their original order, and the next pruning pass retries them.
    pub fn restore(&mut self, backups: Vec<BackupFile>) {
        let mut entries: Vec<_> = backups
            .into_iter()
            .filter(|b| !self.contains(&b.key))
            .collect();
        entries.append(&mut self.entries);
        self.entries = entries;
    }

    /// Newest backup, if any.
    pub fn newest(&self) -> Option<&BackupFile> {
        self.entries.last()
    }

    /// Number of indexed backups.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no backup is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of all entries, oldest first.
    pub fn snapshot(&self) -> Vec<BackupFile> {
        self.entries.clone()
    }
}
