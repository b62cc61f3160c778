// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Active file rotation.
//!
//! ```text
//! app.log (open) --sync/close--> app.log --rename--> app.log.<key>
//!                                                      |
//!                     app.log (fresh, empty) <--open---+
//! ```
//!
//! Runs inside the writer's critical section. Compression and pruning of
//! the new backup are scheduled by the writer once the section is left.

use crate::config::BackupNaming;
use crate::error::{RotateError, RotationStage};
use crate::fs_ops::FileOps;
use crate::index::BackupIndex;
use crate::naming::{BackupFile, BackupPattern};
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use std::fs::File;
use std::sync::Arc;

/// Mutable state of the active file, owned by the writer.
#[derive(Debug)]
pub struct ActiveState {
    /// Open handle; `None` after a failed reopen.
    pub file: Option<File>,
    /// Bytes in the open file.
    pub current_size: u64,
    /// Time of the last successful rotation.
    pub last_rotation: DateTime<Utc>,
}

/// Result of a rotation attempt.
#[derive(Debug)]
pub struct Rotated {
    /// Backup created by the rename, also present when reopening failed.
    pub backup: Option<BackupFile>,
    /// Overall outcome.
    pub outcome: Result<(), RotateError>,
}

/// Performs close/rename/reopen of the active file.
pub struct Rotator {
    pattern: BackupPattern,
    naming: BackupNaming,
    local_time: bool,
    index: Arc<Mutex<BackupIndex>>,
    ops: Arc<dyn FileOps>,
}

impl Rotator {
    /// Create a rotator registering backups in `index`.
    pub fn new(
        naming: BackupNaming,
        local_time: bool,
        index: Arc<Mutex<BackupIndex>>,
        ops: Arc<dyn FileOps>,
    ) -> Self {
        let pattern = index.lock().pattern().clone();
        Self {
            pattern,
            naming,
            local_time,
            index,
            ops,
        }
    }

    /// Rotate the active file.
    ///
    /// - close fails: the handle is kept, nothing is renamed
    /// - rename fails: `basePath` is reopened for append and keeps its content
    /// - reopen fails: the backup exists, the writer has no active file
    pub fn rotate(&self, active: &mut ActiveState, now: DateTime<Utc>) -> Rotated {
        let base = self.pattern.base();

        if let Some(file) = active.file.take() {
            if let Err(source) = self.ops.sync(&file) {
                active.file = Some(file);
                return Rotated {
                    backup: None,
                    outcome: Err(self.failure(RotationStage::Close, source)),
                };
            }
            drop(file);
        }

        let backup = if self.ops.exists(base) {
            match self.retire(now) {
                Ok(backup) => Some(backup),
                Err(source) => {
                    self.restore(active);
                    return Rotated {
                        backup: None,
                        outcome: Err(self.failure(RotationStage::Rename, source)),
                    };
                }
            }
        } else {
            None
        };

        let outcome = match self.ops.create_fresh(base) {
            Ok(file) => {
                active.file = Some(file);
                active.current_size = 0;
                active.last_rotation = now;
                Ok(())
            }
            Err(source) => {
                active.file = None;
                Err(self.failure(RotationStage::Reopen, source))
            }
        };

        Rotated { backup, outcome }
    }

    /// Rename the closed active file to a new backup name and index it.
    fn retire(&self, now: DateTime<Utc>) -> std::io::Result<BackupFile> {
        let stamp = if self.local_time {
            now.with_timezone(&Local).naive_local()
        } else {
            now.naive_utc()
        };

        let mut index = self.index.lock();
        let key = index.next_key(self.naming, stamp, |p| self.ops.exists(p));
        let path = self.pattern.backup_path(&key);
        self.ops.rename(self.pattern.base(), &path)?;

        let backup = BackupFile {
            path,
            key,
            compressed: false,
            mod_time: now,
        };
        index.push(backup.clone());
        Ok(backup)
    }

    /// Point the writer back at the old file after a failed rename.
    fn restore(&self, active: &mut ActiveState) {
        match self.ops.open_append(self.pattern.base()) {
            Ok(file) => {
                if let Ok(meta) = file.metadata() {
                    active.current_size = meta.len();
                }
                active.file = Some(file);
            }
            Err(_) => active.file = None,
        }
    }

    fn failure(&self, stage: RotationStage, source: std::io::Error) -> RotateError {
        RotateError::Rotate {
            stage,
            path: self.pattern.base().to_path_buf(),
            source,
        }
    }
}
