// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rotating log writer.
//!
//! One mutex covers the trigger check, the rotation and the write itself,
//! so concurrent writers never interleave inside a buffer and never write
//! into a file that is being renamed. Compression and pruning run on the
//! housekeeping workers.
//!
//! Tracing events are emitted only after the lock is released: the writer
//! may itself be the sink of the subscriber that receives them. Events
//! raised while a thread is already reporting a rotation are skipped, so a
//! log line about a rotation can never trigger another one.

use crate::config::{
    BackupNaming, CompressionOptions, HousekeepingOptions, LogRotateConfig, RotationPolicy,
};
use crate::error::RotateError;
use crate::fs_ops::{Clock, FileOps, StdFileOps, SystemClock};
use crate::housekeeper::{Housekeeper, HousekeepingContext, HousekeepingSnapshot, Job};
use crate::index::{BackupIndex, ScanResult};
use crate::naming::{BackupFile, BackupPattern};
use crate::rotator::{ActiveState, Rotated, Rotator};
use crate::trigger::{self, RotationReason};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cell::Cell;
use std::fs;
use std::io::{self, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

thread_local! {
    /// Set while this thread reports writer events.
    static PUBLISHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as publishing until dropped.
struct PublishGuard {
    nested: bool,
}

impl PublishGuard {
    fn enter() -> Self {
        Self {
            nested: PUBLISHING.with(|p| p.replace(true)),
        }
    }

    /// Whether an outer frame on this thread is already publishing.
    fn nested(&self) -> bool {
        self.nested
    }
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        if !self.nested {
            PUBLISHING.with(|p| p.set(false));
        }
    }
}

struct WriterState {
    active: ActiveState,
    closed: bool,
}

/// What happened under the state lock, reported after it is released.
#[derive(Default)]
struct Deferred {
    reopened: bool,
    rotation: Option<(Option<RotationReason>, Option<BackupFile>)>,
}

/// Thread-safe rotating file writer.
pub struct LogWriter {
    path: PathBuf,
    policy: RotationPolicy,
    state: Mutex<WriterState>,
    rotator: Rotator,
    index: Arc<Mutex<BackupIndex>>,
    housekeeper: Housekeeper,
    ops: Arc<dyn FileOps>,
    clock: Arc<dyn Clock>,
}

impl LogWriter {
    /// Open a writer with the system clock and file system.
    pub fn open(config: LogRotateConfig) -> Result<Self, RotateError> {
        Self::open_with(config, Arc::new(SystemClock), Arc::new(StdFileOps))
    }

    /// Create a new builder.
    pub fn builder(path: impl Into<PathBuf>) -> LogWriterBuilder {
        LogWriterBuilder {
            config: LogRotateConfig::new(path),
            clock: None,
            ops: None,
        }
    }

    fn open_with(
        config: LogRotateConfig,
        clock: Arc<dyn Clock>,
        ops: Arc<dyn FileOps>,
    ) -> Result<Self, RotateError> {
        config.validate()?;
        let LogRotateConfig {
            path,
            policy,
            naming,
            compression,
            housekeeping,
        } = config;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RotateError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let pattern = BackupPattern::new(&path, &compression.extension);
        let ScanResult { index, leftovers } =
            BackupIndex::scan(pattern).map_err(|source| RotateError::Open {
                path: path.clone(),
                source,
            })?;
        for leftover in &leftovers {
            match ops.remove_file(leftover) {
                Ok(()) => tracing::debug!(path = %leftover.display(), "Removed stale file"),
                Err(e) => {
                    tracing::warn!(path = %leftover.display(), error = %e, "Failed to remove stale file")
                }
            }
        }

        let file = ops.open_append(&path).map_err(|source| RotateError::Open {
            path: path.clone(),
            source,
        })?;
        let meta = file.metadata().map_err(|source| RotateError::Open {
            path: path.clone(),
            source,
        })?;
        let current_size = meta.len();

        let now = clock.now();
        let last_rotation = match index.newest() {
            Some(newest) => newest.age_reference(policy.local_time).min(now),
            // An old non-empty file without backups started at least as
            // early as its last write.
            None if current_size > 0 => meta
                .modified()
                .map(|t| DateTime::<Utc>::from(t).min(now))
                .unwrap_or(now),
            None => now,
        };

        let uncompressed = index.uncompressed();
        let backups = index.len();
        let index = Arc::new(Mutex::new(index));
        let rotator = Rotator::new(naming, policy.local_time, Arc::clone(&index), Arc::clone(&ops));

        let ctx = Arc::new(HousekeepingContext {
            index: Arc::clone(&index),
            policy: policy.clone(),
            compression,
            ops: Arc::clone(&ops),
            clock: Arc::clone(&clock),
        });
        let housekeeper = Housekeeper::spawn(ctx, &housekeeping)?;

        // Prune first so nothing about to be deleted gets compressed.
        let mut dropped = 0usize;
        if policy.has_retention() && !housekeeper.submit(Job::Prune) {
            dropped += 1;
        }
        if policy.compress {
            for backup in uncompressed {
                if !housekeeper.submit(Job::Compress(backup)) {
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Housekeeping queue full, startup jobs dropped");
        }

        tracing::info!(
            path = %path.display(),
            size = current_size,
            backups,
            "Opened rotating log"
        );

        Ok(Self {
            path,
            policy,
            state: Mutex::new(WriterState {
                active: ActiveState {
                    file: Some(file),
                    current_size,
                    last_rotation,
                },
                closed: false,
            }),
            rotator,
            index,
            housekeeper,
            ops,
            clock,
        })
    }

    /// Append `data` to the active file, rotating first if a trigger fires.
    ///
    /// Returns the number of bytes written, which is `data.len()` on success.
    /// A failed rotation writes nothing. A failed write reports how many
    /// bytes reached the file in [`RotateError::written`].
    pub fn write(&self, data: &[u8]) -> Result<usize, RotateError> {
        let mut deferred = Deferred::default();
        let result = {
            let mut state = self.state.lock();
            self.write_locked(&mut state, data, &mut deferred)
        };
        self.publish(deferred);
        result
    }

    fn write_locked(
        &self,
        state: &mut WriterState,
        data: &[u8],
        deferred: &mut Deferred,
    ) -> Result<usize, RotateError> {
        if state.closed {
            return Err(RotateError::Closed);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        let active = &mut state.active;
        if active.file.is_none() {
            self.reopen(active)?;
            deferred.reopened = true;
        }

        let due = trigger::evaluate(
            active.current_size,
            data.len() as u64,
            active.last_rotation,
            now,
            &self.policy,
        );
        if let Some(reason) = due {
            if active.current_size == 0 {
                // Nothing to retire; start the next period here.
                if reason != RotationReason::Size {
                    active.last_rotation = now;
                }
            } else {
                let Rotated { backup, outcome } = self.rotator.rotate(active, now);
                deferred.rotation = Some((Some(reason), backup));
                outcome?;
            }
        }

        self.append(active, data)
    }

    fn append(&self, active: &mut ActiveState, data: &[u8]) -> Result<usize, RotateError> {
        let Some(file) = active.file.as_mut() else {
            return Err(RotateError::Write {
                path: self.path.clone(),
                written: 0,
                source: io::Error::new(io::ErrorKind::NotFound, "no active log file"),
            });
        };

        let mut written = 0;
        while written < data.len() {
            match file.write(&data[written..]) {
                Ok(0) => {
                    return Err(RotateError::Write {
                        path: self.path.clone(),
                        written,
                        source: io::Error::new(io::ErrorKind::WriteZero, "file accepted no bytes"),
                    });
                }
                Ok(n) => {
                    written += n;
                    active.current_size += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(RotateError::Write {
                        path: self.path.clone(),
                        written,
                        source,
                    });
                }
            }
        }
        Ok(written)
    }

    fn reopen(&self, active: &mut ActiveState) -> Result<(), RotateError> {
        let file = self
            .ops
            .open_append(&self.path)
            .map_err(|source| RotateError::Open {
                path: self.path.clone(),
                source,
            })?;
        active.current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        active.file = Some(file);
        Ok(())
    }

    /// Rotate now, regardless of the policy.
    ///
    /// An empty active file is rotated too.
    pub fn rotate(&self) -> Result<(), RotateError> {
        let mut deferred = Deferred::default();
        let result = {
            let mut state = self.state.lock();
            if state.closed {
                Err(RotateError::Closed)
            } else {
                let Rotated { backup, outcome } =
                    self.rotator.rotate(&mut state.active, self.clock.now());
                deferred.rotation = Some((None, backup));
                outcome
            }
        };
        self.publish(deferred);
        result
    }

    /// Log what happened and hand new backups to the housekeeper.
    fn publish(&self, deferred: Deferred) {
        let guard = PublishGuard::enter();
        let quiet = guard.nested();

        if deferred.reopened && !quiet {
            tracing::info!(path = %self.path.display(), "Reopened active log file");
        }

        let Some((reason, backup)) = deferred.rotation else {
            return;
        };
        let Some(backup) = backup else {
            return;
        };

        if !quiet {
            tracing::info!(
                path = %self.path.display(),
                backup = %backup.path.display(),
                reason = ?reason,
                "Rotated log file"
            );
        }

        let mut dropped = 0usize;
        if self.policy.compress && !self.housekeeper.submit(Job::Compress(backup)) {
            dropped += 1;
        }
        if self.policy.has_retention() && !self.housekeeper.submit(Job::Prune) {
            dropped += 1;
        }
        if dropped > 0 && !quiet {
            tracing::warn!(dropped, "Housekeeping queue full, jobs dropped");
        }
    }

    /// Flush and close the active file, then drain housekeeping.
    ///
    /// Idempotent. Later writes fail with [`RotateError::Closed`].
    pub fn close(&self) -> Result<(), RotateError> {
        let result = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            match state.active.file.take() {
                Some(file) => self.ops.sync(&file).map_err(RotateError::Io),
                None => Ok(()),
            }
        };

        self.housekeeper.shutdown();
        tracing::debug!(path = %self.path.display(), "Closed rotating log");
        result
    }

    /// Active file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the active file.
    pub fn current_size(&self) -> u64 {
        self.state.lock().active.current_size
    }

    /// Known backups, oldest first.
    pub fn backups(&self) -> Vec<BackupFile> {
        self.index.lock().snapshot()
    }

    /// Housekeeping counters.
    pub fn housekeeping_stats(&self) -> HousekeepingSnapshot {
        self.housekeeper.stats()
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close log file");
        }
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Write for &LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match LogWriter::write(*self, buf) {
            Ok(n) => Ok(n),
            // Report the partial write; the next call surfaces the error.
            Err(e) if e.written() > 0 => Ok(e.written()),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = &'a LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Cloneable handle to one [`LogWriter`], for code paths that need an
/// owned, `'static` writer (e.g. a `tracing` subscriber).
#[derive(Debug, Clone)]
pub struct SharedLogWriter(Arc<LogWriter>);

impl SharedLogWriter {
    /// Wrap a writer.
    pub fn new(writer: LogWriter) -> Self {
        Self(Arc::new(writer))
    }
}

impl From<LogWriter> for SharedLogWriter {
    fn from(writer: LogWriter) -> Self {
        Self::new(writer)
    }
}

impl Deref for SharedLogWriter {
    type Target = LogWriter;

    fn deref(&self) -> &LogWriter {
        &self.0
    }
}

impl<'a> MakeWriter<'a> for SharedLogWriter {
    type Writer = &'a LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        &self.0
    }
}

/// Builder for [`LogWriter`].
pub struct LogWriterBuilder {
    config: LogRotateConfig,
    clock: Option<Arc<dyn Clock>>,
    ops: Option<Arc<dyn FileOps>>,
}

impl LogWriterBuilder {
    /// Replace the whole configuration (the path included).
    pub fn config(mut self, config: LogRotateConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the rotation policy.
    pub fn policy(mut self, policy: RotationPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Set the backup naming scheme.
    pub fn naming(mut self, naming: BackupNaming) -> Self {
        self.config.naming = naming;
        self
    }

    /// Set compression options.
    pub fn compression(mut self, compression: CompressionOptions) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set housekeeping worker options.
    pub fn housekeeping(mut self, housekeeping: HousekeepingOptions) -> Self {
        self.config.housekeeping = housekeeping;
        self
    }

    /// Use `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use `ops` instead of `std::fs`.
    pub fn file_ops(mut self, ops: Arc<dyn FileOps>) -> Self {
        self.ops = Some(ops);
        self
    }

    /// Open the writer.
    pub fn open(self) -> Result<LogWriter, RotateError> {
        LogWriter::open_with(
            self.config,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.ops.unwrap_or_else(|| Arc::new(StdFileOps)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RotationStage;
    use crate::testing::{FaultPoint, FaultyFileOps, ManualClock};
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn read(path: &Path) -> Vec<u8> {
        fs::read(path).unwrap()
    }

    #[test]
    fn test_size_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::builder(&path)
            .policy(RotationPolicy::by_size(10))
            .naming(BackupNaming::Sequence)
            .open()
            .unwrap();

        assert_eq!(writer.write(b"AAAAAAAA").unwrap(), 8);
        assert_eq!(writer.write(b"BBBB").unwrap(), 4);

        assert_eq!(read(&dir.path().join("app.log.000001")), b"AAAAAAAA");
        assert_eq!(read(&path), b"BBBB");
        assert_eq!(writer.current_size(), 4);
        assert_eq!(writer.backups().len(), 1);
    }

    #[test]
    fn test_oversized_write_lands_in_one_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::builder(&path)
            .policy(RotationPolicy::by_size(10))
            .naming(BackupNaming::Sequence)
            .open()
            .unwrap();

        writer.write(b"0123456789ABCDEF").unwrap();
        assert_eq!(read(&path), b"0123456789ABCDEF");
        assert!(writer.backups().is_empty());

        writer.write(b"x").unwrap();
        assert_eq!(read(&dir.path().join("app.log.000001")), b"0123456789ABCDEF");
        assert_eq!(read(&path), b"x");
    }

    #[test]
    fn test_reopen_keeps_existing_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"123456").unwrap();

        let writer = LogWriter::builder(&path)
            .policy(RotationPolicy::by_size(10))
            .naming(BackupNaming::Sequence)
            .open()
            .unwrap();
        assert_eq!(writer.current_size(), 6);

        writer.write(b"78901").unwrap();
        assert_eq!(read(&dir.path().join("app.log.000001")), b"123456");
        assert_eq!(read(&path), b"78901");
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let writer = LogWriter::open(LogRotateConfig::new(dir.path().join("app.log"))).unwrap();
        writer.write(b"data").unwrap();

        writer.close().unwrap();
        writer.close().unwrap();

        assert!(writer.is_closed());
        assert!(matches!(writer.write(b"late"), Err(RotateError::Closed)));
        assert!(matches!(writer.rotate(), Err(RotateError::Closed)));
        assert_eq!(read(&dir.path().join("app.log")), b"data");
    }

    #[test]
    fn test_interval_rotation_with_manual_clock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let writer = LogWriter::builder(&path)
            .policy(RotationPolicy::by_interval(Duration::from_secs(3600)))
            .clock(clock.clone())
            .open()
            .unwrap();

        writer.write(b"first hour\n").unwrap();
        clock.advance(chrono::Duration::minutes(59));
        writer.write(b"still first\n").unwrap();
        assert!(writer.backups().is_empty());

        clock.advance(chrono::Duration::minutes(1));
        writer.write(b"second hour\n").unwrap();

        let backups = writer.backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].path, dir.path().join("app.log.20240315_110000"));
        assert_eq!(read(&backups[0].path), b"first hour\nstill first\n");
        assert_eq!(read(&path), b"second hour\n");
    }

    #[test]
    fn test_time_trigger_on_empty_file_restarts_period() {
        let dir = TempDir::new().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 23, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let writer = LogWriter::builder(dir.path().join("app.log"))
            .policy(RotationPolicy::daily())
            .clock(clock.clone())
            .open()
            .unwrap();

        clock.advance(chrono::Duration::hours(2));
        writer.write(b"new day\n").unwrap();

        assert!(writer.backups().is_empty());
        assert_eq!(read(&dir.path().join("app.log")), b"new day\n");
    }

    #[test]
    fn test_rename_failure_then_recovery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let ops = Arc::new(FaultyFileOps::new());
        let writer = LogWriter::builder(&path)
            .policy(RotationPolicy::by_size(10))
            .naming(BackupNaming::Sequence)
            .file_ops(ops.clone())
            .open()
            .unwrap();

        writer.write(b"AAAAAAAA").unwrap();
        ops.fail(FaultPoint::Rename, 1);

        let err = writer.write(b"BBBB").unwrap_err();
        assert!(matches!(err, RotateError::Rotate { stage: RotationStage::Rename, .. }));
        assert_eq!(read(&path), b"AAAAAAAA");
        assert_eq!(writer.current_size(), 8);

        writer.write(b"BBBB").unwrap();
        let backups = writer.backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(read(&backups[0].path), b"AAAAAAAA");
        assert_eq!(read(&path), b"BBBB");
    }

    #[test]
    fn test_failed_reopen_heals_on_next_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let ops = Arc::new(FaultyFileOps::new());
        let writer = LogWriter::builder(&path)
            .policy(RotationPolicy::by_size(4))
            .naming(BackupNaming::Sequence)
            .file_ops(ops.clone())
            .open()
            .unwrap();

        writer.write(b"old!").unwrap();
        ops.fail(FaultPoint::CreateFresh, 1);

        let err = writer.write(b"new").unwrap_err();
        assert!(matches!(err, RotateError::Rotate { stage: RotationStage::Reopen, .. }));
        assert_eq!(writer.backups().len(), 1);

        writer.write(b"new").unwrap();
        assert_eq!(read(&path), b"new");
        assert_eq!(read(&dir.path().join("app.log.000001")), b"old!");
    }

    #[test]
    fn test_explicit_rotate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::builder(&path)
            .naming(BackupNaming::Sequence)
            .open()
            .unwrap();

        writer.write(b"before").unwrap();
        writer.rotate().unwrap();
        writer.write(b"after").unwrap();

        assert_eq!(read(&dir.path().join("app.log.000001")), b"before");
        assert_eq!(read(&path), b"after");
    }

    #[test]
    fn test_io_write_impls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut writer = LogWriter::open(LogRotateConfig::new(&path)).unwrap();

        writeln!(writer, "owned {}", 1).unwrap();
        writeln!(&writer, "shared {}", 2).unwrap();
        writer.flush().unwrap();

        assert_eq!(read(&path), b"owned 1\nshared 2\n");
    }

    #[test]
    fn test_shared_writer_as_tracing_sink() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.log");
        let shared = SharedLogWriter::new(
            LogWriter::builder(&path)
                .policy(RotationPolicy::by_size(256))
                .naming(BackupNaming::Sequence)
                .open()
                .unwrap(),
        );

        let subscriber = tracing_subscriber::fmt()
            .with_writer(shared.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::info!(i, "event number");
            }
        });

        let backups = shared.backups();
        assert!(!backups.is_empty());
        let mut all = String::new();
        for backup in &backups {
            all.push_str(&fs::read_to_string(&backup.path).unwrap());
        }
        all.push_str(&fs::read_to_string(&path).unwrap());
        assert_eq!(all.matches("event number").count(), 10);
    }

    #[test]
    fn test_publish_guard_marks_nested_frames() {
        {
            let outer = PublishGuard::enter();
            assert!(!outer.nested());
            {
                let inner = PublishGuard::enter();
                assert!(inner.nested());
            }
            assert!(PUBLISHING.with(|p| p.get()));
        }
        assert!(!PUBLISHING.with(|p| p.get()));
        assert!(!PublishGuard::enter().nested());
    }
}
