// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background housekeeping: compression and retention off the write path.
//!
//! ```text
//! LogWriter::write -> rotate -> submit(Job) --try_send--> [bounded queue]
//!                                                              |
//!                                          +-------------------+---------+
//!                                          v                             v
//!                                   hdds-logrotate-0      ...   hdds-logrotate-N
//!                                   compress / prune            compress / prune
//! ```
//!
//! Workers only touch file system paths and the shared [`BackupIndex`];
//! they never take the writer's lock. A full queue drops the job: an
//! uncompressed backup is still a complete backup, and pruning runs again
//! after the next rotation.

use crate::compress;
use crate::config::{CompressionOptions, HousekeepingOptions, RotationPolicy};
use crate::fs_ops::{Clock, FileOps};
use crate::index::BackupIndex;
use crate::naming::BackupFile;
use crate::retention;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Work item for the housekeeping workers.
#[derive(Debug, Clone)]
pub enum Job {
    /// Compress a freshly retired backup.
    Compress(BackupFile),
    /// Apply the retention policy.
    Prune,
}

/// Everything a worker needs, shared by all workers.
pub struct HousekeepingContext {
    pub index: Arc<Mutex<BackupIndex>>,
    pub policy: RotationPolicy,
    pub compression: CompressionOptions,
    pub ops: Arc<dyn FileOps>,
    pub clock: Arc<dyn Clock>,
}

/// Housekeeping counters.
#[derive(Debug, Default)]
pub struct HousekeepingStats {
    /// Jobs accepted by the queue.
    pub jobs_submitted: AtomicU64,
    /// Jobs dropped (queue full or shut down).
    pub jobs_dropped: AtomicU64,
    /// Backups compressed.
    pub files_compressed: AtomicU64,
    /// Compression attempts that failed.
    pub compress_failures: AtomicU64,
    /// Backups deleted by retention.
    pub files_pruned: AtomicU64,
    /// Deletions that failed.
    pub prune_failures: AtomicU64,
}

impl HousekeepingStats {
    /// Get snapshot of counters
    pub fn snapshot(&self) -> HousekeepingSnapshot {
        HousekeepingSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            files_compressed: self.files_compressed.load(Ordering::Relaxed),
            compress_failures: self.compress_failures.load(Ordering::Relaxed),
            files_pruned: self.files_pruned.load(Ordering::Relaxed),
            prune_failures: self.prune_failures.load(Ordering::Relaxed),
        }
    }
}

/// Counters snapshot (for logging/monitoring)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingSnapshot {
    pub jobs_submitted: u64,
    pub jobs_dropped: u64,
    pub files_compressed: u64,
    pub compress_failures: u64,
    pub files_pruned: u64,
    pub prune_failures: u64,
}

/// Bounded work queue plus worker threads.
pub struct Housekeeper {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<HousekeepingStats>,
}

impl Housekeeper {
    /// Spawn the worker threads.
    pub fn spawn(ctx: Arc<HousekeepingContext>, options: &HousekeepingOptions) -> io::Result<Self> {
        let (sender, receiver) = channel::bounded(options.queue_capacity);
        let stats = Arc::new(HousekeepingStats::default());
        let mut handles = Vec::with_capacity(options.workers);

        for id in 0..options.workers {
            let receiver = receiver.clone();
            let ctx = Arc::clone(&ctx);
            let stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("hdds-logrotate-{}", id))
                .spawn(move || run_loop(receiver, ctx, stats))?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            stats,
        })
    }

    /// Queue a job without blocking.
    ///
    /// Returns false if the job was dropped (queue full or shut down). Emits
    /// no events: the caller may be the writer the subscriber logs into.
    pub fn submit(&self, job: Job) -> bool {
        let Some(sender) = self.sender.lock().clone() else {
            self.stats.jobs_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match sender.try_send(job) {
            Ok(()) => {
                self.stats.jobs_submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.stats.jobs_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Close the queue and wait for workers to drain it. Idempotent.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Housekeeping worker panicked");
            }
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> HousekeepingSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(receiver: Receiver<Job>, ctx: Arc<HousekeepingContext>, stats: Arc<HousekeepingStats>) {
    tracing::debug!("Housekeeping worker started");

    // Ends once every sender is dropped and the queue is empty.
    for job in receiver.iter() {
        match job {
            Job::Compress(backup) => compress_job(&ctx, &stats, backup),
            Job::Prune => prune_job(&ctx, &stats),
        }
    }

    tracing::debug!("Housekeeping worker stopped");
}

fn compress_job(ctx: &HousekeepingContext, stats: &HousekeepingStats, backup: BackupFile) {
    if backup.compressed {
        return;
    }

    let pattern = {
        let index = ctx.index.lock();
        if !index.contains(&backup.key) {
            // pruned before we got to it
            return;
        }
        index.pattern().clone()
    };

    let done = match compress::write_archive(&backup.path, &pattern, &ctx.compression) {
        Ok(done) => done,
        Err(e) => {
            stats.compress_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                path = %backup.path.display(),
                error = %e,
                "Compression failed, keeping uncompressed backup"
            );
            return;
        }
    };

    let still_indexed = ctx
        .index
        .lock()
        .mark_compressed(&backup.key, done.archive.clone());

    if !still_indexed {
        // Retention claimed the backup while it was being compressed.
        if let Err(e) = ctx.ops.remove_file(&done.archive) {
            tracing::warn!(path = %done.archive.display(), error = %e, "Failed to remove pruned archive");
        }
        return;
    }

    if let Err(e) = ctx.ops.remove_file(&backup.path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                path = %backup.path.display(),
                error = %e,
                "Failed to remove compressed original"
            );
        }
    }

    stats.files_compressed.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        archive = %done.archive.display(),
        original_bytes = done.original_bytes,
        compressed_bytes = done.compressed_bytes,
        "Compressed backup"
    );
}

fn prune_job(ctx: &HousekeepingContext, stats: &HousekeepingStats) {
    let report = retention::prune(&ctx.index, &ctx.policy, ctx.clock.now(), ctx.ops.as_ref());
    stats
        .files_pruned
        .fetch_add(report.removed.len() as u64, Ordering::Relaxed);
    stats
        .prune_failures
        .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
}
