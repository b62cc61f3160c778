// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Test doubles for [`FileOps`] and [`Clock`].
//!
//! Compiled for unit tests and, outside the crate, only with the `testing`
//! feature.

use crate::fs_ops::{Clock, FileOps, StdFileOps};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Operation that [`FaultyFileOps`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Sync,
    Rename,
    CreateFresh,
    OpenAppend,
    Remove,
}

/// [`FileOps`] that injects failures into selected operations.
///
/// Each armed fault fails the next `n` calls of its operation with
/// `PermissionDenied`, then falls through to [`StdFileOps`].
#[derive(Debug, Default)]
pub struct FaultyFileOps {
    sync: AtomicU32,
    rename: AtomicU32,
    create_fresh: AtomicU32,
    open_append: AtomicU32,
    remove: AtomicU32,
}

impl FaultyFileOps {
    /// No faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `point`.
    pub fn fail(&self, point: FaultPoint, times: u32) {
        self.counter(point).store(times, Ordering::SeqCst);
    }

    /// Remaining armed failures for `point`.
    pub fn pending(&self, point: FaultPoint) -> u32 {
        self.counter(point).load(Ordering::SeqCst)
    }

    fn counter(&self, point: FaultPoint) -> &AtomicU32 {
        match point {
            FaultPoint::Sync => &self.sync,
            FaultPoint::Rename => &self.rename,
            FaultPoint::CreateFresh => &self.create_fresh,
            FaultPoint::OpenAppend => &self.open_append,
            FaultPoint::Remove => &self.remove,
        }
    }

    fn trip(&self, point: FaultPoint) -> io::Result<()> {
        let armed = self
            .counter(point)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {:?} failure", point),
            ))
        } else {
            Ok(())
        }
    }
}

impl FileOps for FaultyFileOps {
    fn open_append(&self, path: &Path) -> io::Result<File> {
        self.trip(FaultPoint::OpenAppend)?;
        StdFileOps.open_append(path)
    }

    fn create_fresh(&self, path: &Path) -> io::Result<File> {
        self.trip(FaultPoint::CreateFresh)?;
        StdFileOps.create_fresh(path)
    }

    fn sync(&self, file: &File) -> io::Result<()> {
        self.trip(FaultPoint::Sync)?;
        StdFileOps.sync(file)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.trip(FaultPoint::Rename)?;
        StdFileOps.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.trip(FaultPoint::Remove)?;
        StdFileOps.remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        StdFileOps.exists(path)
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for negative deltas).
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
