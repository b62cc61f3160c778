// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File system and clock abstraction.
//!
//! The writer and housekeeping code reach the file system through
//! [`FileOps`] and read time through [`Clock`], so rotation failures and
//! time-based triggers can be exercised without real faults or sleeps.

use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// File system operations used by rotation and housekeeping.
pub trait FileOps: Send + Sync {
    /// Open `path` for appending, creating it if missing.
    fn open_append(&self, path: &Path) -> io::Result<File>;

    /// Open `path` as a fresh empty file in append mode.
    fn create_fresh(&self, path: &Path) -> io::Result<File>;

    /// Flush file contents to disk before the handle is dropped.
    fn sync(&self, file: &File) -> io::Result<()>;

    /// Rename `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// True if something exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// [`FileOps`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn open_append(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn create_fresh(&self, path: &Path) -> io::Result<File> {
        // append and truncate cannot be combined in OpenOptions
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > 0 {
            file.set_len(0)?;
        }
        Ok(file)
    }

    fn sync(&self, file: &File) -> io::Result<()> {
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Time source for triggers, naming and retention.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
