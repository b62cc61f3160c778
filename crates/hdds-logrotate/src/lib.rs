// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Log Rotation
//!
//! Append-only log writer that rotates its file by size, interval or
//! calendar day, and keeps retired files compressed and bounded.
//!
//! # Features
//!
//! - **Rotation**: size, fixed interval and daily triggers, combined with OR
//! - **Naming**: timestamped (`app.log.20240315_110000`) or sequence (`app.log.000042`) backups
//! - **Compression**: background gzip with atomic publish (`.gz.tmp` then rename)
//! - **Retention**: keep at most N backups and/or drop backups older than a max age
//! - **Integration**: `std::io::Write` and `tracing_subscriber` `MakeWriter`
//!
//! # Example
//!
//! ```rust,no_run
//! use hdds_logrotate::{LogWriter, RotationPolicy};
//!
//! let policy = RotationPolicy::by_size(10 * 1024 * 1024)
//!     .with_max_backups(5)
//!     .compressed();
//!
//! let writer = LogWriter::builder("logs/app.log").policy(policy).open()?;
//! writer.write(b"service started\n")?;
//! writer.close()?;
//! # Ok::<(), hdds_logrotate::RotateError>(())
//! ```
//!
//! # Layout on disk
//!
//! ```text
//! logs/
//! ├── app.log                        <- active file
//! ├── app.log.20240315_110000        <- newest backup, awaiting compression
//! ├── app.log.20240315_100000.gz
//! └── app.log.20240315_090000.gz     <- oldest, pruned first
//! ```

mod compress;
mod config;
mod error;
mod fs_ops;
mod housekeeper;
mod index;
mod naming;
mod retention;
mod rotator;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod trigger;
mod writer;

pub use compress::{compress_backup, write_archive, Compressed};
pub use config::{
    parse_duration, parse_size, BackupNaming, CompressionOptions, HousekeepingOptions,
    LogRotateConfig, LogRotateConfigBuilder, RotationPolicy, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_QUEUE_CAPACITY,
};
pub use error::{RotateError, RotationStage};
pub use fs_ops::{Clock, FileOps, StdFileOps, SystemClock};
pub use housekeeper::{HousekeepingSnapshot, HousekeepingStats};
pub use index::{BackupIndex, ScanResult};
pub use naming::{BackupFile, BackupPattern, EntryKind, OrderingKey};
pub use retention::{prune, PruneReport};
pub use trigger::{evaluate, should_rotate, RotationReason};
pub use writer::{LogWriter, LogWriterBuilder, SharedLogWriter};
