// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rotation policy and writer configuration.
//!
//! Supports rotation based on:
//! - File size
//! - Elapsed interval since the last rotation
//! - Calendar day change
//!
//! and retention based on backup count and backup age.

use crate::error::RotateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default gzip level (same as `flate2::Compression::default()`).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default housekeeping queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Rotation and retention policy. Zero values disable the matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RotationPolicy {
    /// Rotate when the active file would grow past this many bytes.
    pub max_size_bytes: u64,

    /// Rotate when this many seconds have elapsed since the last rotation.
    pub max_interval_secs: u64,

    /// Rotate when the calendar day changes.
    pub rotate_daily: bool,

    /// Maximum number of backups to keep.
    pub max_backups: u32,

    /// Maximum backup age in seconds.
    pub max_backup_age_secs: u64,

    /// Gzip retired files.
    pub compress: bool,

    /// Use local time for backup timestamps and day boundaries (UTC otherwise).
    pub local_time: bool,
}

impl RotationPolicy {
    /// Size-based rotation.
    pub fn by_size(max_bytes: u64) -> Self {
        Self {
            max_size_bytes: max_bytes,
            ..Default::default()
        }
    }

    /// Interval-based rotation.
    pub fn by_interval(interval: Duration) -> Self {
        Self {
            max_interval_secs: interval.as_secs(),
            ..Default::default()
        }
    }

    /// Rotate at each calendar day change.
    pub fn daily() -> Self {
        Self {
            rotate_daily: true,
            ..Default::default()
        }
    }

    /// Set the size threshold in bytes.
    pub fn with_max_size(mut self, max_bytes: u64) -> Self {
        self.max_size_bytes = max_bytes;
        self
    }

    /// Set the rotation interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.max_interval_secs = interval.as_secs();
        self
    }

    /// Also rotate on calendar day change.
    pub fn with_daily(mut self) -> Self {
        self.rotate_daily = true;
        self
    }

    /// Set maximum number of backups to keep.
    pub fn with_max_backups(mut self, count: u32) -> Self {
        self.max_backups = count;
        self
    }

    /// Set maximum backup age.
    pub fn with_max_backup_age(mut self, age: Duration) -> Self {
        self.max_backup_age_secs = age.as_secs();
        self
    }

    /// Enable compression of rotated files.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Use local time instead of UTC.
    pub fn with_local_time(mut self) -> Self {
        self.local_time = true;
        self
    }

    /// Rotation interval, `None` when disabled.
    pub fn max_interval(&self) -> Option<Duration> {
        (self.max_interval_secs > 0).then(|| Duration::from_secs(self.max_interval_secs))
    }

    /// Maximum backup age, `None` when disabled.
    pub fn max_backup_age(&self) -> Option<Duration> {
        (self.max_backup_age_secs > 0).then(|| Duration::from_secs(self.max_backup_age_secs))
    }

    /// True if any retention rule is active.
    pub fn has_retention(&self) -> bool {
        self.max_backups > 0 || self.max_backup_age_secs > 0
    }
}

/// Ordering key scheme embedded in backup file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupNaming {
    /// `app.log.20240115_143022` (sub-second collisions get `-1`, `-2`, ...).
    #[default]
    Timestamp,
    /// `app.log.000001`, `app.log.000002`, ...
    Sequence,
}

/// Compression settings for retired files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Gzip level (0-9).
    pub level: u32,
    /// Extension appended to compressed backups (without dot).
    pub extension: String,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            extension: "gz".to_string(),
        }
    }
}

/// Background worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingOptions {
    /// Number of worker threads.
    pub workers: usize,
    /// Bounded queue depth; jobs beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for HousekeepingOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Complete writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRotateConfig {
    /// Active log file path.
    pub path: PathBuf,
    /// Rotation and retention policy.
    #[serde(default)]
    pub policy: RotationPolicy,
    /// Backup naming scheme.
    #[serde(default)]
    pub naming: BackupNaming,
    /// Compression settings.
    #[serde(default)]
    pub compression: CompressionOptions,
    /// Background worker settings.
    #[serde(default)]
    pub housekeeping: HousekeepingOptions,
}

impl LogRotateConfig {
    /// Configuration with defaults for `path` (no rotation, no retention).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: RotationPolicy::default(),
            naming: BackupNaming::default(),
            compression: CompressionOptions::default(),
            housekeeping: HousekeepingOptions::default(),
        }
    }

    /// Create a new builder.
    pub fn builder(path: impl Into<PathBuf>) -> LogRotateConfigBuilder {
        LogRotateConfigBuilder {
            config: Self::new(path),
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RotateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RotateError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| RotateError::ConfigFile {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the writer cannot work with.
    pub fn validate(&self) -> Result<(), RotateError> {
        if self.path.as_os_str().is_empty() {
            return Err(RotateError::Config("log path is empty".into()));
        }
        if self.path.file_name().is_none() {
            return Err(RotateError::Config(format!(
                "log path {} has no file name",
                self.path.display()
            )));
        }
        if self.compression.level > 9 {
            return Err(RotateError::Config(format!(
                "compression level {} out of range 0-9",
                self.compression.level
            )));
        }
        let ext = &self.compression.extension;
        if ext.is_empty() || ext.contains(['/', '\\']) || ext.ends_with("tmp") {
            return Err(RotateError::Config(format!(
                "invalid compressed extension {:?}",
                ext
            )));
        }
        if self.housekeeping.workers == 0 {
            return Err(RotateError::Config("housekeeping needs at least one worker".into()));
        }
        if self.housekeeping.queue_capacity == 0 {
            return Err(RotateError::Config("housekeeping queue capacity is zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`LogRotateConfig`].
#[derive(Debug)]
pub struct LogRotateConfigBuilder {
    config: LogRotateConfig,
}

impl LogRotateConfigBuilder {
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

    /// Set gzip level (0-9).
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression.level = level;
        self
    }

    /// Set the compressed file extension.
    pub fn compressed_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.compression.extension = ext.into();
        self
    }

    /// Set the number of housekeeping workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.housekeeping.workers = workers;
        self
    }

    /// Set the housekeeping queue depth.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.housekeeping.queue_capacity = capacity;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<LogRotateConfig, RotateError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse size string like "10M", "100K", "1G".
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();

    let (num, unit) = if let Some(num) = s.strip_suffix('K') {
        (num, 1024)
    } else if let Some(num) = s.strip_suffix('M') {
        (num, 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('G') {
        (num, 1024 * 1024 * 1024)
    } else {
        (s.as_str(), 1)
    };
    num.parse::<u64>().ok()?.checked_mul(unit)
}

/// Parse duration string like "90s", "30m", "12h", "7d" (bare numbers are seconds).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    let (num, unit) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], c),
        Some(_) => (s.as_str(), 's'),
        None => return None,
    };
    let n = num.parse::<u64>().ok()?;
    let secs = match unit {
        's' => n,
        'm' => n.checked_mul(60)?,
        'h' => n.checked_mul(3600)?,
        'd' => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
