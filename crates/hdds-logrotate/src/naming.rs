// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backup file naming.
//!
//! ```text
//! app.log                       active file
//! app.log.20240115_143022       timestamp key
//! app.log.20240115_143022-1     second rotation within the same second
//! app.log.20240115_143022.gz    compressed backup
//! app.log.000042                sequence key
//! app.log.000042.gz.tmp         compression in progress (never a backup)
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;
const SEQUENCE_WIDTH: usize = 6;
const TEMP_SUFFIX: &str = ".tmp";

/// Ordering key embedded in a backup file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderingKey {
    /// Rotation time (second resolution) plus a collision counter.
    Timestamp { at: NaiveDateTime, sub: u32 },
    /// Monotonic sequence number.
    Sequence(u64),
}

impl OrderingKey {
    /// Parse a key from its file name rendering.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s.parse().ok().map(Self::Sequence);
        }

        let (ts, sub) = match s.split_once('-') {
            Some((ts, sub)) if !sub.is_empty() && sub.bytes().all(|b| b.is_ascii_digit()) => {
                (ts, sub.parse().ok()?)
            }
            Some(_) => return None,
            None => (s, 0),
        };
        if ts.len() != TIMESTAMP_LEN {
            return None;
        }
        let at = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
        Some(Self::Timestamp { at, sub })
    }

    /// True for timestamp keys.
    pub fn is_timestamp(&self) -> bool {
        matches!(self, Self::Timestamp { .. })
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp { at, sub: 0 } => write!(f, "{}", at.format(TIMESTAMP_FORMAT)),
            Self::Timestamp { at, sub } => write!(f, "{}-{}", at.format(TIMESTAMP_FORMAT), sub),
            Self::Sequence(n) => write!(f, "{:0width$}", n, width = SEQUENCE_WIDTH),
        }
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingKey {
    /// Keys of the same kind compare by value; sequence keys sort before
    /// timestamp keys (callers mixing kinds fall back to modification time).
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Timestamp { at: a, sub: sa }, Self::Timestamp { at: b, sub: sb }) => {
                a.cmp(b).then(sa.cmp(sb))
            }
            (Self::Sequence(a), Self::Sequence(b)) => a.cmp(b),
            (Self::Sequence(_), Self::Timestamp { .. }) => Ordering::Less,
            (Self::Timestamp { .. }, Self::Sequence(_)) => Ordering::Greater,
        }
    }
}

/// A retired log file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Current location (changes when compressed).
    pub path: PathBuf,
    /// Ordering key from the file name.
    pub key: OrderingKey,
    /// Whether the file is a compressed archive.
    pub compressed: bool,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
}

impl BackupFile {
    /// Point in time used for age-based retention.
    ///
    /// Timestamp keys carry the rotation time; sequence keys (and local
    /// timestamps that fall into a DST gap) use the modification time.
    pub fn age_reference(&self, local_time: bool) -> DateTime<Utc> {
        match self.key {
            OrderingKey::Timestamp { at, .. } if local_time => Local
                .from_local_datetime(&at)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(self.mod_time),
            OrderingKey::Timestamp { at, .. } => Utc.from_utc_datetime(&at),
            OrderingKey::Sequence(_) => self.mod_time,
        }
    }
}

/// Classification of a directory entry next to the active file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A backup with its key and compression flag.
    Backup { key: OrderingKey, compressed: bool },
    /// Leftover output of an interrupted compression.
    TempArchive,
    /// Not ours.
    Unrelated,
}

/// File name pattern derived from the active file path.
#[derive(Debug, Clone)]
pub struct BackupPattern {
    base: PathBuf,
    dir: PathBuf,
    prefix: String,
    compressed_suffix: String,
}

impl BackupPattern {
    /// Build the pattern for `base` with compressed extension `ext` (no dot).
    pub fn new(base: &Path, ext: &str) -> Self {
        let file_name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = match base.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self {
            base: base.to_path_buf(),
            dir,
            prefix: format!("{}.", file_name),
            compressed_suffix: format!(".{}", ext),
        }
    }

    /// Active file path.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding the active file and its backups.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Uncompressed backup path for `key`.
    pub fn backup_path(&self, key: &OrderingKey) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, key))
    }

    /// Compressed archive path for an uncompressed backup.
    pub fn compressed_path(&self, backup: &Path) -> PathBuf {
        append_to_name(backup, &self.compressed_suffix)
    }

    /// Temporary path written during compression.
    pub fn temp_path(&self, backup: &Path) -> PathBuf {
        append_to_name(&self.compressed_path(backup), TEMP_SUFFIX)
    }

    /// Classify a file name found in [`Self::dir`].
    pub fn classify(&self, name: &str) -> EntryKind {
        let Some(rest) = name.strip_prefix(&self.prefix) else {
            return EntryKind::Unrelated;
        };

        if let Some(archive) = rest.strip_suffix(TEMP_SUFFIX) {
            return match archive.strip_suffix(&self.compressed_suffix) {
                Some(key) if OrderingKey::parse(key).is_some() => EntryKind::TempArchive,
                _ => EntryKind::Unrelated,
            };
        }

        let (key, compressed) = match rest.strip_suffix(&self.compressed_suffix) {
            Some(key) => (key, true),
            None => (rest, false),
        };

        match OrderingKey::parse(key) {
            Some(key) => EntryKind::Backup { key, compressed },
            None => EntryKind::Unrelated,
        }
    }
}

fn append_to_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32, sub: u32) -> OrderingKey {
        let at = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap();
        OrderingKey::Timestamp { at, sub }
    }

    #[test]
    fn test_key_rendering() {
        assert_eq!(ts(14, 30, 22, 0).to_string(), "20240115_143022");
        assert_eq!(ts(14, 30, 22, 3).to_string(), "20240115_143022-3");
        assert_eq!(OrderingKey::Sequence(42).to_string(), "000042");
        assert_eq!(OrderingKey::Sequence(1_234_567).to_string(), "1234567");
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!(OrderingKey::parse("20240115_143022"), Some(ts(14, 30, 22, 0)));
        assert_eq!(OrderingKey::parse("20240115_143022-12"), Some(ts(14, 30, 22, 12)));
        assert_eq!(OrderingKey::parse("000042"), Some(OrderingKey::Sequence(42)));
        assert_eq!(OrderingKey::parse(""), None);
        assert_eq!(OrderingKey::parse("20240115_143022-"), None);
        assert_eq!(OrderingKey::parse("20241315_143022"), None);
        assert_eq!(OrderingKey::parse("lock"), None);
    }

    #[test]
    fn test_key_ordering_uses_values() {
        assert!(ts(14, 30, 22, 9) < ts(14, 30, 22, 10));
        assert!(ts(14, 30, 22, 10) < ts(14, 30, 23, 0));
        assert!(OrderingKey::Sequence(9) < OrderingKey::Sequence(10));
    }

    #[test]
    fn test_pattern_paths() {
        let pattern = BackupPattern::new(Path::new("/var/log/app.log"), "gz");
        let key = ts(14, 30, 22, 0);

        let backup = pattern.backup_path(&key);
        assert_eq!(backup, PathBuf::from("/var/log/app.log.20240115_143022"));
        assert_eq!(
            pattern.compressed_path(&backup),
            PathBuf::from("/var/log/app.log.20240115_143022.gz")
        );
        assert_eq!(
            pattern.temp_path(&backup),
            PathBuf::from("/var/log/app.log.20240115_143022.gz.tmp")
        );
    }

    #[test]
    fn test_pattern_relative_base() {
        let pattern = BackupPattern::new(Path::new("app.log"), "gz");
        assert_eq!(pattern.dir(), Path::new("."));
        assert_eq!(
            pattern.backup_path(&OrderingKey::Sequence(1)),
            PathBuf::from("./app.log.000001")
        );
    }

    #[test]
    fn test_classify() {
        let pattern = BackupPattern::new(Path::new("/var/log/app.log"), "gz");

        assert_eq!(
            pattern.classify("app.log.20240115_143022"),
            EntryKind::Backup {
                key: ts(14, 30, 22, 0),
                compressed: false
            }
        );
        assert_eq!(
            pattern.classify("app.log.000007.gz"),
            EntryKind::Backup {
                key: OrderingKey::Sequence(7),
                compressed: true
            }
        );
        assert_eq!(
            pattern.classify("app.log.20240115_143022.gz.tmp"),
            EntryKind::TempArchive
        );
        assert_eq!(pattern.classify("app.log"), EntryKind::Unrelated);
        assert_eq!(pattern.classify("app.log.lock"), EntryKind::Unrelated);
        assert_eq!(pattern.classify("other.log.000001"), EntryKind::Unrelated);
        assert_eq!(pattern.classify("app.log.notes.tmp"), EntryKind::Unrelated);
    }

    #[test]
    fn test_age_reference() {
        let mod_time = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let stamped = BackupFile {
            path: PathBuf::from("app.log.20240115_143022"),
            key: ts(14, 30, 22, 0),
            compressed: false,
            mod_time,
        };
        assert_eq!(
            stamped.age_reference(false),
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 22).unwrap()
        );

        let numbered = BackupFile {
            key: OrderingKey::Sequence(3),
            ..stamped
        };
        assert_eq!(numbered.age_reference(false), mod_time);
    }
}
