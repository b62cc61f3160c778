// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Writer installed as the process-wide tracing sink.
//!
//! Kept in its own test binary: the global default can be set only once.

use flate2::read::GzDecoder;
use hdds_logrotate::{HousekeepingOptions, LogWriter, RotationPolicy, SharedLogWriter};
use std::fs::{self, File};
use std::io::Read;

#[test]
fn test_rotation_events_logged_into_the_rotating_writer() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let writer = LogWriter::builder(&path)
        .policy(RotationPolicy::by_size(64).compressed())
        .housekeeping(HousekeepingOptions {
            workers: 1,
            queue_capacity: 1,
        })
        .open()
        .unwrap();
    let shared = SharedLogWriter::new(writer);

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_writer(shared.clone())
            .with_ansi(false)
            .finish(),
    )
    .unwrap();

    let small = b"0123456789";
    let large = "x".repeat(58);
    assert_eq!(shared.write(small).unwrap(), small.len());
    assert_eq!(shared.write(large.as_bytes()).unwrap(), large.len());
    for _ in 0..8 {
        shared.write(large.as_bytes()).unwrap();
    }
    tracing::info!("application event");

    shared.close().unwrap();

    let backups = shared.backups();
    assert!(!backups.is_empty());

    let mut all = Vec::new();
    for backup in &backups {
        if backup.compressed {
            GzDecoder::new(File::open(&backup.path).unwrap())
                .read_to_end(&mut all)
                .unwrap();
        } else {
            all.extend(fs::read(&backup.path).unwrap());
        }
    }
    all.extend(fs::read(&path).unwrap());

    let text = String::from_utf8_lossy(&all);
    assert!(text.contains("0123456789"));
    assert_eq!(text.matches(large.as_str()).count(), 9);
    assert!(text.contains("Rotated log file"));
    assert!(text.contains("application event"));
}
