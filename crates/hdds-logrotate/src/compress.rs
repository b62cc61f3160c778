// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gzip compression of retired log files.
//!
//! The archive is written to `<backup>.<ext>.tmp` and renamed into place
//! once complete, so a file under the final name is always a whole archive.
//! The original is removed only after that rename.

use crate::config::CompressionOptions;
use crate::naming::BackupPattern;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Outcome of a successful compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    /// Final archive path.
    pub archive: PathBuf,
    /// Size of the original file.
    pub original_bytes: u64,
    /// Size of the archive.
    pub compressed_bytes: u64,
}

/// Compress `backup` into its archive, without removing the original.
///
/// On error the temporary file is removed and neither the original nor any
/// archive under the final name is touched.
pub fn write_archive(
    backup: &Path,
    pattern: &BackupPattern,
    options: &CompressionOptions,
) -> io::Result<Compressed> {
    let archive = pattern.compressed_path(backup);
    let temp = pattern.temp_path(backup);

    match encode(backup, &temp, options.level) {
        Ok(original_bytes) => {
            if let Err(e) = fs::rename(&temp, &archive) {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
            let compressed_bytes = fs::metadata(&archive)?.len();
            Ok(Compressed {
                archive,
                original_bytes,
                compressed_bytes,
            })
        }
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

/// Compress `backup` and remove the original once the archive is in place.
pub fn compress_backup(
    backup: &Path,
    pattern: &BackupPattern,
    options: &CompressionOptions,
) -> io::Result<Compressed> {
    let done = write_archive(backup, pattern, options)?;
    fs::remove_file(backup)?;
    Ok(done)
}

fn encode(source: &Path, temp: &Path, level: u32) -> io::Result<u64> {
    let input = File::open(source)?;
    let permissions = input.metadata()?.permissions();
    let mut reader = BufReader::new(input);

    let output = File::create(temp)?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::new(level));
    let copied = io::copy(&mut reader, &mut encoder)?;

    let mut writer = encoder.finish()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    file.set_permissions(permissions)?;

    Ok(copied)
}
