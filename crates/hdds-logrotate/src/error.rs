// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the rotating writer.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Step of a rotation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    /// Syncing/closing the active file.
    Close,
    /// Renaming the active file to its backup name.
    Rename,
    /// Opening the fresh active file.
    Reopen,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Close => "closing",
            Self::Rename => "renaming",
            Self::Reopen => "reopening",
        };
        f.write_str(s)
    }
}

/// Rotating writer errors.
#[derive(Debug, Error)]
pub enum RotateError {
    #[error("Log writer is closed")]
    Closed,

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write to {} failed after {written} bytes: {source}", path.display())]
    Write {
        path: PathBuf,
        /// Bytes the file system accepted before the failure.
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("Rotation failed while {stage} {}: {source}", path.display())]
    Rotate {
        stage: RotationStage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to load config {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RotateError {
    /// True if the error came from a rotation step (close/rename/reopen).
    pub fn is_rotation(&self) -> bool {
        matches!(self, Self::Rotate { .. })
    }

    /// Bytes accepted by the file before the error (0 unless a write failed midway).
    pub fn written(&self) -> usize {
        match self {
            Self::Write { written, .. } => *written,
            _ => 0,
        }
    }
}

impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        let kind = match &err {
            RotateError::Closed => io::ErrorKind::BrokenPipe,
            RotateError::Open { source, .. }
            | RotateError::Write { source, .. }
            | RotateError::Rotate { source, .. }
            | RotateError::ConfigFile { source, .. }
            | RotateError::Io(source) => source.kind(),
            RotateError::Config(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}
