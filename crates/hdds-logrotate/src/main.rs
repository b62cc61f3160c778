// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Log Rotation CLI
//!
//! Pipe a process's output into a rotating log file.
//!
//! # Usage
//!
//! ```bash
//! # Rotate at 10 MB, keep 5 compressed backups
//! my-service 2>&1 | hdds-logrotate -o logs/service.log --rotate 10M --keep 5 --compress
//!
//! # Daily files in local time, dropped after a week
//! my-service | hdds-logrotate -o logs/service.log --daily --local-time --max-age 7d
//!
//! # Settings from a JSON file, flags override it
//! my-service | hdds-logrotate --config logrotate.json --tee
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam::channel::{self, RecvTimeoutError};
use hdds_logrotate::{parse_duration, parse_size, BackupNaming, LogRotateConfig, LogWriter};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// Lines buffered between the stdin reader and the writer.
const LINE_QUEUE_DEPTH: usize = 1024;

#[derive(Parser)]
#[command(name = "hdds-logrotate")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Append stdin to a log file with size/time rotation, compression and retention")]
#[command(long_about = None)]
struct Cli {
    /// Active log file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file (flags override its values)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rotate when the file would exceed this size (e.g., 10M, 100K, 1G)
    #[arg(long)]
    rotate: Option<String>,

    /// Rotate after this much time (e.g., 90s, 30m, 12h, 7d)
    #[arg(long)]
    interval: Option<String>,

    /// Rotate when the calendar day changes
    #[arg(long)]
    daily: bool,

    /// Maximum number of backups to keep
    #[arg(long)]
    keep: Option<u32>,

    /// Delete backups older than this (e.g., 7d)
    #[arg(long)]
    max_age: Option<String>,

    /// Gzip rotated files
    #[arg(long)]
    compress: bool,

    /// Backup naming scheme
    #[arg(long, value_enum)]
    naming: Option<NamingArg>,

    /// Use local time for backup names and day boundaries
    #[arg(long)]
    local_time: bool,

    /// Also echo input to stdout
    #[arg(long)]
    tee: bool,

    /// Verbose mode (show internal logs)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NamingArg {
    Timestamp,
    Sequence,
}

impl From<NamingArg> for BackupNaming {
    fn from(arg: NamingArg) -> Self {
        match arg {
            NamingArg::Timestamp => BackupNaming::Timestamp,
            NamingArg::Sequence => BackupNaming::Sequence,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("hdds_logrotate=debug")
    } else {
        EnvFilter::new("hdds_logrotate=info")
    };

    // stdout may carry --tee output
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    tracing::info!(
        path = %config.path.display(),
        max_size = config.policy.max_size_bytes,
        interval_secs = config.policy.max_interval_secs,
        daily = config.policy.rotate_daily,
        keep = config.policy.max_backups,
        compress = config.policy.compress,
        "Starting HDDS logrotate"
    );

    let writer = LogWriter::open(config).context("Failed to open log file")?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running));

    let lines = spawn_stdin_reader()?;
    let mut stdout = io::stdout();
    let tee: Option<&mut dyn Write> = if cli.tee { Some(&mut stdout) } else { None };
    let PumpStats {
        lines_written,
        write_errors,
    } = pump(&lines, &writer, &running, tee)?;

    writer.close().context("Failed to close log file")?;

    let stats = writer.housekeeping_stats();
    tracing::info!(
        lines_written,
        write_errors,
        files_compressed = stats.files_compressed,
        files_pruned = stats.files_pruned,
        jobs_dropped = stats.jobs_dropped,
        "Logrotate shutdown complete"
    );

    Ok(())
}

fn build_config(cli: &Cli) -> Result<LogRotateConfig> {
    let mut config = match (&cli.config, &cli.output) {
        (Some(file), output) => {
            let mut config = LogRotateConfig::from_json_file(file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            if let Some(path) = output {
                config.path = path.clone();
            }
            config
        }
        (None, Some(path)) => LogRotateConfig::new(path.clone()),
        (None, None) => bail!("either --output or --config is required"),
    };

    let policy = &mut config.policy;
    if let Some(ref size) = cli.rotate {
        policy.max_size_bytes =
            parse_size(size).with_context(|| format!("Invalid size: {}", size))?;
    }
    if let Some(ref interval) = cli.interval {
        policy.max_interval_secs = parse_duration(interval)
            .with_context(|| format!("Invalid interval: {}", interval))?
            .as_secs();
    }
    if let Some(ref age) = cli.max_age {
        policy.max_backup_age_secs = parse_duration(age)
            .with_context(|| format!("Invalid max age: {}", age))?
            .as_secs();
    }
    if let Some(keep) = cli.keep {
        policy.max_backups = keep;
    }
    policy.rotate_daily |= cli.daily;
    policy.compress |= cli.compress;
    policy.local_time |= cli.local_time;

    if let Some(naming) = cli.naming {
        config.naming = naming.into();
    }

    config.validate()?;
    Ok(config)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PumpStats {
    lines_written: u64,
    write_errors: u64,
}

/// Move lines from the reader into the writer until stdin closes or
/// `running` is cleared. Lines already queued at shutdown are still written.
fn pump(
    lines: &channel::Receiver<Vec<u8>>,
    writer: &LogWriter,
    running: &AtomicBool,
    mut tee: Option<&mut dyn Write>,
) -> Result<PumpStats> {
    let mut stats = PumpStats::default();

    while running.load(Ordering::SeqCst) {
        let line = match lines.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(stats),
        };
        forward(&line, writer, &mut stats, tee.as_deref_mut())?;
    }

    for line in lines.try_iter() {
        forward(&line, writer, &mut stats, tee.as_deref_mut())?;
    }
    Ok(stats)
}

fn forward(
    line: &[u8],
    writer: &LogWriter,
    stats: &mut PumpStats,
    tee: Option<&mut (dyn Write + '_)>,
) -> Result<()> {
    match writer.write(line) {
        Ok(_) => stats.lines_written += 1,
        Err(e) => {
            stats.write_errors += 1;
            tracing::warn!(error = %e, "Failed to write line");
        }
    }

    if let Some(out) = tee {
        out.write_all(line).context("Failed to echo to stdout")?;
    }
    Ok(())
}

/// Read stdin on its own thread, one line (newline included) per message.
fn spawn_stdin_reader() -> Result<channel::Receiver<Vec<u8>>> {
    let (tx, rx) = channel::bounded(LINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("hdds-logrotate-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            loop {
                let mut line = Vec::new();
                match input.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            tracing::debug!("stdin closed");
        })
        .context("Failed to spawn stdin reader")?;

    Ok(rx)
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        running.store(false, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_config_from_flags() {
        let cli = Cli::try_parse_from([
            "hdds-logrotate",
            "-o",
            "logs/app.log",
            "--rotate",
            "10M",
            "--interval",
            "12h",
            "--keep",
            "5",
            "--max-age",
            "7d",
            "--compress",
            "--naming",
            "sequence",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.path, PathBuf::from("logs/app.log"));
        assert_eq!(config.policy.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.policy.max_interval_secs, 12 * 3600);
        assert_eq!(config.policy.max_backups, 5);
        assert_eq!(config.policy.max_backup_age_secs, 7 * 86400);
        assert!(config.policy.compress);
        assert!(!config.policy.rotate_daily);
        assert_eq!(config.naming, BackupNaming::Sequence);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("logrotate.json");
        std::fs::write(
            &file,
            r#"{ "path": "from-file.log", "policy": { "max_backups": 3, "compress": true } }"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "hdds-logrotate",
            "--config",
            file.to_str().unwrap(),
            "--keep",
            "9",
            "--daily",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.path, PathBuf::from("from-file.log"));
        assert_eq!(config.policy.max_backups, 9);
        assert!(config.policy.compress);
        assert!(config.policy.rotate_daily);
    }

    #[test]
    fn test_pump_drains_queue_after_stop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::open(LogRotateConfig::new(&path)).unwrap();

        let (tx, rx) = channel::bounded(LINE_QUEUE_DEPTH);
        for i in 0..5 {
            tx.send(format!("line {}\n", i).into_bytes()).unwrap();
        }
        let running = AtomicBool::new(false);
        let mut echoed = Vec::new();

        let stats = pump(&rx, &writer, &running, Some(&mut echoed)).unwrap();
        writer.close().unwrap();

        assert_eq!(
            stats,
            PumpStats {
                lines_written: 5,
                write_errors: 0,
            }
        );
        let expected = "line 0\nline 1\nline 2\nline 3\nline 4\n";
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
        assert_eq!(String::from_utf8(echoed).unwrap(), expected);
    }

    #[test]
    fn test_pump_stops_when_input_closes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let writer = LogWriter::open(LogRotateConfig::new(&path)).unwrap();

        let (tx, rx) = channel::bounded(LINE_QUEUE_DEPTH);
        tx.send(b"only line\n".to_vec()).unwrap();
        drop(tx);
        let running = AtomicBool::new(true);

        let stats = pump(&rx, &writer, &running, None).unwrap();
        writer.close().unwrap();

        assert_eq!(stats.lines_written, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "only line\n");
    }

    #[test]
    fn test_build_config_errors() {
        let cli = Cli::try_parse_from(["hdds-logrotate", "--daily"]).unwrap();
        assert!(build_config(&cli).is_err());

        let cli = Cli::try_parse_from(["hdds-logrotate", "-o", "a.log", "--rotate", "ten"]).unwrap();
        assert!(build_config(&cli).is_err());
    }
}
