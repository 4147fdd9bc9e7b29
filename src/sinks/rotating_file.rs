//! File sink with timed rotation
//!
//! The active file is renamed to `<file>.<period-suffix>` when its interval
//! elapses. Only the newest `backup_count` rotated files are kept.

use crate::core::{LogError, LogRecord, Renderer, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Rotation interval unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum When {
    #[serde(rename = "S")]
    Seconds,
    #[serde(rename = "M")]
    Minutes,
    #[serde(rename = "H")]
    Hours,
    #[default]
    #[serde(rename = "D")]
    Days,
    #[serde(rename = "W")]
    Weeks,
}

impl When {
    pub fn interval(&self) -> Duration {
        match self {
            When::Seconds => Duration::from_secs(1),
            When::Minutes => Duration::from_secs(60),
            When::Hours => Duration::from_secs(60 * 60),
            When::Days => Duration::from_secs(24 * 60 * 60),
            When::Weeks => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// strftime pattern appended to rotated file names
    pub fn suffix_format(&self) -> &'static str {
        match self {
            When::Seconds => "%Y-%m-%d_%H-%M-%S",
            When::Minutes => "%Y-%m-%d_%H-%M",
            When::Hours => "%Y-%m-%d_%H",
            When::Days | When::Weeks => "%Y-%m-%d",
        }
    }

    fn suffix_matches(&self, suffix: &str) -> bool {
        let expected_len = match self {
            When::Seconds => 19,
            When::Minutes => 16,
            When::Hours => 13,
            When::Days | When::Weeks => 10,
        };
        suffix.len() == expected_len
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c == '-' || c == '_')
    }
}

impl FromStr for When {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "S" => Ok(When::Seconds),
            "M" => Ok(When::Minutes),
            "H" => Ok(When::Hours),
            "D" => Ok(When::Days),
            "W" => Ok(When::Weeks),
            other => Err(format!("Invalid rotation unit '{}', expected one of S, M, H, D, W", other)),
        }
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self {
            When::Seconds => "S",
            When::Minutes => "M",
            When::Hours => "H",
            When::Days => "D",
            When::Weeks => "W",
        };
        write!(f, "{}", unit)
    }
}

/// Configuration for the rotating file sink
///
/// # Examples
///
/// ```
/// use axum_structlog::sinks::{RotationPolicy, When};
///
/// let policy = RotationPolicy::new()
///     .with_when(When::Hours)
///     .with_backup_count(24)
///     .with_compression(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    pub when: When,
    /// Maximum number of rotated files to keep
    pub backup_count: usize,
    /// Whether to gzip rotated files
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            when: When::Days,
            backup_count: 1,
            compress: false,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_when(mut self, when: When) -> Self {
        self.when = when;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_backup_count(mut self, count: usize) -> Self {
        self.backup_count = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }
}

/// Appends rendered records to a file, rotating on a fixed interval
pub struct RotatingFileSink {
    base_path: PathBuf,
    policy: RotationPolicy,
    renderer: Renderer,
    writer: Option<BufWriter<File>>,
    /// Start of the period covered by the active file
    period_start: SystemTime,
    rollover_at: SystemTime,
}

impl RotatingFileSink {
    /// Open (or create) the log file
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created
    pub fn new<P: AsRef<Path>>(path: P, policy: RotationPolicy, renderer: Renderer) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();

        if let Some(parent) = base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LogError::io_operation(
                    "create log directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let (file, period_start) = Self::open(&base_path)?;
        let rollover_at = period_start + policy.when.interval();

        Ok(Self {
            base_path,
            policy,
            renderer,
            writer: Some(BufWriter::new(file)),
            period_start,
            rollover_at,
        })
    }

    fn open(path: &Path) -> Result<(File, SystemTime)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LogError::io_operation(
                    "open log file",
                    format!("Failed to open '{}'", path.display()),
                    e,
                )
            })?;
        let started = file
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        Ok((file, started))
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    fn should_rotate(&self) -> bool {
        SystemTime::now() >= self.rollover_at
    }

    /// Name of the file the active period will be rotated into
    fn rotated_path(&self) -> PathBuf {
        let start: DateTime<Local> = self.period_start.into();
        let suffix = start.format(self.policy.when.suffix_format());
        let mut path = self.base_path.clone();
        path.set_file_name(format!("{}.{}", self.file_name(), suffix));
        path
    }

    fn file_name(&self) -> String {
        self.base_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app.log")
            .to_string()
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                LogError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }

        let target = self.rotated_path();
        if target.exists() {
            let _ = fs::remove_file(&target);
        }
        if self.base_path.exists() {
            fs::rename(&self.base_path, &target).map_err(|e| {
                LogError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to rotate current log file: {}", e),
                )
            })?;
            if self.policy.compress {
                compress_file(&target)?;
            }
        }

        self.prune_backups();

        let (file, _) = Self::open(&self.base_path)?;
        self.writer = Some(BufWriter::new(file));
        self.advance_period();
        Ok(())
    }

    fn advance_period(&mut self) {
        let now = SystemTime::now();
        let interval = self.policy.when.interval();
        self.period_start = now;
        self.rollover_at = now + interval;
    }

    /// Rotated files belonging to this sink, oldest first
    pub fn backups(&self) -> Vec<PathBuf> {
        let dir = match self.base_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = format!("{}.", self.file_name());

        let mut found: Vec<(String, PathBuf)> = fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let name = e.file_name().to_str()?.to_string();
                        let suffix = name.strip_prefix(&prefix)?;
                        let suffix = suffix.strip_suffix(".gz").unwrap_or(suffix);
                        self.policy
                            .when
                            .suffix_matches(suffix)
                            .then(|| (suffix.to_string(), e.path()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        found.sort();
        found.into_iter().map(|(_, path)| path).collect()
    }

    /// Keep the newest `backup_count` rotated files; zero keeps all of them
    fn prune_backups(&self) {
        if self.policy.backup_count == 0 {
            return;
        }
        let backups = self.backups();
        if backups.len() <= self.policy.backup_count {
            return;
        }
        let excess = backups.len() - self.policy.backup_count;
        for old in backups.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&old) {
                eprintln!(
                    "[LOGGER WARNING] Failed to remove old backup {}: {}",
                    old.display(),
                    e
                );
            }
        }
    }

    pub fn write(&mut self, record: &LogRecord) -> Result<()> {
        if self.should_rotate() {
            if let Err(e) = self.rotate() {
                eprintln!(
                    "[LOGGER WARNING] Log rotation failed: {}. Continuing with current file.",
                    e
                );
                self.advance_period();
                if self.writer.is_none() {
                    match Self::open(&self.base_path) {
                        Ok((file, _)) => self.writer = Some(BufWriter::new(file)),
                        Err(reopen_err) => {
                            eprintln!(
                                "[LOGGER WARNING] Cannot reopen {}: {}. Writing to console.",
                                self.base_path.display(),
                                reopen_err
                            );
                        }
                    }
                }
            }
        }

        let line = format!("{}\n", self.renderer.render(record));
        match self.writer {
            Some(ref mut writer) => writer.write_all(line.as_bytes()).map_err(|e| {
                LogError::sink_write(
                    self.base_path.display().to_string(),
                    format!("Failed to write log record: {}", e),
                )
            }),
            None => {
                std::io::stdout().lock().write_all(line.as_bytes())?;
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                LogError::sink_write(
                    self.base_path.display().to_string(),
                    format!("Failed to flush: {}", e),
                )
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for RotatingFileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingFileSink")
            .field("path", &self.base_path)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Gzip a rotated file, removing the original only once the archive is complete
fn compress_file(path: &Path) -> Result<()> {
    use std::io::{BufReader, Read};

    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);
    let mut tmp_name = gz_path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let temp_gz_path = PathBuf::from(tmp_name);

    let input = File::open(path).map_err(|e| {
        LogError::io_operation(
            "compress log file",
            format!("Failed to open file for compression: {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::with_capacity(64 * 1024, input);

    let output = File::create(&temp_gz_path).map_err(|e| {
        LogError::io_operation(
            "compress log file",
            format!("Failed to create temporary file: {}", temp_gz_path.display()),
            e,
        )
    })?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(64 * 1024, output),
        flate2::Compression::default(),
    );

    let mut buffer = vec![0u8; 64 * 1024];
    let copied: std::io::Result<()> = (|| {
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buffer[..n])?;
        }
        encoder.finish()?.flush()
    })();

    if let Err(e) = copied.and_then(|_| fs::rename(&temp_gz_path, &gz_path)) {
        let _ = fs::remove_file(&temp_gz_path);
        return Err(LogError::io_operation(
            "compress log file",
            format!("Failed to compress {}", path.display()),
            e,
        ));
    }

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compressed {} but could not remove the original: {}",
            path.display(),
            e
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use std::io::Read;
    use std::thread;
    use tempfile::tempdir;

    fn record(msg: &str) -> LogRecord {
        LogRecord::new("app", LogLevel::Info, msg)
    }

    #[test]
    fn test_when_parsing_and_suffix() {
        assert_eq!("s".parse::<When>().unwrap(), When::Seconds);
        assert_eq!("W".parse::<When>().unwrap(), When::Weeks);
        assert!("Q".parse::<When>().is_err());
        assert_eq!(When::Hours.interval(), Duration::from_secs(3600));
        assert_eq!(When::Days.suffix_format(), "%Y-%m-%d");
        assert!(When::Minutes.suffix_matches("2025-01-08_10-30"));
        assert!(!When::Minutes.suffix_matches("2025-01-08"));
    }

    #[test]
    fn test_writes_rendered_lines() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("logs").join("app.log");

        let mut sink =
            RotatingFileSink::new(&log_path, RotationPolicy::default(), Renderer::json()).unwrap();
        sink.write(&record("first")).unwrap();
        sink.write(&record("second")).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"message\":\"second\""));
    }

    #[test]
    fn test_timed_rotation_keeps_backup_count() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("rotation.log");
        let policy = RotationPolicy::new()
            .with_when(When::Seconds)
            .with_backup_count(1);

        let mut sink = RotatingFileSink::new(&log_path, policy, Renderer::json()).unwrap();
        for i in 0..3 {
            sink.write(&record(&format!("period {}", i))).unwrap();
            sink.flush().unwrap();
            thread::sleep(Duration::from_millis(1100));
        }
        sink.write(&record("current")).unwrap();
        sink.flush().unwrap();

        let backups = sink.backups();
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("rotation.log."));

        let current = fs::read_to_string(&log_path).unwrap();
        assert!(current.contains("current"));
        assert!(!current.contains("period 0"));
    }

    #[test]
    fn test_zero_backup_count_keeps_every_rotation() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("app.log");
        let policy = RotationPolicy::new()
            .with_when(When::Seconds)
            .with_backup_count(0);

        let mut sink = RotatingFileSink::new(&log_path, policy, Renderer::json()).unwrap();
        sink.write(&record("first")).unwrap();
        sink.flush().unwrap();
        thread::sleep(Duration::from_millis(1100));
        sink.write(&record("second")).unwrap();
        sink.flush().unwrap();

        let backups = sink.backups();
        assert_eq!(backups.len(), 1);
        assert!(fs::read_to_string(&backups[0]).unwrap().contains("first"));
        assert!(fs::read_to_string(&log_path).unwrap().contains("second"));
    }

    #[test]
    fn test_rotation_with_compression() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("zipped.log");
        let policy = RotationPolicy::new()
            .with_when(When::Seconds)
            .with_backup_count(3)
            .with_compression(true);

        let mut sink = RotatingFileSink::new(&log_path, policy, Renderer::json()).unwrap();
        sink.write(&record("to be archived")).unwrap();
        sink.flush().unwrap();
        thread::sleep(Duration::from_millis(1100));
        sink.write(&record("fresh")).unwrap();
        sink.flush().unwrap();

        let backups = sink.backups();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].to_str().unwrap().ends_with(".gz"));

        let mut decoder = flate2::read::GzDecoder::new(File::open(&backups[0]).unwrap());
        let mut archived = String::new();
        decoder.read_to_string(&mut archived).unwrap();
        assert!(archived.contains("to be archived"));
    }

    #[test]
    fn test_unrelated_files_are_not_pruned() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("svc.log");
        fs::write(dir.path().join("svc.log.notes"), "keep me").unwrap();

        let policy = RotationPolicy::new().with_when(When::Seconds).with_backup_count(1);
        let mut sink = RotatingFileSink::new(&log_path, policy, Renderer::json()).unwrap();
        sink.write(&record("a")).unwrap();
        thread::sleep(Duration::from_millis(1100));
        sink.write(&record("b")).unwrap();

        assert!(dir.path().join("svc.log.notes").exists());
    }
}
