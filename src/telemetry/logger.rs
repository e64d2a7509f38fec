//! JSONL telemetry logger with file rotation.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::{LinkError, Result};
use crate::protocol::SensorReading;

/// Telemetry file name prefix
pub const FILE_PREFIX: &str = "telemetry_";

/// Telemetry file extension
pub const FILE_EXTENSION: &str = "jsonl";

/// One line of a telemetry file
#[derive(Serialize)]
struct TelemetryRecord<'a> {
    timestamp: String,
    reading: &'a SensorReading,
}

/// Appends sensor readings to rotating JSONL files
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    file_seq: u64,
}

impl std::fmt::Debug for TelemetryLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLogger")
            .field("dir", &self.dir)
            .field("current_path", &self.current_path)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl TelemetryLogger {
    /// Create a logger writing into `config.log_dir`, creating it if needed
    ///
    /// No file is opened until the first reading is logged.
    ///
    /// # Errors
    ///
    /// Returns `Telemetry` for zero limits, `Io` if the directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        if config.max_records_per_file == 0 || config.max_files_to_keep == 0 {
            return Err(LinkError::Telemetry(
                "telemetry file limits must be greater than 0".to_string(),
            ));
        }

        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        // Continue numbering after files left by an earlier run
        let file_seq = match list_telemetry_files(&dir)?.last() {
            Some((seq, _)) => seq + 1,
            None => 0,
        };

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            writer: None,
            current_path: None,
            records_in_file: 0,
            file_seq,
        })
    }

    /// Append one reading, rotating files as needed
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written
    pub fn log_reading(&mut self, reading: &SensorReading) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = TelemetryRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            reading,
        };

        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return Err(LinkError::Telemetry("no telemetry file open".to_string())),
        };

        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        self.records_in_file += 1;
        Ok(())
    }

    /// File currently being written, if any
    pub fn current_file(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Close the current file and start a new one
    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_EXTENSION
        );
        self.file_seq += 1;

        let path = self.dir.join(name);
        let file = File::create(&path)?;
        info!("Writing telemetry to {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest telemetry files beyond `max_files_to_keep`
    fn prune(&self) -> Result<()> {
        let files = list_telemetry_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        let excess = files.len() - self.max_files_to_keep;
        for (_, path) in files.into_iter().take(excess) {
            if Some(path.as_path()) == self.current_path.as_deref() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed old telemetry file {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(())
    }
}

/// Telemetry files in `dir` with their sequence numbers, oldest first
fn list_telemetry_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut files: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| file_seq(&path).map(|seq| (seq, path)))
        .collect();
    files.sort();
    Ok(files)
}

/// Sequence number from `telemetry_<date>_<time>_<seq>.jsonl`
fn file_seq(path: &Path) -> Option<u64> {
    if !is_telemetry_file(path) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.strip_prefix(FILE_PREFIX)?;
    let (_, seq) = stem.rsplit_once('_')?;
    seq.parse().ok()
}

fn is_telemetry_file(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(FILE_PREFIX))
        .unwrap_or(false);
    let ext_ok = path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);
    name_ok && ext_ok
}
