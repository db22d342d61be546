/**
 * TELEMETRY SINK - Persistence of simulated readings
 *
 * ROLE :
 * Every reading produced by the scheduler lands in two independent stores:
 * - an append-only, human-readable log per device (`<data>/<uuid>.txt`)
 * - a latest-value cache keyed by device id (`<data>/latest.json`)
 *
 * The feedback handler reads the append logs back through `TelemetryLog`.
 *
 * LOG RECORD :
 * ```text
 * uuid: 29C5F44E0A49470FB06367CDC9724FD3
 * humidity: 41.203311
 * temperature: 12.998120
 * timestamp: 2026-10-16T08:12:03Z
 * ```
 */

use crate::models::{is_safe_id, ReadingSet};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CACHE_FILE: &str = "latest.json";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid device id {0:?}")]
    InvalidId(String),
}

impl SinkError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SinkError::Io { path: path.to_path_buf(), source }
    }
}

/// Write side, used by the acquisition scheduler.
pub trait TelemetrySink: Send + Sync {
    fn write(&self, device_id: &str, readings: &ReadingSet, timestamp: &str) -> Result<(), SinkError>;
}

/// Read side, used by the feedback handler.
pub trait TelemetryLog: Send + Sync {
    /// Full accumulated log of a device. A device that never logged anything
    /// has an empty log, not an error.
    fn read_log(&self, device_id: &str) -> Result<String, SinkError>;
}

/// File-backed sink: one text log per device plus a JSON cache of the last
/// record of every device.
pub struct FileSink {
    data_dir: PathBuf,
    /// Cache mirror, rewritten to disk after each upsert
    latest: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Result<Self, SinkError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| SinkError::io(&data_dir, e))?;

        let sink = Self { data_dir, latest: Mutex::new(BTreeMap::new()) };
        sink.load_cache()?;
        debug!("[sink] initialized at {:?}", sink.data_dir);
        Ok(sink)
    }

    /// Log file of a device. Ids that could leave `data_dir` are refused.
    pub fn log_path(&self, device_id: &str) -> Result<PathBuf, SinkError> {
        if !is_safe_id(device_id) {
            return Err(SinkError::InvalidId(device_id.to_string()));
        }
        Ok(self.data_dir.join(format!("{device_id}.txt")))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE)
    }

    /// Last record cached for a device, if any.
    pub fn latest(&self, device_id: &str) -> Option<serde_json::Value> {
        self.latest.lock().get(device_id).cloned()
    }

    fn load_cache(&self) -> Result<(), SinkError> {
        let path = self.cache_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(SinkError::io(&path, e)),
        };
        if content.trim().is_empty() {
            return Ok(());
        }
        // A damaged cache only costs the last values; the logs are intact.
        match serde_json::from_str(&content) {
            Ok(latest) => *self.latest.lock() = latest,
            Err(e) => warn!("[sink] cache {:?} unreadable, starting empty: {}", path, e),
        }
        Ok(())
    }

    fn append_log(&self, device_id: &str, readings: &ReadingSet, timestamp: &str) -> Result<(), SinkError> {
        let path = self.log_path(device_id)?;
        let mut record = format!("uuid: {device_id}\n");
        for (metric, value) in readings {
            record.push_str(&format!("{metric}: {value}\n"));
        }
        record.push_str(&format!("timestamp: {timestamp}\n"));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::io(&path, e))?;
        file.write_all(record.as_bytes()).map_err(|e| SinkError::io(&path, e))?;
        file.flush().map_err(|e| SinkError::io(&path, e))
    }

    fn upsert_latest(&self, device_id: &str, readings: &ReadingSet, timestamp: &str) -> Result<(), SinkError> {
        let mut record = serde_json::Map::new();
        record.insert("uuid".into(), device_id.into());
        for (metric, value) in readings {
            record.insert(metric.clone(), value.clone().into());
        }
        record.insert("timestamp".into(), timestamp.into());

        let mut latest = self.latest.lock();
        latest.insert(device_id.to_string(), serde_json::Value::Object(record));
        let json = serde_json::to_string_pretty(&*latest)?;
        write_atomic(&self.cache_path(), json.as_bytes())
    }
}

/// Writes next to `path` then renames over it, so readers never see a
/// half-written file.
fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), SinkError> {
    let tmp_path = path.with_extension("partial");
    fs::write(&tmp_path, payload).map_err(|e| SinkError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| SinkError::io(path, e))
}

impl TelemetrySink for FileSink {
    fn write(&self, device_id: &str, readings: &ReadingSet, timestamp: &str) -> Result<(), SinkError> {
        if !is_safe_id(device_id) {
            return Err(SinkError::InvalidId(device_id.to_string()));
        }
        // Both stores are attempted even if the first one fails.
        let logged = self.append_log(device_id, readings, timestamp);
        let cached = self.upsert_latest(device_id, readings, timestamp);
        logged.and(cached)
    }
}

impl TelemetryLog for FileSink {
    fn read_log(&self, device_id: &str) -> Result<String, SinkError> {
        let path = self.log_path(device_id)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(SinkError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(pairs: &[(&str, &str)]) -> ReadingSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_append_log_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();

        sink.write("dev-1", &readings(&[("humidity", "1.500000"), ("temperature", "2.000000")]), "2026-10-16T08:00:00Z")
            .unwrap();
        sink.write("dev-1", &readings(&[("humidity", "3.000000"), ("temperature", "4.000000")]), "2026-10-16T08:00:01Z")
            .unwrap();

        let log = sink.read_log("dev-1").unwrap();
        assert_eq!(
            log,
            "uuid: dev-1\nhumidity: 1.500000\ntemperature: 2.000000\ntimestamp: 2026-10-16T08:00:00Z\n\
             uuid: dev-1\nhumidity: 3.000000\ntemperature: 4.000000\ntimestamp: 2026-10-16T08:00:01Z\n"
        );
    }

    #[test]
    fn test_latest_cache_upserts_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sink = FileSink::new(dir.path()).unwrap();
            sink.write("dev-1", &readings(&[("light", "10.000000")]), "2026-10-16T08:00:00Z").unwrap();
            sink.write("dev-1", &readings(&[("light", "20.000000")]), "2026-10-16T08:00:05Z").unwrap();
            let latest = sink.latest("dev-1").unwrap();
            assert_eq!(latest["light"], "20.000000");
            assert_eq!(latest["uuid"], "dev-1");
        }

        let reopened = FileSink::new(dir.path()).unwrap();
        let latest = reopened.latest("dev-1").unwrap();
        assert_eq!(latest["light"], "20.000000");
        assert_eq!(latest["timestamp"], "2026-10-16T08:00:05Z");
    }

    #[test]
    fn test_empty_reading_set_still_logs_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        sink.write("gw", &ReadingSet::new(), "2026-10-16T08:00:00Z").unwrap();
        assert_eq!(sink.read_log("gw").unwrap(), "uuid: gw\ntimestamp: 2026-10-16T08:00:00Z\n");
    }

    #[test]
    fn test_truncated_cache_does_not_block_startup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CACHE_FILE), "{\n  \"dev-1\": {\n    \"uuid\": \"dev").unwrap();

        let sink = FileSink::new(dir.path()).unwrap();
        assert!(sink.latest("dev-1").is_none());

        sink.write("dev-2", &readings(&[("light", "5.000000")]), "2026-10-16T08:00:00Z").unwrap();
        let cache: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sink.cache_path()).unwrap()).unwrap();
        assert_eq!(cache["dev-2"]["light"], "5.000000");
        assert!(!dir.path().join("latest.partial").exists());
    }

    #[test]
    fn test_ids_escaping_data_dir_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let sink = FileSink::new(&data).unwrap();

        for id in ["../x", "a/b", "a\\b", "..", ""] {
            let err = sink.write(id, &readings(&[("light", "1.000000")]), "2026-10-16T08:00:00Z").unwrap_err();
            assert!(matches!(err, SinkError::InvalidId(_)), "{id:?}");
            assert!(matches!(sink.read_log(id), Err(SinkError::InvalidId(_))), "{id:?}");
        }
        assert!(!dir.path().join("x.txt").exists());
        assert!(sink.latest("../x").is_none());
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        assert_eq!(sink.read_log("never-written").unwrap(), "");
    }
}
