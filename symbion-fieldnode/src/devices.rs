//! Device configuration sources.
//!
//! A serial config (`serial_config.json`) lists the serial lines this node
//! tracks; each line has a device document `<device_dir>/<uuid>.json`. The
//! same walk is used at startup and for every hot reload: documents are read
//! wholesale and applied to the registry by identifier, without pruning.

use crate::models::{is_safe_id, DeviceDocument, SerialConfig};
use crate::registry::{DeviceRegistry, ReloadEffect};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of applying every tracked document to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub sources_read: usize,
    pub sources_failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Device entries dropped because their id cannot be used as a file name
    pub rejected: usize,
}

impl ReloadSummary {
    fn record(&mut self, effect: ReloadEffect) {
        match effect {
            ReloadEffect::Inserted => self.inserted += 1,
            ReloadEffect::Updated => self.updated += 1,
            ReloadEffect::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSources {
    device_dir: PathBuf,
    tracked: Vec<String>,
}

impl DeviceSources {
    pub fn new<P: Into<PathBuf>>(device_dir: P, tracked: Vec<String>) -> Self {
        Self { device_dir: device_dir.into(), tracked }
    }

    /// Builds the tracked list from a serial config. A missing or broken serial
    /// config yields an empty list rather than an error.
    pub fn from_serial_config<P: Into<PathBuf>>(serial_config: &Path, device_dir: P) -> Self {
        let tracked = match read_json::<SerialConfig>(serial_config) {
            Ok(cfg) => cfg
                .devices
                .into_iter()
                .map(|entry| entry.uuid)
                .filter(|uuid| {
                    let safe = is_safe_id(uuid);
                    if !safe {
                        warn!("[config] serial line {:?} ignored: not a valid file name", uuid);
                    }
                    safe
                })
                .collect(),
            Err(e) => {
                warn!("[config] serial config skipped: {}", e);
                Vec::new()
            }
        };
        info!("[config] tracking {} serial line(s)", tracked.len());
        Self::new(device_dir, tracked)
    }

    pub fn tracked(&self) -> &[String] {
        &self.tracked
    }

    pub fn document_path(&self, serial_uuid: &str) -> PathBuf {
        self.device_dir.join(format!("{serial_uuid}.json"))
    }

    pub fn read_document(&self, serial_uuid: &str) -> Result<DeviceDocument, SourceError> {
        read_json(&self.document_path(serial_uuid))
    }

    /// Reads every tracked document and applies its devices to the registry.
    /// Unreadable documents are logged and skipped.
    pub fn apply_to(&self, registry: &DeviceRegistry) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        for serial_uuid in &self.tracked {
            let document = match self.read_document(serial_uuid) {
                Ok(document) => document,
                Err(e) => {
                    warn!("[config] device source skipped: {}", e);
                    summary.sources_failed += 1;
                    continue;
                }
            };
            summary.sources_read += 1;
            for record in document.devices {
                if !is_safe_id(&record.uuid) {
                    warn!("[config] device {:?} in {} ignored: not a valid file name", record.uuid, serial_uuid);
                    summary.rejected += 1;
                    continue;
                }
                summary.record(registry.apply_reload(&record.uuid, record.profile));
            }
        }
        summary
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let content = fs::read_to_string(path).map_err(|source| SourceError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&content).map_err(|source| SourceError::Json { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use symbion_devkit::FixtureDir;

    #[test]
    fn test_serial_config_lists_tracked_lines() {
        let fixtures = FixtureDir::new().unwrap();
        fixtures.write_serial_config(&["A", "B"]).unwrap();

        let sources = DeviceSources::from_serial_config(&fixtures.serial_config_path(), fixtures.path());
        assert_eq!(sources.tracked(), ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_path_like_ids_are_rejected() {
        let fixtures = FixtureDir::new().unwrap();
        fixtures.write_serial_config(&["A", "../outside", "x/y"]).unwrap();
        fixtures
            .write_device_document(
                "A",
                &[
                    json!({"uuid": "good", "device-type": "sensor", "acquisition-cycle": 500}),
                    json!({"uuid": "../escape", "device-type": "sensor", "acquisition-cycle": 500}),
                ],
            )
            .unwrap();

        let sources = DeviceSources::from_serial_config(&fixtures.serial_config_path(), fixtures.path());
        assert_eq!(sources.tracked(), ["A".to_string()]);

        let registry = DeviceRegistry::new();
        let summary = sources.apply_to(&registry);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.rejected, 1);
        assert!(registry.get("../escape").is_none());
        assert!(registry.get("good").is_some());
    }

    #[test]
    fn test_missing_serial_config_tracks_nothing() {
        let fixtures = FixtureDir::new().unwrap();
        let sources = DeviceSources::from_serial_config(&fixtures.serial_config_path(), fixtures.path());
        assert!(sources.tracked().is_empty());
    }

    #[test]
    fn test_apply_skips_unreadable_sources() {
        let fixtures = FixtureDir::new().unwrap();
        fixtures
            .write_device_document("A", &[json!({"uuid": "A", "device-type": "sensor", "acquisition-cycle": 500})])
            .unwrap();
        fixtures.write_raw("B.json", "{ not json").unwrap();

        let registry = DeviceRegistry::new();
        let sources = DeviceSources::new(fixtures.path(), vec!["A".into(), "B".into(), "C".into()]);
        let summary = sources.apply_to(&registry);

        assert_eq!(summary.sources_read, 1);
        assert_eq!(summary.sources_failed, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(registry.get("A").unwrap().profile.acquisition_cycle, 500);
    }

    #[test]
    fn test_reload_applies_new_interval_and_is_idempotent() {
        let fixtures = FixtureDir::new().unwrap();
        fixtures
            .write_device_document("A", &[json!({"uuid": "A", "device-type": "sensor", "acquisition-cycle": 500})])
            .unwrap();

        let registry = DeviceRegistry::new();
        let sources = DeviceSources::new(fixtures.path(), vec!["A".into()]);
        sources.apply_to(&registry);

        fixtures
            .write_device_document("A", &[json!({"uuid": "A", "device-type": "sensor", "acquisition-cycle": 1000})])
            .unwrap();
        let first = sources.apply_to(&registry);
        assert_eq!(first.updated, 1);
        let after_first = registry.snapshot_devices();

        let second = sources.apply_to(&registry);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(registry.snapshot_devices(), after_first);
        assert_eq!(registry.get("A").unwrap().interval(), Some(std::time::Duration::from_millis(1000)));
    }

    #[test]
    fn test_reload_never_prunes() {
        let fixtures = FixtureDir::new().unwrap();
        fixtures
            .write_device_document(
                "A",
                &[
                    json!({"uuid": "A", "device-type": "sensor", "acquisition-cycle": 500}),
                    json!({"uuid": "A2", "device-type": "control", "acquisition-cycle": 800}),
                ],
            )
            .unwrap();

        let registry = DeviceRegistry::new();
        let sources = DeviceSources::new(fixtures.path(), vec!["A".into()]);
        sources.apply_to(&registry);

        fixtures
            .write_device_document("A", &[json!({"uuid": "A", "device-type": "sensor", "acquisition-cycle": 500})])
            .unwrap();
        sources.apply_to(&registry);

        assert_eq!(registry.len(), 2);
        assert!(registry.get("A2").is_some());
    }
}
