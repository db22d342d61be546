/*!
Fixtures de configuration pour le field node

Crée dans un répertoire temporaire:
- `serial_config.json` : liste des lignes série suivies
- `<uuid>.json` : document device d'une ligne série
*/

use anyhow::Result;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SERIAL_CONFIG_FILE: &str = "serial_config.json";

/// Répertoire temporaire de configuration, supprimé au drop
pub struct FixtureDir {
    dir: TempDir,
}

impl FixtureDir {
    pub fn new() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests
        Ok(Self { dir: tempfile::tempdir()? })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn serial_config_path(&self) -> PathBuf {
        self.path().join(SERIAL_CONFIG_FILE)
    }

    pub fn document_path(&self, serial_uuid: &str) -> PathBuf {
        self.path().join(format!("{serial_uuid}.json"))
    }

    /// Écrit `serial_config.json` avec les lignes série données
    pub fn write_serial_config(&self, serial_uuids: &[&str]) -> Result<PathBuf> {
        let devices: Vec<Value> = serial_uuids.iter().map(|uuid| json!({ "uuid": uuid })).collect();
        let path = self.serial_config_path();
        std::fs::write(&path, serde_json::to_string_pretty(&json!({ "devices": devices }))?)?;
        log::info!("🧪 serial config with {} line(s)", serial_uuids.len());
        Ok(path)
    }

    /// Écrit (ou réécrit) le document device d'une ligne série
    pub fn write_device_document(&self, serial_uuid: &str, devices: &[Value]) -> Result<PathBuf> {
        let path = self.document_path(serial_uuid);
        std::fs::write(&path, serde_json::to_string_pretty(&json!({ "devices": devices }))?)?;
        log::info!("🧪 device document {} ({} device(s))", serial_uuid, devices.len());
        Ok(path)
    }

    /// Écrit un fichier brut (documents invalides, etc.)
    pub fn write_raw(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Entrée device complète au format des documents de configuration
pub fn device_json(uuid: &str, device_type: &str, acquisition_cycle: i64) -> Value {
    json!({
        "uuid": uuid,
        "key": format!("key-{uuid}"),
        "alias": format!("{device_type}-{uuid}"),
        "address": 1,
        "start-offset": 0,
        "device-type": device_type,
        "description": "fixture device",
        "category": [device_type],
        "fields": [],
        "acquisition-cycle": acquisition_cycle,
        "model-type": "SIM",
        "location": "bench",
        "unit": {},
        "manufacturer": "Symbion"
    })
}
