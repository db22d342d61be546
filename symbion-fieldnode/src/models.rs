use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Metric name -> stringified value, one device, one tick.
pub type ReadingSet = BTreeMap<String, String>;

/// Everything about a device except its identifier. This is the unit a hot
/// reload replaces, so that type and interval always change together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceProfile {
    pub key: String,
    pub alias: String,
    pub address: i64,
    pub start_offset: i64,
    pub device_type: String,
    pub description: String,
    pub category: Vec<String>,
    pub fields: Vec<String>,
    /// Milliseconds between two readings of this device.
    pub acquisition_cycle: i64,
    pub model_type: String,
    pub location: String,
    pub unit: BTreeMap<String, String>,
    pub manufacturer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub profile: DeviceProfile,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, profile: DeviceProfile) -> Self {
        Self { id: id.into(), profile }
    }

    pub fn device_type(&self) -> &str {
        &self.profile.device_type
    }

    /// `None` when the configured cycle is not strictly positive; such devices
    /// are skipped by the scheduler.
    pub fn interval(&self) -> Option<Duration> {
        u64::try_from(self.profile.acquisition_cycle)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Ids end up as file names (`<id>.json`, `<id>.txt`): no separators, no
/// dot-only names, no NUL.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

/// One entry of a device document (`<serial-uuid>.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    pub uuid: String,
    #[serde(flatten)]
    pub profile: DeviceProfile,
}

impl From<DeviceRecord> for DeviceDescriptor {
    fn from(record: DeviceRecord) -> Self {
        DeviceDescriptor::new(record.uuid, record.profile)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceDocument {
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialEntry {
    pub uuid: String,
}

/// Serial config: the list of serial lines whose device documents we track.
#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default)]
    pub devices: Vec<SerialEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_document_parsing() {
        let doc: DeviceDocument = serde_json::from_str(
            r#"{
                "devices": [{
                    "uuid": "29C5F44E0A49470FB06367CDC9724FD3",
                    "key": "k1",
                    "alias": "greenhouse-1",
                    "address": 3,
                    "start-offset": 16,
                    "device-type": "sensor",
                    "category": ["env"],
                    "fields": ["humidity", "temperature"],
                    "acquisition-cycle": 500,
                    "model-type": "DHT22",
                    "location": "north wall",
                    "unit": {"humidity": "%", "temperature": "C"},
                    "manufacturer": "Aosong"
                }]
            }"#,
        )
        .unwrap();

        let device: DeviceDescriptor = doc.devices[0].clone().into();
        assert_eq!(device.id, "29C5F44E0A49470FB06367CDC9724FD3");
        assert_eq!(device.device_type(), "sensor");
        assert_eq!(device.profile.start_offset, 16);
        assert_eq!(device.profile.unit["humidity"], "%");
        assert_eq!(device.interval(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_non_positive_cycle_has_no_interval() {
        let mut profile = DeviceProfile { device_type: "sensor".into(), ..Default::default() };
        assert_eq!(DeviceDescriptor::new("a", profile.clone()).interval(), None);

        profile.acquisition_cycle = -20;
        assert_eq!(DeviceDescriptor::new("a", profile).interval(), None);
    }

    #[test]
    fn test_file_safe_ids() {
        assert!(is_safe_id("29C5F44E0A49470FB06367CDC9724FD3"));
        assert!(is_safe_id("dev-1.a"));
        for id in ["", ".", "..", "../x", "a/b", "a\\b", "a\0b"] {
            assert!(!is_safe_id(id), "{id:?}");
        }
    }

    #[test]
    fn test_missing_fields_default() {
        let record: DeviceRecord = serde_json::from_str(r#"{"uuid": "x"}"#).unwrap();
        assert_eq!(record.profile, DeviceProfile::default());
    }
}
