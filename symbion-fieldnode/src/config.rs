use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::commands::CommandClassifier;
use crate::dispatcher::{CommandTokens, DispatchSettings};

pub const CONFIG_ENV: &str = "SYMBION_FIELDNODE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fieldnode.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub mqtt: MqttConf,
    pub topics: TopicsConf,
    pub commands: CommandsConf,
    pub devices: DevicesConf,
    pub storage: StorageConf,
    /// Devices whose logs are returned by the feedback command, in order
    pub feedback_devices: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub channel_capacity: usize,
    /// Incoming and outgoing packet limit in bytes. Feedback payloads carry
    /// whole device logs, far above rumqttc's 10 KiB default.
    pub max_packet_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConf {
    pub command: String,
    pub serial_data: String,
    pub feedback: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CommandsConf {
    pub controller_marker: String,
    pub sensor_marker: String,
    pub reload_token: String,
    pub feedback_token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DevicesConf {
    pub serial_config: PathBuf,
    pub config_dir: PathBuf,
    /// Pause when a whole cycle had no device to visit
    pub idle_wait_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConf {
    pub data_dir: PathBuf,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            username: None,
            password: None,
            client_id_prefix: "symbion-fieldnode".into(),
            keep_alive_secs: 60,
            channel_capacity: 10,
            max_packet_size: 4 * 1024 * 1024,
        }
    }
}

impl Default for TopicsConf {
    fn default() -> Self {
        Self { command: "command".into(), serial_data: "serial/data".into(), feedback: "feedback".into() }
    }
}

impl Default for CommandsConf {
    fn default() -> Self {
        let tokens = CommandTokens::default();
        Self {
            controller_marker: "controller".into(),
            sensor_marker: "sensor".into(),
            reload_token: tokens.reload,
            feedback_token: tokens.feedback,
        }
    }
}

impl Default for DevicesConf {
    fn default() -> Self {
        Self { serial_config: "serial_config.json".into(), config_dir: ".".into(), idle_wait_ms: 1000 }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_dir: "./data".into() }
    }
}

impl NodeConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            classifier: CommandClassifier::new(&self.commands.controller_marker, &self.commands.sensor_marker),
            tokens: CommandTokens {
                reload: self.commands.reload_token.clone(),
                feedback: self.commands.feedback_token.clone(),
            },
            feedback_topic: self.topics.feedback.clone(),
            feedback_devices: self.feedback_devices.clone(),
        }
    }

    /// Reads `SYMBION_MQTT_HOST` / `SYMBION_MQTT_PORT` on top of the file.
    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SYMBION_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = std::env::var("SYMBION_MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(_) => warn!("[config] SYMBION_MQTT_PORT invalide: {port}"),
            }
        }
    }
}

/// Parses a YAML config. An empty document yields the defaults.
pub fn parse_config(txt: &str) -> Result<NodeConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(NodeConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub fn load_config_from(path: &Path) -> NodeConfig {
    let mut cfg = if path.exists() {
        let txt = std::fs::read_to_string(path).unwrap_or_else(|e| {
            error!("[config] lecture impossible {}: {e}", path.display());
            String::new()
        });
        parse_config(&txt).unwrap_or_else(|e| {
            error!("[config] config invalide {}: {e}", path.display());
            NodeConfig::default()
        })
    } else {
        warn!("[config] pas de {}, usage config par défaut", path.display());
        NodeConfig::default()
    };
    cfg.apply_env();
    cfg
}

pub fn load_config() -> NodeConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(Path::new(&path))
}
