/*!
# Symbion DevKit - Stubs et fixtures pour le noeud terrain

Bibliothèque facilitant les tests du field node sans broker:
- Stub MQTT qui enregistre les publications et simule la réception
- Fixtures de configuration (serial_config.json, documents device) en répertoire temporaire
*/

pub mod fixtures;
pub mod mqtt_stub;

pub use fixtures::{device_json, FixtureDir};
pub use mqtt_stub::{MockMessage, MockMqttClient};
