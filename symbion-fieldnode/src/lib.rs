//! Symbion Field Node - simulated telemetry and MQTT command handling
//!
//! - `scheduler`: acquisition loop (simulate -> persist -> wait per device)
//! - `commands` / `dispatcher`: inbound command classification, FIFO queues, handlers
//! - `registry` / `devices`: live device registry and its JSON config sources
//! - `sink`: append-only logs + latest-value cache
//! - `mqtt`: broker session, inbound routing, feedback publishing

pub mod commands;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod models;
pub mod mqtt;
pub mod registry;
pub mod scheduler;
pub mod simulator;
pub mod sink;

pub use commands::{CommandCategory, CommandClassifier, CommandQueues};
pub use config::NodeConfig;
pub use devices::DeviceSources;
pub use dispatcher::{DispatchAction, DispatchSettings, Dispatched, Dispatcher};
pub use models::{DeviceDescriptor, DeviceProfile, ReadingSet};
pub use mqtt::{BusError, BusGateway, FeedbackPublisher};
pub use registry::DeviceRegistry;
pub use scheduler::AcquisitionScheduler;
pub use simulator::ReadingSimulator;
pub use sink::{FileSink, SinkError, TelemetryLog, TelemetrySink};
