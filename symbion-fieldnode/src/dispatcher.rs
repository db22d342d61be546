/**
 * COMMAND DISPATCHER - Inbound command handling
 *
 * ROLE :
 * `intake` is called once per inbound bus message: classify -> enqueue ->
 * drain the category queue. Handlers run synchronously on the caller, which is
 * the MQTT event loop, so a slow handler (a large reload, a big feedback
 * payload) delays delivery of the next inbound message. Accepted: commands are
 * rare operator actions.
 *
 * HANDLERS :
 * - controller queue: the reload token re-reads every tracked device document
 *   and applies it to the registry
 * - sensor queue: the feedback token publishes the concatenated logs of the
 *   configured feedback devices on the feedback topic
 * Any other token is consumed as a no-op.
 */

use crate::commands::{CommandCategory, CommandClassifier, CommandQueues};
use crate::devices::{DeviceSources, ReloadSummary};
use crate::mqtt::{BusError, FeedbackPublisher};
use crate::registry::DeviceRegistry;
use crate::sink::TelemetryLog;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CommandTokens {
    pub reload: String,
    pub feedback: String,
}

impl Default for CommandTokens {
    fn default() -> Self {
        Self { reload: "controlleruc".into(), feedback: "sensorfb".into() }
    }
}

/// Static dispatcher settings, usually derived from `NodeConfig`.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    pub classifier: CommandClassifier,
    pub tokens: CommandTokens,
    pub feedback_topic: String,
    /// Devices whose logs make up a feedback payload, in payload order
    pub feedback_devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    ConfigReload(ReloadSummary),
    Feedback { bytes: usize },
    Ignored,
    Failed(String),
}

/// One command taken off a queue and what was done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub category: CommandCategory,
    pub command: String,
    pub action: DispatchAction,
}

pub struct Dispatcher {
    settings: DispatchSettings,
    queues: Arc<CommandQueues>,
    registry: DeviceRegistry,
    sources: DeviceSources,
    log: Arc<dyn TelemetryLog>,
    publisher: Arc<dyn FeedbackPublisher>,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        registry: DeviceRegistry,
        sources: DeviceSources,
        log: Arc<dyn TelemetryLog>,
        publisher: Arc<dyn FeedbackPublisher>,
    ) -> Self {
        Self { settings, queues: Arc::new(CommandQueues::new()), registry, sources, log, publisher }
    }

    /// Shares an existing set of queues (extra producers, tests).
    pub fn with_queues(mut self, queues: Arc<CommandQueues>) -> Self {
        self.queues = queues;
        self
    }

    pub fn queues(&self) -> &Arc<CommandQueues> {
        &self.queues
    }

    /// Classify, enqueue and immediately drain the command's category.
    pub fn intake(&self, raw: &str) -> Vec<Dispatched> {
        let category = self.settings.classifier.classify(raw);
        if !self.queues.enqueue(category, raw.to_string()) {
            return Vec::new();
        }
        debug!("[dispatch] queued {} command {:?}", category, raw);
        self.drain(category)
    }

    /// Pops the category queue until empty, handling each command in order.
    pub fn drain(&self, category: CommandCategory) -> Vec<Dispatched> {
        let Some(queue) = self.queues.queue(category) else {
            return Vec::new();
        };

        let mut dispatched = Vec::new();
        while let Some(command) = queue.pop() {
            let action = self.handle(category, &command);
            dispatched.push(Dispatched { category, command, action });
        }
        dispatched
    }

    fn handle(&self, category: CommandCategory, command: &str) -> DispatchAction {
        match category {
            CommandCategory::Controller if command == self.settings.tokens.reload => {
                DispatchAction::ConfigReload(self.reload_config())
            }
            CommandCategory::Sensor if command == self.settings.tokens.feedback => match self.publish_feedback() {
                Ok(bytes) => DispatchAction::Feedback { bytes },
                Err(e) => {
                    warn!("[dispatch] feedback not published: {}", e);
                    DispatchAction::Failed(e.to_string())
                }
            },
            _ => {
                debug!("[dispatch] no handler for {} command {:?}", category, command);
                DispatchAction::Ignored
            }
        }
    }

    fn reload_config(&self) -> ReloadSummary {
        info!("[dispatch] reloading device configuration");
        let summary = self.sources.apply_to(&self.registry);
        info!(
            "[dispatch] reload done: {} source(s) read, {} failed, {} updated, {} added",
            summary.sources_read, summary.sources_failed, summary.updated, summary.inserted
        );
        summary
    }

    /// Concatenated logs of the feedback devices, in declaration order.
    pub fn feedback_payload(&self) -> String {
        let mut payload = String::new();
        for device_id in &self.settings.feedback_devices {
            match self.log.read_log(device_id) {
                Ok(content) => payload.push_str(&content),
                Err(e) => warn!("[dispatch] feedback log of {} skipped: {}", device_id, e),
            }
        }
        payload
    }

    fn publish_feedback(&self) -> Result<usize, BusError> {
        let payload = self.feedback_payload();
        let bytes = payload.len();
        self.publisher.publish(&self.settings.feedback_topic, payload.into_bytes())?;
        info!("[dispatch] feedback published ({} bytes)", bytes);
        Ok(bytes)
    }
}
