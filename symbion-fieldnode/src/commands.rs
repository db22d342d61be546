//! Command classification and per-category FIFO queues.
//!
//! Classification is a substring test with a fixed check order: the
//! controller marker wins over the sensor marker, so a command carrying both
//! is a controller command. Unclassified commands never reach a queue.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Controller,
    Sensor,
    Unclassified,
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandCategory::Controller => "controller",
            CommandCategory::Sensor => "sensor",
            CommandCategory::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CommandClassifier {
    controller_marker: String,
    sensor_marker: String,
}

impl CommandClassifier {
    pub fn new(controller_marker: impl Into<String>, sensor_marker: impl Into<String>) -> Self {
        Self { controller_marker: controller_marker.into(), sensor_marker: sensor_marker.into() }
    }

    pub fn classify(&self, raw: &str) -> CommandCategory {
        if raw.contains(&self.controller_marker) {
            CommandCategory::Controller
        } else if raw.contains(&self.sensor_marker) {
            CommandCategory::Sensor
        } else {
            CommandCategory::Unclassified
        }
    }
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new("controller", "sensor")
    }
}

/// Unbounded FIFO for one category. Producers only touch the channel
/// sender; the receiver is locked by the single draining consumer.
#[derive(Debug)]
pub struct CategoryQueue {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    pending: AtomicUsize,
}

impl CategoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Mutex::new(rx), pending: AtomicUsize::new(0) }
    }

    pub fn push(&self, command: String) {
        // Counted before the send so a concurrent pop never drives it below zero.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(command).is_err() {
            // Receiver lives in `self`; unreachable while the queue exists.
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn pop(&self) -> Option<String> {
        let command = self.rx.lock().try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(command)
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CategoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Both category queues.
#[derive(Debug, Default)]
pub struct CommandQueues {
    controller: CategoryQueue,
    sensor: CategoryQueue,
}

impl CommandQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, category: CommandCategory) -> Option<&CategoryQueue> {
        match category {
            CommandCategory::Controller => Some(&self.controller),
            CommandCategory::Sensor => Some(&self.sensor),
            CommandCategory::Unclassified => None,
        }
    }

    /// Appends `command` to its category queue. Returns `false` for
    /// unclassified commands, which are dropped.
    pub fn enqueue(&self, category: CommandCategory, command: String) -> bool {
        match self.queue(category) {
            Some(queue) => {
                queue.push(command);
                true
            }
            None => {
                debug!("[dispatch] dropped unclassified command {:?}", command);
                false
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.controller.len() + self.sensor.len()
    }
}
