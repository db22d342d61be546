/**
 * ACQUISITION SCHEDULER - Boucle de télémétrie simulée
 *
 * ROLE :
 * Runs forever on its own task: for each device in the registry, simulate a
 * reading set, hand it to the sink with a fresh UTC timestamp, then sleep the
 * device's own acquisition cycle before moving on.
 *
 * RELOAD :
 * Each cycle lists the registry ids, then fetches every descriptor again right
 * before visiting it. A reload that lands mid-cycle is therefore picked up by
 * the next device visit; a sleep already started keeps its old duration.
 *
 * FAILURES :
 * Sink errors are logged and the loop moves on. No retry, no backoff.
 */

use crate::models::{DeviceDescriptor, ReadingSet};
use crate::registry::DeviceRegistry;
use crate::simulator::ReadingSimulator;
use crate::sink::{SinkError, TelemetrySink};
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `YYYY-MM-DDTHH:MM:SSZ`, always in UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let utc = at.to_offset(time::UtcOffset::UTC);
    utc.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
        .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}

pub fn timestamp_now() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub visited: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleStats),
    Stopped,
}

pub struct AcquisitionScheduler {
    registry: DeviceRegistry,
    simulator: Arc<ReadingSimulator>,
    sink: Arc<dyn TelemetrySink>,
    idle_wait: Duration,
}

impl AcquisitionScheduler {
    pub fn new(registry: DeviceRegistry, simulator: Arc<ReadingSimulator>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self { registry, simulator, sink, idle_wait: Duration::from_secs(1) }
    }

    /// Pause used when a full cycle had nothing to visit.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Simulate and persist one reading of `device`.
    pub fn acquire(&self, device: &DeviceDescriptor) -> Result<ReadingSet, SinkError> {
        let readings = self.simulator.simulate(device);
        let timestamp = timestamp_now();
        self.sink.write(&device.id, &readings, &timestamp)?;
        debug!("[scheduler] {} -> {} metric(s) at {}", device.id, readings.len(), timestamp);
        Ok(readings)
    }

    /// One pass over the registry. Returns `Stopped` as soon as shutdown is
    /// signalled, even in the middle of a device's wait.
    pub async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        let mut stats = CycleStats::default();
        let ids: Vec<String> = self.registry.snapshot_devices().into_iter().map(|d| d.id).collect();

        for id in ids {
            if *shutdown.borrow() {
                return CycleOutcome::Stopped;
            }
            // Re-read so type and interval come from the same registry state.
            let Some(device) = self.registry.get(&id) else { continue };
            let Some(interval) = device.interval() else {
                debug!("[scheduler] {} skipped (acquisition-cycle {})", id, device.profile.acquisition_cycle);
                stats.skipped += 1;
                continue;
            };

            stats.visited += 1;
            if let Err(e) = self.acquire(&device) {
                warn!("[scheduler] write failed for {}: {}", id, e);
                stats.failed += 1;
            }

            if !wait_or_shutdown(interval, shutdown).await {
                return CycleOutcome::Stopped;
            }
        }
        CycleOutcome::Completed(stats)
    }

    /// Runs cycles until `shutdown` is signalled (or its sender dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("[scheduler] acquisition loop started ({} device(s))", self.registry.len());
        loop {
            match self.run_cycle(&mut shutdown).await {
                CycleOutcome::Stopped => break,
                CycleOutcome::Completed(stats) if stats.visited == 0 => {
                    if !wait_or_shutdown(self.idle_wait, &mut shutdown).await {
                        break;
                    }
                }
                CycleOutcome::Completed(_) => {}
            }
        }
        info!("[scheduler] acquisition loop stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Sleeps `duration`; `false` if shutdown arrived first.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}
