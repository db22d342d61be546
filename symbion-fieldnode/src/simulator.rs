//! Reading simulator: turns a device descriptor into a fresh reading set.
//!
//! - `sensor`  -> humidity + temperature, uniform in [0, 100)
//! - `control` -> light, uniform in [0, 1000)
//! - anything else -> empty set

use crate::models::{DeviceDescriptor, ReadingSet};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SENSOR_TYPE: &str = "sensor";
pub const CONTROL_TYPE: &str = "control";

const HUMIDITY_RANGE: std::ops::Range<f64> = 0.0..100.0;
const LIGHT_RANGE: std::ops::Range<f64> = 0.0..1000.0;

#[derive(Debug)]
pub struct ReadingSimulator {
    rng: Mutex<StdRng>,
}

impl ReadingSimulator {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Deterministic stream, for tests and replayable runs.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    pub fn simulate(&self, device: &DeviceDescriptor) -> ReadingSet {
        let mut readings = ReadingSet::new();
        match device.device_type() {
            SENSOR_TYPE => {
                let mut rng = self.rng.lock();
                readings.insert("humidity".into(), render(rng.gen_range(HUMIDITY_RANGE), HUMIDITY_RANGE.end));
                readings.insert("temperature".into(), render(rng.gen_range(HUMIDITY_RANGE), HUMIDITY_RANGE.end));
            }
            CONTROL_TYPE => {
                let value = self.rng.lock().gen_range(LIGHT_RANGE);
                readings.insert("light".into(), render(value, LIGHT_RANGE.end));
            }
            _ => {}
        }
        readings
    }
}

impl Default for ReadingSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Six decimals, truncated. `value * 1e6` can round up to `upper * 1e6` for
/// values a few ulps below `upper`, hence the clamp.
fn render(value: f64, upper: f64) -> String {
    let micros = (value * 1e6).floor().min(upper * 1e6 - 1.0);
    format!("{:.6}", micros / 1e6)
}
