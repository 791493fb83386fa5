//! Simulated temperature/humidity sensor.

use beacon_protocols::SensorSource;
use rand::Rng;

/// Readings that wander around a base value.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    base_temperature: i32,
    base_humidity: i32,
    jitter: u32,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(22, 45, 2)
    }
}

impl SimulatedSensor {
    pub fn new(base_temperature: i32, base_humidity: i32, jitter: i32) -> Self {
        Self {
            base_temperature,
            base_humidity,
            jitter: jitter.unsigned_abs(),
        }
    }

    fn wander(&self, base: i32) -> i32 {
        if self.jitter == 0 {
            return base;
        }
        let jitter = i64::from(self.jitter);
        let reading = i64::from(base) + rand::thread_rng().gen_range(-jitter..=jitter);
        reading.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

impl SensorSource for SimulatedSensor {
    fn temperature_celsius(&self) -> i32 {
        self.wander(self.base_temperature)
    }

    fn humidity_percent(&self) -> i32 {
        self.wander(self.base_humidity).clamp(0, 100)
    }
}
