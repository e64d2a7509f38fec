//! Simulated sensor readings for running without controller hardware.
//!
//! Every field follows a slow sine wave between fixed bounds so the host
//! sees plausible, changing telemetry. The outlet group runs a couple of
//! seconds ahead of the inlet group. Live samples add uniform noise of up
//! to `jitter` on top of the wave; [`SimulatedSensors::sample_at`] stays
//! noise-free.

use std::f64::consts::TAU;
use std::time::Instant;

use rand::Rng;

use crate::protocol::{SensorGroup, SensorReading};

/// Phase lead of the outlet sensors, in seconds
pub const OUTLET_PHASE_OFFSET_S: f64 = 2.0;

/// Sine wave oscillating between `min` and `max`, plus up to `jitter` of noise
#[derive(Debug, Clone, Copy)]
struct Wave {
    min: f64,
    max: f64,
    period_s: f64,
    phase_s: f64,
    jitter: f64,
}

impl Wave {
    const fn new(min: f64, max: f64, period_s: f64, jitter: f64) -> Self {
        Self { min, max, period_s, phase_s: 0.0, jitter }
    }

    const fn shifted(self, phase_s: f64) -> Self {
        Self { phase_s, ..self }
    }

    fn at(&self, t: f64) -> f64 {
        let mid = (self.min + self.max) / 2.0;
        let amplitude = (self.max - self.min) / 2.0;
        mid + amplitude * (TAU * (t + self.phase_s) / self.period_s).sin()
    }

    fn noisy_at(&self, t: f64, rng: &mut impl Rng) -> f64 {
        self.at(t) + rng.gen_range(-self.jitter..=self.jitter)
    }
}

const DHT_TEMP: Wave = Wave::new(20.0, 25.0, 60.0, 0.25);
const DHT_HUMIDITY: Wave = Wave::new(40.0, 50.0, 120.0, 0.75);
const SGP_ECO2: Wave = Wave::new(100.0, 200.0, 30.0, 2.0);
const SGP_TVOC: Wave = Wave::new(10.0, 15.0, 60.0, 0.5);
const BME_TEMP: Wave = Wave::new(20.0, 25.0, 60.0, 0.25).shifted(-2.0);
const BME_GAS: Wave = Wave::new(75.0, 100.0, 200.0, 1.0);
const BME_HUMIDITY: Wave = Wave::new(40.0, 50.0, 120.0, 0.75).shifted(-2.0);
const BME_PRESSURE: Wave = Wave::new(990.0, 1100.0, 90.0, 5.0);
const BME_ALTITUDE: Wave = Wave::new(500.0, 550.0, 60.0, 2.0);

/// Time-driven sensor source
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    started: Instant,
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }

    /// Noisy reading for the current instant
    pub fn sample(&self) -> SensorReading {
        Self::noisy_sample_at(self.started.elapsed().as_secs_f64(), &mut rand::thread_rng())
    }

    /// Noise-free reading `t` seconds after start
    pub fn sample_at(t: f64) -> SensorReading {
        SensorReading {
            inlet: group_with(|wave| wave.at(t)),
            outlet: group_with(|wave| wave.at(t + OUTLET_PHASE_OFFSET_S)),
        }
    }

    fn noisy_sample_at(t: f64, rng: &mut impl Rng) -> SensorReading {
        SensorReading {
            inlet: group_with(|wave| wave.noisy_at(t, rng)),
            outlet: group_with(|wave| wave.noisy_at(t + OUTLET_PHASE_OFFSET_S, rng)),
        }
    }
}

fn group_with(mut value: impl FnMut(&Wave) -> f64) -> SensorGroup {
    SensorGroup {
        dht_temp_c: value(&DHT_TEMP).round() as i16,
        dht_humidity_rh: value(&DHT_HUMIDITY).round() as u16,
        sgp_eco2_ppm: value(&SGP_ECO2).round() as u16,
        sgp_tvoc_ppb: value(&SGP_TVOC).round() as u16,
        bme_temp_c: value(&BME_TEMP) as f32,
        bme_gas_kohm: value(&BME_GAS) as f32,
        bme_humidity_rh: value(&BME_HUMIDITY) as f32,
        bme_pressure_hpa: value(&BME_PRESSURE) as f32,
        bme_altitude_m: value(&BME_ALTITUDE) as f32,
    }
}
