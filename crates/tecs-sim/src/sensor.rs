//! Sensor corruption for the closed-loop harness: Gaussian noise on the
//! airspeed, barometric altitude, vertical speed and longitudinal
//! acceleration channels the controller consumes.

use crate::plant::Plant;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub struct SensorConfig {
    /// Global multiplier on all noise levels; zero gives exact measurements.
    pub noise_scale: f64,
    pub eas_noise_std: f64,   // m/s
    pub alt_noise_std: f64,   // m
    pub vz_noise_std: f64,    // m/s
    pub accel_noise_std: f64, // m/s²
    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise_scale: 1.0,
            eas_noise_std: 0.4,
            alt_noise_std: 0.3,
            vz_noise_std: 0.15,
            accel_noise_std: 0.2,
            seed: 42,
        }
    }
}

/// One set of controller inputs, in the controller's conventions
/// (vertical speed positive down).
#[derive(Debug, Clone, Copy)]
pub struct SensorSample {
    pub eas: f32,
    pub altitude: f32,
    pub vz_down: f32,
    pub accel_forward: f32,
}

pub struct SensorModel {
    rng: StdRng,
    d_eas: Normal<f64>,
    d_alt: Normal<f64>,
    d_vz: Normal<f64>,
    d_accel: Normal<f64>,
}

impl SensorModel {
    pub fn new(cfg: &SensorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            d_eas: Normal::new(0.0, cfg.noise_scale * cfg.eas_noise_std).unwrap(),
            d_alt: Normal::new(0.0, cfg.noise_scale * cfg.alt_noise_std).unwrap(),
            d_vz: Normal::new(0.0, cfg.noise_scale * cfg.vz_noise_std).unwrap(),
            d_accel: Normal::new(0.0, cfg.noise_scale * cfg.accel_noise_std).unwrap(),
        }
    }

    pub fn sample(&mut self, plant: &Plant) -> SensorSample {
        SensorSample {
            eas: (plant.eas() + self.d_eas.sample(&mut self.rng)) as f32,
            altitude: (plant.altitude() + self.d_alt.sample(&mut self.rng)) as f32,
            vz_down: (-plant.climb_rate() + self.d_vz.sample(&mut self.rng)) as f32,
            accel_forward: (plant.accel_forward() + self.d_accel.sample(&mut self.rng)) as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::PlantParams;

    #[test]
    fn zero_noise_is_exact() {
        let plant = Plant::new(PlantParams::default(), 100.0, 15.0);
        let mut sensors = SensorModel::new(&SensorConfig {
            noise_scale: 0.0,
            ..SensorConfig::default()
        });

        let s = sensors.sample(&plant);
        assert_eq!(s.altitude, 100.0);
        assert_eq!(s.eas, 15.0);
        assert_eq!(s.vz_down, 0.0);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let plant = Plant::new(PlantParams::default(), 100.0, 15.0);
        let cfg = SensorConfig::default();
        let a = SensorModel::new(&cfg).sample(&plant);
        let b = SensorModel::new(&cfg).sample(&plant);
        assert_eq!(a.eas, b.eas);
        assert_eq!(a.altitude, b.altitude);
    }
}
