//! # Longitudinal fixed-wing plant
//!
//! A point-mass longitudinal model for closed-loop testing of the energy
//! controller:
//! - Quadratic drag polar (parasitic + induced) with lift balancing weight
//! - Thrust proportional to throttle with a first-order engine lag
//! - First-order pitch response standing in for the attitude inner loop
//! - Flight-path angle slaved to pitch (constant angle of attack folded in)
//! - RK4 integration with a fixed inner timestep
//!
//! The model is deliberately minimal: it exposes exactly the coupling TECS
//! must manage (thrust changes total energy, pitch trades speed for height)
//! without lateral dynamics or wind.

use nalgebra::SVector;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Inner integration timestep (seconds) - 1000Hz
const DT: f64 = 0.001;

/// Airspeed floor for aerodynamic coefficients (m/s)
const MIN_AERO_SPEED: f64 = 1.0;

/// State vector layout: [altitude, airspeed, pitch, throttle, distance]
type State = SVector<f64, 5>;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Airframe and engine parameters for the longitudinal model
#[derive(Debug, Clone)]
pub struct PlantParams {
    /// All-up mass (kg)
    pub mass: f64,

    /// Wing reference area (m²)
    pub wing_area: f64,

    /// Parasitic drag coefficient (dimensionless)
    pub cd0: f64,

    /// Induced drag factor: CD = cd0 + k * CL² (dimensionless)
    pub induced_drag_k: f64,

    /// Air density (kg/m³); sea level standard by default so EAS == TAS
    pub air_density: f64,

    /// Static thrust at full throttle (N)
    pub max_thrust: f64,

    /// Engine response time constant (s)
    pub thrust_lag_tau: f64,

    /// Attitude inner loop time constant (s)
    pub pitch_lag_tau: f64,

    /// Gravitational acceleration (m/s²)
    pub gravity: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            // ~10 kg small UAV cruising at 15 m/s
            mass: 10.0,
            wing_area: 1.0,
            cd0: 0.06,
            induced_drag_k: 0.06,
            air_density: 1.225,

            // Enough margin over trim drag for ~4 m/s climbs
            max_thrust: 40.0,
            thrust_lag_tau: 0.4,
            pitch_lag_tau: 0.35,

            gravity: 9.80665,
        }
    }
}

impl PlantParams {
    /// Drag in level flight at `airspeed` (N).
    pub fn level_drag(&self, airspeed: f64) -> f64 {
        let v = airspeed.max(MIN_AERO_SPEED);
        let q = 0.5 * self.air_density * v * v;
        let cl = self.mass * self.gravity / (q * self.wing_area);
        let cd = self.cd0 + self.induced_drag_k * cl * cl;
        q * self.wing_area * cd
    }

    /// Throttle fraction that balances drag in level flight at `airspeed`.
    pub fn trim_throttle(&self, airspeed: f64) -> f64 {
        (self.level_drag(airspeed) / self.max_thrust).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Plant
// ---------------------------------------------------------------------------

pub struct Plant {
    params: PlantParams,
    state: State,
    /// Last evaluated longitudinal acceleration, mimicking the along-axis
    /// accelerometer channel the controller consumes.
    accel_forward: f64,
    /// Fault injection: scales the available thrust.
    thrust_scale: f64,
}

impl Plant {
    /// Start in trimmed level flight at the given altitude and airspeed.
    pub fn new(params: PlantParams, altitude: f64, airspeed: f64) -> Self {
        let trim = params.trim_throttle(airspeed);
        Self {
            params,
            state: State::from([altitude, airspeed, 0.0, trim, 0.0]),
            accel_forward: 0.0,
            thrust_scale: 1.0,
        }
    }

    pub fn params(&self) -> &PlantParams {
        &self.params
    }

    /// Scale the available thrust (1.0 = healthy engine).
    pub fn set_thrust_scale(&mut self, scale: f64) {
        self.thrust_scale = scale.max(0.0);
    }

    fn derivatives(&self, s: &State, throttle_cmd: f64, pitch_cmd: f64) -> State {
        let p = &self.params;
        let v = s[1].max(MIN_AERO_SPEED);
        let gamma = s[2];

        let q = 0.5 * p.air_density * v * v;
        let cl = p.mass * p.gravity * gamma.cos() / (q * p.wing_area);
        let cd = p.cd0 + p.induced_drag_k * cl * cl;
        let drag = q * p.wing_area * cd;
        let thrust = p.max_thrust * self.thrust_scale * s[3].clamp(0.0, 1.0);

        State::from([
            s[1] * gamma.sin(),
            (thrust - drag) / p.mass - p.gravity * gamma.sin(),
            (pitch_cmd - s[2]) / p.pitch_lag_tau,
            (throttle_cmd.clamp(0.0, 1.0) - s[3]) / p.thrust_lag_tau,
            s[1] * gamma.cos(),
        ])
    }

    /// Advance the plant by `dt` seconds with the given actuator commands,
    /// integrating at the fixed inner timestep.
    pub fn step(&mut self, dt: f64, throttle_cmd: f64, pitch_cmd: f64) {
        let mut remaining = dt;
        while remaining > 1e-9 {
            let h = remaining.min(DT);

            // RK4
            let k1 = self.derivatives(&self.state, throttle_cmd, pitch_cmd);
            let k2 = self.derivatives(&(self.state + k1 * (h / 2.0)), throttle_cmd, pitch_cmd);
            let k3 = self.derivatives(&(self.state + k2 * (h / 2.0)), throttle_cmd, pitch_cmd);
            let k4 = self.derivatives(&(self.state + k3 * h), throttle_cmd, pitch_cmd);

            self.state += (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
            self.state[1] = self.state[1].max(0.0);

            self.accel_forward = k1[1];
            remaining -= h;
        }
    }

    // ── State access ──────────────────────────────────────────

    pub fn altitude(&self) -> f64 {
        self.state[0]
    }

    pub fn airspeed(&self) -> f64 {
        self.state[1]
    }

    /// Equivalent airspeed; identical to TAS at the default sea-level
    /// density.
    pub fn eas(&self) -> f64 {
        self.state[1] * (self.params.air_density / 1.225).sqrt()
    }

    pub fn pitch(&self) -> f64 {
        self.state[2]
    }

    pub fn throttle(&self) -> f64 {
        self.state[3]
    }

    pub fn climb_rate(&self) -> f64 {
        self.state[1] * self.state[2].sin()
    }

    pub fn accel_forward(&self) -> f64 {
        self.accel_forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmed_plant_holds_level_flight() {
        let params = PlantParams::default();
        let trim = params.trim_throttle(15.0);
        let mut plant = Plant::new(params, 100.0, 15.0);

        for _ in 0..1000 {
            plant.step(0.01, trim, 0.0);
        }
        assert!((plant.altitude() - 100.0).abs() < 0.5);
        assert!((plant.airspeed() - 15.0).abs() < 0.2);
    }

    #[test]
    fn full_throttle_accelerates_then_pitch_converts_to_climb() {
        let mut plant = Plant::new(PlantParams::default(), 100.0, 15.0);

        for _ in 0..500 {
            plant.step(0.01, 1.0, 0.2);
        }
        assert!(plant.altitude() > 105.0, "no climb at full throttle");
        assert!((plant.pitch() - 0.2).abs() < 0.01, "pitch lag never settled");
    }

    #[test]
    fn thrust_fault_bleeds_airspeed_in_level_flight() {
        let params = PlantParams::default();
        let trim = params.trim_throttle(15.0);
        let mut plant = Plant::new(params, 100.0, 15.0);
        plant.set_thrust_scale(0.2);

        for _ in 0..1000 {
            plant.step(0.01, trim, 0.0);
        }
        assert!(plant.airspeed() < 14.0);
    }

    #[test]
    fn trim_throttle_balances_level_drag() {
        let params = PlantParams::default();
        let trim = params.trim_throttle(15.0);
        assert!(trim > 0.1 && trim < 0.6, "implausible trim: {trim}");
        let thrust = trim * params.max_thrust;
        assert!((thrust - params.level_drag(15.0)).abs() < 1e-6);
    }
}
