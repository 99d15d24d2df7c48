//! Closed-loop scenario runner: plant + sensors + controller stepped at the
//! controller cadence, recording the telemetry time series.

use crate::plant::{Plant, PlantParams};
use crate::sensor::{SensorConfig, SensorModel};
use log::{debug, info};
use serde::Serialize;
use tecs_core::{TecsConfig, TecsController, TecsInput, TecsMode};

// Schedule constants shared by the canned scenarios.
const EVENT_TIME_S: f64 = 5.0;
const ALT_STEP_M: f64 = 20.0;
const SPEED_STEP_EAS: f32 = 12.0;
const CLIMBOUT_END_S: f64 = 10.0;
const CLIMBOUT_GAIN_M: f64 = 80.0;
const SINK_RATE_M_S: f32 = -2.0;
const SINK_END_S: f64 = 20.0;
const SINK_TARGET_DROP_M: f64 = 40.0;
/// Iced-pitot bias injected by the underspeed scenario (m/s).
const UNDERSPEED_FAULT_BIAS: f64 = -6.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    /// Hold altitude and airspeed at the initial condition.
    Cruise,
    /// Altitude setpoint step at t = 5 s.
    AltStep,
    /// Airspeed setpoint step down at t = 5 s.
    SpeedStep,
    /// Pitot icing at t = 5 s drives the airspeed estimate into the
    /// underspeed band.
    Underspeed,
    /// Climbout gate held for the first 10 s, then a normal climb.
    Climbout,
    /// Direct height-rate command, then altitude hold.
    Sink,
}

impl ScenarioKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cruise => "cruise",
            Self::AltStep => "alt-step",
            Self::SpeedStep => "speed-step",
            Self::Underspeed => "underspeed",
            Self::Climbout => "climbout",
            Self::Sink => "sink",
        }
    }
}

pub struct ScenarioConfig {
    pub kind: ScenarioKind,
    pub duration_s: f64,
    pub control_dt_s: f64,
    pub initial_altitude: f64,
    pub initial_eas: f64,
    pub plant: PlantParams,
    pub tecs: TecsConfig,
    pub sensors: SensorConfig,

    pub throttle_min: f32,
    pub throttle_max: f32,
    pub throttle_trim: f32,
    pub pitch_limit_min: f32,
    pub pitch_limit_max: f32,
    pub target_climbrate: f32,
    pub target_sinkrate: f32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            kind: ScenarioKind::Cruise,
            duration_s: 60.0,
            control_dt_s: 0.02,
            initial_altitude: 100.0,
            initial_eas: 15.0,
            plant: PlantParams::default(),
            tecs: TecsConfig {
                equivalent_airspeed_min: 12.0,
                max_sink_rate: 4.0,
                vert_accel_limit: 4.0,
                jerk_max: 10.0,
                ..TecsConfig::default()
            },
            sensors: SensorConfig::default(),
            throttle_min: 0.0,
            throttle_max: 1.0,
            throttle_trim: 0.45,
            pitch_limit_min: -0.5,
            pitch_limit_max: 0.5,
            target_climbrate: 5.0,
            target_sinkrate: 4.0,
        }
    }
}

impl ScenarioConfig {
    /// Commanded setpoints at scenario time `t`.
    fn input_at(&self, t: f64, plant_pitch: f32) -> TecsInput {
        let mut input = TecsInput {
            pitch: plant_pitch,
            hgt_setpoint: self.initial_altitude as f32,
            eas_setpoint: self.initial_eas as f32,
            eas_to_tas: 1.0,
            throttle_min: self.throttle_min,
            throttle_max: self.throttle_max,
            throttle_trim: self.throttle_trim,
            pitch_limit_min: self.pitch_limit_min,
            pitch_limit_max: self.pitch_limit_max,
            target_climbrate: self.target_climbrate,
            target_sinkrate: self.target_sinkrate,
            ..TecsInput::default()
        };

        match self.kind {
            ScenarioKind::Cruise | ScenarioKind::Underspeed => {}
            ScenarioKind::AltStep => {
                if t >= EVENT_TIME_S {
                    input.hgt_setpoint = (self.initial_altitude + ALT_STEP_M) as f32;
                }
            }
            ScenarioKind::SpeedStep => {
                if t >= EVENT_TIME_S {
                    input.eas_setpoint = SPEED_STEP_EAS;
                }
            }
            ScenarioKind::Climbout => {
                input.hgt_setpoint = (self.initial_altitude + CLIMBOUT_GAIN_M) as f32;
                if t < CLIMBOUT_END_S {
                    input.climb_out_setpoint = true;
                    input.pitch_min_climbout = 0.08;
                }
            }
            ScenarioKind::Sink => {
                input.hgt_setpoint = (self.initial_altitude - SINK_TARGET_DROP_M) as f32;
                if t < SINK_END_S {
                    input.hgt_rate_setpoint = SINK_RATE_M_S;
                }
            }
        }

        input
    }
}

/// Recorded time series of one closed-loop run.
#[derive(Clone, Serialize)]
pub struct ScenarioResult {
    pub time: Vec<f64>,
    pub altitude: Vec<f64>,
    pub eas: Vec<f64>,
    pub hgt_setpoint: Vec<f32>,
    pub hgt_rate_setpoint: Vec<f32>,
    pub tas_estimate: Vec<f32>,
    pub throttle: Vec<f32>,
    pub pitch: Vec<f32>,
    pub ste_error: Vec<f32>,
    pub seb_error: Vec<f32>,
    pub mode: Vec<u8>,
}

impl ScenarioResult {
    fn with_capacity(n: usize) -> Self {
        Self {
            time: Vec::with_capacity(n),
            altitude: Vec::with_capacity(n),
            eas: Vec::with_capacity(n),
            hgt_setpoint: Vec::with_capacity(n),
            hgt_rate_setpoint: Vec::with_capacity(n),
            tas_estimate: Vec::with_capacity(n),
            throttle: Vec::with_capacity(n),
            pitch: Vec::with_capacity(n),
            ste_error: Vec::with_capacity(n),
            seb_error: Vec::with_capacity(n),
            mode: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// True if the given mode was reported at any tick.
    pub fn saw_mode(&self, mode: TecsMode) -> bool {
        self.mode.iter().any(|&m| m == mode as u8)
    }
}

/// Run a scenario to completion.
pub fn run_scenario(cfg: &ScenarioConfig) -> ScenarioResult {
    let mut plant = Plant::new(cfg.plant.clone(), cfg.initial_altitude, cfg.initial_eas);
    let mut sensors = SensorModel::new(&cfg.sensors);
    let mut tecs = TecsController::new(cfg.tecs);

    let steps = (cfg.duration_s / cfg.control_dt_s) as usize;
    let tick_us = (cfg.control_dt_s * 1e6) as u64;

    info!(
        "scenario {}: {:.0} s at {:.0} Hz",
        cfg.kind.label(),
        cfg.duration_s,
        1.0 / cfg.control_dt_s
    );

    let mut result = ScenarioResult::with_capacity(steps);
    let mut now_us = 0u64;
    let mut last_mode = TecsMode::Normal;

    for i in 0..steps {
        let t = i as f64 * cfg.control_dt_s;
        now_us += tick_us;

        let mut sample = sensors.sample(&plant);
        if cfg.kind == ScenarioKind::Underspeed && t >= EVENT_TIME_S {
            sample.eas += UNDERSPEED_FAULT_BIAS as f32;
        }

        tecs.update_vehicle_state(
            sample.eas,
            sample.accel_forward,
            true,
            sample.altitude,
            sample.vz_down,
            now_us,
        );

        let input = cfg.input_at(t, plant.pitch() as f32);
        tecs.update(&input, now_us);

        if tecs.mode() != last_mode {
            debug!(
                "t={:.2} s: mode {} -> {}",
                t,
                last_mode.label(),
                tecs.mode().label()
            );
            last_mode = tecs.mode();
        }

        plant.step(
            cfg.control_dt_s,
            tecs.throttle_setpoint() as f64,
            tecs.pitch_setpoint() as f64,
        );

        let s = tecs.status();
        result.time.push(t);
        result.altitude.push(plant.altitude());
        result.eas.push(plant.eas());
        result.hgt_setpoint.push(s.hgt_setpoint);
        result.hgt_rate_setpoint.push(s.hgt_rate_setpoint);
        result.tas_estimate.push(s.tas);
        result.throttle.push(s.throttle_setpoint);
        result.pitch.push(s.pitch_setpoint);
        result.ste_error.push(s.ste_error);
        result.seb_error.push(s.seb_error);
        result.mode.push(s.mode as u8);
    }

    info!(
        "scenario {} done: altitude {:.1} m, EAS {:.1} m/s, mode {}",
        cfg.kind.label(),
        plant.altitude(),
        plant.eas(),
        last_mode.label()
    );

    result
}
