//! Controller gains, limits and filter constants.

/// Standard gravity (m/s^2).
pub const ONE_G: f32 = 9.80665;

/// Minimum allowed integration step (s).
pub const DT_MIN: f32 = 0.001;

/// Maximum step before a full state reset is performed instead of
/// integrating across the gap (s).
pub const DT_MAX: f32 = 1.0;

/// Nominal tick period substituted while resetting (s).
pub const DT_DEFAULT: f32 = 0.02;

/// Tuning parameters for the total energy controller.
///
/// The struct is plain data: it is treated as immutable for the duration of a
/// tick and may be swapped between ticks. All units are SI; angles in
/// radians, airspeeds in m/s, specific energy rates in m^2/s^3.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TecsConfig {
    // ── Gains ─────────────────────────────────────────────────
    /// Throttle demand per unit of filtered total-energy-rate error,
    /// normalised by the total-energy-rate span.
    pub throttle_damping_gain: f32,
    /// Integrator gain from total-energy-rate error to throttle (1/s).
    pub integrator_gain_throttle: f32,
    /// Pitch demand per unit of energy-balance-rate error.
    pub pitch_damping_gain: f32,
    /// Integrator gain from energy-balance-rate error to pitch (1/s).
    pub integrator_gain_pitch: f32,
    /// Height error to height-rate demand (1/s).
    pub height_error_gain: f32,
    /// Feed-forward from trajectory velocity to height-rate demand.
    pub height_setpoint_gain_ff: f32,
    /// Airspeed error to airspeed-rate demand (1/s).
    pub airspeed_error_gain: f32,
    /// Extra specific-energy rate per unit of additional load factor,
    /// compensating induced drag rise in turns (m^2/s^3).
    pub load_factor_correction: f32,
    /// Feed-forward from energy-balance-rate demand into the pitch law.
    pub seb_rate_ff: f32,
    /// Speed/height priority for the pitch loop: 0 = all height,
    /// 1 = balanced, 2 = all speed.
    pub pitch_speed_weight: f32,

    // ── Airspeed limits (equivalent airspeed, m/s) ────────────
    pub equivalent_airspeed_min: f32,
    pub equivalent_airspeed_max: f32,
    pub equivalent_airspeed_trim: f32,

    // ── Vertical performance limits ───────────────────────────
    /// Climb rate achievable at maximum throttle (m/s).
    pub max_climb_rate: f32,
    /// Sink rate limit for trajectory generation (m/s, positive).
    pub max_sink_rate: f32,
    /// Sink rate at minimum throttle and trim airspeed (m/s, positive).
    pub min_sink_rate: f32,
    /// Vertical acceleration limit for the height trajectory (m/s^2).
    pub vert_accel_limit: f32,
    /// Jerk limit for the height trajectory (m/s^3).
    pub jerk_max: f32,
    /// Throttle slew limit in full-range fractions per second;
    /// magnitudes below 0.01 disable slew limiting.
    pub throttle_slewrate: f32,

    // ── Filter constants ──────────────────────────────────────
    /// Natural frequency of the airspeed complementary filter (rad/s).
    pub tas_estimate_freq: f32,
    /// Time constant of the total-energy-rate error filter (s).
    pub ste_rate_time_const: f32,
    /// Time constant of the airspeed-derivative filter (s).
    pub speed_derivative_time_const: f32,

    // ── Mode constants ────────────────────────────────────────
    /// Allowed airspeed deviation before underspeed mitigation ramps in,
    /// as a fraction of the trim airspeed.
    pub tas_error_percentage: f32,
}

impl Default for TecsConfig {
    fn default() -> Self {
        Self {
            throttle_damping_gain: 0.5,
            integrator_gain_throttle: 0.3,
            pitch_damping_gain: 0.1,
            integrator_gain_pitch: 0.1,
            height_error_gain: 0.2,
            height_setpoint_gain_ff: 0.3,
            airspeed_error_gain: 0.2,
            load_factor_correction: 15.0,
            seb_rate_ff: 1.0,
            pitch_speed_weight: 1.0,

            equivalent_airspeed_min: 10.0,
            equivalent_airspeed_max: 25.0,
            equivalent_airspeed_trim: 15.0,

            max_climb_rate: 5.0,
            max_sink_rate: 5.0,
            min_sink_rate: 2.0,
            vert_accel_limit: 7.0,
            jerk_max: 10.0,
            throttle_slewrate: 0.0,

            tas_estimate_freq: 2.0,
            ste_rate_time_const: 0.5,
            speed_derivative_time_const: 0.5,

            tas_error_percentage: 0.10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_airspeed_band_is_ordered() {
        let cfg = TecsConfig::default();
        assert!(cfg.equivalent_airspeed_min < cfg.equivalent_airspeed_trim);
        assert!(cfg.equivalent_airspeed_trim < cfg.equivalent_airspeed_max);
    }

    #[test]
    fn default_rates_are_positive() {
        let cfg = TecsConfig::default();
        assert!(cfg.max_climb_rate > 0.0);
        assert!(cfg.max_sink_rate > 0.0);
        assert!(cfg.min_sink_rate > 0.0);
        assert!(cfg.jerk_max > 0.0);
        assert!(cfg.vert_accel_limit > 0.0);
    }
}
