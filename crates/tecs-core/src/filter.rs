// ---------------------------------------------------------------------------
// First-order low-pass filter
// ---------------------------------------------------------------------------

/// Discrete first-order low-pass filter.
///
/// The pole is derived from a nominal sample period and a time constant:
/// `alpha = dt / (dt + tau)`. Used to keep accelerometer noise out of the
/// throttle and pitch loops (true-airspeed derivative, total-energy-rate
/// error).
#[derive(Debug, Clone, Copy)]
pub struct FirstOrderLpf {
    alpha: f32,
    state: f32,
}

impl FirstOrderLpf {
    /// Build a filter for a nominal sample period `dt` (s) and time constant
    /// `tau` (s).
    pub fn new(dt: f32, tau: f32) -> Self {
        let mut filter = Self {
            alpha: 0.0,
            state: 0.0,
        };
        filter.set_parameters(dt, tau);
        filter
    }

    /// Recompute the pole for a new sample period / time constant pair.
    pub fn set_parameters(&mut self, dt: f32, tau: f32) {
        let denom = dt + tau;
        self.alpha = if denom > f32::EPSILON { dt / denom } else { 1.0 };
    }

    /// Advance the filter by one sample and return the new state.
    pub fn update(&mut self, sample: f32) -> f32 {
        self.state += self.alpha * (sample - self.state);
        self.state
    }

    /// Force the state to `value`.
    pub fn reset(&mut self, value: f32) {
        self.state = value;
    }

    pub fn state(&self) -> f32 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pole_from_parameters() {
        let f = FirstOrderLpf::new(0.02, 0.5);
        // alpha = 0.02 / 0.52
        let mut f2 = f;
        let out = f2.update(1.0);
        assert!((out - 0.02 / 0.52).abs() < 1e-6);
    }

    #[test]
    fn converges_to_constant_input() {
        let mut f = FirstOrderLpf::new(0.02, 0.5);
        for _ in 0..2000 {
            f.update(3.5);
        }
        assert!((f.state() - 3.5).abs() < 1e-3);
    }

    #[test]
    fn reset_overrides_state() {
        let mut f = FirstOrderLpf::new(0.02, 0.5);
        f.update(10.0);
        f.reset(-2.0);
        assert_eq!(f.state(), -2.0);
    }

    #[test]
    fn degenerate_time_constant_passes_through() {
        let mut f = FirstOrderLpf::new(0.02, 0.0);
        assert!((f.update(7.0) - 7.0).abs() < 1e-6);
    }
}
