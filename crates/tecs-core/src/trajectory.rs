// ---------------------------------------------------------------------------
// Jerk-limited 1-D trajectory generator
// ---------------------------------------------------------------------------
//
// Tracks a commanded velocity with a minimum-time acceleration profile built
// from three segments: jerk-up, constant acceleration, jerk-down. The profile
// honours a jerk magnitude limit, asymmetric acceleration limits and
// asymmetric velocity limits, and is integrated accel -> vel -> pos each tick.
//
// The generator is used twice by the controller: once in the position domain
// (altitude setpoint smoothing) and once in the velocity domain (height-rate
// setpoint smoothing), with different limit conventions.

const SMALL: f32 = 1e-4;

/// Jerk-limited velocity-tracking trajectory generator.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryGenerator {
    max_jerk: f32,
    max_accel_up: f32,
    max_accel_down: f32,
    max_vel_up: f32,
    max_vel_down: f32,

    accel: f32,
    vel: f32,
    pos: f32,

    // Profile computed by the last `update_durations` call.
    jerk: f32,
    t1: f32,
    t2: f32,
    t3: f32,
    init_accel: f32,
    init_vel: f32,
    init_pos: f32,
    local_time: f32,
    vel_sp: f32,
}

impl TrajectoryGenerator {
    pub fn new(max_jerk: f32, max_accel: f32, max_vel: f32) -> Self {
        Self {
            max_jerk,
            max_accel_up: max_accel,
            max_accel_down: max_accel,
            max_vel_up: max_vel,
            max_vel_down: max_vel,
            accel: 0.0,
            vel: 0.0,
            pos: 0.0,
            jerk: 0.0,
            t1: 0.0,
            t2: 0.0,
            t3: 0.0,
            init_accel: 0.0,
            init_vel: 0.0,
            init_pos: 0.0,
            local_time: 0.0,
            vel_sp: 0.0,
        }
    }

    // ── Limit setters ─────────────────────────────────────────

    pub fn set_max_jerk(&mut self, jerk: f32) {
        self.max_jerk = jerk.max(SMALL);
    }

    /// Symmetric acceleration limit (both directions, magnitude).
    pub fn set_max_accel(&mut self, accel: f32) {
        self.set_max_accel_up(accel);
        self.set_max_accel_down(accel);
    }

    pub fn set_max_accel_up(&mut self, accel: f32) {
        self.max_accel_up = accel.max(SMALL);
    }

    pub fn set_max_accel_down(&mut self, accel: f32) {
        self.max_accel_down = accel.max(SMALL);
    }

    /// Symmetric velocity limit (both directions, magnitude).
    pub fn set_max_vel(&mut self, vel: f32) {
        self.set_max_vel_up(vel);
        self.set_max_vel_down(vel);
    }

    /// Limit on positive (upward) velocity.
    pub fn set_max_vel_up(&mut self, vel: f32) {
        self.max_vel_up = vel.max(0.0);
    }

    /// Limit on negative (downward) velocity, given as a magnitude.
    pub fn set_max_vel_down(&mut self, vel: f32) {
        self.max_vel_down = vel.max(0.0);
    }

    // ── State access ──────────────────────────────────────────

    pub fn set_current_position(&mut self, pos: f32) {
        self.pos = pos;
        self.init_pos = pos;
    }

    pub fn set_current_velocity(&mut self, vel: f32) {
        self.vel = vel;
        self.init_vel = vel;
    }

    pub fn set_current_acceleration(&mut self, accel: f32) {
        self.accel = accel;
        self.init_accel = accel;
    }

    /// Hard reset of the kinematic state; clears the active profile.
    pub fn reset(&mut self, accel: f32, vel: f32, pos: f32) {
        self.accel = accel;
        self.vel = vel;
        self.pos = pos;
        self.init_accel = accel;
        self.init_vel = vel;
        self.init_pos = pos;
        self.jerk = 0.0;
        self.t1 = 0.0;
        self.t2 = 0.0;
        self.t3 = 0.0;
        self.local_time = 0.0;
        self.vel_sp = vel;
    }

    pub fn position(&self) -> f32 {
        self.pos
    }

    pub fn velocity(&self) -> f32 {
        self.vel
    }

    pub fn acceleration(&self) -> f32 {
        self.accel
    }

    pub fn velocity_setpoint(&self) -> f32 {
        self.vel_sp
    }

    // ── Profile generation ────────────────────────────────────

    /// Recompute the three-segment profile that brings the current
    /// (accel, vel) state to `vel_cmd` with zero final acceleration.
    pub fn update_durations(&mut self, vel_cmd: f32) {
        self.vel_sp = vel_cmd.clamp(-self.max_vel_down, self.max_vel_up);
        self.init_accel = self.accel;
        self.init_vel = self.vel;
        self.init_pos = self.pos;
        self.local_time = 0.0;

        let a0 = self.accel;
        let dv = self.vel_sp - self.vel;
        let jm = self.max_jerk.max(SMALL);

        // Velocity that would be reached by immediately ramping the
        // acceleration to zero at maximum jerk.
        let vel_zero_acc = self.vel + 0.5 * a0 * a0.abs() / jm;
        let err = self.vel_sp - vel_zero_acc;

        if err.abs() < SMALL {
            // Already on target once the acceleration is unwound.
            self.jerk = a0.signum() * jm;
            self.t1 = 0.0;
            self.t2 = 0.0;
            self.t3 = if a0.abs() > SMALL { a0.abs() / jm } else { 0.0 };
            return;
        }

        let dir = if err > 0.0 { 1.0 } else { -1.0 };
        let j = dir * jm;

        // Peak acceleration of the unsaturated (triangular) profile:
        // dv = a0*T1 + j*T1^2/2 + a_peak^2/(2j), a_peak = a0 + j*T1.
        let delta = (0.5 * a0 * a0 + j * dv).max(0.0);
        let mut a_peak = dir * delta.sqrt();

        let a_lim = if dir > 0.0 {
            self.max_accel_up
        } else {
            self.max_accel_down
        };

        if a_peak.abs() > a_lim {
            // Trapezoidal profile: ride the acceleration limit for T2.
            a_peak = dir * a_lim;
            let t1 = ((a_peak - a0) / j).max(0.0);
            let t3 = a_lim / jm;
            let dv_ramps = a0 * t1 + 0.5 * j * t1 * t1 + a_peak * a_peak / (2.0 * j);
            self.t1 = t1;
            self.t2 = ((dv - dv_ramps) / a_peak).max(0.0);
            self.t3 = t3;
        } else {
            self.t1 = ((a_peak - a0) / j).max(0.0);
            self.t2 = 0.0;
            self.t3 = (a_peak / j).max(0.0);
        }

        self.jerk = j;
    }

    /// Integrate the active profile forward by `dt`.
    pub fn update_traj(&mut self, dt: f32) {
        self.local_time += dt;
        let mut t = self.local_time;

        let mut a = self.init_accel;
        let mut v = self.init_vel;
        let mut p = self.init_pos;

        // Segment 1: constant jerk toward the peak acceleration.
        let dt1 = t.min(self.t1);
        if dt1 > 0.0 {
            p += v * dt1 + 0.5 * a * dt1 * dt1 + self.jerk * dt1 * dt1 * dt1 / 6.0;
            v += a * dt1 + 0.5 * self.jerk * dt1 * dt1;
            a += self.jerk * dt1;
        }
        t -= dt1.max(0.0);

        // Segment 2: constant acceleration.
        let dt2 = t.min(self.t2);
        if dt2 > 0.0 {
            p += v * dt2 + 0.5 * a * dt2 * dt2;
            v += a * dt2;
            t -= dt2;
        }

        // Segment 3: constant jerk back to zero acceleration.
        let dt3 = t.min(self.t3);
        if dt3 > 0.0 {
            p += v * dt3 + 0.5 * a * dt3 * dt3 - self.jerk * dt3 * dt3 * dt3 / 6.0;
            v += a * dt3 - 0.5 * self.jerk * dt3 * dt3;
            a -= self.jerk * dt3;
            t -= dt3;
        }

        // Past the end of the profile: coast at the achieved velocity.
        if t > 0.0 {
            a = 0.0;
            p += v * t;
        }

        self.accel = a;
        self.vel = v;
        self.pos = p;
    }

    /// Single-call tick: recompute the profile for `vel_cmd` and advance `dt`.
    pub fn update(&mut self, dt: f32, vel_cmd: f32) {
        self.update_durations(vel_cmd);
        self.update_traj(dt);
    }
}

/// Maximum speed from which a jerk-limited braking profile can stop within
/// `distance` while ending at `final_speed`.
///
/// Classic trapezoidal result with a jerk-time allowance: solves
/// `v^2 = final^2 + 2*accel*distance - v*(4*accel^2/jerk)`.
pub fn compute_max_speed_from_distance(
    jerk: f32,
    accel: f32,
    distance: f32,
    final_speed: f32,
) -> f32 {
    let jerk = jerk.max(SMALL);
    let accel = accel.max(SMALL);
    let distance = distance.max(0.0);

    let b = 4.0 * accel * accel / jerk;
    let c = -2.0 * accel * distance - final_speed * final_speed;
    let max_speed = 0.5 * (-b + (b * b - 4.0 * c).sqrt());

    max_speed.max(final_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.02;

    fn run_to(gen: &mut TrajectoryGenerator, vel_cmd: f32, ticks: usize) -> (f32, f32) {
        let mut max_accel: f32 = 0.0;
        let mut max_jerk: f32 = 0.0;
        let mut prev_accel = gen.acceleration();
        for _ in 0..ticks {
            gen.update(DT, vel_cmd);
            max_accel = max_accel.max(gen.acceleration().abs());
            max_jerk = max_jerk.max((gen.acceleration() - prev_accel).abs() / DT);
            prev_accel = gen.acceleration();
        }
        (max_accel, max_jerk)
    }

    #[test]
    fn converges_to_commanded_velocity() {
        let mut gen = TrajectoryGenerator::new(10.0, 4.0, 8.0);
        gen.reset(0.0, 0.0, 0.0);
        run_to(&mut gen, 5.0, 500);
        assert!((gen.velocity() - 5.0).abs() < 1e-2);
        assert!(gen.acceleration().abs() < 1e-2);
        assert!(gen.position() > 0.0);
    }

    #[test]
    fn respects_accel_and_jerk_limits() {
        let mut gen = TrajectoryGenerator::new(10.0, 4.0, 8.0);
        gen.reset(0.0, 0.0, 0.0);
        let (max_accel, max_jerk) = run_to(&mut gen, 8.0, 500);
        assert!(max_accel <= 4.0 + 1e-3, "accel limit violated: {max_accel}");
        assert!(max_jerk <= 10.0 + 0.1, "jerk limit violated: {max_jerk}");
    }

    #[test]
    fn velocity_monotonic_from_rest() {
        let mut gen = TrajectoryGenerator::new(10.0, 4.0, 8.0);
        gen.reset(0.0, 0.0, 0.0);
        let mut prev = 0.0;
        for _ in 0..500 {
            gen.update(DT, 6.0);
            assert!(gen.velocity() >= prev - 1e-4);
            prev = gen.velocity();
        }
    }

    #[test]
    fn asymmetric_velocity_clamp() {
        let mut gen = TrajectoryGenerator::new(10.0, 4.0, 8.0);
        gen.set_max_vel_up(5.0);
        gen.set_max_vel_down(3.0);
        gen.update_durations(-10.0);
        assert!((gen.velocity_setpoint() + 3.0).abs() < 1e-6);
        gen.update_durations(10.0);
        assert!((gen.velocity_setpoint() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn unwinds_residual_acceleration() {
        let mut gen = TrajectoryGenerator::new(10.0, 4.0, 8.0);
        // Start with the velocity already on target but a leftover accel.
        gen.reset(2.0, 0.0, 0.0);
        for _ in 0..200 {
            gen.update(DT, gen.velocity());
        }
        assert!(gen.acceleration().abs() < 1e-2);
    }

    #[test]
    fn reset_clears_profile() {
        let mut gen = TrajectoryGenerator::new(10.0, 4.0, 8.0);
        run_to(&mut gen, 5.0, 100);
        gen.reset(0.0, 1.5, 120.0);
        assert_eq!(gen.velocity(), 1.5);
        assert_eq!(gen.position(), 120.0);
        assert_eq!(gen.acceleration(), 0.0);
    }

    #[test]
    fn braking_speed_matches_accel_limited_form() {
        // With an effectively unlimited jerk the jerk allowance vanishes and
        // the classic v = sqrt(2*a*d) remains.
        let v = compute_max_speed_from_distance(1e6, 4.0, 50.0, 0.0);
        assert!((v - 20.0).abs() < 0.05);
    }

    #[test]
    fn braking_speed_zero_distance() {
        let v = compute_max_speed_from_distance(10.0, 4.0, 0.0, 1.5);
        assert!((v - 1.5).abs() < 1e-3);
    }
}
