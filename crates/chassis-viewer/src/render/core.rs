//! Core render-mode state machine.
//!
//! Pure functions that can be tested in isolation without Bevy dependencies.
//! Decides each frame whether the viewer runs the real-time rasterizer
//! (Interactive) or the progressive accumulation backend (Converging), and
//! when accumulated samples must be discarded.

/// The two operating states of the viewer.
#[derive(Default, PartialEq, Eq, Clone, Copy, Debug)]
pub enum RenderMode {
    /// Real-time rasterized rendering while the user interacts.
    Interactive,
    /// Progressive path-traced accumulation while input is settled.
    #[default]
    Converging,
}

/// Tuning parameters for the mode controller.
#[derive(Clone, Debug)]
pub struct RenderModeParams {
    /// Idle duration after the last interaction before convergence resumes.
    pub settle_ms: f64,
    /// Wheel spin speed at full rate (rad/s).
    pub full_spin_speed: f32,
    /// Spin damping factor while converging.
    ///
    /// Deliberately non-zero: a slight residual motion trades a small amount
    /// of blur for avoiding a visibly frozen scene.
    pub damped_spin_factor: f32,
}

impl Default for RenderModeParams {
    fn default() -> Self {
        Self {
            settle_ms: 200.0,
            full_spin_speed: 2.0,
            damped_spin_factor: 0.02,
        }
    }
}

/// What the frame loop should do this frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameDirective {
    /// Mode to render this frame with.
    pub mode: RenderMode,
    /// Damping factor for secondary animation (wheel spin).
    pub spin_factor: f32,
    /// Whether accumulated samples must be discarded before any
    /// converging-path work happens this frame.
    pub reset_accumulation: bool,
}

/// Render-mode state machine.
///
/// Owned by the frame loop; interaction handlers feed it events and the
/// per-frame [`tick`](Self::tick) evaluates the settle check exactly once.
#[derive(Clone, Debug)]
pub struct RenderModeMachine {
    /// Current mode.
    mode: RenderMode,
    /// Whether an interaction (drag) is currently in progress.
    interacting: bool,
    /// Timestamp of the last interaction-change event, in milliseconds.
    last_change_ms: f64,
    /// Pending request to discard accumulated samples.
    reset_requested: bool,
}

impl Default for RenderModeMachine {
    fn default() -> Self {
        Self {
            // Accumulation-first: start converging immediately.
            mode: RenderMode::Converging,
            interacting: false,
            last_change_ms: f64::NEG_INFINITY,
            reset_requested: false,
        }
    }
}

impl RenderModeMachine {
    /// Get the current render mode.
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Milliseconds of idle time still required before convergence resumes.
    ///
    /// Returns `None` when already converging or while interacting.
    pub fn settle_remaining_ms(&self, now_ms: f64, params: &RenderModeParams) -> Option<f64> {
        if self.mode == RenderMode::Converging || self.interacting {
            return None;
        }
        Some((params.settle_ms - (now_ms - self.last_change_ms)).max(0.0))
    }

    /// An interaction has begun (e.g. drag start).
    ///
    /// Switches to Interactive immediately and discards accumulated samples.
    pub fn on_interaction_start(&mut self, now_ms: f64) {
        self.interacting = true;
        self.mode = RenderMode::Interactive;
        self.last_change_ms = now_ms;
        self.reset_requested = true;
    }

    /// An interaction changed the scene (camera orbit delta, zoom step).
    ///
    /// Records the timestamp and requests a sample reset. Does not change
    /// mode; the settle check runs independently, once per frame.
    pub fn on_interaction_change(&mut self, now_ms: f64) {
        self.last_change_ms = now_ms;
        self.reset_requested = true;
    }

    /// The interaction has ended (e.g. drag release).
    ///
    /// Clears the in-progress flag. The mode does not switch here; the
    /// settle threshold must still elapse via the per-frame check.
    pub fn on_interaction_end(&mut self, now_ms: f64) {
        self.interacting = false;
        self.last_change_ms = now_ms;
    }

    /// Evaluate the per-frame mode check and consume any pending reset.
    ///
    /// Called exactly once per frame, after interaction events have been
    /// applied. The returned directive carries the reset flag for the same
    /// frame, so every entry into Converging is preceded by exactly one
    /// reset before any converging-path frame is produced.
    pub fn tick(&mut self, now_ms: f64, params: &RenderModeParams) -> FrameDirective {
        if self.mode == RenderMode::Interactive
            && !self.interacting
            && now_ms - self.last_change_ms > params.settle_ms
        {
            self.mode = RenderMode::Converging;
            self.reset_requested = true;
        }

        FrameDirective {
            mode: self.mode,
            spin_factor: match self.mode {
                RenderMode::Interactive => 1.0,
                RenderMode::Converging => params.damped_spin_factor,
            },
            reset_accumulation: std::mem::take(&mut self.reset_requested),
        }
    }
}

/// Rotation advance for one wheel this frame.
pub fn wheel_rotation_delta(delta_secs: f32, spin_speed: f32, spin_factor: f32) -> f32 {
    delta_secs * spin_speed * spin_factor
}

/// Advance a wheel angle, wrapped to one turn so long sessions do not lose
/// f32 precision.
pub fn advance_wheel_angle(angle: f32, delta: f32) -> f32 {
    (angle + delta).rem_euclid(std::f32::consts::TAU)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RenderModeParams {
        RenderModeParams::default()
    }

    #[test]
    fn test_initial_mode_is_converging() {
        let machine = RenderModeMachine::default();
        assert_eq!(machine.mode(), RenderMode::Converging);
    }

    #[test]
    fn test_mode_after_start_is_always_interactive() {
        // From Converging.
        let mut machine = RenderModeMachine::default();
        machine.on_interaction_start(0.0);
        assert_eq!(machine.mode(), RenderMode::Interactive);

        // From Interactive (redundant start is harmless).
        machine.on_interaction_start(10.0);
        assert_eq!(machine.mode(), RenderMode::Interactive);
    }

    #[test]
    fn test_settle_check_switches_to_converging() {
        let mut machine = RenderModeMachine::default();
        machine.on_interaction_start(0.0);
        machine.on_interaction_end(50.0);

        // Not yet settled.
        let directive = machine.tick(200.0, &params());
        assert_eq!(directive.mode, RenderMode::Interactive);

        // 50 + 200 elapsed exactly: threshold is strict.
        let directive = machine.tick(250.0, &params());
        assert_eq!(directive.mode, RenderMode::Interactive);

        let directive = machine.tick(251.0, &params());
        assert_eq!(directive.mode, RenderMode::Converging);
    }

    #[test]
    fn test_interacting_blocks_convergence_regardless_of_time() {
        let mut machine = RenderModeMachine::default();
        machine.on_interaction_start(0.0);

        let directive = machine.tick(1_000_000.0, &params());
        assert_eq!(directive.mode, RenderMode::Interactive);
    }

    #[test]
    fn test_spin_factor_per_mode() {
        let mut machine = RenderModeMachine::default();

        let directive = machine.tick(0.0, &params());
        assert_eq!(directive.mode, RenderMode::Converging);
        assert!((directive.spin_factor - 0.02).abs() < f32::EPSILON);

        machine.on_interaction_start(1.0);
        let directive = machine.tick(1.0, &params());
        assert_eq!(directive.mode, RenderMode::Interactive);
        assert!((directive.spin_factor - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_wheel_rotation_delta() {
        let delta = wheel_rotation_delta(0.016, 2.0, 1.0);
        assert!((delta - 0.032).abs() < 1e-6);

        let damped = wheel_rotation_delta(0.016, 2.0, 0.02);
        assert!((damped - 0.000_64).abs() < 1e-6);
    }

    #[test]
    fn test_wheel_angle_wraps_to_one_turn() {
        use std::f32::consts::TAU;

        let wrapped = advance_wheel_angle(TAU - 0.01, 0.02);
        assert!((wrapped - 0.01).abs() < 1e-6);

        // Hours of simulated spinning stay in range instead of growing.
        let mut angle = 0.0_f32;
        for _ in 0..1_000_000 {
            angle = advance_wheel_angle(angle, 0.032);
        }
        assert!((0.0..TAU).contains(&angle));
    }

    #[test]
    fn test_exactly_one_reset_per_converging_entry() {
        let mut machine = RenderModeMachine::default();
        machine.on_interaction_start(0.0);
        let directive = machine.tick(0.0, &params());
        // Start discards any accumulated samples.
        assert!(directive.reset_accumulation);

        machine.on_interaction_end(50.0);

        // Entry into Converging carries the reset in the same directive.
        let directive = machine.tick(300.0, &params());
        assert_eq!(directive.mode, RenderMode::Converging);
        assert!(directive.reset_accumulation);

        // Subsequent converging frames do not reset again.
        let directive = machine.tick(316.0, &params());
        assert_eq!(directive.mode, RenderMode::Converging);
        assert!(!directive.reset_accumulation);
    }

    #[test]
    fn test_change_resets_without_mode_change() {
        let mut machine = RenderModeMachine::default();
        assert_eq!(machine.mode(), RenderMode::Converging);

        // A change while converging (e.g. a zoom step without a drag)
        // discards samples but the mode is evaluated by the tick.
        machine.on_interaction_change(100.0);
        assert_eq!(machine.mode(), RenderMode::Converging);
        let directive = machine.tick(100.0, &params());
        assert!(directive.reset_accumulation);
        assert_eq!(directive.mode, RenderMode::Converging);
    }

    #[test]
    fn test_scenario_start_end_then_settle() {
        // start at t=0, end at t=50ms, frames every 16ms.
        let mut machine = RenderModeMachine::default();
        machine.on_interaction_start(0.0);
        machine.on_interaction_end(50.0);

        let mut entered_converging_at = None;
        for frame in 1..40 {
            let now = f64::from(frame) * 16.0;
            let directive = machine.tick(now, &params());
            if directive.mode == RenderMode::Converging && entered_converging_at.is_none() {
                entered_converging_at = Some(now);
                assert!(directive.reset_accumulation);
            }
        }

        // First frame with now - 50 > 200, i.e. now > 250: 16 * 16 = 256.
        assert_eq!(entered_converging_at, Some(256.0));
    }

    #[test]
    fn test_scenario_continuous_changes_never_converge() {
        let mut machine = RenderModeMachine::default();
        machine.on_interaction_start(0.0);
        machine.on_interaction_end(5.0);

        // Change events every 10ms forever (e.g. scroll-wheel zooming).
        for step in 0..1_000 {
            let now = f64::from(step) * 10.0;
            machine.on_interaction_change(now);
            let directive = machine.tick(now + 1.0, &params());
            assert_eq!(directive.mode, RenderMode::Interactive);
        }
    }

    #[test]
    fn test_scenario_no_events_converges_forever() {
        let mut machine = RenderModeMachine::default();

        for frame in 0..1_000 {
            let now = f64::from(frame) * 16.0;
            let directive = machine.tick(now, &params());
            assert_eq!(directive.mode, RenderMode::Converging);
            assert!((directive.spin_factor - 0.02).abs() < f32::EPSILON);
            // No events, so nothing ever discards the accumulation.
            assert!(!directive.reset_accumulation);
        }
    }

    #[test]
    fn test_settle_remaining_ms() {
        let mut machine = RenderModeMachine::default();
        assert_eq!(machine.settle_remaining_ms(0.0, &params()), None);

        machine.on_interaction_start(0.0);
        machine.on_interaction_end(100.0);
        let remaining = machine.settle_remaining_ms(150.0, &params()).unwrap();
        assert!((remaining - 150.0).abs() < 1e-9);

        machine.on_interaction_start(200.0);
        assert_eq!(machine.settle_remaining_ms(250.0, &params()), None);
    }
}
