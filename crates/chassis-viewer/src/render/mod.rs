//! Render-mode controller.
//!
//! Owns the [`core::RenderModeMachine`] and drives the per-frame sequence:
//! interaction messages are applied, the settle check runs exactly once, the
//! wheels advance with the mode's damping factor, and the converging backend
//! steps or the rasterized view is left visible. System order within a frame
//! follows that sequence explicitly via `chain()`, after the camera controls
//! so same-frame interaction messages are observed.

mod convergence;
pub mod core;

use bevy::ecs::message::MessageReader;
use bevy::prelude::*;

use crate::camera::{CameraControlSet, CameraInteraction};
use crate::chassis::Wheel;
use crate::launch_params::LaunchParams;

pub use self::convergence::AccumulationTarget;
pub use self::core::RenderMode;
use self::core::{
    FrameDirective, RenderModeMachine, RenderModeParams, advance_wheel_angle, wheel_rotation_delta,
};

// ============================================================================
// Resources
// ============================================================================

/// The render-mode state machine, owned by the frame loop.
#[derive(Resource)]
pub struct RenderModeState {
    machine: RenderModeMachine,
    params: RenderModeParams,
}

impl RenderModeState {
    /// Current render mode.
    pub fn mode(&self) -> RenderMode {
        self.machine.mode()
    }

    /// Milliseconds of idle time left before convergence resumes, if the
    /// settle countdown is running.
    pub fn settle_remaining_ms(&self, now_ms: f64) -> Option<f64> {
        self.machine.settle_remaining_ms(now_ms, &self.params)
    }
}

/// The directive computed by this frame's controller tick. Downstream
/// systems (wheel spin, convergence step, overlay visibility) read this
/// instead of re-deriving mode state.
#[derive(Resource, Clone, Copy)]
pub struct ActiveDirective(pub FrameDirective);

// ============================================================================
// Plugin
// ============================================================================

/// Plugin for the render-mode controller and the converging backend.
pub struct RenderModePlugin;

impl Plugin for RenderModePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Startup,
            (init_controller, convergence::setup_accumulation_target),
        )
        .add_systems(
            Update,
            (
                apply_interaction_messages,
                tick_mode_controller,
                spin_wheels,
                convergence::step_accumulation,
                convergence::update_overlay_visibility,
            )
                .chain()
                .after(CameraControlSet),
        );
    }
}

/// Construct the controller from launch parameters.
fn init_controller(mut commands: Commands, launch: Res<LaunchParams>) {
    let params = RenderModeParams {
        settle_ms: launch.settle_ms,
        full_spin_speed: launch.spin_speed,
        damped_spin_factor: launch.damped_spin_factor,
    };
    // Accumulation-first: the machine starts Converging, and the first tick
    // fills in the directive before anything downstream reads it.
    commands.insert_resource(ActiveDirective(FrameDirective {
        mode: RenderMode::Converging,
        spin_factor: params.damped_spin_factor,
        reset_accumulation: false,
    }));
    commands.insert_resource(RenderModeState {
        machine: RenderModeMachine::default(),
        params,
    });
}

// ============================================================================
// Systems
// ============================================================================

/// Feed interaction messages from the camera controls into the machine.
fn apply_interaction_messages(
    time: Res<Time>,
    mut state: ResMut<RenderModeState>,
    mut interactions: MessageReader<CameraInteraction>,
) {
    let now_ms = time.elapsed_secs_f64() * 1000.0;
    for interaction in interactions.read() {
        match interaction {
            CameraInteraction::Started => {
                state.machine.on_interaction_start(now_ms);
                tracing::debug!("Interaction started");
            }
            CameraInteraction::Changed => state.machine.on_interaction_change(now_ms),
            CameraInteraction::Ended => {
                state.machine.on_interaction_end(now_ms);
                tracing::debug!("Interaction ended; settle countdown running");
            }
        }
    }
}

/// Run the per-frame mode check and publish the frame directive.
fn tick_mode_controller(
    time: Res<Time>,
    mut state: ResMut<RenderModeState>,
    mut directive: ResMut<ActiveDirective>,
) {
    let now_ms = time.elapsed_secs_f64() * 1000.0;
    let previous = state.machine.mode();

    let RenderModeState { machine, params } = &mut *state;
    directive.0 = machine.tick(now_ms, params);

    if directive.0.mode != previous {
        tracing::info!("Render mode: {:?} -> {:?}", previous, directive.0.mode);
    }
}

/// Advance wheel rotation with the directive's damping factor.
fn spin_wheels(
    time: Res<Time>,
    directive: Res<ActiveDirective>,
    mut wheels: Query<(&mut Wheel, &mut Transform)>,
) {
    for (mut wheel, mut transform) in &mut wheels {
        wheel.angle = advance_wheel_angle(
            wheel.angle,
            wheel_rotation_delta(time.delta_secs(), wheel.spin_speed, directive.0.spin_factor),
        );
        // Spin around the world-X axle, applied on top of the cylinder's
        // base orientation.
        transform.rotation =
            Quat::from_rotation_x(wheel.angle) * Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    }
}
