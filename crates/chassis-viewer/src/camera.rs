//! Orbit camera controller.
//!
//! Drag to orbit the chassis, scroll to zoom. This is the interaction source
//! for the render-mode controller: every camera-moving input emits a
//! [`CameraInteraction`] message, which the controller turns into mode
//! switches and accumulation resets.

use bevy::ecs::message::{Message, MessageWriter};
use bevy::prelude::*;
use bevy_egui::EguiContexts;
use leafwing_input_manager::prelude::*;

use crate::input::ViewerAction;

// ============================================================================
// Interaction messages
// ============================================================================

/// Interaction events fired by the camera controls.
///
/// `Started`/`Ended` bracket a drag; `Changed` fires on every input that
/// actually moves the camera. Zoom emits `Changed` without a surrounding
/// drag, so only the settle check returns the viewer to convergence.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraInteraction {
    Started,
    Changed,
    Ended,
}

/// Set containing all camera control systems. The render-mode controller
/// runs after this so same-frame interaction messages are observed.
#[derive(SystemSet, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct CameraControlSet;

// ============================================================================
// Settings and state
// ============================================================================

/// Settings for orbit movement.
#[derive(Resource)]
pub struct OrbitSettings {
    /// Radians of orbit per pixel of mouse motion.
    pub rotate_sensitivity: f32,
    /// Zoom factor base per scroll step.
    pub zoom_step: f32,
    /// Closest allowed camera distance.
    pub min_distance: f32,
    /// Farthest allowed camera distance.
    pub max_distance: f32,
    /// Pitch limits, keeping the camera above the ground plane.
    pub min_pitch: f32,
    pub max_pitch: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            rotate_sensitivity: 0.005,
            zoom_step: 1.1,
            min_distance: 2.5,
            max_distance: 30.0,
            min_pitch: 0.02,
            max_pitch: 1.45,
        }
    }
}

/// Orbit state for the camera entity.
#[derive(Component)]
pub struct OrbitCamera {
    /// Azimuth around the target (rad).
    pub yaw: f32,
    /// Elevation above the horizon (rad).
    pub pitch: f32,
    /// Distance from the target.
    pub distance: f32,
    /// Point the camera orbits around.
    pub target: Vec3,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw: 0.65,
            pitch: 0.35,
            distance: 7.5,
            target: Vec3::new(0.0, -0.1, 0.0),
        }
    }
}

impl OrbitCamera {
    /// Camera position implied by the orbit parameters.
    pub fn eye(&self) -> Vec3 {
        let direction = Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.target + direction * self.distance
    }
}

// ============================================================================
// Drag latch (pure)
// ============================================================================

/// Per-frame outcome of the drag latch.
#[derive(Clone, Copy, Debug, Default)]
pub struct DragFrame {
    pub started: bool,
    pub ended: bool,
    pub orbiting: bool,
}

/// Advance the drag latch for one frame.
///
/// A drag only becomes active when the press lands outside the UI. A press
/// captured by the UI never activates the latch, so none of its held frames
/// orbit and its release emits nothing; `Started`/`Ended` always come in
/// matched pairs.
pub fn drag_frame(
    just_pressed: bool,
    just_released: bool,
    pressed: bool,
    over_ui: bool,
    active: &mut bool,
) -> DragFrame {
    let mut frame = DragFrame::default();
    if just_pressed && !over_ui && !*active {
        *active = true;
        frame.started = true;
    }
    if just_released && *active {
        *active = false;
        frame.ended = true;
    }
    frame.orbiting = *active && pressed;
    frame
}

// ============================================================================
// Plugin
// ============================================================================

/// Plugin for orbit camera controls.
pub struct OrbitCameraPlugin;

impl Plugin for OrbitCameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<CameraInteraction>()
            .init_resource::<OrbitSettings>()
            .add_systems(Startup, spawn_camera)
            .add_systems(
                Update,
                (orbit_drag, orbit_zoom, sync_camera_transform)
                    .chain()
                    .in_set(CameraControlSet),
            );
    }
}

/// Spawn the 3D camera at its initial orbit position.
fn spawn_camera(mut commands: Commands) {
    let orbit = OrbitCamera::default();
    let transform = Transform::from_translation(orbit.eye()).looking_at(orbit.target, Vec3::Y);

    commands.spawn((
        Camera3d::default(),
        Camera::default(),
        transform,
        Projection::Perspective(PerspectiveProjection {
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.05,
            far: 500.0,
            ..Default::default()
        }),
        orbit,
    ));
}

// ============================================================================
// Systems
// ============================================================================

/// Handle orbit dragging and emit interaction messages.
fn orbit_drag(
    action_query: Query<&ActionState<ViewerAction>>,
    settings: Res<OrbitSettings>,
    mut query: Query<&mut OrbitCamera>,
    mut interactions: MessageWriter<CameraInteraction>,
    mut contexts: EguiContexts,
    mut drag_active: Local<bool>,
) {
    let Ok(action_state) = action_query.single() else {
        return;
    };
    let Ok(mut orbit) = query.single_mut() else {
        return;
    };

    let egui_wants_pointer = contexts
        .ctx_mut()
        .ok()
        .is_some_and(|ctx| ctx.is_pointer_over_area());

    let frame = drag_frame(
        action_state.just_pressed(&ViewerAction::Drag),
        action_state.just_released(&ViewerAction::Drag),
        action_state.pressed(&ViewerAction::Drag),
        egui_wants_pointer,
        &mut drag_active,
    );

    if frame.started {
        interactions.write(CameraInteraction::Started);
    }
    if frame.ended {
        interactions.write(CameraInteraction::Ended);
    }
    if !frame.orbiting {
        return;
    }

    let delta = action_state.axis_pair(&ViewerAction::Orbit);
    if delta == Vec2::ZERO {
        return;
    }

    orbit.yaw -= delta.x * settings.rotate_sensitivity;
    orbit.pitch = (orbit.pitch + delta.y * settings.rotate_sensitivity)
        .clamp(settings.min_pitch, settings.max_pitch);
    interactions.write(CameraInteraction::Changed);
}

/// Handle scroll-wheel zoom.
fn orbit_zoom(
    action_query: Query<&ActionState<ViewerAction>>,
    settings: Res<OrbitSettings>,
    mut query: Query<&mut OrbitCamera>,
    mut interactions: MessageWriter<CameraInteraction>,
) {
    let Ok(action_state) = action_query.single() else {
        return;
    };
    let Ok(mut orbit) = query.single_mut() else {
        return;
    };

    let scroll = action_state.clamped_value(&ViewerAction::Zoom);
    if scroll == 0.0 {
        return;
    }

    // Scale distance logarithmically for smooth zooming.
    let factor = settings.zoom_step.powf(-scroll);
    orbit.distance = (orbit.distance * factor).clamp(settings.min_distance, settings.max_distance);
    interactions.write(CameraInteraction::Changed);
}

/// Update the camera transform from the orbit parameters.
fn sync_camera_transform(mut query: Query<(&OrbitCamera, &mut Transform), Changed<OrbitCamera>>) {
    for (orbit, mut transform) in &mut query {
        *transform = Transform::from_translation(orbit.eye()).looking_at(orbit.target, Vec3::Y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_off_ui_brackets_started_and_ended() {
        let mut active = false;

        // Press, hold, release.
        let press = drag_frame(true, false, true, false, &mut active);
        assert!(press.started && press.orbiting && !press.ended);

        let hold = drag_frame(false, false, true, false, &mut active);
        assert!(!hold.started && hold.orbiting && !hold.ended);

        let release = drag_frame(false, true, false, false, &mut active);
        assert!(!release.started && !release.orbiting && release.ended);
        assert!(!active);
    }

    #[test]
    fn test_drag_starting_over_ui_never_orbits() {
        let mut active = false;

        // The press lands on the UI: no Started, latch stays off.
        let press = drag_frame(true, false, true, true, &mut active);
        assert!(!press.started && !press.orbiting);

        // Held frames off the UI still do not orbit and emit nothing.
        let hold = drag_frame(false, false, true, false, &mut active);
        assert!(!hold.started && !hold.orbiting && !hold.ended);

        // The release emits no unmatched Ended.
        let release = drag_frame(false, true, false, false, &mut active);
        assert!(!release.ended);
        assert!(!active);
    }

    #[test]
    fn test_drag_started_off_ui_keeps_orbiting_over_ui() {
        let mut active = false;
        drag_frame(true, false, true, false, &mut active);

        // Dragging across the UI mid-gesture does not drop the latch.
        let hold = drag_frame(false, false, true, true, &mut active);
        assert!(hold.orbiting && !hold.started && !hold.ended);
    }
}
