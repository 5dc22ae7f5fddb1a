//! Input action definitions.
//!
//! Declares the viewer's actions using `leafwing-input-manager` for
//! declarative, rebindable input mapping.

use bevy::prelude::*;
use leafwing_input_manager::prelude::*;

/// Actions for orbiting the camera and toggling the UI.
#[derive(Actionlike, PartialEq, Eq, Hash, Clone, Copy, Debug, Reflect)]
pub enum ViewerAction {
    /// Mouse look (yaw/pitch) while dragging.
    #[actionlike(DualAxis)]
    Orbit,
    /// Zoom with mouse scroll.
    #[actionlike(Axis)]
    Zoom,
    /// Orbit drag (left mouse held).
    Drag,
    /// Toggle UI visibility (Q).
    ToggleUi,
}

/// Create the default input map for viewer actions.
pub fn default_input_map() -> InputMap<ViewerAction> {
    InputMap::default()
        .with_dual_axis(ViewerAction::Orbit, MouseMove::default())
        .with_axis(ViewerAction::Zoom, MouseScrollAxis::Y)
        .with(ViewerAction::Drag, MouseButton::Left)
        .with(ViewerAction::ToggleUi, KeyCode::KeyQ)
}

/// Plugin that registers the action type and spawns the action state.
pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(InputManagerPlugin::<ViewerAction>::default())
            .add_systems(Startup, spawn_action_state);
    }
}

fn spawn_action_state(mut commands: Commands) {
    commands.spawn((
        default_input_map(),
        ActionState::<ViewerAction>::default(),
    ));
}
