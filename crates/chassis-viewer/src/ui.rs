//! Debug UI for displaying render-mode and convergence info.
//!
//! Shows FPS, the current render mode, the settle countdown and the
//! accumulated sample count, with a short history plot.

use std::collections::VecDeque;

use bevy::{
    diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin},
    prelude::*,
};
use bevy_egui::{EguiContexts, EguiPlugin, EguiPrimaryContextPass, egui};
use egui_plot::{Line, Plot, PlotPoints};
use leafwing_input_manager::prelude::*;

use crate::{
    input::ViewerAction,
    render::{AccumulationTarget, RenderMode, RenderModeState},
};

/// Number of samples to keep in the history plot.
const SAMPLE_HISTORY_SIZE: usize = 240;

/// Resource controlling whether the debug UI is visible.
#[derive(Resource)]
pub struct UiVisible(pub bool);

impl Default for UiVisible {
    fn default() -> Self {
        Self(true)
    }
}

/// Historical accumulated-sample counts for the plot.
#[derive(Resource, Default)]
struct SampleHistory {
    samples: VecDeque<f32>,
}

impl SampleHistory {
    fn push(&mut self, value: f32) {
        self.samples.push_back(value);
        if self.samples.len() > SAMPLE_HISTORY_SIZE {
            self.samples.pop_front();
        }
    }
}

/// Plugin for the debug UI overlay.
pub struct DebugUiPlugin;

impl Plugin for DebugUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin::default())
            .add_plugins(FrameTimeDiagnosticsPlugin::default())
            .init_resource::<UiVisible>()
            .init_resource::<SampleHistory>()
            .add_systems(Update, (toggle_ui_visible, record_sample_history))
            .add_systems(
                EguiPrimaryContextPass,
                debug_ui_system.run_if(|visible: Res<UiVisible>| visible.0),
            );
    }
}

/// Toggle UI visibility with Q.
fn toggle_ui_visible(
    action_query: Query<&ActionState<ViewerAction>>,
    mut visible: ResMut<UiVisible>,
) {
    let Ok(action_state) = action_query.single() else {
        return;
    };
    if action_state.just_pressed(&ViewerAction::ToggleUi) {
        visible.0 = !visible.0;
    }
}

/// Record the accumulated sample count each frame.
fn record_sample_history(target: Res<AccumulationTarget>, mut history: ResMut<SampleHistory>) {
    history.push(target.samples() as f32);
}

/// Draw the debug window.
fn debug_ui_system(
    mut contexts: EguiContexts,
    diagnostics: Res<DiagnosticsStore>,
    state: Res<RenderModeState>,
    target: Res<AccumulationTarget>,
    history: Res<SampleHistory>,
    time: Res<Time>,
) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    egui::Window::new("Chassis Viewer")
        .default_width(260.0)
        .show(ctx, |ui| {
            if let Some(fps) = diagnostics
                .get(&FrameTimeDiagnosticsPlugin::FPS)
                .and_then(bevy::diagnostic::Diagnostic::smoothed)
            {
                ui.label(format!("FPS: {fps:.0}"));
            }

            match state.mode() {
                RenderMode::Interactive => {
                    ui.colored_label(egui::Color32::LIGHT_GREEN, "Mode: Interactive");
                    let now_ms = time.elapsed_secs_f64() * 1000.0;
                    if let Some(remaining) = state.settle_remaining_ms(now_ms) {
                        ui.label(format!("Converging in {remaining:.0} ms"));
                    }
                }
                RenderMode::Converging => {
                    ui.colored_label(egui::Color32::LIGHT_BLUE, "Mode: Converging");
                }
            }

            ui.label(format!("Accumulated samples: {}", target.samples()));

            ui.add_space(4.0);
            ui.label("Sample history:");
            let points: PlotPoints = history
                .samples
                .iter()
                .enumerate()
                .map(|(i, &v)| [i as f64, f64::from(v)])
                .collect();
            Plot::new("sample_plot")
                .height(60.0)
                .show_axes(false)
                .allow_drag(false)
                .allow_zoom(false)
                .allow_scroll(false)
                .show(ui, |plot_ui| {
                    plot_ui.line(Line::new("samples", points).color(egui::Color32::LIGHT_BLUE));
                });

            ui.add_space(4.0);
            ui.small("Drag to orbit, scroll to zoom, Q toggles this panel");
        });
}
