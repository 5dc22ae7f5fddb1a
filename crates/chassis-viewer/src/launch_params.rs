//! Launch parameter parsing for the viewer.
//!
//! On native, parameters are parsed from command-line arguments using clap.
//! On WASM, defaults are used (CLI argument parsing is not available).

use bevy::prelude::*;

/// Default settle threshold in milliseconds.
const DEFAULT_SETTLE_MS: f64 = 200.0;
/// Default wheel spin speed in rad/s.
const DEFAULT_SPIN_SPEED: f32 = 2.0;
/// Default spin damping factor while converging.
const DEFAULT_DAMPED_SPIN: f32 = 0.02;
/// Default accumulation buffer width in pixels.
const DEFAULT_TRACE_WIDTH: u32 = 480;
/// Default accumulation buffer height in pixels.
const DEFAULT_TRACE_HEIGHT: u32 = 270;

/// Launch parameters for the viewer.
#[derive(Resource, Debug, Clone)]
pub struct LaunchParams {
    /// Idle duration after the last interaction before convergence resumes.
    pub settle_ms: f64,
    /// Wheel spin speed at full rate (rad/s).
    pub spin_speed: f32,
    /// Spin damping factor while converging.
    pub damped_spin_factor: f32,
    /// Accumulation buffer width in pixels.
    pub trace_width: u32,
    /// Accumulation buffer height in pixels.
    pub trace_height: u32,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
            spin_speed: DEFAULT_SPIN_SPEED,
            damped_spin_factor: DEFAULT_DAMPED_SPIN,
            trace_width: DEFAULT_TRACE_WIDTH,
            trace_height: DEFAULT_TRACE_HEIGHT,
        }
    }
}

#[cfg(not(target_family = "wasm"))]
mod native {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    #[command(about = "Interactive 3D chassis viewer with path-traced refinement")]
    struct CliArgs {
        /// Idle time in milliseconds before convergence resumes.
        #[arg(long, default_value_t = DEFAULT_SETTLE_MS)]
        settle_ms: f64,

        /// Wheel spin speed in rad/s.
        #[arg(long, default_value_t = DEFAULT_SPIN_SPEED)]
        spin_speed: f32,

        /// Wheel spin damping factor while converging (0 freezes the wheels).
        #[arg(long, default_value_t = DEFAULT_DAMPED_SPIN)]
        damped_spin: f32,

        /// Accumulation buffer width in pixels.
        #[arg(long, default_value_t = DEFAULT_TRACE_WIDTH)]
        trace_width: u32,

        /// Accumulation buffer height in pixels.
        #[arg(long, default_value_t = DEFAULT_TRACE_HEIGHT)]
        trace_height: u32,
    }

    pub fn parse() -> LaunchParams {
        let args = CliArgs::parse();
        LaunchParams {
            settle_ms: args.settle_ms,
            spin_speed: args.spin_speed,
            damped_spin_factor: args.damped_spin,
            trace_width: args.trace_width.max(1),
            trace_height: args.trace_height.max(1),
        }
    }
}

/// Parse launch parameters from CLI args (native) or use defaults (WASM).
pub fn parse() -> LaunchParams {
    #[cfg(not(target_family = "wasm"))]
    {
        native::parse()
    }
    #[cfg(target_family = "wasm")]
    {
        LaunchParams::default()
    }
}
