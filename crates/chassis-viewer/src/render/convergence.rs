//! Progressive accumulation backend.
//!
//! While the viewer is Converging, each frame adds one path-traced sample
//! per pixel to a linear accumulation buffer and presents the running
//! average through a fullscreen overlay image. A reset clears the buffer and
//! drops the scene snapshot; the next step re-snapshots world-space
//! triangles and the camera, so accumulation always restarts clean after a
//! scene change.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, VertexAttributeValues};
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy::ui::widget::NodeImageMode;
use bevy::window::PrimaryWindow;
use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::chassis::Traceable;
use crate::launch_params::LaunchParams;
use crate::tracer::{Lighting, TraceCamera, TraceScene, Triangle, tonemap};

use super::{ActiveDirective, RenderMode};

/// Bounce depth for accumulation paths.
const MAX_PATH_DEPTH: u32 = 4;

// ============================================================================
// Resources and components
// ============================================================================

/// The accumulation buffer and its display image.
#[derive(Resource)]
pub struct AccumulationTarget {
    image: Handle<Image>,
    width: u32,
    height: u32,
    samples: u32,
    /// Linear radiance sums, one per pixel.
    accum: Vec<Vec3>,
    /// Scene snapshot for the current convergence run. `None` after a reset
    /// until the next step re-snapshots.
    scene: Option<TraceScene>,
}

impl AccumulationTarget {
    /// Samples accumulated since the last reset.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Discard accumulated samples and the scene snapshot.
    fn reset(&mut self) {
        self.samples = 0;
        self.accum.fill(Vec3::ZERO);
        self.scene = None;
    }
}

/// Aspect ratio the traced image is presented at. The overlay stretches the
/// buffer to the window, so rays must use the window's aspect rather than
/// the buffer's or the converged view distorts relative to the rasterized
/// one.
fn display_aspect(window: Option<(f32, f32)>, buffer: (u32, u32)) -> f32 {
    match window {
        Some((width, height)) if height > 0.0 => width / height,
        _ => buffer.0 as f32 / buffer.1.max(1) as f32,
    }
}

/// Marker for the fullscreen node displaying the accumulation image.
#[derive(Component)]
pub(super) struct ConvergenceOverlay;

// ============================================================================
// Setup
// ============================================================================

/// Create the accumulation buffer, its display image and the overlay node.
pub(super) fn setup_accumulation_target(
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    params: Res<LaunchParams>,
) {
    let (width, height) = (params.trace_width, params.trace_height);
    let image = Image::new_fill(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    );
    let handle = images.add(image);

    commands.spawn((
        Node {
            position_type: PositionType::Absolute,
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        },
        ImageNode::new(handle.clone()).with_mode(NodeImageMode::Stretch),
        // The viewer starts Converging, so the overlay starts visible.
        Visibility::Visible,
        ConvergenceOverlay,
    ));

    commands.insert_resource(AccumulationTarget {
        image: handle,
        width,
        height,
        samples: 0,
        accum: vec![Vec3::ZERO; (width * height) as usize],
        scene: None,
    });

    tracing::info!(width, height, "Accumulation target created");
}

// ============================================================================
// Per-frame systems
// ============================================================================

/// Apply pending resets and, while Converging, add one sample per pixel.
#[allow(clippy::type_complexity)]
pub(super) fn step_accumulation(
    directive: Res<ActiveDirective>,
    mut target: ResMut<AccumulationTarget>,
    mut images: ResMut<Assets<Image>>,
    meshes: Res<Assets<Mesh>>,
    traceables: Query<(&Mesh3d, &GlobalTransform, &Traceable)>,
    camera_query: Query<(&GlobalTransform, &Projection), With<Camera3d>>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    // Resets apply in both modes: a scene change invalidates samples even if
    // the converging path is not taken this frame.
    if directive.0.reset_accumulation {
        target.reset();
    }
    if directive.0.mode != RenderMode::Converging {
        return;
    }

    // Re-snapshot after a reset. The snapshot is intentionally static for
    // the whole convergence run; residual damped wheel motion only affects
    // the rasterized view.
    if target.scene.is_none() {
        let Ok((camera_transform, projection)) = camera_query.single() else {
            return;
        };
        let aspect = display_aspect(
            windows.single().ok().map(|w| (w.width(), w.height())),
            (target.width, target.height),
        );
        let scene = snapshot_scene(&meshes, &traceables, camera_transform, projection, aspect);
        tracing::debug!(triangles = scene.triangle_count(), "Scene snapshot taken");
        target.scene = Some(scene);
    }

    let AccumulationTarget {
        image,
        width,
        height,
        samples,
        accum,
        scene,
    } = &mut *target;
    let Some(scene) = scene.as_ref() else {
        return;
    };

    // A missing display image is a precondition violation, not a recoverable
    // state: fail fast and loud.
    let Some(image) = images.get_mut(&*image) else {
        tracing::error!("Accumulation image asset missing; cannot present convergence output");
        return;
    };
    let Some(data) = image.data.as_mut() else {
        tracing::error!("Accumulation image has no CPU-side data; cannot present");
        return;
    };

    *samples += 1;
    let inv_samples = 1.0 / *samples as f32;
    let mut rng = SmallRng::seed_from_u64(u64::from(*samples).wrapping_mul(0x9E37_79B9_7F4A_7C15));

    for y in 0..*height {
        for x in 0..*width {
            // Jittered sample position within the pixel.
            let u = (x as f32 + rng.random::<f32>()) / *width as f32;
            let v = (y as f32 + rng.random::<f32>()) / *height as f32;

            let index = (y * *width + x) as usize;
            accum[index] += scene.trace_path(u, v, MAX_PATH_DEPTH, &mut rng);

            // Copy the running average into the display target.
            let rgb = tonemap(accum[index] * inv_samples);
            let offset = index * 4;
            data[offset..offset + 3].copy_from_slice(&rgb);
            data[offset + 3] = 255;
        }
    }
}

/// Swap the presented output: the overlay covers the rasterized view while
/// Converging and is hidden while Interactive.
pub(super) fn update_overlay_visibility(
    directive: Res<ActiveDirective>,
    mut overlays: Query<&mut Visibility, With<ConvergenceOverlay>>,
) {
    for mut visibility in &mut overlays {
        *visibility = match directive.0.mode {
            RenderMode::Converging => Visibility::Visible,
            RenderMode::Interactive => Visibility::Hidden,
        };
    }
}

// ============================================================================
// Scene snapshot
// ============================================================================

/// Collect world-space triangles and the active camera into a trace scene.
fn snapshot_scene(
    meshes: &Assets<Mesh>,
    traceables: &Query<(&Mesh3d, &GlobalTransform, &Traceable)>,
    camera_transform: &GlobalTransform,
    projection: &Projection,
    aspect: f32,
) -> TraceScene {
    let mut triangles = Vec::new();
    for (mesh3d, transform, traceable) in traceables {
        let Some(mesh) = meshes.get(&mesh3d.0) else {
            continue;
        };
        append_mesh_triangles(&mut triangles, mesh, transform, traceable.albedo);
    }

    let fov_y = match projection {
        Projection::Perspective(perspective) => perspective.fov,
        _ => std::f32::consts::FRAC_PI_4,
    };
    let camera = TraceCamera::new(
        camera_transform.translation(),
        *camera_transform.forward(),
        Vec3::Y,
        fov_y,
        aspect,
    );

    TraceScene::new(triangles, camera, Lighting::default())
}

/// Append a mesh's triangles in world space.
fn append_mesh_triangles(
    out: &mut Vec<Triangle>,
    mesh: &Mesh,
    transform: &GlobalTransform,
    albedo: Vec3,
) {
    let Some(VertexAttributeValues::Float32x3(positions)) =
        mesh.attribute(Mesh::ATTRIBUTE_POSITION)
    else {
        return;
    };

    let affine = transform.affine();
    let world: Vec<Vec3> = positions
        .iter()
        .map(|p| affine.transform_point3(Vec3::from(*p)))
        .collect();

    let mut push = |a: usize, b: usize, c: usize| {
        out.push(Triangle {
            a: world[a],
            b: world[b],
            c: world[c],
            albedo,
        });
    };

    match mesh.indices() {
        Some(Indices::U32(indices)) => {
            for tri in indices.chunks_exact(3) {
                push(tri[0] as usize, tri[1] as usize, tri[2] as usize);
            }
        }
        Some(Indices::U16(indices)) => {
            for tri in indices.chunks_exact(3) {
                push(tri[0] as usize, tri[1] as usize, tri[2] as usize);
            }
        }
        // Non-indexed: consecutive vertex triples.
        None => {
            for base in 0..world.len() / 3 {
                push(base * 3, base * 3 + 1, base * 3 + 2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_aspect_follows_window_not_buffer() {
        // A square window with the default 16:9 buffer traces square.
        let aspect = display_aspect(Some((800.0, 800.0)), (480, 270));
        assert!((aspect - 1.0).abs() < 1e-6);

        let aspect = display_aspect(Some((1000.0, 500.0)), (480, 270));
        assert!((aspect - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_display_aspect_falls_back_to_buffer() {
        let aspect = display_aspect(None, (480, 270));
        assert!((aspect - 480.0 / 270.0).abs() < 1e-6);

        // A degenerate window never yields a non-finite aspect.
        assert!(display_aspect(Some((100.0, 0.0)), (480, 270)).is_finite());
    }
}
