//! Chassis geometry and scene setup.
//!
//! The vehicle body is a full-width, closed 2D profile extruded along Z into
//! a watertight solid, so no mirrored duplication is needed. Extrusion is
//! pure code tested in isolation; the plugin converts it to a Bevy mesh and
//! spawns the body, four wheels, a ground plane and lighting.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use glam::Vec2;

use crate::launch_params::LaunchParams;
use crate::tracer::Lighting;

// ============================================================================
// Constants
// ============================================================================

/// Closed chassis silhouette in the XY plane, ordered around the perimeter.
/// X is vehicle width, Y is height; the loop closes between the last and
/// first points. Extrusion normalizes the winding.
pub const CHASSIS_PROFILE: [Vec2; 8] = [
    Vec2::new(-1.25, -0.55), // left-bottom
    Vec2::new(-1.05, 0.15),  // left-mid
    Vec2::new(-0.55, 0.62),  // left-top shoulder
    Vec2::new(0.0, 0.74),    // center-top crown
    Vec2::new(0.55, 0.62),   // right-top shoulder
    Vec2::new(1.05, 0.15),   // right-mid
    Vec2::new(1.25, -0.55),  // right-bottom
    Vec2::new(0.0, -0.62),   // center-bottom
];

/// Half of the extruded body length along Z.
pub const CHASSIS_HALF_LENGTH: f32 = 1.8;

/// Wheel dimensions.
pub const WHEEL_RADIUS: f32 = 0.38;
const WHEEL_WIDTH: f32 = 0.3;

/// Ground plane height.
pub const GROUND_Y: f32 = -0.85;

/// Wheel hub positions: (x, z) pairs, y derived from ground contact.
const WHEEL_HUBS: [(f32, f32); 4] = [
    (-1.32, -1.15),
    (1.32, -1.15),
    (-1.32, 1.15),
    (1.32, 1.15),
];

// ============================================================================
// Components
// ============================================================================

/// A spinning wheel. The frame loop advances `angle` by
/// `dt * spin_speed * damping` each frame.
#[derive(Component)]
pub struct Wheel {
    /// Spin speed at full rate (rad/s).
    pub spin_speed: f32,
    /// Accumulated rotation around the axle (rad).
    pub angle: f32,
}

/// Marks an entity whose mesh is included in path-traced snapshots, with the
/// flat diffuse albedo the tracer shades it with.
#[derive(Component)]
pub struct Traceable {
    pub albedo: glam::Vec3,
}

// ============================================================================
// Profile extrusion (pure)
// ============================================================================

/// Flat-shaded mesh data produced by extruding a profile.
#[derive(Clone, Debug, Default)]
pub struct ExtrudedProfile {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

/// Twice the signed area of a polygon. Positive for counter-clockwise
/// winding.
pub fn signed_area_doubled(points: &[Vec2]) -> f32 {
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum
}

/// Whether a polygon is convex (all perimeter turns share a sign).
pub fn is_convex(points: &[Vec2]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0_f32;
    for i in 0..n {
        let e0 = points[(i + 1) % n] - points[i];
        let e1 = points[(i + 2) % n] - points[(i + 1) % n];
        let cross = e0.perp_dot(e1);
        if cross.abs() < 1e-9 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Extrude a closed convex profile along Z into a watertight, flat-shaded
/// solid: side quads around the perimeter plus fan-triangulated caps at
/// `z = ±half_depth`.
///
/// Winding is normalized internally, so the input may be clockwise or
/// counter-clockwise. Vertices are duplicated per face for hard edges.
pub fn extrude_profile(points: &[Vec2], half_depth: f32) -> ExtrudedProfile {
    debug_assert!(is_convex(points), "fan-triangulated caps require a convex profile");
    let mut profile: Vec<Vec2> = points.to_vec();
    if signed_area_doubled(&profile) < 0.0 {
        profile.reverse();
    }
    let n = profile.len();

    let mut mesh = ExtrudedProfile::default();

    // Front cap at +Z, fanned from vertex 0. CCW in XY faces +Z.
    let front_base = mesh.positions.len() as u32;
    for p in &profile {
        mesh.positions.push([p.x, p.y, half_depth]);
        mesh.normals.push([0.0, 0.0, 1.0]);
    }
    for i in 1..n as u32 - 1 {
        mesh.indices.extend([front_base, front_base + i, front_base + i + 1]);
    }

    // Back cap at -Z, reversed fan so it faces -Z.
    let back_base = mesh.positions.len() as u32;
    for p in &profile {
        mesh.positions.push([p.x, p.y, -half_depth]);
        mesh.normals.push([0.0, 0.0, -1.0]);
    }
    for i in 1..n as u32 - 1 {
        mesh.indices.extend([back_base, back_base + i + 1, back_base + i]);
    }

    // Side quads, one per perimeter edge, outward-facing.
    for i in 0..n {
        let p0 = profile[i];
        let p1 = profile[(i + 1) % n];
        let edge = p1 - p0;
        let normal = Vec2::new(edge.y, -edge.x).normalize();
        let normal = [normal.x, normal.y, 0.0];

        let base = mesh.positions.len() as u32;
        // a = near-front, b = far-front, c = far-back, d = near-back.
        mesh.positions.push([p0.x, p0.y, half_depth]);
        mesh.positions.push([p1.x, p1.y, half_depth]);
        mesh.positions.push([p1.x, p1.y, -half_depth]);
        mesh.positions.push([p0.x, p0.y, -half_depth]);
        for _ in 0..4 {
            mesh.normals.push(normal);
        }
        mesh.indices.extend([base, base + 3, base + 2]);
        mesh.indices.extend([base, base + 2, base + 1]);
    }

    mesh
}

/// Convert extruded profile data to a Bevy mesh.
fn to_bevy_mesh(extruded: &ExtrudedProfile) -> Mesh {
    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, extruded.positions.clone());
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, extruded.normals.clone());
    mesh.insert_indices(Indices::U32(extruded.indices.clone()));
    mesh
}

// ============================================================================
// Plugin
// ============================================================================

/// Plugin that spawns the chassis scene.
pub struct ChassisScenePlugin;

impl Plugin for ChassisScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_scene);
    }
}

/// Spawn the chassis body, wheels, ground and lighting.
fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    params: Res<LaunchParams>,
) {
    // Body.
    let body_albedo = glam::Vec3::new(0.62, 0.13, 0.11);
    let body_mesh = to_bevy_mesh(&extrude_profile(&CHASSIS_PROFILE, CHASSIS_HALF_LENGTH));
    commands.spawn((
        Mesh3d(meshes.add(body_mesh)),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(body_albedo.x, body_albedo.y, body_albedo.z),
            perceptual_roughness: 0.35,
            metallic: 0.1,
            ..default()
        })),
        Transform::default(),
        Traceable {
            albedo: body_albedo,
        },
    ));

    // Wheels: cylinders with the axle along X.
    let wheel_albedo = glam::Vec3::new(0.08, 0.08, 0.09);
    let wheel_mesh = meshes.add(Cylinder::new(WHEEL_RADIUS, WHEEL_WIDTH));
    let wheel_material = materials.add(StandardMaterial {
        base_color: Color::srgb(wheel_albedo.x, wheel_albedo.y, wheel_albedo.z),
        perceptual_roughness: 0.9,
        ..default()
    });
    let hub_y = GROUND_Y + WHEEL_RADIUS;
    for (hub_x, hub_z) in WHEEL_HUBS {
        commands.spawn((
            Mesh3d(wheel_mesh.clone()),
            MeshMaterial3d(wheel_material.clone()),
            Transform {
                translation: Vec3::new(hub_x, hub_y, hub_z),
                rotation: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                ..default()
            },
            Wheel {
                spin_speed: params.spin_speed,
                angle: 0.0,
            },
            Traceable {
                albedo: wheel_albedo,
            },
        ));
    }

    // Ground plane.
    let ground_albedo = glam::Vec3::new(0.42, 0.43, 0.45);
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(40.0, 40.0))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(ground_albedo.x, ground_albedo.y, ground_albedo.z),
            perceptual_roughness: 0.95,
            ..default()
        })),
        Transform::from_translation(Vec3::new(0.0, GROUND_Y, 0.0)),
        Traceable {
            albedo: ground_albedo,
        },
    ));

    // Sun, matching the tracer's lighting environment so both backends agree
    // on the scene's look.
    let lighting = Lighting::default();
    commands.spawn((
        DirectionalLight {
            illuminance: 32_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::default().looking_to(-lighting.sun_direction, Vec3::Y),
    ));
    commands.insert_resource(GlobalAmbientLight {
        color: Color::srgb(0.65, 0.72, 0.82),
        brightness: 400.0,
        ..default()
    });

    tracing::info!("Chassis scene ready: drag to orbit, scroll to zoom");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn quantize(p: [f32; 3]) -> [i64; 3] {
        [
            (p[0] * 10_000.0).round() as i64,
            (p[1] * 10_000.0).round() as i64,
            (p[2] * 10_000.0).round() as i64,
        ]
    }

    #[test]
    fn test_profile_is_convex_and_closed() {
        assert!(is_convex(&CHASSIS_PROFILE));
        assert!(signed_area_doubled(&CHASSIS_PROFILE).abs() > 0.1);
    }

    #[test]
    fn test_extrusion_counts() {
        let n = CHASSIS_PROFILE.len();
        let mesh = extrude_profile(&CHASSIS_PROFILE, CHASSIS_HALF_LENGTH);

        // Two caps of (n - 2) triangles, two triangles per side quad.
        let expected_triangles = 2 * (n - 2) + 2 * n;
        assert_eq!(mesh.indices.len(), expected_triangles * 3);
        assert_eq!(mesh.positions.len(), mesh.normals.len());
        // Caps share ring vertices, sides duplicate four per edge.
        assert_eq!(mesh.positions.len(), 2 * n + 4 * n);
    }

    #[test]
    fn test_extrusion_is_watertight() {
        // Every undirected edge must be shared by exactly two triangles,
        // traversed in opposite directions. Compare by position since
        // vertices are duplicated per face.
        let mesh = extrude_profile(&CHASSIS_PROFILE, CHASSIS_HALF_LENGTH);

        let mut edge_counts: HashMap<([i64; 3], [i64; 3]), i32> = HashMap::new();
        for tri in mesh.indices.chunks(3) {
            let verts = [
                quantize(mesh.positions[tri[0] as usize]),
                quantize(mesh.positions[tri[1] as usize]),
                quantize(mesh.positions[tri[2] as usize]),
            ];
            for i in 0..3 {
                let a = verts[i];
                let b = verts[(i + 1) % 3];
                // Count directed edges: +1 forward, -1 reverse.
                if a < b {
                    *edge_counts.entry((a, b)).or_insert(0) += 1;
                } else {
                    *edge_counts.entry((b, a)).or_insert(0) -= 1;
                }
            }
        }

        // A closed, consistently wound surface balances every edge.
        for (edge, count) in &edge_counts {
            assert_eq!(*count, 0, "unbalanced edge {edge:?}");
        }
    }

    #[test]
    fn test_extrusion_normals_point_outward() {
        let mesh = extrude_profile(&CHASSIS_PROFILE, CHASSIS_HALF_LENGTH);

        // The centroid is inside the convex solid, so every face normal must
        // point away from it.
        let centroid = mesh
            .positions
            .iter()
            .fold(glam::Vec3::ZERO, |acc, p| acc + glam::Vec3::from(*p))
            / mesh.positions.len() as f32;

        for tri in mesh.indices.chunks(3) {
            let a = glam::Vec3::from(mesh.positions[tri[0] as usize]);
            let b = glam::Vec3::from(mesh.positions[tri[1] as usize]);
            let c = glam::Vec3::from(mesh.positions[tri[2] as usize]);
            let face_normal = (b - a).cross(c - a);
            let outward = (a + b + c) / 3.0 - centroid;
            assert!(
                face_normal.dot(outward) > 0.0,
                "inward-facing triangle {tri:?}"
            );
        }
    }

    #[test]
    fn test_winding_normalization() {
        // The profile as listed runs clockwise; its reverse runs counter-
        // clockwise. Both must extrude to the same watertight result.
        assert!(signed_area_doubled(&CHASSIS_PROFILE) < 0.0);
        let mut reversed = CHASSIS_PROFILE.to_vec();
        reversed.reverse();
        assert!(signed_area_doubled(&reversed) > 0.0);

        let mesh = extrude_profile(&reversed, CHASSIS_HALF_LENGTH);
        let reference = extrude_profile(&CHASSIS_PROFILE, CHASSIS_HALF_LENGTH);
        assert_eq!(mesh.indices.len(), reference.indices.len());
        assert_eq!(mesh.positions.len(), reference.positions.len());
    }
}
