//! CPU progressive path tracer backing the converging render mode.
//!
//! Pure code with no Bevy dependencies: the convergence system snapshots the
//! scene into a [`TraceScene`] (world-space triangle soup plus a pinhole
//! camera) and requests one sample per pixel per accumulation step.

mod bvh;
pub mod sampling;

use glam::Vec3;
use rand::Rng;

use bvh::Bvh;
pub use bvh::{Aabb, Hit};
pub use sampling::tonemap;

/// Offset applied along the surface normal to avoid self-intersection.
const SHADOW_BIAS: f32 = 1e-3;

/// Minimum ray parameter accepted by intersection tests.
const T_MIN: f32 = 1e-4;

/// A ray with precomputed reciprocal direction for slab tests.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a ray. `direction` is expected to be normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Point along the ray at parameter `t`.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A world-space triangle with a flat diffuse albedo.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
    pub albedo: Vec3,
}

impl Triangle {
    /// Möller–Trumbore intersection. Returns the ray parameter of the hit,
    /// if any, in `(T_MIN, t_max)`.
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<f32> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;

        let pvec = ray.direction.cross(edge2);
        let det = edge1.dot(pvec);
        if det.abs() < 1e-8 {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = ray.origin - self.a;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let qvec = tvec.cross(edge1);
        let v = ray.direction.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(qvec) * inv_det;
        (t > T_MIN && t < t_max).then_some(t)
    }

    /// Geometric normal (normalized).
    pub fn normal(&self) -> Vec3 {
        (self.b - self.a).cross(self.c - self.a).normalize()
    }

    /// Bounding box.
    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::empty();
        b.grow_point(self.a);
        b.grow_point(self.b);
        b.grow_point(self.c);
        b
    }

    /// Centroid (for BVH builds).
    pub fn centroid(&self) -> Vec3 {
        (self.a + self.b + self.c) / 3.0
    }
}

/// Pinhole camera used to generate primary rays.
#[derive(Clone, Copy, Debug)]
pub struct TraceCamera {
    origin: Vec3,
    right: Vec3,
    up: Vec3,
    forward: Vec3,
    tan_half_fov_y: f32,
    aspect: f32,
}

impl TraceCamera {
    /// Build a camera from position, view direction, vertical field of view
    /// (radians) and the target aspect ratio.
    pub fn new(origin: Vec3, forward: Vec3, up_hint: Vec3, fov_y: f32, aspect: f32) -> Self {
        let forward = forward.normalize();
        let right = forward.cross(up_hint).normalize();
        let up = right.cross(forward);
        Self {
            origin,
            right,
            up,
            forward,
            tan_half_fov_y: (fov_y * 0.5).tan(),
            aspect,
        }
    }

    /// Primary ray through normalized screen coordinates, `u` and `v` in
    /// `[0, 1)` with `v = 0` at the top of the image.
    pub fn primary_ray(&self, u: f32, v: f32) -> Ray {
        let x = (2.0 * u - 1.0) * self.tan_half_fov_y * self.aspect;
        let y = (1.0 - 2.0 * v) * self.tan_half_fov_y;
        let direction = (self.forward + self.right * x + self.up * y).normalize();
        Ray::new(self.origin, direction)
    }
}

/// Lighting environment: one directional sun plus a vertical sky gradient.
#[derive(Clone, Copy, Debug)]
pub struct Lighting {
    /// Unit direction toward the sun.
    pub sun_direction: Vec3,
    /// Sun radiance reaching a surface facing it head-on.
    pub sun_color: Vec3,
    /// Sky color at the horizon.
    pub horizon_color: Vec3,
    /// Sky color straight up.
    pub zenith_color: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(0.4, 0.8, 0.3).normalize(),
            sun_color: Vec3::new(2.4, 2.3, 2.1),
            horizon_color: Vec3::new(0.65, 0.72, 0.82),
            zenith_color: Vec3::new(0.25, 0.42, 0.75),
        }
    }
}

/// An immutable snapshot of everything the tracer needs for one convergence
/// run. Rebuilt on every accumulation reset.
#[derive(Clone, Debug)]
pub struct TraceScene {
    triangles: Vec<Triangle>,
    bvh: Bvh,
    camera: TraceCamera,
    lighting: Lighting,
}

impl TraceScene {
    /// Snapshot a triangle soup and camera, building the BVH.
    pub fn new(triangles: Vec<Triangle>, camera: TraceCamera, lighting: Lighting) -> Self {
        let bvh = Bvh::build(&triangles);
        Self {
            triangles,
            bvh,
            camera,
            lighting,
        }
    }

    /// Number of triangles in the snapshot.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn intersect(&self, ray: &Ray) -> Option<Hit> {
        self.bvh.intersect(&self.triangles, ray, f32::INFINITY)
    }

    fn occluded(&self, ray: &Ray) -> bool {
        self.bvh.occluded(&self.triangles, ray, f32::INFINITY)
    }

    /// Sky radiance for a miss direction.
    fn sky(&self, direction: Vec3) -> Vec3 {
        let t = (direction.y * 0.5 + 0.5).clamp(0.0, 1.0);
        self.lighting
            .horizon_color
            .lerp(self.lighting.zenith_color, t)
    }

    /// Trace one light path from the camera through screen position
    /// `(u, v)`, returning linear radiance.
    pub fn trace_path(&self, u: f32, v: f32, max_depth: u32, rng: &mut impl Rng) -> Vec3 {
        let mut ray = self.camera.primary_ray(u, v);
        let mut radiance = Vec3::ZERO;
        let mut throughput = Vec3::ONE;

        for _ in 0..max_depth {
            let Some(hit) = self.intersect(&ray) else {
                radiance += throughput * self.sky(ray.direction);
                break;
            };

            let triangle = &self.triangles[hit.index as usize];
            let mut normal = triangle.normal();
            if normal.dot(ray.direction) > 0.0 {
                normal = -normal;
            }
            let point = ray.at(hit.t) + normal * SHADOW_BIAS;

            throughput *= triangle.albedo;

            // Next-event estimation toward the sun. With cosine-weighted
            // bounce sampling the BRDF and pdf terms cancel to this form.
            let cos_sun = normal.dot(self.lighting.sun_direction);
            if cos_sun > 0.0 {
                let shadow_ray = Ray::new(point, self.lighting.sun_direction);
                if !self.occluded(&shadow_ray) {
                    radiance += throughput * self.lighting.sun_color * cos_sun;
                }
            }

            ray = Ray::new(point, sampling::cosine_hemisphere(normal, rng));
        }

        radiance
    }
}
