//! Bounding volume hierarchy over the triangle soup.
//!
//! Median-split build over centroid positions, flat node array, iterative
//! stack traversal. Enough acceleration for a one-sample-per-pixel CPU
//! accumulation step at interactive resolutions.

use glam::Vec3;

use super::{Ray, Triangle};

/// Maximum triangles per leaf.
const LEAF_SIZE: usize = 4;

/// Traversal stack depth. Generous for the scene sizes involved.
const STACK_SIZE: usize = 64;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An empty box that any point or box can grow.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Grow to include a point.
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to include another box.
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Slab test: does the ray hit this box before `t_max`?
    pub fn hit(&self, ray: &Ray, t_max: f32) -> bool {
        let t0 = (self.min - ray.origin) * ray.inv_direction;
        let t1 = (self.max - ray.origin) * ray.inv_direction;
        let t_near = t0.min(t1).max_element().max(0.0);
        let t_far = t0.max(t1).min_element().min(t_max);
        t_near <= t_far
    }
}

/// A node in the flattened hierarchy.
///
/// `count > 0` marks a leaf covering `order[first..first + count]`;
/// otherwise `first` is the index of the left child and the right child
/// immediately follows it.
#[derive(Clone, Copy, Debug)]
struct BvhNode {
    bounds: Aabb,
    first: u32,
    count: u32,
}

/// The nearest intersection found by a traversal.
#[derive(Clone, Copy, Debug)]
pub struct Hit {
    /// Index into the triangle soup.
    pub index: u32,
    /// Ray parameter at the intersection.
    pub t: f32,
}

/// Flat BVH over an externally owned triangle slice.
#[derive(Clone, Debug)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    /// Triangle indices, permuted so leaves cover contiguous ranges.
    order: Vec<u32>,
}

impl Bvh {
    /// Build a hierarchy over the given triangles.
    pub fn build(triangles: &[Triangle]) -> Self {
        let bounds: Vec<Aabb> = triangles.iter().map(Triangle::bounds).collect();
        let centroids: Vec<Vec3> = triangles.iter().map(Triangle::centroid).collect();

        let mut order: Vec<u32> = (0..triangles.len() as u32).collect();
        let mut nodes = Vec::with_capacity(triangles.len().max(1) * 2);

        if triangles.is_empty() {
            nodes.push(BvhNode {
                bounds: Aabb::empty(),
                first: 0,
                count: 0,
            });
            return Self { nodes, order };
        }

        // Root covers everything; split recursively.
        let count = order.len() as u32;
        nodes.push(BvhNode {
            bounds: Aabb::empty(),
            first: 0,
            count,
        });
        let mut bvh = Self { nodes, order };
        bvh.update_bounds(0, &bounds);
        bvh.subdivide(0, &bounds, &centroids);
        bvh
    }

    fn update_bounds(&mut self, node_idx: usize, bounds: &[Aabb]) {
        let node = self.nodes[node_idx];
        let mut b = Aabb::empty();
        for &tri in &self.order[node.first as usize..(node.first + node.count) as usize] {
            b.grow(&bounds[tri as usize]);
        }
        self.nodes[node_idx].bounds = b;
    }

    fn subdivide(&mut self, node_idx: usize, bounds: &[Aabb], centroids: &[Vec3]) {
        let node = self.nodes[node_idx];
        if (node.count as usize) <= LEAF_SIZE {
            return;
        }

        // Split along the widest centroid axis at the median.
        let range = &mut self.order[node.first as usize..(node.first + node.count) as usize];
        let mut cb = Aabb::empty();
        for &tri in range.iter() {
            cb.grow_point(centroids[tri as usize]);
        }
        let extent = cb.max - cb.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        let mid = range.len() / 2;
        range.select_nth_unstable_by(mid, |&a, &b| {
            centroids[a as usize][axis]
                .partial_cmp(&centroids[b as usize][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let left_idx = self.nodes.len();
        self.nodes.push(BvhNode {
            bounds: Aabb::empty(),
            first: node.first,
            count: mid as u32,
        });
        self.nodes.push(BvhNode {
            bounds: Aabb::empty(),
            first: node.first + mid as u32,
            count: node.count - mid as u32,
        });

        self.nodes[node_idx].first = left_idx as u32;
        self.nodes[node_idx].count = 0;

        self.update_bounds(left_idx, bounds);
        self.update_bounds(left_idx + 1, bounds);
        self.subdivide(left_idx, bounds, centroids);
        self.subdivide(left_idx + 1, bounds, centroids);
    }

    /// Find the nearest triangle intersection along the ray.
    pub fn intersect(&self, triangles: &[Triangle], ray: &Ray, t_max: f32) -> Option<Hit> {
        if self.order.is_empty() {
            return None;
        }
        let mut best: Option<Hit> = None;
        let mut t_best = t_max;

        let mut stack = [0u32; STACK_SIZE];
        let mut sp = 0usize;
        stack[sp] = 0;
        sp += 1;

        while sp > 0 {
            sp -= 1;
            let node = self.nodes[stack[sp] as usize];
            if !node.bounds.hit(ray, t_best) {
                continue;
            }

            if node.count > 0 {
                for &tri_idx in
                    &self.order[node.first as usize..(node.first + node.count) as usize]
                {
                    if let Some(t) = triangles[tri_idx as usize].intersect(ray, t_best) {
                        t_best = t;
                        best = Some(Hit { index: tri_idx, t });
                    }
                }
            } else {
                stack[sp] = node.first;
                stack[sp + 1] = node.first + 1;
                sp += 2;
            }
        }

        best
    }

    /// Whether anything blocks the ray before `t_max` (shadow rays).
    pub fn occluded(&self, triangles: &[Triangle], ray: &Ray, t_max: f32) -> bool {
        if self.order.is_empty() {
            return false;
        }
        let mut stack = [0u32; STACK_SIZE];
        let mut sp = 0usize;
        stack[sp] = 0;
        sp += 1;

        while sp > 0 {
            sp -= 1;
            let node = self.nodes[stack[sp] as usize];
            if !node.bounds.hit(ray, t_max) {
                continue;
            }

            if node.count > 0 {
                for &tri_idx in
                    &self.order[node.first as usize..(node.first + node.count) as usize]
                {
                    if triangles[tri_idx as usize].intersect(ray, t_max).is_some() {
                        return true;
                    }
                }
            } else {
                stack[sp] = node.first;
                stack[sp + 1] = node.first + 1;
                sp += 2;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    fn tri(a: Vec3, b: Vec3, c: Vec3) -> Triangle {
        Triangle {
            a,
            b,
            c,
            albedo: Vec3::ONE,
        }
    }

    #[test]
    fn test_aabb_hit_and_miss() {
        let aabb = Aabb {
            min: Vec3::new(-1.0, -1.0, -1.0),
            max: Vec3::new(1.0, 1.0, 1.0),
        };

        let hit_ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        assert!(aabb.hit(&hit_ray, f32::INFINITY));

        let miss_ray = Ray::new(Vec3::new(0.0, 3.0, -5.0), Vec3::Z);
        assert!(!aabb.hit(&miss_ray, f32::INFINITY));

        // Box behind the ray origin.
        let behind_ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(!aabb.hit(&behind_ray, f32::INFINITY));

        // t_max cuts the hit off.
        assert!(!aabb.hit(&hit_ray, 1.0));
    }

    #[test]
    fn test_single_triangle() {
        let triangles = vec![tri(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )];
        let bvh = Bvh::build(&triangles);

        let ray = Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        let hit = bvh.intersect(&triangles, &ray, f32::INFINITY).unwrap();
        assert_eq!(hit.index, 0);
        assert!((hit.t - 2.0).abs() < 1e-5);

        let miss = Ray::new(Vec3::new(5.0, 0.0, -2.0), Vec3::Z);
        assert!(bvh.intersect(&triangles, &miss, f32::INFINITY).is_none());
    }

    #[test]
    fn test_empty_scene() {
        let triangles = Vec::new();
        let bvh = Bvh::build(&triangles);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(bvh.intersect(&triangles, &ray, f32::INFINITY).is_none());
        assert!(!bvh.occluded(&triangles, &ray, f32::INFINITY));
    }

    #[test]
    fn test_matches_brute_force() {
        // Random triangle cloud; BVH must agree with a linear scan.
        let mut rng = SmallRng::seed_from_u64(7);
        let mut random_vec = |scale: f32| {
            Vec3::new(
                rng.random_range(-scale..scale),
                rng.random_range(-scale..scale),
                rng.random_range(-scale..scale),
            )
        };

        let triangles: Vec<Triangle> = (0..200)
            .map(|_| {
                let base = random_vec(10.0);
                tri(base, base + random_vec(1.5), base + random_vec(1.5))
            })
            .collect();
        let bvh = Bvh::build(&triangles);

        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..500 {
            let origin = Vec3::new(
                rng.random_range(-12.0..12.0),
                rng.random_range(-12.0..12.0),
                -20.0,
            );
            let target = Vec3::new(
                rng.random_range(-12.0..12.0),
                rng.random_range(-12.0..12.0),
                20.0,
            );
            let ray = Ray::new(origin, (target - origin).normalize());

            let mut brute: Option<(usize, f32)> = None;
            for (i, t) in triangles.iter().enumerate() {
                if let Some(t_hit) = t.intersect(&ray, brute.map_or(f32::INFINITY, |(_, t)| t)) {
                    brute = Some((i, t_hit));
                }
            }

            let hit = bvh.intersect(&triangles, &ray, f32::INFINITY);
            match (brute, hit) {
                (None, None) => {}
                (Some((i, t)), Some(h)) => {
                    assert_eq!(i as u32, h.index);
                    assert!((t - h.t).abs() < 1e-4);
                }
                other => panic!("bvh/brute force disagree: {other:?}"),
            }
        }
    }

    #[test]
    fn test_occlusion_respects_t_max() {
        let triangles = vec![tri(
            Vec3::new(-1.0, -1.0, 5.0),
            Vec3::new(1.0, -1.0, 5.0),
            Vec3::new(0.0, 1.0, 5.0),
        )];
        let bvh = Bvh::build(&triangles);

        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(bvh.occluded(&triangles, &ray, f32::INFINITY));
        // Blocker is past the ray segment.
        assert!(!bvh.occluded(&triangles, &ray, 2.0));
    }
}
