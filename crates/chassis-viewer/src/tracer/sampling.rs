//! Sampling helpers for the accumulation tracer.

use glam::Vec3;
use rand::Rng;

/// Build an orthonormal basis around a unit normal.
///
/// Branchless Frisvad-style construction; returns (tangent, bitangent).
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0_f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);
    (tangent, bitangent)
}

/// Sample a cosine-weighted direction on the hemisphere around `n`.
pub fn cosine_hemisphere(n: Vec3, rng: &mut impl Rng) -> Vec3 {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();

    // Concentric-free polar mapping; r^2 = u1 gives the cosine weighting.
    let r = u1.sqrt();
    let phi = std::f32::consts::TAU * u2;
    let x = r * phi.cos();
    let y = r * phi.sin();
    let z = (1.0 - u1).max(0.0).sqrt();

    let (tangent, bitangent) = orthonormal_basis(n);
    (tangent * x + bitangent * y + n * z).normalize()
}

/// Map linear radiance to display bytes: Reinhard tonemap plus gamma 2.2.
pub fn tonemap(c: Vec3) -> [u8; 3] {
    let mapped = c / (Vec3::ONE + c);
    let gamma = mapped.powf(1.0 / 2.2);
    [
        (gamma.x * 255.0 + 0.5).clamp(0.0, 255.0) as u8,
        (gamma.y * 255.0 + 0.5).clamp(0.0, 255.0) as u8,
        (gamma.z * 255.0 + 0.5).clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn test_orthonormal_basis() {
        for n in [Vec3::Y, Vec3::NEG_Y, Vec3::X, Vec3::new(0.3, -0.8, 0.52).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cosine_hemisphere_stays_above_surface() {
        let mut rng = SmallRng::seed_from_u64(42);
        let n = Vec3::new(0.2, 0.9, -0.1).normalize();
        for _ in 0..1_000 {
            let d = cosine_hemisphere(n, &mut rng);
            assert!((d.length() - 1.0).abs() < 1e-4);
            assert!(d.dot(n) >= 0.0);
        }
    }

    #[test]
    fn test_cosine_hemisphere_mean_direction() {
        // The mean of cosine-weighted samples leans toward the normal.
        let mut rng = SmallRng::seed_from_u64(1);
        let n = Vec3::Y;
        let mut sum = Vec3::ZERO;
        for _ in 0..10_000 {
            sum += cosine_hemisphere(n, &mut rng);
        }
        let mean = sum / 10_000.0;
        assert!(mean.y > 0.6);
        assert!(mean.x.abs() < 0.05);
        assert!(mean.z.abs() < 0.05);
    }

    #[test]
    fn test_tonemap_range() {
        assert_eq!(tonemap(Vec3::ZERO), [0, 0, 0]);

        // Very bright input approaches but never exceeds white.
        let bright = tonemap(Vec3::splat(1_000.0));
        assert!(bright.iter().all(|&c| c >= 250));

        // Midtones stay in range and are monotonic per channel.
        let low = tonemap(Vec3::splat(0.2));
        let high = tonemap(Vec3::splat(0.8));
        assert!(low[0] < high[0]);
    }
}
