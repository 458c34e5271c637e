//! Convergence distance from two per-eye gaze rays.
//!
//! The eyes' gaze rays rarely intersect exactly.  The convergence point is
//! taken as the midpoint of the shortest segment between the two rays, and
//! the convergence distance as its distance from the midpoint between the
//! two eye origins.

use gazecast_types::Vec3;

/// Below this the rays are treated as parallel.
const PARALLEL_EPSILON: f32 = 1e-9;

/// Distance from the eyes to the point where the two gaze rays pass
/// closest to each other, in the units of the inputs.
///
/// Returns `None` when the rays are parallel or their closest approach lies
/// behind either eye (diverging gaze).
pub fn convergence_distance(
    left_origin: Vec3,
    left_direction: Vec3,
    right_origin: Vec3,
    right_direction: Vec3,
) -> Option<f32> {
    let w0 = left_origin.sub(right_origin);
    let a = left_direction.dot(left_direction);
    let b = left_direction.dot(right_direction);
    let c = right_direction.dot(right_direction);
    let d = left_direction.dot(w0);
    let e = right_direction.dot(w0);

    let denom = a * c - b * b;
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }

    let t = (b * e - c * d) / denom;
    let s = (a * e - b * d) / denom;
    if t < 0.0 || s < 0.0 {
        return None;
    }

    let on_left = left_origin.add(left_direction.scale(t));
    let on_right = right_origin.add(right_direction.scale(s));
    let convergence_point = on_left.lerp(on_right, 0.5);
    let eyes_centre = left_origin.lerp(right_origin, 0.5);
    Some(convergence_point.sub(eyes_centre).length())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_vergence_on_midline() {
        let target = Vec3::new(0.0, 0.0, 500.0);
        let left = Vec3::new(-32.0, 0.0, 0.0);
        let right = Vec3::new(32.0, 0.0, 0.0);
        let d = convergence_distance(
            left,
            target.sub(left).normalized(),
            right,
            target.sub(right).normalized(),
        )
        .unwrap();
        assert!((d - 500.0).abs() < 1e-2, "got {d}");
    }

    #[test]
    fn skew_rays_use_closest_approach() {
        // Left ray passes 1 mm above the target, right ray 1 mm below.
        let left = Vec3::new(-30.0, 0.0, 0.0);
        let right = Vec3::new(30.0, 0.0, 0.0);
        let d = convergence_distance(
            left,
            Vec3::new(30.0, 1.0, 400.0).normalized(),
            right,
            Vec3::new(-30.0, -1.0, 400.0).normalized(),
        )
        .unwrap();
        assert!((d - 400.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn parallel_rays_have_no_convergence() {
        let d = convergence_distance(
            Vec3::new(-30.0, 0.0, 0.0),
            Vec3::FORWARD,
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::FORWARD,
        );
        assert!(d.is_none());
    }

    #[test]
    fn diverging_rays_have_no_convergence() {
        let d = convergence_distance(
            Vec3::new(-30.0, 0.0, 0.0),
            Vec3::new(-0.1, 0.0, 1.0).normalized(),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.1, 0.0, 1.0).normalized(),
        );
        assert!(d.is_none());
    }
}
