//! Rigid head/entity poses and their lowering to [`Mat4`].
//!
//! Hosts usually author a head pose as a position plus an orientation.
//! [`RigidTransform`] holds that form; [`RigidTransform::to_matrix`] produces
//! the head-to-world matrix that
//! [`HeadPoseHistory`][crate::head_pose::HeadPoseHistory] records.
//!
//! # Example
//!
//! ```rust
//! use gazecast_perception::transform::{Quaternion, RigidTransform};
//! use gazecast_types::Vec3;
//!
//! // Eyes 1.7 m above the floor, looking down +Z.
//! let head = RigidTransform::new(Vec3::new(0.0, 1.7, 0.0), Quaternion::IDENTITY);
//! let ahead = head.to_matrix().transform_point(Vec3::FORWARD);
//! assert!((ahead.y - 1.7).abs() < 1e-5);
//! assert!((ahead.z - 1.0).abs() < 1e-5);
//! ```

use gazecast_types::{Mat4, Vec3};

/// Unit quaternion, scalar first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Right-handed rotation of `angle_rad` about `axis`.  A zero axis
    /// yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let n = axis.normalized();
        let (sin, cos) = (0.5 * angle_rad).sin_cos();
        Self {
            w: cos,
            x: n.x * sin,
            y: n.y * sin,
            z: n.z * sin,
        }
    }

    /// Head orientation from yaw (about +Y, positive turns +Z toward +X)
    /// followed by pitch (about the turned +X, positive looks down).
    pub fn from_yaw_pitch(yaw_rad: f32, pitch_rad: f32) -> Self {
        let yaw = Self::from_axis_angle(Vec3::UP, yaw_rad);
        let pitch = Self::from_axis_angle(Vec3::RIGHT, pitch_rad);
        yaw.then(pitch)
    }

    /// `self` followed by `inner` in the rotated frame (Hamilton product
    /// `self * inner`).
    pub fn then(self, inner: Self) -> Self {
        let (a, b) = (self, inner);
        Self {
            w: a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
            x: a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            y: a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            z: a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        }
    }

    pub fn rotate(self, v: Vec3) -> Vec3 {
        let [r0, r1, r2] = self.basis_rows();
        Vec3::new(r0.dot(v), r1.dot(v), r2.dot(v))
    }

    fn basis_rows(self) -> [Vec3; 3] {
        let Self { w, x, y, z } = self;
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);
        [
            Vec3::new(1.0 - 2.0 * (yy + zz), 2.0 * (xy - wz), 2.0 * (xz + wy)),
            Vec3::new(2.0 * (xy + wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - wx)),
            Vec3::new(2.0 * (xz - wy), 2.0 * (yz + wx), 1.0 - 2.0 * (xx + yy)),
        ]
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Orientation then translation, child frame to parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RigidTransform {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl RigidTransform {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn to_matrix(self) -> Mat4 {
        let [r0, r1, r2] = self.orientation.basis_rows();
        let p = self.position;
        Mat4::from_rows([
            [r0.x, r0.y, r0.z, p.x],
            [r1.x, r1.y, r1.z, p.y],
            [r2.x, r2.y, r2.z, p.z],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Vec3, b: Vec3) -> bool {
        a.sub(b).length() < 1e-5
    }

    #[test]
    fn positive_yaw_turns_forward_toward_right() {
        let q = Quaternion::from_axis_angle(Vec3::UP, FRAC_PI_2);
        assert!(close(q.rotate(Vec3::FORWARD), Vec3::RIGHT));
    }

    #[test]
    fn positive_pitch_looks_down() {
        let q = Quaternion::from_yaw_pitch(0.0, 0.3);
        let gaze = q.rotate(Vec3::FORWARD);
        assert!(gaze.y < 0.0);
        assert!((gaze.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn yaw_then_pitch_keeps_turned_heading() {
        let q = Quaternion::from_yaw_pitch(FRAC_PI_2, 0.2);
        let gaze = q.rotate(Vec3::FORWARD);
        assert!(gaze.x > 0.9);
        assert!(gaze.z.abs() < 1e-5);
    }

    #[test]
    fn zero_axis_is_identity() {
        let q = Quaternion::from_axis_angle(Vec3::zero(), 1.0);
        assert!(close(q.rotate(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn matrix_rotates_then_translates() {
        let head = RigidTransform::new(
            Vec3::new(0.0, 1.7, 0.0),
            Quaternion::from_axis_angle(Vec3::UP, 0.6),
        );
        let p = Vec3::new(0.2, -0.1, 2.0);
        let expected = head.orientation.rotate(p).add(head.position);
        assert!(close(head.to_matrix().transform_point(p), expected));
    }

    #[test]
    fn default_lowers_to_identity_matrix() {
        assert!(RigidTransform::default().to_matrix().approx_eq(&Mat4::IDENTITY, 1e-6));
    }
}
