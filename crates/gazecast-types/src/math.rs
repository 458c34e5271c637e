//! Minimal linear-algebra primitives shared by every gazecast crate.
//!
//! Matrices are row-major and act on column vectors, so the translation of
//! a rigid transform lives in the last column (`m[0][3]`, `m[1][3]`,
//! `m[2][3]`).

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector or point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// World up (`+Y`).
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    /// World right (`+X`).
    pub const RIGHT: Self = Self::new(1.0, 0.0, 0.0);
    /// World forward (`+Z`).
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit-length copy of this vector, or the zero vector when the length
    /// is zero.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 { self.scale(1.0 / len) } else { Self::zero() }
    }

    /// Linear interpolation; `t = 0` yields `self`, `t = 1` yields `to`.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        self.add(to.sub(self).scale(t))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mat4
// ────────────────────────────────────────────────────────────────────────────

/// A 4×4 affine transform, stored row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4 {
    pub m: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Build a matrix from its four rows.
    pub const fn from_rows(m: [[f32; 4]; 4]) -> Self {
        Self { m }
    }

    /// A pure translation.
    pub fn from_translation(t: Vec3) -> Self {
        let mut out = Self::IDENTITY;
        out.m[0][3] = t.x;
        out.m[1][3] = t.y;
        out.m[2][3] = t.z;
        out
    }

    /// The translation column.
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    /// Transform a point (w = 1).
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z + m[0][3],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z + m[1][3],
            m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z + m[2][3],
        )
    }

    /// Transform a direction (w = 0); translation is ignored.
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// Matrix product `self * rhs`: `rhs` is applied first.
    pub fn mul(&self, rhs: &Self) -> Self {
        let mut out = [[0.0f32; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[r][k] * rhs.m[k][c]).sum();
            }
        }
        Self { m: out }
    }

    /// Component-wise linear interpolation of all sixteen entries.
    ///
    /// This is not a rigid-body interpolation; for the small pose deltas
    /// between consecutive head samples it is close enough.
    pub fn lerp(from: &Self, to: &Self, weight: f32) -> Self {
        let mut out = [[0.0f32; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = from.m[r][c] + (to.m[r][c] - from.m[r][c]) * weight;
            }
        }
        Self { m: out }
    }

    /// `true` when every entry differs from `other` by at most `eps`.
    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        self.m
            .iter()
            .flatten()
            .zip(other.m.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ray
// ────────────────────────────────────────────────────────────────────────────

/// An origin and a direction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub const fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// A ray with a zero direction cannot be cast; search patterns use one
    /// to mark the end of the usable rays.
    pub fn is_degenerate(&self) -> bool {
        self.direction.length_squared() == 0.0
    }

    /// The point `distance` units along the ray.
    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin.add(self.direction.scale(distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_of_right_and_up_is_forward() {
        let f = Vec3::RIGHT.cross(Vec3::UP);
        assert!((f.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalized_zero_stays_zero() {
        assert_eq!(Vec3::zero().normalized(), Vec3::zero());
    }

    #[test]
    fn translation_moves_points_not_vectors() {
        let t = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let p = t.transform_point(Vec3::zero());
        let v = t.transform_vector(Vec3::FORWARD);
        assert_eq!(p, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v, Vec3::FORWARD);
    }

    #[test]
    fn mul_composes_translations() {
        let a = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let b = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let ab = a.mul(&b);
        assert_eq!(ab.translation(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn lerp_midpoint_is_componentwise_average() {
        let a = Mat4::from_translation(Vec3::new(0.0, 0.0, 0.0));
        let b = Mat4::from_translation(Vec3::new(2.0, 4.0, -6.0));
        let mid = Mat4::lerp(&a, &b, 0.5);
        assert!(mid.approx_eq(&Mat4::from_translation(Vec3::new(1.0, 2.0, -3.0)), 1e-6));
    }

    #[test]
    fn degenerate_ray_detection() {
        assert!(Ray::new(Vec3::zero(), Vec3::zero()).is_degenerate());
        assert!(!Ray::new(Vec3::zero(), Vec3::FORWARD).is_degenerate());
    }
}
