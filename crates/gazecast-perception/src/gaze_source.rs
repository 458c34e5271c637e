//! Gaze Sample Source.
//!
//! Combines the device's head-relative gaze stream with the
//! [`HeadPoseHistory`] into a single world-space [`GazeSample`] per tick.
//!
//! Each tick:
//!
//! 1. The live head pose is recorded into the history, stamped with the
//!    host time plus the estimated pipeline latency.
//! 2. If the device delivered a new sample, it is converted from device
//!    space (millimetres, mirrored X) into head-local metres, then
//!    reprojected into world space with the head pose chosen by the
//!    configured [`PoseLookup`] policy.
//! 3. Otherwise the previous sample is kept unchanged.  Nothing is
//!    extrapolated.
//!
//! # Example
//!
//! ```rust
//! use gazecast_perception::gaze_source::{GazeSampleSource, GazeSourceConfig};
//! use gazecast_types::{Mat4, RawGazeSample, Vec3};
//!
//! let mut source = GazeSampleSource::new(GazeSourceConfig::default()).unwrap();
//!
//! let raw = RawGazeSample {
//!     combined_origin_valid: true,
//!     combined_direction: Vec3::FORWARD,
//!     combined_direction_valid: true,
//!     ..RawGazeSample::default()
//! };
//!
//! let fresh = source.tick(1_000, Mat4::IDENTITY, Some(&raw), false);
//! assert!(fresh);
//! assert!(source.current().gaze_ray.is_valid);
//!
//! // No new sample: the previous one is kept as-is.
//! assert!(!source.tick(12_000, Mat4::IDENTITY, None, false));
//! assert_eq!(source.current().timestamp_us, 1_000);
//! ```

use gazecast_types::{GazeError, GazeRay, GazeSample, Mat4, RawEyeData, RawGazeSample, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::convergence::convergence_distance;
use crate::head_pose::HeadPoseHistory;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// How the head pose for a gaze sample is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseLookup {
    /// Use the pose recorded this many ticks ago.  For sensors whose clock
    /// is not synchronized with the host.
    FrameOffset(usize),
    /// Interpolate the pose at the sample's own timestamp.  Requires the
    /// sensor timestamps to be in the host clock domain.
    NearestTimestamp,
}

impl Default for PoseLookup {
    fn default() -> Self {
        Self::FrameOffset(4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSourceConfig {
    pub history_capacity: usize,
    pub pose_lookup: PoseLookup,
    /// Added to the host time when a head pose is recorded, to account for
    /// the delay between the pose being sampled and the frame using it.
    pub pose_latency_us: u64,
}

impl Default for GazeSourceConfig {
    fn default() -> Self {
        Self {
            history_capacity: 5,
            pose_lookup: PoseLookup::default(),
            pose_latency_us: 33_000,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GazeSampleSource
// ────────────────────────────────────────────────────────────────────────────

/// Produces one world-space [`GazeSample`] per tick.
#[derive(Debug)]
pub struct GazeSampleSource {
    history: HeadPoseHistory,
    pose_lookup: PoseLookup,
    pose_latency_us: u64,
    current: GazeSample,
    has_sample: bool,
}

impl GazeSampleSource {
    /// # Errors
    ///
    /// [`GazeError::OutOfHistoryRange`] if a frame-offset lookup reaches
    /// past the history capacity.
    pub fn new(config: GazeSourceConfig) -> Result<Self, GazeError> {
        let history = HeadPoseHistory::new(config.history_capacity);
        if let PoseLookup::FrameOffset(frames) = config.pose_lookup
            && frames >= history.capacity()
        {
            return Err(GazeError::OutOfHistoryRange {
                requested: frames,
                capacity: history.capacity(),
            });
        }
        Ok(Self {
            history,
            pose_lookup: config.pose_lookup,
            pose_latency_us: config.pose_latency_us,
            current: GazeSample::default(),
            has_sample: false,
        })
    }

    /// The most recent world-space sample.  Its `timestamp_us` is the tick
    /// that produced it, which may be older than the current tick.
    pub fn current(&self) -> &GazeSample {
        &self.current
    }

    /// `true` once at least one device sample has been processed.
    pub fn has_sample(&self) -> bool {
        self.has_sample
    }

    pub fn history(&self) -> &HeadPoseHistory {
        &self.history
    }

    /// Advance one tick.
    ///
    /// Returns `true` when `raw` was consumed and the current sample was
    /// replaced, `false` when the previous sample was kept.
    pub fn tick(
        &mut self,
        now_us: u64,
        live_pose: Mat4,
        raw: Option<&RawGazeSample>,
        convergence_supported: bool,
    ) -> bool {
        self.history
            .record(now_us.saturating_add(self.pose_latency_us), live_pose);

        let Some(raw) = raw else {
            return false;
        };

        let head_pose = match self.pose_lookup {
            // Range was checked at construction.
            PoseLookup::FrameOffset(frames) => match self.history.pose_offset_by(frames) {
                Ok(pose) => pose,
                Err(e) => {
                    warn!(error = %e, "head pose lookup failed, using live pose");
                    live_pose
                }
            },
            PoseLookup::NearestTimestamp => self.history.pose_nearest(raw.timestamp_us),
        };

        let local = to_head_local(raw, convergence_supported);
        self.current = reproject(now_us, &local, &head_pose);
        self.has_sample = true;
        true
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Conversion helpers
// ────────────────────────────────────────────────────────────────────────────

/// Device space (mm, mirrored X) → head-local metres.
fn device_point_to_local(p_mm: Vec3) -> Vec3 {
    Vec3::new(-p_mm.x / 1000.0, p_mm.y / 1000.0, p_mm.z / 1000.0)
}

fn device_direction_to_local(d: Vec3) -> Vec3 {
    Vec3::new(-d.x, d.y, d.z)
}

fn is_blinking(eye: &RawEyeData) -> bool {
    !eye.eye_openness_valid || eye.eye_openness.abs() <= f32::EPSILON
}

/// Convert a raw device sample into a head-local [`GazeSample`].
///
/// When the device reports convergence distance directly (and the
/// capability is supported) that value is used; otherwise it is derived
/// from the two per-eye rays and marked invalid if either eye's direction
/// is invalid.
pub fn to_head_local(raw: &RawGazeSample, convergence_supported: bool) -> GazeSample {
    let gaze_ray = GazeRay::new(
        device_point_to_local(raw.combined_origin_mm),
        device_direction_to_local(raw.combined_direction),
        raw.combined_origin_valid && raw.combined_direction_valid,
    );

    let (convergence_distance_m, convergence_valid) = if convergence_supported {
        (
            raw.convergence_distance_mm / 1000.0,
            raw.convergence_distance_valid,
        )
    } else if !raw.left.gaze_direction_valid || !raw.right.gaze_direction_valid {
        (0.0, false)
    } else {
        match convergence_distance(
            raw.left.gaze_origin_mm,
            raw.left.gaze_direction,
            raw.right.gaze_origin_mm,
            raw.right.gaze_direction,
        ) {
            Some(mm) => (mm / 1000.0, true),
            None => (0.0, false),
        }
    };

    GazeSample {
        timestamp_us: raw.timestamp_us,
        gaze_ray,
        is_left_eye_blinking: is_blinking(&raw.left),
        is_right_eye_blinking: is_blinking(&raw.right),
        convergence_distance: convergence_distance_m,
        convergence_distance_is_valid: convergence_valid,
    }
}

/// Reproject a head-local sample into world space with `head_pose`.
fn reproject(now_us: u64, local: &GazeSample, head_pose: &Mat4) -> GazeSample {
    let ray = &local.gaze_ray;
    GazeSample {
        timestamp_us: now_us,
        gaze_ray: GazeRay::new(
            head_pose.transform_point(ray.origin),
            head_pose.transform_vector(ray.direction).normalized(),
            ray.is_valid,
        ),
        ..*local
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
