//! `gazecast-perception` – spatial side of the gaze pipeline.
//!
//! Turns head-relative eye-tracking samples into world-space gaze rays by
//! pairing them with the head pose that was current when the eyes moved.
//!
//! # Modules
//!
//! - [`transform`] – [`RigidTransform`][transform::RigidTransform]: position +
//!   orientation head poses, lowered to [`Mat4`][gazecast_types::Mat4].
//! - [`head_pose`] – [`HeadPoseHistory`][head_pose::HeadPoseHistory]: ring
//!   buffer of timestamped head poses with frame-offset and interpolated
//!   timestamp lookups.
//! - [`convergence`] – closest-point-of-approach convergence distance from
//!   the two per-eye gaze rays.
//! - [`gaze_source`] – [`GazeSampleSource`][gaze_source::GazeSampleSource]:
//!   converts device samples and reprojects them into world space once per
//!   tick.

pub mod convergence;
pub mod gaze_source;
pub mod head_pose;
pub mod transform;

pub use gaze_source::{GazeSampleSource, GazeSourceConfig, PoseLookup};
pub use head_pose::HeadPoseHistory;
