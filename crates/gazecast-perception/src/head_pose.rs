//! [`HeadPoseHistory`] – fixed-capacity ring buffer of timestamped head poses.
//!
//! Eye-tracking samples arrive some milliseconds after the eye moved, so the
//! gaze ray must be reprojected with the head pose from *that* moment, not
//! the current one.  Two lookup policies are offered:
//!
//! - [`HeadPoseHistory::pose_offset_by`] – the pose recorded `n` ticks ago.
//!   Use this when the sensor clock is not synchronized with the host; pick
//!   `n` to match the sensor's average latency.
//! - [`HeadPoseHistory::pose_nearest`] – the pose interpolated at a given
//!   timestamp.  Requires sensor timestamps in the host clock domain.
//!
//! Both fall back to the live pose while the history is still empty, so
//! callers never see an uninitialised (all-zero) transform.
//!
//! # Example
//!
//! ```rust
//! use gazecast_perception::head_pose::HeadPoseHistory;
//! use gazecast_types::{Mat4, Vec3};
//!
//! let mut history = HeadPoseHistory::new(5);
//! history.record(1_000, Mat4::from_translation(Vec3::new(0.0, 0.0, 0.0)));
//! history.record(2_000, Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
//!
//! let previous = history.pose_offset_by(1).unwrap();
//! assert_eq!(previous.translation().x, 0.0);
//!
//! let halfway = history.pose_nearest(1_500);
//! assert!((halfway.translation().x - 0.5).abs() < 1e-6);
//! ```

use gazecast_types::{GazeError, HeadPoseSample, Mat4};

/// Ring buffer of the most recent head poses.
#[derive(Debug, Clone)]
pub struct HeadPoseHistory {
    slots: Vec<Option<HeadPoseSample>>,
    /// Slot the next [`record`][Self::record] writes to.
    write_index: usize,
    live_pose: Mat4,
}

impl HeadPoseHistory {
    /// Create an empty history holding up to `capacity` poses.
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            write_index: 0,
            live_pose: Mat4::IDENTITY,
        }
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots that have been written at least once.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// The most recently supplied live pose.
    pub fn live_pose(&self) -> Mat4 {
        self.live_pose
    }

    /// Update the live pose without recording a history entry.
    pub fn set_live_pose(&mut self, pose: Mat4) {
        self.live_pose = pose;
    }

    /// Append a pose, overwriting the oldest slot once the ring is full.
    ///
    /// The pose also becomes the live pose.
    pub fn record(&mut self, timestamp_us: u64, pose: Mat4) {
        self.slots[self.write_index] = Some(HeadPoseSample { timestamp_us, pose });
        self.write_index = (self.write_index + 1) % self.slots.len();
        self.live_pose = pose;
    }

    /// The pose recorded `n` records ago (`0` is the latest).
    ///
    /// Returns the live pose if that slot has never been written.
    ///
    /// # Errors
    ///
    /// [`GazeError::OutOfHistoryRange`] when `n >= capacity`.
    pub fn pose_offset_by(&self, n: usize) -> Result<Mat4, GazeError> {
        let capacity = self.slots.len();
        if n >= capacity {
            return Err(GazeError::OutOfHistoryRange {
                requested: n,
                capacity,
            });
        }
        let index = (capacity + self.write_index - 1 - n) % capacity;
        Ok(self.slots[index].map_or(self.live_pose, |s| s.pose))
    }

    /// The pose at `timestamp_us`, linearly interpolated between the two
    /// recorded samples that bracket it.
    ///
    /// The bracket is the latest sample at or before `timestamp_us` and the
    /// earliest sample after it.  When only one side exists its pose is
    /// returned unmodified; an empty history yields the live pose.
    pub fn pose_nearest(&self, timestamp_us: u64) -> Mat4 {
        let mut before: Option<HeadPoseSample> = None;
        let mut after: Option<HeadPoseSample> = None;

        for sample in self.slots.iter().flatten() {
            if sample.timestamp_us <= timestamp_us {
                if before.is_none_or(|b| sample.timestamp_us > b.timestamp_us) {
                    before = Some(*sample);
                }
            } else if after.is_none_or(|a| sample.timestamp_us < a.timestamp_us) {
                after = Some(*sample);
            }
        }

        match (before, after) {
            (Some(b), Some(a)) => {
                let span = (a.timestamp_us - b.timestamp_us) as f64;
                let weight = ((timestamp_us - b.timestamp_us) as f64 / span) as f32;
                Mat4::lerp(&b.pose, &a.pose, weight)
            }
            (Some(only), None) | (None, Some(only)) => only.pose,
            (None, None) => self.live_pose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazecast_types::Vec3;

    fn at_x(x: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn offset_returns_nth_from_latest() {
        let capacity = 5;
        for n in 0..capacity {
            let mut history = HeadPoseHistory::new(capacity);
            // n + 1 records: x = 0, 1, …, n.  The n-th from latest is x = 0.
            for i in 0..=n {
                history.record(i as u64 * 1_000, at_x(i as f32));
            }
            let pose = history.pose_offset_by(n).unwrap();
            assert_eq!(pose, at_x(0.0), "offset {n}");
        }
    }

    #[test]
    fn offset_wraps_around_the_ring() {
        let mut history = HeadPoseHistory::new(3);
        for i in 0..7 {
            history.record(i * 10, at_x(i as f32));
        }
        assert_eq!(history.pose_offset_by(0).unwrap(), at_x(6.0));
        assert_eq!(history.pose_offset_by(2).unwrap(), at_x(4.0));
    }

    #[test]
    fn offset_out_of_range_fails() {
        let history = HeadPoseHistory::new(5);
        let err = history.pose_offset_by(5).unwrap_err();
        assert_eq!(
            err,
            GazeError::OutOfHistoryRange {
                requested: 5,
                capacity: 5
            }
        );
    }

    #[test]
    fn unwritten_slot_falls_back_to_live_pose() {
        let mut history = HeadPoseHistory::new(5);
        history.set_live_pose(at_x(9.0));
        assert_eq!(history.pose_offset_by(3).unwrap(), at_x(9.0));

        history.record(100, at_x(1.0));
        // Slot 3-ago still unwritten → live pose, which is now the recorded one.
        assert_eq!(history.pose_offset_by(3).unwrap(), at_x(1.0));
    }

    #[test]
    fn nearest_midpoint_interpolates_half_way() {
        let mut history = HeadPoseHistory::new(5);
        history.record(1_000, at_x(2.0));
        history.record(3_000, at_x(6.0));
        let pose = history.pose_nearest(2_000);
        assert!(pose.approx_eq(&at_x(4.0), 1e-6));
    }

    #[test]
    fn nearest_picks_tightest_bracket() {
        let mut history = HeadPoseHistory::new(5);
        history.record(1_000, at_x(0.0));
        history.record(2_000, at_x(10.0));
        history.record(3_000, at_x(20.0));
        history.record(4_000, at_x(30.0));
        let pose = history.pose_nearest(2_250);
        assert!(pose.approx_eq(&at_x(12.5), 1e-5));
    }

    #[test]
    fn nearest_with_one_side_returns_that_sample() {
        let mut history = HeadPoseHistory::new(5);
        history.record(1_000, at_x(1.0));
        history.record(2_000, at_x(2.0));
        // After everything: only a "before" sample exists.
        assert_eq!(history.pose_nearest(9_000), at_x(2.0));
        // Before everything: only an "after" sample exists.
        assert_eq!(history.pose_nearest(10), at_x(1.0));
    }

    #[test]
    fn nearest_exact_timestamp_is_exact() {
        let mut history = HeadPoseHistory::new(5);
        history.record(1_000, at_x(1.0));
        history.record(2_000, at_x(2.0));
        assert!(history.pose_nearest(1_000).approx_eq(&at_x(1.0), 1e-6));
    }

    #[test]
    fn nearest_on_empty_history_is_live_pose() {
        let mut history = HeadPoseHistory::new(5);
        history.set_live_pose(at_x(3.0));
        assert_eq!(history.pose_nearest(123), at_x(3.0));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut history = HeadPoseHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.record(1, at_x(1.0));
        assert_eq!(history.len(), 1);
        assert!(!history.is_empty());
    }
}
