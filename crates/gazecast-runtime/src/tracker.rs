//! [`GazeTracker`] – device connection plus world-space sample source.
//!
//! Pairs one [`DeviceConnection`] with one [`GazeSampleSource`] so a single
//! call per tick pumps the driver, picks up the newest sample and
//! reprojects it with the matching head pose.

use std::time::Instant;

use gazecast_hal::{ConnectionConfig, DeviceConnection, EyeTrackerDriver};
use gazecast_perception::{GazeSampleSource, GazeSourceConfig};
use gazecast_types::{ConnectionState, GazeError, GazeSample, Mat4};

#[derive(Debug)]
pub struct GazeTracker {
    connection: DeviceConnection,
    source: GazeSampleSource,
}

impl GazeTracker {
    /// Build the sample source and open the device.
    ///
    /// # Errors
    ///
    /// Any [`DeviceConnection::open`] failure, or
    /// [`GazeError::OutOfHistoryRange`] for an unusable pose lookup.
    pub fn open(
        driver: Box<dyn EyeTrackerDriver>,
        connection: ConnectionConfig,
        source: GazeSourceConfig,
    ) -> Result<Self, GazeError> {
        let source = GazeSampleSource::new(source)?;
        let mut connection = DeviceConnection::new(driver, connection);
        connection.open()?;
        Ok(Self { connection, source })
    }

    /// Advance one tick.  Returns `true` when a new device sample arrived
    /// and replaced the current gaze sample.
    pub fn tick(&mut self, now: Instant, now_us: u64, head_pose: Mat4) -> bool {
        let raw = self.connection.tick(now);
        self.source.tick(
            now_us,
            head_pose,
            raw.as_ref(),
            self.connection.convergence_supported(),
        )
    }

    pub fn gaze_sample(&self) -> &GazeSample {
        self.source.current()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &DeviceConnection {
        &self.connection
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazecast_hal::SimDriver;
    use gazecast_types::{RawGazeSample, Vec3};

    fn forward_sample() -> RawGazeSample {
        RawGazeSample {
            timestamp_us: 1,
            combined_origin_valid: true,
            combined_direction: Vec3::FORWARD,
            combined_direction_valid: true,
            ..RawGazeSample::default()
        }
    }

    #[test]
    fn open_failure_is_propagated() {
        let err = GazeTracker::open(
            Box::new(SimDriver::new()),
            ConnectionConfig::default(),
            GazeSourceConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, GazeError::NoDeviceFound);
    }

    #[test]
    fn reports_fresh_samples_only_when_delivered() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut tracker = GazeTracker::open(
            Box::new(driver.clone()),
            ConnectionConfig::default(),
            GazeSourceConfig::default(),
        )
        .unwrap();
        let now = Instant::now();

        assert!(!tracker.tick(now, 0, Mat4::IDENTITY));
        assert!(!tracker.gaze_sample().gaze_ray.is_valid);

        driver.queue_sample(forward_sample());
        assert!(tracker.tick(now, 11_000, Mat4::IDENTITY));
        assert!(tracker.gaze_sample().gaze_ray.is_valid);
        assert_eq!(tracker.gaze_sample().timestamp_us, 11_000);

        assert!(!tracker.tick(now, 22_000, Mat4::IDENTITY));
        assert_eq!(tracker.gaze_sample().timestamp_us, 11_000);
    }

    #[test]
    fn close_disconnects() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut tracker = GazeTracker::open(
            Box::new(driver.clone()),
            ConnectionConfig::default(),
            GazeSourceConfig::default(),
        )
        .unwrap();
        tracker.close();
        assert_eq!(tracker.connection_state(), ConnectionState::Disconnected);
        assert!(driver.open_devices().is_empty());
    }
}
