//! [`GazeFocusPipeline`] – the per-frame gaze focus orchestrator.
//!
//! One [`tick`][GazeFocusPipeline::tick] per rendered frame:
//!
//! 1. **Sense** – pump the device connection and pick up the newest sample,
//!    if any arrived since the previous tick.
//! 2. **Reproject** – record the live head pose and turn the sample into a
//!    world-space gaze ray.
//! 3. **Focus** – run one [`FocusEngine`] step against the scene.
//!
//! The pipeline performs no threading of its own and a tick never fails:
//! connectivity problems show up in [`TickReport::connection_state`],
//! scoring problems as `focus_updated == false` with the previous focus
//! list left in place.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use gazecast_hal::SimDriver;
//! use gazecast_runtime::config::PipelineConfig;
//! use gazecast_runtime::pipeline::GazeFocusPipeline;
//! use gazecast_runtime::scene::AllFocusable;
//! use gazecast_runtime::sim::{SimScene, SimScoringEngine};
//! use gazecast_types::{Mat4, RawGazeSample, Vec3};
//!
//! let driver = SimDriver::new().with_device("sim://headset", "wearable");
//! let mut pipeline = GazeFocusPipeline::new(
//!     &PipelineConfig::default(),
//!     Box::new(driver.clone()),
//!     Box::new(SimScoringEngine::new()),
//!     Box::new(AllFocusable),
//! )
//! .expect("sim pipeline must start");
//!
//! let mut scene = SimScene::new();
//! let cube = scene.add_box(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.5, 0.5, 0.5), 0);
//!
//! driver.queue_sample(RawGazeSample {
//!     combined_origin_valid: true,
//!     combined_direction: Vec3::FORWARD,
//!     combined_direction_valid: true,
//!     ..RawGazeSample::default()
//! });
//!
//! let report = pipeline.tick(Instant::now(), Mat4::IDENTITY, &scene);
//! assert!(report.device_sample_available);
//! assert_eq!(pipeline.focused().first().map(|f| f.entity), Some(cube));
//!
//! pipeline.destroy();
//! pipeline.destroy(); // no-op
//! ```

use std::time::Instant;

use gazecast_hal::EyeTrackerDriver;
use gazecast_types::{
    CandidateGeometry, ConnectionState, DeviceData, EntityId, FocusedCandidate, GazeError,
    GazeSample, Mat4, ScoreResult,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::candidate_cache::Candidate;
use crate::config::PipelineConfig;
use crate::focus::{FocusEngine, FocusObserver};
use crate::scene::{FocusPredicate, SceneQuery};
use crate::scoring::ScoringEngine;
use crate::tracker::GazeTracker;

/// Outcome of one [`GazeFocusPipeline::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// A new device sample arrived this tick.  When `false` the previous
    /// gaze sample was reused unchanged.
    pub device_sample_available: bool,
    pub connection_state: ConnectionState,
    /// The focus list was rebuilt.  `false` means scoring failed (or the
    /// pipeline is destroyed) and the last good list is still in place.
    pub focus_updated: bool,
    pub focused_count: usize,
}

pub struct GazeFocusPipeline {
    tracker: GazeTracker,
    focus: FocusEngine,
    predicate: Box<dyn FocusPredicate + Send>,
    epoch: Instant,
    destroyed: bool,
}

impl GazeFocusPipeline {
    /// Validate `config`, create the scoring context, and open the device.
    ///
    /// # Errors
    ///
    /// - [`GazeError::InvalidConfig`] for a rejected configuration.
    /// - [`GazeError::ScoringEngine`] when no scoring context can be
    ///   created.
    /// - Any device open failure; the scoring context is released again.
    pub fn new(
        config: &PipelineConfig,
        driver: Box<dyn EyeTrackerDriver>,
        engine: Box<dyn ScoringEngine>,
        predicate: Box<dyn FocusPredicate + Send>,
    ) -> Result<Self, GazeError> {
        config.validate()?;
        debug!(config = ?config, "starting gaze focus pipeline");

        let focus = FocusEngine::new(config.focus_config(), engine)?;
        let tracker = GazeTracker::open(
            driver,
            config.connection_config(),
            config.gaze_source_config(),
        )?;

        Ok(Self {
            tracker,
            focus,
            predicate,
            epoch: Instant::now(),
            destroyed: false,
        })
    }

    /// Register a hook called with every freshly built focus list.
    pub fn set_observer(&mut self, observer: Box<dyn FocusObserver>) {
        self.focus.set_observer(observer);
    }

    /// Run one frame.  `head_pose` is the live head-to-world transform.
    pub fn tick(&mut self, now: Instant, head_pose: Mat4, scene: &dyn SceneQuery) -> TickReport {
        if self.destroyed {
            return TickReport {
                device_sample_available: false,
                connection_state: ConnectionState::Disconnected,
                focus_updated: false,
                focused_count: self.focus.focused_count(),
            };
        }

        let now_us = u64::try_from(now.saturating_duration_since(self.epoch).as_micros())
            .unwrap_or(u64::MAX);

        let device_sample_available = self.tracker.tick(now, now_us, head_pose);
        let device = DeviceData::from_sample(now_us, self.tracker.gaze_sample());
        let focus_updated = self.focus.tick(device, scene, self.predicate.as_ref());

        TickReport {
            device_sample_available,
            connection_state: self.tracker.connection_state(),
            focus_updated,
            focused_count: self.focus.focused_count(),
        }
    }

    /// Total number of tracked candidates.
    pub fn total_candidates(&self) -> usize {
        self.focus.total_candidates()
    }

    pub fn focused_count(&self) -> usize {
        self.focus.focused_count()
    }

    /// Entities in focus, best first.  Rebuilt every tick.
    pub fn focused(&self) -> &[FocusedCandidate] {
        self.focus.focused()
    }

    pub fn candidates(&self) -> &[CandidateGeometry] {
        self.focus.candidates()
    }

    pub fn score_results(&self) -> &[ScoreResult] {
        self.focus.score_results()
    }

    pub fn device_data(&self) -> &DeviceData {
        self.focus.device_data()
    }

    pub fn candidate(&self, entity: EntityId) -> Option<&Candidate> {
        self.focus.candidate(entity)
    }

    pub fn gaze_sample(&self) -> &GazeSample {
        self.tracker.gaze_sample()
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.destroyed {
            ConnectionState::Disconnected
        } else {
            self.tracker.connection_state()
        }
    }

    pub fn clear_candidates(&mut self) {
        self.focus.clear_candidates();
    }

    /// Release the scoring context and the device.  Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.focus.destroy();
        self.tracker.close();
        info!("gaze focus pipeline destroyed");
    }
}

impl Drop for GazeFocusPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for GazeFocusPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GazeFocusPipeline")
            .field("tracker", &self.tracker)
            .field("focus", &self.focus)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::AllFocusable;
    use crate::sim::{SimScene, SimScoringEngine};
    use gazecast_hal::SimDriver;
    use gazecast_types::{RawGazeSample, Vec3};
    use std::time::Duration;

    const FRAME: Duration = Duration::from_micros(11_111);

    fn looking_forward() -> RawGazeSample {
        RawGazeSample {
            combined_origin_valid: true,
            combined_direction: Vec3::FORWARD,
            combined_direction_valid: true,
            ..RawGazeSample::default()
        }
    }

    fn pipeline(driver: &SimDriver, engine: &SimScoringEngine) -> GazeFocusPipeline {
        GazeFocusPipeline::new(
            &PipelineConfig::default(),
            Box::new(driver.clone()),
            Box::new(engine.clone()),
            Box::new(AllFocusable),
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_before_touching_drivers() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let config = PipelineConfig {
            min_rays: 0,
            ..PipelineConfig::default()
        };
        let err = GazeFocusPipeline::new(
            &config,
            Box::new(driver.clone()),
            Box::new(SimScoringEngine::new()),
            Box::new(AllFocusable),
        )
        .unwrap_err();
        assert!(matches!(err, GazeError::InvalidConfig(_)));
        assert_eq!(driver.live_contexts(), 0);
    }

    #[test]
    fn device_failure_releases_scoring_context() {
        let engine = SimScoringEngine::new();
        let err = GazeFocusPipeline::new(
            &PipelineConfig::default(),
            Box::new(SimDriver::new()),
            Box::new(engine.clone()),
            Box::new(AllFocusable),
        )
        .unwrap_err();
        assert_eq!(err, GazeError::NoDeviceFound);
        assert_eq!(engine.live_contexts(), 0);
    }

    #[test]
    fn focuses_the_box_in_front_of_the_user() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);

        let mut scene = SimScene::new();
        let ahead = scene.add_box(Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.5, 0.5, 0.5), 0);
        scene.add_box(Vec3::new(0.0, 6.0, 4.0), Vec3::new(0.5, 0.5, 0.5), 0);

        driver.queue_sample(looking_forward());
        let report = p.tick(Instant::now(), Mat4::IDENTITY, &scene);

        assert!(report.device_sample_available);
        assert!(report.focus_updated);
        assert_eq!(report.connection_state, ConnectionState::Connected);
        assert_eq!(p.focused().first().map(|f| f.entity), Some(ahead));
        assert_eq!(p.total_candidates(), 1);
        assert!(p.candidate(ahead).is_some());
        assert_eq!(p.candidates().len(), p.score_results().len());
    }

    #[test]
    fn no_sample_reuses_previous_gaze() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);
        let scene = SimScene::new();
        let t0 = Instant::now();

        driver.queue_sample(looking_forward());
        p.tick(t0, Mat4::IDENTITY, &scene);
        let first = *p.gaze_sample();

        let report = p.tick(t0 + FRAME, Mat4::IDENTITY, &scene);
        assert!(!report.device_sample_available);
        assert_eq!(*p.gaze_sample(), first);
        assert!(p.device_data().timestamp_us >= first.timestamp_us);
    }

    #[test]
    fn focus_survives_a_failed_scoring_tick() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);
        let mut scene = SimScene::new();
        let ahead = scene.add_box(Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.5, 0.5, 0.5), 0);
        let t0 = Instant::now();

        driver.queue_sample(looking_forward());
        p.tick(t0, Mat4::IDENTITY, &scene);

        engine.fail_next_process(1);
        let report = p.tick(t0 + FRAME, Mat4::IDENTITY, &scene);
        assert!(!report.focus_updated);
        assert_eq!(p.focused().first().map(|f| f.entity), Some(ahead));

        let report = p.tick(t0 + FRAME * 2, Mat4::IDENTITY, &scene);
        assert!(report.focus_updated);
    }

    #[test]
    fn diagnostics_keep_last_good_arrays_after_a_failed_scoring_tick() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);
        let mut scene = SimScene::new();
        let ahead = scene.add_box(Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.5, 0.5, 0.5), 0);
        let t0 = Instant::now();

        driver.queue_sample(looking_forward());
        assert!(p.tick(t0, Mat4::IDENTITY, &scene).focus_updated);
        let good_scores = p.score_results().to_vec();
        let good_geometry = p.candidates().to_vec();
        assert_eq!(good_scores.first().and_then(|r| r.id), Some(ahead));
        assert!(!good_scores[0].is_zero());

        engine.fail_next_process(1);
        assert!(!p.tick(t0 + FRAME, Mat4::IDENTITY, &scene).focus_updated);
        assert_eq!(p.score_results(), good_scores.as_slice());
        assert_eq!(p.candidates(), good_geometry.as_slice());
        assert_eq!(p.focused_count(), 1);
    }

    #[test]
    fn transport_failure_surfaces_as_state_only() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);
        let scene = SimScene::new();

        driver.set_transport_down(true);
        let report = p.tick(Instant::now(), Mat4::IDENTITY, &scene);
        assert_eq!(report.connection_state, ConnectionState::Reconnecting);
        assert!(!report.device_sample_available);
    }

    #[test]
    fn destroy_twice_is_a_noop() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);

        p.destroy();
        p.destroy();
        drop(p);

        assert_eq!(engine.live_contexts(), 0);
        assert_eq!(engine.destroyed_contexts(), 1);
        assert_eq!(driver.destroyed_contexts(), 1);
        assert!(driver.open_devices().is_empty());
    }

    #[test]
    fn tick_after_destroy_reports_disconnected() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let engine = SimScoringEngine::new();
        let mut p = pipeline(&driver, &engine);
        p.destroy();
        let report = p.tick(Instant::now(), Mat4::IDENTITY, &SimScene::new());
        assert_eq!(report.connection_state, ConnectionState::Disconnected);
        assert!(!report.focus_updated);
    }
}
