//! Scoring engine boundary.
//!
//! The external scoring engine ranks candidates and corrects gaze rays
//! against their geometry.  [`ScoringEngine`] is the narrow call contract a
//! native binding implements; [`ScoringEngineClient`] owns one engine
//! context and the reusable candidate/result buffers marshalled across it.
//!
//! Buffers start at the expected candidate count and only ever grow.  Each
//! call is marshalled through scratch buffers that are published only when
//! the engine succeeds, so a failed call leaves the last good arrays
//! readable.

use gazecast_types::{
    CandidateGeometry, DeviceData, GazeError, Ray, RaycastResult, ScoreResult, Vec3,
};
use thiserror::Error;
use tracing::{debug, error, info};

/// Status codes reported by the scoring engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringError {
    #[error("null pointer passed")]
    NullPointerPassed,
    #[error("internal error")]
    Internal,
    #[error("invalid index")]
    InvalidIndex,
    #[error("index out of bounds")]
    IndexOutOfBounds,
    #[error("not implemented")]
    NotImplemented,
}

impl From<ScoringError> for GazeError {
    fn from(e: ScoringError) -> Self {
        GazeError::ScoringEngine(e.to_string())
    }
}

/// Opaque handle to a scoring engine context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// The external scoring engine.
pub trait ScoringEngine: Send {
    fn create_context(&mut self, capacity_hint: usize) -> Result<EngineHandle, ScoringError>;

    /// Fill `rays` with this tick's discovery pattern.  The first ray
    /// follows the combined gaze; a zero-direction ray ends the pattern.
    fn search_pattern(
        &mut self,
        context: EngineHandle,
        up: Vec3,
        right: Vec3,
        device: &DeviceData,
        rays: &mut [Ray],
    ) -> Result<(), ScoringError>;

    /// Score every candidate.  `results` has exactly `candidates.len()`
    /// entries and is expected back sorted by descending score.
    fn process(
        &mut self,
        context: EngineHandle,
        device: &DeviceData,
        raycast: &RaycastResult,
        candidates: &[CandidateGeometry],
        results: &mut [ScoreResult],
    ) -> Result<(), ScoringError>;

    fn destroy_context(&mut self, context: EngineHandle) -> Result<(), ScoringError>;
}

// ────────────────────────────────────────────────────────────────────────────
// ScoringEngineClient
// ────────────────────────────────────────────────────────────────────────────

pub struct ScoringEngineClient {
    engine: Box<dyn ScoringEngine>,
    context: Option<EngineHandle>,
    up: Vec3,
    right: Vec3,
    candidates: Vec<CandidateGeometry>,
    results: Vec<ScoreResult>,
    count: usize,
    scratch_candidates: Vec<CandidateGeometry>,
    scratch_results: Vec<ScoreResult>,
}

impl ScoringEngineClient {
    /// Create an engine context pre-sized for `expected_candidates`.
    ///
    /// # Errors
    ///
    /// [`GazeError::ScoringEngine`] when the engine refuses the context.
    pub fn new(
        mut engine: Box<dyn ScoringEngine>,
        expected_candidates: usize,
    ) -> Result<Self, GazeError> {
        let context = engine.create_context(expected_candidates).map_err(|e| {
            error!(error = %e, "failed to create scoring context");
            GazeError::from(e)
        })?;
        info!(capacity = expected_candidates, "created scoring context");

        Ok(Self {
            engine,
            context: Some(context),
            up: Vec3::UP,
            right: Vec3::RIGHT,
            candidates: vec![CandidateGeometry::default(); expected_candidates],
            results: vec![ScoreResult::default(); expected_candidates],
            count: 0,
            scratch_candidates: vec![CandidateGeometry::default(); expected_candidates],
            scratch_results: vec![ScoreResult::default(); expected_candidates],
        })
    }

    pub fn is_alive(&self) -> bool {
        self.context.is_some()
    }

    /// Current size of the candidate/result buffers.
    pub fn capacity(&self) -> usize {
        self.candidates.len()
    }

    /// Geometry sent with the last successful [`process`][Self::process]
    /// call.
    pub fn candidates(&self) -> &[CandidateGeometry] {
        &self.candidates[..self.count]
    }

    /// Results of the last successful [`process`][Self::process] call.
    pub fn results(&self) -> &[ScoreResult] {
        &self.results[..self.count]
    }

    /// # Errors
    ///
    /// [`GazeError::SearchPattern`] when the engine fails or the context
    /// has been destroyed.
    pub fn search_pattern(&mut self, device: &DeviceData, rays: &mut [Ray]) -> Result<(), GazeError> {
        let context = self
            .context
            .ok_or_else(|| GazeError::SearchPattern("scoring context destroyed".to_string()))?;
        self.engine
            .search_pattern(context, self.up, self.right, device, rays)
            .map_err(|e| GazeError::SearchPattern(e.to_string()))
    }

    /// Grow the buffers to hold `count` candidates.  Never shrinks.
    pub fn ensure_capacity(&mut self, count: usize) {
        if count <= self.candidates.len() {
            return;
        }
        debug!(from = self.candidates.len(), to = count, "growing scoring buffers");
        self.candidates.resize(count, CandidateGeometry::default());
        self.results.resize(count, ScoreResult::default());
        self.scratch_candidates.resize(count, CandidateGeometry::default());
        self.scratch_results.resize(count, ScoreResult::default());
    }

    /// Score `geometry` for this tick.  The engine sees slices of exactly
    /// `geometry.len()` entries.
    ///
    /// # Errors
    ///
    /// [`GazeError::ScoringEngine`] when the engine rejects the call or the
    /// context has been destroyed.  [`candidates`][Self::candidates] and
    /// [`results`][Self::results] then still hold the previous call's data.
    pub fn process(
        &mut self,
        device: &DeviceData,
        raycast: &RaycastResult,
        geometry: &[CandidateGeometry],
    ) -> Result<&[ScoreResult], GazeError> {
        let context = self
            .context
            .ok_or_else(|| GazeError::ScoringEngine("scoring context destroyed".to_string()))?;

        let n = geometry.len();
        self.ensure_capacity(n);
        self.scratch_candidates[..n].copy_from_slice(geometry);
        self.scratch_results[..n].fill(ScoreResult::default());

        self.engine.process(
            context,
            device,
            raycast,
            &self.scratch_candidates[..n],
            &mut self.scratch_results[..n],
        )?;

        std::mem::swap(&mut self.candidates, &mut self.scratch_candidates);
        std::mem::swap(&mut self.results, &mut self.scratch_results);
        self.count = n;
        Ok(&self.results[..n])
    }

    /// Release the engine context.  Idempotent.
    pub fn destroy(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        match self.engine.destroy_context(context) {
            Ok(()) => info!("destroyed scoring context"),
            Err(e) => error!(error = %e, "failed to destroy scoring context"),
        }
    }
}

impl Drop for ScoringEngineClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for ScoringEngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngineClient")
            .field("context", &self.context)
            .field("capacity", &self.candidates.len())
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
