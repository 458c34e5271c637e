//! [`FocusEngine`] – one gaze-to-object mapping step per tick.
//!
//! Each [`tick`][FocusEngine::tick]:
//!
//! 1. **Discover** – [`ObjectFinder`] casts this tick's discovery rays.
//! 2. **Cache** – new entities are merged into the [`CandidateCache`], idle
//!    or destroyed ones are evicted.  Both are skipped when discovery
//!    failed, leaving the cache as it was.
//! 3. **Geometry** – bounds are read fresh from the scene for every cached
//!    candidate.
//! 4. **Direct hit** – the combined gaze ray is hit-tested on its own.
//! 5. **Score** – the scoring engine ranks all candidates.
//! 6. **Focus** – results are scanned in order and cut at the first
//!    near-zero score.  The new list replaces the old one only when scoring
//!    succeeded.

use gazecast_types::{
    CandidateGeometry, DeviceData, EntityId, FocusedCandidate, GazeError, RaycastResult,
    ScoreResult,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::candidate_cache::{Candidate, CandidateCache};
use crate::object_finder::{ObjectFinder, ObjectFinderConfig};
use crate::scene::{FocusPredicate, SceneQuery};
use crate::scoring::{ScoringEngine, ScoringEngineClient};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// How score results are ordered before the zero-score cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOrdering {
    /// Trust the engine's order.  A zero score hides every later result.
    #[default]
    EngineOrder,
    /// Sort by descending score first.
    SortDescending,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusConfig {
    pub expected_candidates: usize,
    pub retention: Duration,
    pub finder: ObjectFinderConfig,
    pub score_ordering: ScoreOrdering,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            expected_candidates: 10,
            retention: Duration::from_secs(1),
            finder: ObjectFinderConfig::default(),
            score_ordering: ScoreOrdering::EngineOrder,
        }
    }
}

/// Notified after every tick that produced a new focus list.
pub trait FocusObserver: Send {
    fn on_focus_updated(&mut self, focused: &[FocusedCandidate]);
}

impl<F> FocusObserver for F
where
    F: FnMut(&[FocusedCandidate]) + Send,
{
    fn on_focus_updated(&mut self, focused: &[FocusedCandidate]) {
        self(focused)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Focus list construction
// ────────────────────────────────────────────────────────────────────────────

/// Rebuild `out` from `results`: entries before the first near-zero score,
/// each carrying its adjusted combined ray.  Results naming an entity
/// `is_tracked` rejects are skipped.
pub fn build_focused_list(
    results: &[ScoreResult],
    ordering: ScoreOrdering,
    is_tracked: impl Fn(EntityId) -> bool,
    out: &mut Vec<FocusedCandidate>,
) {
    out.clear();

    let mut sorted;
    let ordered: &[ScoreResult] = match ordering {
        ScoreOrdering::EngineOrder => results,
        ScoreOrdering::SortDescending => {
            sorted = results.to_vec();
            // NaN ranks last.
            let rank = |r: &ScoreResult| if r.score.is_nan() { f32::NEG_INFINITY } else { r.score };
            sorted.sort_by(|a, b| rank(b).total_cmp(&rank(a)));
            &sorted
        }
    };

    for result in ordered {
        if result.is_zero() {
            break;
        }
        let Some(entity) = result.id.filter(|&e| is_tracked(e)) else {
            debug!(id = ?result.id, "score result for untracked candidate");
            continue;
        };
        let ray = &result.adjusted_combined;
        out.push(FocusedCandidate {
            entity,
            is_ray_valid: ray.is_valid,
            origin: ray.origin,
            direction: ray.direction,
        });
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FocusEngine
// ────────────────────────────────────────────────────────────────────────────

pub struct FocusEngine {
    cache: CandidateCache,
    finder: ObjectFinder,
    client: ScoringEngineClient,
    score_ordering: ScoreOrdering,
    geometry: Vec<CandidateGeometry>,
    focused: Vec<FocusedCandidate>,
    device_data: DeviceData,
    raycast: RaycastResult,
    observer: Option<Box<dyn FocusObserver>>,
}

impl FocusEngine {
    /// # Errors
    ///
    /// [`GazeError::ScoringEngine`] when no engine context can be created.
    pub fn new(config: FocusConfig, engine: Box<dyn ScoringEngine>) -> Result<Self, GazeError> {
        let client = ScoringEngineClient::new(engine, config.expected_candidates)?;
        Ok(Self {
            cache: CandidateCache::new(config.retention, config.expected_candidates),
            finder: ObjectFinder::new(config.finder),
            client,
            score_ordering: config.score_ordering,
            geometry: Vec::with_capacity(config.expected_candidates),
            focused: Vec::with_capacity(config.expected_candidates),
            device_data: DeviceData::default(),
            raycast: RaycastResult::default(),
            observer: None,
        })
    }

    pub fn set_observer(&mut self, observer: Box<dyn FocusObserver>) {
        self.observer = Some(observer);
    }

    /// Run one step.  Returns `true` when the focus list was rebuilt,
    /// `false` when scoring failed and the previous list was kept.
    pub fn tick(
        &mut self,
        device: DeviceData,
        scene: &dyn SceneQuery,
        predicate: &dyn FocusPredicate,
    ) -> bool {
        self.device_data = device;
        let now_us = device.timestamp_us;

        if let Ok(found) =
            self.finder
                .find_candidates(&self.device_data, &mut self.client, scene, predicate)
        {
            let inserted = self.cache.merge(now_us, found);
            let evicted = self.cache.evict(now_us, |e| scene.is_alive(e)).len();
            if inserted > 0 || evicted > 0 {
                debug!(
                    inserted,
                    evicted,
                    tracked = self.cache.len(),
                    "candidate cache updated"
                );
            }
        }

        self.geometry.clear();
        for candidate in self.cache.iter() {
            match scene.bounds(candidate.entity) {
                Some(bounds) => self.geometry.push(bounds.into_geometry(candidate.entity)),
                None => debug!(entity = %candidate.entity, "candidate has no bounds this tick"),
            }
        }

        self.raycast = self.finder.direct_hit(&self.device_data, scene, predicate);

        let results = match self
            .client
            .process(&self.device_data, &self.raycast, &self.geometry)
        {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "failed to process gaze-to-object mapping");
                return false;
            }
        };

        let cache = &self.cache;
        build_focused_list(
            results,
            self.score_ordering,
            |e| cache.contains(e),
            &mut self.focused,
        );

        if let Some(observer) = self.observer.as_mut() {
            observer.on_focus_updated(&self.focused);
        }
        true
    }

    /// Number of tracked candidates.
    pub fn total_candidates(&self) -> usize {
        self.cache.len()
    }

    pub fn focused(&self) -> &[FocusedCandidate] {
        &self.focused
    }

    pub fn focused_count(&self) -> usize {
        self.focused.len()
    }

    /// Candidate geometry sent to the engine on the last tick.
    pub fn candidates(&self) -> &[CandidateGeometry] {
        self.client.candidates()
    }

    /// Engine results of the last tick.
    pub fn score_results(&self) -> &[ScoreResult] {
        self.client.results()
    }

    /// Device data sent to the engine on the last tick.
    pub fn device_data(&self) -> &DeviceData {
        &self.device_data
    }

    pub fn raycast_result(&self) -> &RaycastResult {
        &self.raycast
    }

    pub fn candidate(&self, entity: EntityId) -> Option<&Candidate> {
        self.cache.get(entity)
    }

    /// Ray budget of the last discovery pass.
    pub fn last_ray_budget(&self) -> usize {
        self.finder.last_budget()
    }

    /// Forget every tracked candidate.
    pub fn clear_candidates(&mut self) {
        self.cache.clear();
    }

    /// Release the scoring engine context.  Idempotent.
    pub fn destroy(&mut self) {
        self.client.destroy();
    }
}

impl std::fmt::Debug for FocusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusEngine")
            .field("tracked", &self.cache.len())
            .field("focused", &self.focused.len())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
