//! In-process simulation doubles for headless runs and tests.
//!
//! - [`SimScene`] – a scene of axis-aligned boxes answering ray casts,
//!   liveness and bounds queries.
//! - [`SimScoringEngine`] – a scoring engine that ranks candidates by the
//!   angle between the gaze and each box centre.  Cheaply cloneable; clones
//!   share state so tests can inject failures and inspect contexts.
//!
//! Neither aims for fidelity with a production engine; they produce
//! plausible, deterministic output for exercising the pipeline.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use gazecast_types::{
    CandidateGeometry, DeviceData, EntityId, GazeRay, LayerMask, Mat4, Ray, RaycastResult,
    ScoreResult, Vec3,
};
use parking_lot::Mutex;

use crate::scene::{EntityBounds, RayHit, SceneQuery};
use crate::scoring::{EngineHandle, ScoringEngine, ScoringError};

// ────────────────────────────────────────────────────────────────────────────
// SimScene
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SimBox {
    centre: Vec3,
    half_extents: Vec3,
    layer: u8,
}

impl SimBox {
    /// Slab test.  Returns the entry distance along `ray` (0 when the
    /// origin is inside).
    fn intersect(&self, ray: &Ray) -> Option<f32> {
        let min = self.centre.sub(self.half_extents);
        let max = self.centre.add(self.half_extents);
        let o = [ray.origin.x, ray.origin.y, ray.origin.z];
        let d = [ray.direction.x, ray.direction.y, ray.direction.z];
        let lo = [min.x, min.y, min.z];
        let hi = [max.x, max.y, max.z];

        let mut t_near = 0.0_f32;
        let mut t_far = f32::INFINITY;
        for axis in 0..3 {
            if d[axis].abs() < 1e-12 {
                if o[axis] < lo[axis] || o[axis] > hi[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d[axis];
            let (t0, t1) = {
                let a = (lo[axis] - o[axis]) * inv;
                let b = (hi[axis] - o[axis]) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }
        Some(t_near * ray.direction.length())
    }
}

/// A scene of axis-aligned boxes.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    boxes: BTreeMap<EntityId, SimBox>,
    next_id: u64,
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a box and return its entity id.  `layer` is 0–31.
    pub fn add_box(&mut self, centre: Vec3, half_extents: Vec3, layer: u8) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.boxes.insert(
            id,
            SimBox {
                centre,
                half_extents,
                layer,
            },
        );
        id
    }

    /// Move a box.  Returns `false` for unknown entities.
    pub fn move_box(&mut self, entity: EntityId, centre: Vec3) -> bool {
        match self.boxes.get_mut(&entity) {
            Some(b) => {
                b.centre = centre;
                true
            }
            None => false,
        }
    }

    /// Destroy a box.  Returns `false` for unknown entities.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        self.boxes.remove(&entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn centre(&self, entity: EntityId) -> Option<Vec3> {
        self.boxes.get(&entity).map(|b| b.centre)
    }
}

impl SceneQuery for SimScene {
    fn raycast(&self, ray: &Ray, mask: LayerMask) -> Option<RayHit> {
        if ray.is_degenerate() {
            return None;
        }
        self.boxes
            .iter()
            .filter(|(_, b)| mask.includes(b.layer))
            .filter_map(|(&entity, b)| b.intersect(ray).map(|distance| RayHit { entity, distance }))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        self.boxes.contains_key(&entity)
    }

    fn bounds(&self, entity: EntityId) -> Option<EntityBounds> {
        self.boxes.get(&entity).map(|b| EntityBounds {
            aabb_min_local: b.half_extents.scale(-1.0),
            aabb_max_local: b.half_extents,
            local_to_world: Mat4::from_translation(b.centre),
            world_to_local: Mat4::from_translation(b.centre.scale(-1.0)),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimScoringEngine
// ────────────────────────────────────────────────────────────────────────────

/// Angular radius of the first search ring, in radians.
const SEARCH_RING_RADIUS: f32 = 0.035;
/// Rays per search ring.
const RAYS_PER_RING: usize = 6;
/// Candidates further than this from the gaze (radians) score zero.
const MAX_SCORING_ANGLE: f32 = 0.25;
/// Added to the score of the entity the combined ray hits directly.
const DIRECT_HIT_BONUS: f32 = 0.2;

#[derive(Debug, Default)]
struct EngineState {
    next_handle: u64,
    contexts: HashSet<u64>,
    destroyed_contexts: usize,
    process_calls: usize,
    fail_process: usize,
    fail_search_pattern: bool,
    fail_create: bool,
}

/// Angle-based scoring engine.
#[derive(Debug, Clone, Default)]
pub struct SimScoringEngine {
    state: Arc<Mutex<EngineState>>,
}

impl SimScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make context creation fail.
    pub fn with_failing_context(self) -> Self {
        self.state.lock().fail_create = true;
        self
    }

    /// Fail the next `n` `process` calls.
    pub fn fail_next_process(&self, n: usize) {
        self.state.lock().fail_process = n;
    }

    pub fn set_search_pattern_failing(&self, failing: bool) {
        self.state.lock().fail_search_pattern = failing;
    }

    pub fn process_calls(&self) -> usize {
        self.state.lock().process_calls
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn destroyed_contexts(&self) -> usize {
        self.state.lock().destroyed_contexts
    }

    fn check_context(&self, context: EngineHandle) -> Result<(), ScoringError> {
        if self.state.lock().contexts.contains(&context.0) {
            Ok(())
        } else {
            Err(ScoringError::NullPointerPassed)
        }
    }
}

/// Angle in radians between two non-zero vectors.
fn angle_between(a: Vec3, b: Vec3) -> f32 {
    let cos = a.normalized().dot(b.normalized()).clamp(-1.0, 1.0);
    cos.acos()
}

impl ScoringEngine for SimScoringEngine {
    fn create_context(&mut self, _capacity_hint: usize) -> Result<EngineHandle, ScoringError> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(ScoringError::Internal);
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.contexts.insert(handle);
        Ok(EngineHandle(handle))
    }

    /// The combined ray, then concentric rings of rays around it.  An
    /// invalid gaze yields an all-degenerate pattern.
    fn search_pattern(
        &mut self,
        context: EngineHandle,
        up: Vec3,
        right: Vec3,
        device: &DeviceData,
        rays: &mut [Ray],
    ) -> Result<(), ScoringError> {
        self.check_context(context)?;
        if self.state.lock().fail_search_pattern {
            return Err(ScoringError::Internal);
        }

        rays.fill(Ray::default());
        let gaze = device.combined;
        if !gaze.is_valid || gaze.direction.length_squared() == 0.0 {
            return Ok(());
        }

        let forward = gaze.direction.normalized();
        for (i, ray) in rays.iter_mut().enumerate() {
            if i == 0 {
                *ray = Ray::new(gaze.origin, forward);
                continue;
            }
            let ring = (i - 1) / RAYS_PER_RING;
            let slot = (i - 1) % RAYS_PER_RING;
            let radius = SEARCH_RING_RADIUS * (ring + 1) as f32;
            // Offset alternate rings by half a step.
            let phase = (slot as f32 + 0.5 * (ring % 2) as f32) / RAYS_PER_RING as f32;
            let theta = phase * std::f32::consts::TAU;
            let offset = right
                .scale(theta.cos())
                .add(up.scale(theta.sin()))
                .scale(radius.tan());
            *ray = Ray::new(gaze.origin, forward.add(offset).normalized());
        }
        Ok(())
    }

    fn process(
        &mut self,
        context: EngineHandle,
        device: &DeviceData,
        raycast: &RaycastResult,
        candidates: &[CandidateGeometry],
        results: &mut [ScoreResult],
    ) -> Result<(), ScoringError> {
        self.check_context(context)?;
        {
            let mut state = self.state.lock();
            state.process_calls += 1;
            if state.fail_process > 0 {
                state.fail_process -= 1;
                return Err(ScoringError::Internal);
            }
        }
        if results.len() != candidates.len() {
            return Err(ScoringError::IndexOutOfBounds);
        }

        let gaze = device.combined;
        for (candidate, result) in candidates.iter().zip(results.iter_mut()) {
            let centre_local = candidate
                .aabb_min_local
                .add(candidate.aabb_max_local)
                .scale(0.5);
            let centre = candidate.local_to_world.transform_point(centre_local);
            let to_centre = centre.sub(gaze.origin);

            let mut score = 0.0;
            if gaze.is_valid && to_centre.length_squared() > 0.0 {
                let angle = angle_between(gaze.direction, to_centre);
                score = (1.0 - angle / MAX_SCORING_ANGLE).max(0.0);
                if raycast.combined.hit_candidate
                    && raycast.combined.entity.is_some()
                    && raycast.combined.entity == candidate.id
                {
                    score = (score + DIRECT_HIT_BONUS).min(1.0);
                }
            }

            let adjusted = GazeRay::new(gaze.origin, to_centre.normalized(), gaze.is_valid);
            *result = ScoreResult {
                id: candidate.id,
                score,
                adjusted_combined: adjusted,
                adjusted_left: adjusted,
                adjusted_right: adjusted,
            };
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(())
    }

    fn destroy_context(&mut self, context: EngineHandle) -> Result<(), ScoringError> {
        let mut state = self.state.lock();
        if !state.contexts.remove(&context.0) {
            return Err(ScoringError::NullPointerPassed);
        }
        state.destroyed_contexts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazecast_types::Raycast;

    fn unit() -> Vec3 {
        Vec3::new(0.5, 0.5, 0.5)
    }

    fn forward_device() -> DeviceData {
        DeviceData {
            timestamp_us: 0,
            combined: GazeRay::new(Vec3::zero(), Vec3::FORWARD, true),
        }
    }

    #[test]
    fn raycast_returns_nearest_box() {
        let mut scene = SimScene::new();
        let far = scene.add_box(Vec3::new(0.0, 0.0, 10.0), unit(), 0);
        let near = scene.add_box(Vec3::new(0.0, 0.0, 3.0), unit(), 0);
        let hit = scene
            .raycast(&Ray::new(Vec3::zero(), Vec3::FORWARD), LayerMask::ALL)
            .unwrap();
        assert_eq!(hit.entity, near);
        assert!((hit.distance - 2.5).abs() < 1e-5);
        assert_ne!(hit.entity, far);
    }

    #[test]
    fn raycast_respects_layer_mask() {
        let mut scene = SimScene::new();
        scene.add_box(Vec3::new(0.0, 0.0, 3.0), unit(), 4);
        let ray = Ray::new(Vec3::zero(), Vec3::FORWARD);
        assert!(scene.raycast(&ray, LayerMask(1)).is_none());
        assert!(scene.raycast(&ray, LayerMask(1 << 4)).is_some());
    }

    #[test]
    fn raycast_misses_behind_and_beside() {
        let mut scene = SimScene::new();
        scene.add_box(Vec3::new(0.0, 0.0, -3.0), unit(), 0);
        scene.add_box(Vec3::new(2.0, 0.0, 3.0), unit(), 0);
        assert!(
            scene
                .raycast(&Ray::new(Vec3::zero(), Vec3::FORWARD), LayerMask::ALL)
                .is_none()
        );
    }

    #[test]
    fn removed_boxes_are_dead() {
        let mut scene = SimScene::new();
        let id = scene.add_box(Vec3::zero(), unit(), 0);
        assert!(scene.is_alive(id));
        assert!(scene.remove(id));
        assert!(!scene.is_alive(id));
        assert!(scene.bounds(id).is_none());
    }

    #[test]
    fn bounds_place_box_in_world() {
        let mut scene = SimScene::new();
        let id = scene.add_box(Vec3::new(1.0, 2.0, 3.0), unit(), 0);
        let geometry = scene.bounds(id).unwrap().into_geometry(id);
        let corners = geometry.world_corners();
        assert!((corners[0].x - 0.5).abs() < 1e-5);
        assert!((corners[6].z - 3.5).abs() < 1e-5);
    }

    #[test]
    fn pattern_starts_with_combined_ray() {
        let mut engine = SimScoringEngine::new();
        let ctx = engine.create_context(4).unwrap();
        let mut rays = [Ray::default(); 15];
        engine
            .search_pattern(ctx, Vec3::UP, Vec3::RIGHT, &forward_device(), &mut rays)
            .unwrap();
        assert_eq!(rays[0].direction, Vec3::FORWARD);
        assert!(rays.iter().all(|r| !r.is_degenerate()));
        assert!(rays[1].direction.z < 1.0);
    }

    #[test]
    fn invalid_gaze_gives_empty_pattern() {
        let mut engine = SimScoringEngine::new();
        let ctx = engine.create_context(4).unwrap();
        let mut device = forward_device();
        device.combined.is_valid = false;
        let mut rays = [Ray::default(); 5];
        engine
            .search_pattern(ctx, Vec3::UP, Vec3::RIGHT, &device, &mut rays)
            .unwrap();
        assert!(rays[0].is_degenerate());
    }

    #[test]
    fn process_ranks_by_angle_and_sorts() {
        let mut scene = SimScene::new();
        let off = scene.add_box(Vec3::new(0.5, 0.0, 4.0), unit(), 0);
        let ahead = scene.add_box(Vec3::new(0.0, 0.0, 4.0), unit(), 0);
        let far_off = scene.add_box(Vec3::new(0.0, 8.0, 4.0), unit(), 0);
        let geometry: Vec<_> = [off, ahead, far_off]
            .iter()
            .map(|&id| scene.bounds(id).unwrap().into_geometry(id))
            .collect();

        let mut engine = SimScoringEngine::new();
        let ctx = engine.create_context(4).unwrap();
        let mut results = vec![ScoreResult::default(); 3];
        let raycast = RaycastResult {
            combined: Raycast {
                hit_candidate: true,
                entity: Some(ahead),
            },
            ..RaycastResult::default()
        };
        engine
            .process(ctx, &forward_device(), &raycast, &geometry, &mut results)
            .unwrap();

        assert_eq!(results[0].id, Some(ahead));
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert_eq!(results[1].id, Some(off));
        assert!(results[1].score > 0.0);
        assert_eq!(results[2].id, Some(far_off));
        assert!(results[2].is_zero());
    }

    #[test]
    fn unknown_context_is_rejected() {
        let mut engine = SimScoringEngine::new();
        let mut rays = [Ray::default(); 3];
        let err = engine
            .search_pattern(EngineHandle(99), Vec3::UP, Vec3::RIGHT, &forward_device(), &mut rays)
            .unwrap_err();
        assert_eq!(err, ScoringError::NullPointerPassed);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut engine = SimScoringEngine::new();
        let ctx = engine.create_context(1).unwrap();
        engine.fail_next_process(1);
        let device = forward_device();
        let raycast = RaycastResult::default();
        assert!(engine.process(ctx, &device, &raycast, &[], &mut []).is_err());
        assert!(engine.process(ctx, &device, &raycast, &[], &mut []).is_ok());
        assert_eq!(engine.process_calls(), 2);
    }
}
