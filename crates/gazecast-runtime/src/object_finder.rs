//! [`ObjectFinder`] – rate-limited discovery of focusable entities.
//!
//! Each tick the scoring engine supplies an ordered pattern of discovery
//! rays around the user's gaze.  The finder casts as many of them as this
//! tick's budget allows:
//!
//! ```text
//! rays = clamp(ceil(rays_per_second × dt), min_rays, max_rays)
//! ```
//!
//! A long frame buys more catch-up rays, a short one still casts at least
//! `min_rays`.  Separately, one direct ray along the combined gaze gives the
//! scoring engine a same-tick hit test that does not depend on the cache.

use gazecast_types::{DeviceData, EntityId, GazeError, LayerMask, Ray, Raycast, RaycastResult};
use tracing::error;

use crate::scene::{FocusPredicate, SceneQuery};
use crate::scoring::ScoringEngineClient;

/// Discovery ray budget for a tick that is `dt_us` microseconds after the
/// previous one.  Never below `min_rays`.
pub fn ray_budget(dt_us: u64, rays_per_second: f32, min_rays: usize, max_rays: usize) -> usize {
    let wanted = (f64::from(rays_per_second) * dt_us as f64 / 1_000_000.0).ceil();
    // Float-to-int `as` saturates, and maps NaN to zero.
    (wanted as usize).min(max_rays).max(min_rays)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectFinderConfig {
    pub layer_mask: LayerMask,
    pub rays_per_second: f32,
    pub min_rays: usize,
    pub max_rays: usize,
}

impl Default for ObjectFinderConfig {
    fn default() -> Self {
        Self {
            layer_mask: LayerMask::ALL,
            rays_per_second: 900.0,
            min_rays: 3,
            max_rays: 15,
        }
    }
}

#[derive(Debug)]
pub struct ObjectFinder {
    config: ObjectFinderConfig,
    rays: Vec<Ray>,
    found: Vec<EntityId>,
    previous_timestamp_us: Option<u64>,
    last_budget: usize,
}

impl ObjectFinder {
    pub fn new(config: ObjectFinderConfig) -> Self {
        let pattern_len = config.max_rays.max(config.min_rays);
        Self {
            config,
            rays: vec![Ray::default(); pattern_len],
            found: Vec::with_capacity(pattern_len),
            previous_timestamp_us: None,
            last_budget: 0,
        }
    }

    pub fn config(&self) -> &ObjectFinderConfig {
        &self.config
    }

    /// Ray budget used by the last successful discovery.
    pub fn last_budget(&self) -> usize {
        self.last_budget
    }

    /// Cast this tick's discovery rays and return the distinct focusable
    /// entities they hit, in hit order.
    ///
    /// # Errors
    ///
    /// [`GazeError::SearchPattern`] when the engine cannot supply a pattern.
    /// Nothing is cast and the previous tick time is kept, so the next
    /// tick's budget covers the skipped interval.
    pub fn find_candidates(
        &mut self,
        device: &DeviceData,
        client: &mut ScoringEngineClient,
        scene: &dyn SceneQuery,
        predicate: &dyn FocusPredicate,
    ) -> Result<&[EntityId], GazeError> {
        if let Err(e) = client.search_pattern(device, &mut self.rays) {
            error!(error = %e, "failed to get candidate search pattern");
            return Err(e);
        }

        let dt_us = self
            .previous_timestamp_us
            .map_or(0, |prev| device.timestamp_us.saturating_sub(prev));
        self.previous_timestamp_us = Some(device.timestamp_us);

        let budget = ray_budget(
            dt_us,
            self.config.rays_per_second,
            self.config.min_rays,
            self.config.max_rays,
        )
        .min(self.rays.len());
        self.last_budget = budget;

        self.found.clear();
        for ray in &self.rays[..budget] {
            if ray.is_degenerate() {
                break;
            }
            let Some(hit) = scene.raycast(ray, self.config.layer_mask) else {
                continue;
            };
            if self.found.contains(&hit.entity) || !predicate.is_focusable(hit.entity) {
                continue;
            }
            self.found.push(hit.entity);
        }
        Ok(&self.found)
    }

    /// Hit-test the combined gaze ray directly.  Per-eye results are left
    /// empty.
    pub fn direct_hit(
        &self,
        device: &DeviceData,
        scene: &dyn SceneQuery,
        predicate: &dyn FocusPredicate,
    ) -> RaycastResult {
        let mut result = RaycastResult::default();
        if !device.combined.is_valid {
            return result;
        }
        if let Some(hit) = scene.raycast(&device.combined.ray(), self.config.layer_mask) {
            result.combined = Raycast {
                hit_candidate: predicate.is_focusable(hit.entity),
                entity: Some(hit.entity),
            };
        }
        result
    }
}
