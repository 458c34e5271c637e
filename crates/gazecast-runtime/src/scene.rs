//! Scene query boundary.
//!
//! The pipeline never owns scene entities.  It casts rays, asks whether an
//! entity still exists, and reads bounding boxes through [`SceneQuery`];
//! whether an entity may receive focus at all is decided by a pluggable
//! [`FocusPredicate`].

use gazecast_types::{CandidateGeometry, EntityId, LayerMask, Mat4, Ray, Vec3};

/// Closest hit of a ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: EntityId,
    pub distance: f32,
}

/// Local-space bounding box of an entity and its current world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityBounds {
    pub aabb_min_local: Vec3,
    pub aabb_max_local: Vec3,
    pub local_to_world: Mat4,
    pub world_to_local: Mat4,
}

impl EntityBounds {
    pub fn into_geometry(self, entity: EntityId) -> CandidateGeometry {
        CandidateGeometry {
            id: Some(entity),
            aabb_min_local: self.aabb_min_local,
            aabb_max_local: self.aabb_max_local,
            world_to_local: self.world_to_local,
            local_to_world: self.local_to_world,
        }
    }
}

/// Read-only access to the host's scene.
pub trait SceneQuery {
    /// Closest entity hit by `ray` on a layer enabled in `mask`, with no
    /// length limit.
    fn raycast(&self, ray: &Ray, mask: LayerMask) -> Option<RayHit>;

    /// `false` once the entity has been destroyed.
    fn is_alive(&self, entity: EntityId) -> bool;

    /// Current bounds of a live entity.
    fn bounds(&self, entity: EntityId) -> Option<EntityBounds>;
}

/// Decides whether a hit entity is eligible for gaze focus.
pub trait FocusPredicate {
    fn is_focusable(&self, entity: EntityId) -> bool;
}

impl<F> FocusPredicate for F
where
    F: Fn(EntityId) -> bool,
{
    fn is_focusable(&self, entity: EntityId) -> bool {
        self(entity)
    }
}

/// Every entity is focusable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFocusable;

impl FocusPredicate for AllFocusable {
    fn is_focusable(&self, _entity: EntityId) -> bool {
        true
    }
}
