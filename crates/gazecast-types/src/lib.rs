//! `gazecast-types` – the shared data model of the gaze-focus pipeline.
//!
//! Everything that crosses a crate boundary lives here: gaze samples in
//! both device and world form, head poses, candidate geometry, scoring
//! results, and the workspace-wide [`GazeError`].

pub mod math;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use math::{Mat4, Ray, Vec3};

/// Scores at or below this value are treated as zero.
pub const SCORE_EPSILON: f32 = 1e-6;

// ────────────────────────────────────────────────────────────────────────────
// Identity and filtering
// ────────────────────────────────────────────────────────────────────────────

/// Stable identifier of a scene entity for as long as that entity lives.
///
/// The pipeline never owns entities; it holds this id and asks the scene
/// whether the entity still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bit mask over 32 scene layers used to filter spatial queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Every layer.
    pub const ALL: Self = Self(u32::MAX);
    /// No layer.
    pub const NONE: Self = Self(0);

    /// `true` when `layer` (0–31) is enabled in this mask.
    pub fn includes(self, layer: u8) -> bool {
        layer < 32 && self.0 & (1u32 << layer) != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gaze data
// ────────────────────────────────────────────────────────────────────────────

/// Origin + direction + validity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GazeRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub is_valid: bool,
}

impl GazeRay {
    pub fn new(origin: Vec3, direction: Vec3, is_valid: bool) -> Self {
        Self {
            origin,
            direction,
            is_valid,
        }
    }

    pub fn ray(&self) -> Ray {
        Ray::new(self.origin, self.direction)
    }
}

/// Per-eye data as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawEyeData {
    /// Gaze origin in device space (millimetres).
    pub gaze_origin_mm: Vec3,
    pub gaze_direction: Vec3,
    pub gaze_direction_valid: bool,
    /// Eye openness signal; `0.0` means closed.
    pub eye_openness: f32,
    pub eye_openness_valid: bool,
}

/// One sample as delivered by the device transport.
///
/// Positions are head-relative in millimetres, in the device's mirrored-X
/// coordinate convention.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawGazeSample {
    /// Device timestamp in microseconds.
    pub timestamp_us: u64,
    pub combined_origin_mm: Vec3,
    pub combined_origin_valid: bool,
    pub combined_direction: Vec3,
    pub combined_direction_valid: bool,
    pub left: RawEyeData,
    pub right: RawEyeData,
    pub convergence_distance_mm: f32,
    pub convergence_distance_valid: bool,
}

/// A world-space gaze sample, produced once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GazeSample {
    /// Host time, in microseconds, of the tick that produced this sample.
    pub timestamp_us: u64,
    pub gaze_ray: GazeRay,
    pub is_left_eye_blinking: bool,
    pub is_right_eye_blinking: bool,
    /// Convergence distance in metres.
    pub convergence_distance: f32,
    pub convergence_distance_is_valid: bool,
}

/// A head pose recorded at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPoseSample {
    pub timestamp_us: u64,
    /// Head-local to world transform.
    pub pose: Mat4,
}

// ────────────────────────────────────────────────────────────────────────────
// Scoring engine data
// ────────────────────────────────────────────────────────────────────────────

/// What the scoring engine receives about the user's gaze each tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceData {
    /// Must never decrease between calls.
    pub timestamp_us: u64,
    pub combined: GazeRay,
}

impl DeviceData {
    pub fn from_sample(now_us: u64, sample: &GazeSample) -> Self {
        Self {
            timestamp_us: now_us,
            combined: sample.gaze_ray,
        }
    }
}

/// The outcome of one direct ray cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Raycast {
    /// `true` when the ray hit an entity accepted by the focusability
    /// predicate.
    pub hit_candidate: bool,
    /// Entity the ray hit, focusable or not.
    pub entity: Option<EntityId>,
}

/// Direct hit-test results handed to the scoring engine alongside the
/// candidate geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RaycastResult {
    pub combined: Raycast,
    pub left: Raycast,
    pub right: Raycast,
}

/// Bounding-box geometry of one candidate, rebuilt every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateGeometry {
    pub id: Option<EntityId>,
    pub aabb_min_local: Vec3,
    pub aabb_max_local: Vec3,
    pub world_to_local: Mat4,
    pub local_to_world: Mat4,
}

impl CandidateGeometry {
    /// The eight box corners in world space, ordered front-lower-left,
    /// front-upper-left, front-upper-right, front-lower-right, then the same
    /// four on the back face.
    pub fn world_corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.aabb_min_local, self.aabb_max_local);
        let local = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
        ];
        local.map(|p| self.local_to_world.transform_point(p))
    }
}

/// Per-candidate output of the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreResult {
    pub id: Option<EntityId>,
    /// Score in `[0, 1]`.
    pub score: f32,
    pub adjusted_combined: GazeRay,
    pub adjusted_left: GazeRay,
    pub adjusted_right: GazeRay,
}

impl ScoreResult {
    /// `true` for scores within [`SCORE_EPSILON`] of zero, and for NaN.
    pub fn is_zero(&self) -> bool {
        self.score.is_nan() || self.score <= SCORE_EPSILON
    }
}

/// An entity the user is currently looking at.
///
/// Rebuilt every tick; do not hold on to it across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusedCandidate {
    pub entity: EntityId,
    pub is_ray_valid: bool,
    pub origin: Vec3,
    pub direction: Vec3,
}

// ────────────────────────────────────────────────────────────────────────────
// Connection state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type covering device connectivity, native resource
/// management, scoring-engine protocol failures, and configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GazeError {
    #[error("No eye tracking devices found")]
    NoDeviceFound,

    #[error("No device of integration type '{integration_type}' found")]
    NoMatchingDevice { integration_type: String },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Device is not connected")]
    NotConnected,

    #[error("A connection is already open")]
    AlreadyOpen,

    #[error("Failed to create context: {0}")]
    ContextCreation(String),

    #[error("Failed to enumerate devices: {0}")]
    Enumeration(String),

    #[error("Failed to create device for {url}: {details}")]
    DeviceCreation { url: String, details: String },

    #[error("Failed to read device info: {0}")]
    DeviceInfo(String),

    #[error("Failed to subscribe to samples: {0}")]
    Subscription(String),

    #[error("History capacity is {capacity} frames, but frame {requested} was requested")]
    OutOfHistoryRange { requested: usize, capacity: usize },

    #[error("Search pattern request failed: {0}")]
    SearchPattern(String),

    #[error("Scoring engine error: {0}")]
    ScoringEngine(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
