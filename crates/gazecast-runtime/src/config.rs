//! [`PipelineConfig`] – every tunable of the gaze focus pipeline.
//!
//! All fields have defaults, so a partial TOML table (or none at all)
//! deserializes to a working configuration.  Call
//! [`PipelineConfig::validate`] before building a pipeline from
//! user-supplied values.

use std::time::Duration;

use gazecast_hal::ConnectionConfig;
use gazecast_perception::{GazeSourceConfig, PoseLookup};
use gazecast_types::{GazeError, LayerMask};
use serde::{Deserialize, Serialize};

use crate::focus::{FocusConfig, ScoreOrdering};
use crate::object_finder::ObjectFinderConfig;

/// Head-pose lookup policy, as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseLookupMode {
    #[default]
    FrameOffset,
    NearestTimestamp,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pre-sizing hint for the candidate cache, scoring buffers and engine
    /// context.
    #[serde(default = "default_expected_candidates")]
    pub expected_candidates: usize,

    /// Seconds a candidate may go undiscovered before it is evicted.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: f32,

    #[serde(default)]
    pub layer_mask: LayerMask,

    #[serde(default = "default_rays_per_second")]
    pub rays_per_second: f32,

    #[serde(default = "default_min_rays")]
    pub min_rays: usize,

    #[serde(default = "default_max_rays")]
    pub max_rays: usize,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Ticks of head-pose delay applied under `frame_offset` lookup.
    #[serde(default = "default_pose_offset_frames")]
    pub pose_offset_frames: usize,

    /// Estimated pipeline latency added to recorded head-pose timestamps.
    #[serde(default = "default_pose_latency_ms")]
    pub pose_latency_ms: u64,

    #[serde(default)]
    pub pose_lookup: PoseLookupMode,

    /// Required device integration type, compared case-insensitively.
    #[serde(default = "default_integration_type")]
    pub integration_type: String,

    /// License tokens passed to the driver.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default)]
    pub score_ordering: ScoreOrdering,
}

fn default_expected_candidates() -> usize {
    10
}
fn default_retention_seconds() -> f32 {
    1.0
}
fn default_rays_per_second() -> f32 {
    900.0
}
fn default_min_rays() -> usize {
    3
}
fn default_max_rays() -> usize {
    15
}
fn default_history_capacity() -> usize {
    5
}
fn default_pose_offset_frames() -> usize {
    4
}
fn default_pose_latency_ms() -> u64 {
    33
}
fn default_integration_type() -> String {
    "wearable".to_string()
}
fn default_reconnect_interval_ms() -> u64 {
    500
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expected_candidates: default_expected_candidates(),
            retention_seconds: default_retention_seconds(),
            layer_mask: LayerMask::ALL,
            rays_per_second: default_rays_per_second(),
            min_rays: default_min_rays(),
            max_rays: default_max_rays(),
            history_capacity: default_history_capacity(),
            pose_offset_frames: default_pose_offset_frames(),
            pose_latency_ms: default_pose_latency_ms(),
            pose_lookup: PoseLookupMode::default(),
            integration_type: default_integration_type(),
            licenses: Vec::new(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            score_ordering: ScoreOrdering::default(),
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("expected_candidates", &self.expected_candidates)
            .field("retention_seconds", &self.retention_seconds)
            .field("layer_mask", &format_args!("{:#010x}", self.layer_mask.0))
            .field("rays_per_second", &self.rays_per_second)
            .field("min_rays", &self.min_rays)
            .field("max_rays", &self.max_rays)
            .field("history_capacity", &self.history_capacity)
            .field("pose_offset_frames", &self.pose_offset_frames)
            .field("pose_latency_ms", &self.pose_latency_ms)
            .field("pose_lookup", &self.pose_lookup)
            .field("integration_type", &self.integration_type)
            .field(
                "licenses",
                if self.licenses.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("reconnect_interval_ms", &self.reconnect_interval_ms)
            .field("score_ordering", &self.score_ordering)
            .finish()
    }
}

impl PipelineConfig {
    /// # Errors
    ///
    /// [`GazeError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), GazeError> {
        let invalid = |msg: String| Err(GazeError::InvalidConfig(msg));

        if self.min_rays == 0 {
            return invalid("min_rays must be at least 1".to_string());
        }
        if self.min_rays > self.max_rays {
            return invalid(format!(
                "min_rays ({}) exceeds max_rays ({})",
                self.min_rays, self.max_rays
            ));
        }
        if !(self.retention_seconds > 0.0 && self.retention_seconds.is_finite()) {
            return invalid(format!(
                "retention_seconds must be positive, got {}",
                self.retention_seconds
            ));
        }
        if !(self.rays_per_second > 0.0 && self.rays_per_second.is_finite()) {
            return invalid(format!(
                "rays_per_second must be positive, got {}",
                self.rays_per_second
            ));
        }
        if self.history_capacity == 0 {
            return invalid("history_capacity must be at least 1".to_string());
        }
        if self.pose_offset_frames >= self.history_capacity {
            return invalid(format!(
                "pose_offset_frames ({}) must be below history_capacity ({})",
                self.pose_offset_frames, self.history_capacity
            ));
        }
        if self.integration_type.trim().is_empty() {
            return invalid("integration_type must not be empty".to_string());
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::try_from_secs_f32(self.retention_seconds).unwrap_or_default()
    }

    pub fn focus_config(&self) -> FocusConfig {
        FocusConfig {
            expected_candidates: self.expected_candidates,
            retention: self.retention(),
            finder: ObjectFinderConfig {
                layer_mask: self.layer_mask,
                rays_per_second: self.rays_per_second,
                min_rays: self.min_rays,
                max_rays: self.max_rays,
            },
            score_ordering: self.score_ordering,
        }
    }

    pub fn gaze_source_config(&self) -> GazeSourceConfig {
        GazeSourceConfig {
            history_capacity: self.history_capacity,
            pose_lookup: match self.pose_lookup {
                PoseLookupMode::FrameOffset => PoseLookup::FrameOffset(self.pose_offset_frames),
                PoseLookupMode::NearestTimestamp => PoseLookup::NearestTimestamp,
            },
            pose_latency_us: self.pose_latency_ms.saturating_mul(1_000),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            integration_type: self.integration_type.clone(),
            licenses: self.licenses.clone(),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
        }
    }
}
