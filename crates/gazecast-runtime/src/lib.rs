//! `gazecast-runtime` – gaze-to-object focus engine and per-frame pipeline.
//!
//! # Modules
//!
//! - [`pipeline`] – [`GazeFocusPipeline`][pipeline::GazeFocusPipeline]: the
//!   per-frame orchestrator wiring the device, the head-pose reprojection
//!   and the focus engine into one `tick`.
//! - [`focus`] – [`FocusEngine`][focus::FocusEngine]: discovery, candidate
//!   bookkeeping, scoring and the focus list for one tick.
//! - [`candidate_cache`] – [`CandidateCache`][candidate_cache::CandidateCache]:
//!   time-windowed set of discovered entities.
//! - [`object_finder`] – [`ObjectFinder`][object_finder::ObjectFinder]:
//!   rate-limited discovery rays plus the direct gaze hit test.
//! - [`scoring`] – the [`ScoringEngine`][scoring::ScoringEngine] boundary and
//!   [`ScoringEngineClient`][scoring::ScoringEngineClient], which owns the
//!   engine context and its grow-only buffers.
//! - [`scene`] – [`SceneQuery`][scene::SceneQuery] and
//!   [`FocusPredicate`][scene::FocusPredicate], the host scene boundary.
//! - [`tracker`] – [`GazeTracker`][tracker::GazeTracker]: device connection
//!   plus world-space sample source.
//! - [`config`] – [`PipelineConfig`][config::PipelineConfig].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].
//! - [`sim`] – [`SimScene`][sim::SimScene] and
//!   [`SimScoringEngine`][sim::SimScoringEngine] for headless runs.

pub mod candidate_cache;
pub mod config;
pub mod focus;
pub mod object_finder;
pub mod pipeline;
pub mod scene;
pub mod scoring;
pub mod sim;
pub mod telemetry;
pub mod tracker;

pub use config::PipelineConfig;
pub use focus::{FocusObserver, ScoreOrdering};
pub use pipeline::{GazeFocusPipeline, TickReport};
pub use scene::{AllFocusable, FocusPredicate, SceneQuery};
pub use scoring::{ScoringEngine, ScoringError};
