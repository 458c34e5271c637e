//! `gazecast` – headless gaze-to-object focus simulator.
//!
//! Runs the full [`GazeFocusPipeline`] against simulated hardware:
//!
//! 1. Loads `~/.gazecast/config.toml` (writing defaults on first run) and
//!    applies `GAZECAST_*` environment overrides.
//! 2. Builds a ring of boxes in front of a simulated head.
//! 3. Feeds eye-tracker samples from a transport thread while the head sweeps
//!    left and right at the configured frame rate.
//! 4. Drops the transport for a moment halfway through so the reconnect path
//!    runs.
//! 5. Prints every focus change (or one JSON line per change with `--json`)
//!    until the tick count is reached or Ctrl-C is pressed.

mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use gazecast_hal::SimDriver;
use gazecast_perception::transform::{Quaternion, RigidTransform};
use gazecast_runtime::sim::{SimScene, SimScoringEngine};
use gazecast_runtime::telemetry::init_tracing;
use gazecast_runtime::{AllFocusable, GazeFocusPipeline};
use gazecast_types::{ConnectionState, EntityId, GazeError, Mat4, RawEyeData, RawGazeSample, Vec3};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;

const DEVICE_URL: &str = "tobii-prp://sim-headset";
const EYE_HEIGHT_M: f32 = 1.6;
const RING_RADIUS_M: f32 = 3.0;
const DROPOUT: Duration = Duration::from_millis(600);

// ────────────────────────────────────────────────────────────────────────────
// Command line
// ────────────────────────────────────────────────────────────────────────────

/// Headless gaze-to-object focus simulator.
#[derive(Parser, Debug)]
#[command(name = "gazecast", version, long_about = None)]
struct Args {
    /// Frames to simulate (default from config)
    #[arg(long)]
    ticks: Option<u64>,

    /// Print focus changes as JSON lines
    #[arg(long)]
    json: bool,

    /// Config file (default ~/.gazecast/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct FocusEvent<'a> {
    tick: u64,
    elapsed_ms: u128,
    connection_state: ConnectionState,
    focused: Vec<&'a str>,
    candidates: usize,
}

#[derive(Debug)]
struct RunSummary {
    ticks: u64,
    focus_changes: u64,
    samples: u64,
    reconnect_attempts: usize,
    interrupted: bool,
}

fn main() -> ExitCode {
    let _otel_guard = init_tracing("gazecast");

    let args = Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────
    let path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let cfg = Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => info!(path = %path.display(), "wrote default configuration"),
                Err(e) => warn!("Could not write default configuration: {}", e),
            }
            cfg
        }
        Err(e) => {
            eprintln!("{} {} – using defaults", "warning:".yellow().bold(), e);
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    let ticks = args.ticks.unwrap_or(cfg.simulation.ticks);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\n{}", "Interrupted – shutting down gracefully…".yellow());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    if !args.json {
        print_banner(&cfg, ticks);
    }

    match run(&cfg, ticks, args.json, &shutdown) {
        Ok(summary) => {
            if !args.json {
                print_summary(&summary);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn print_banner(cfg: &Config, ticks: u64) {
    println!("{}", "gazecast – gaze focus simulator".bold().cyan());
    println!(
        "  {} ticks at {} Hz, head sweep ±{}°, retention {} s",
        ticks, cfg.simulation.tick_hz, cfg.simulation.sweep_degrees, cfg.pipeline.retention_seconds
    );
    println!();
}

fn print_summary(summary: &RunSummary) {
    println!();
    let status = if summary.interrupted {
        "interrupted".yellow()
    } else {
        "done".green()
    };
    println!(
        "{} {} ticks, {} focus changes, {} device samples, {} reconnect attempts",
        status.bold(),
        summary.ticks,
        summary.focus_changes,
        summary.samples,
        summary.reconnect_attempts
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Simulation
// ────────────────────────────────────────────────────────────────────────────

/// Five boxes on a ring around the head, one every 15° of yaw, plus one
/// box on layer 31 that is only discoverable when the mask includes it.
fn build_scene() -> (SimScene, BTreeMap<EntityId, &'static str>) {
    let mut scene = SimScene::new();
    let mut labels = BTreeMap::new();
    let placements: [(&str, f32, u8); 6] = [
        ("far-left", -30.0, 0),
        ("left", -15.0, 0),
        ("centre", 0.0, 0),
        ("right", 15.0, 0),
        ("far-right", 30.0, 0),
        ("hidden", 7.5, 31),
    ];
    for (label, yaw_deg, layer) in placements {
        let yaw = yaw_deg.to_radians();
        let centre = Vec3::new(
            RING_RADIUS_M * yaw.sin(),
            EYE_HEIGHT_M,
            RING_RADIUS_M * yaw.cos(),
        );
        let id = scene.add_box(centre, Vec3::new(0.2, 0.2, 0.2), layer);
        labels.insert(id, label);
    }
    (scene, labels)
}

/// A straight-ahead gaze with a small deterministic saccade wobble.
fn synth_sample(timestamp_us: u64) -> RawGazeSample {
    let t = timestamp_us as f32 / 1_000_000.0;
    let direction = Vec3::new(0.03 * (t * 7.0).sin(), 0.02 * (t * 5.0).cos(), 1.0).normalized();
    let eye = |x_mm: f32| RawEyeData {
        gaze_origin_mm: Vec3::new(x_mm, 0.0, 0.0),
        gaze_direction: direction,
        gaze_direction_valid: true,
        eye_openness: 1.0,
        eye_openness_valid: true,
    };
    RawGazeSample {
        timestamp_us,
        combined_origin_mm: Vec3::zero(),
        combined_origin_valid: true,
        combined_direction: direction,
        combined_direction_valid: true,
        left: eye(32.0),
        right: eye(-32.0),
        convergence_distance_mm: 0.0,
        convergence_distance_valid: false,
    }
}

/// Pushes samples through the driver the way a device transport thread does.
fn spawn_transport(
    driver: SimDriver,
    sample_hz: u32,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let period = Duration::from_secs_f64(1.0 / f64::from(sample_hz.max(1)));
        let started = Instant::now();
        let mut delivered = 0u64;
        while !stop.load(Ordering::SeqCst) {
            let timestamp_us = started.elapsed().as_micros() as u64;
            driver.deliver_now(synth_sample(timestamp_us));
            delivered += 1;
            thread::sleep(period);
        }
        delivered
    })
}

fn head_pose(elapsed: Duration, sweep_degrees: f32) -> Mat4 {
    // One full left-right sweep every three seconds.
    let phase = elapsed.as_secs_f32() * std::f32::consts::TAU / 3.0;
    let yaw = sweep_degrees.to_radians() * phase.sin();
    RigidTransform::new(
        Vec3::new(0.0, EYE_HEIGHT_M, 0.0),
        Quaternion::from_yaw_pitch(yaw, 0.0),
    )
    .to_matrix()
}

fn run(
    cfg: &Config,
    ticks: u64,
    json: bool,
    shutdown: &AtomicBool,
) -> Result<RunSummary, GazeError> {
    let (scene, labels) = build_scene();
    // A remote tracker listed first so the integration-type filter is
    // exercised on every run.
    let driver = SimDriver::new()
        .with_device("tobii-prp://sim-desk", "remote")
        .with_device(DEVICE_URL, "wearable");

    let mut pipeline = GazeFocusPipeline::new(
        &cfg.pipeline,
        Box::new(driver.clone()),
        Box::new(SimScoringEngine::new()),
        Box::new(AllFocusable),
    )?;

    let stop_transport = Arc::new(AtomicBool::new(false));
    let transport = spawn_transport(
        driver.clone(),
        cfg.simulation.sample_hz,
        Arc::clone(&stop_transport),
    );

    let frame = Duration::from_secs_f64(1.0 / f64::from(cfg.simulation.tick_hz.max(1)));
    let dropout_tick = ticks / 2;
    let started = Instant::now();
    let mut dropout_until: Option<Instant> = None;
    let mut last_focus: Option<Vec<EntityId>> = None;
    let mut last_state = ConnectionState::Disconnected;
    let mut summary = RunSummary {
        ticks: 0,
        focus_changes: 0,
        samples: 0,
        reconnect_attempts: 0,
        interrupted: false,
    };

    for tick in 0..ticks {
        if shutdown.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }

        let now = Instant::now();
        // ── Transport dropout ─────────────────────────────────────────────
        if tick == dropout_tick && ticks > 1 {
            driver.set_transport_down(true);
            dropout_until = Some(now + DROPOUT);
        }
        if let Some(until) = dropout_until
            && now >= until
        {
            driver.set_transport_down(false);
            dropout_until = None;
        }

        let pose = head_pose(now - started, cfg.simulation.sweep_degrees);
        let report = pipeline.tick(now, pose, &scene);
        summary.ticks += 1;
        if report.device_sample_available {
            summary.samples += 1;
        }

        if report.connection_state != last_state {
            if !json {
                let state = format!("{:?}", report.connection_state);
                let label = match report.connection_state {
                    ConnectionState::Connected => state.as_str().green(),
                    ConnectionState::Reconnecting => state.as_str().yellow(),
                    ConnectionState::Disconnected => state.as_str().red(),
                };
                println!("{:>6}  device {}", tick, label.bold());
            }
            last_state = report.connection_state;
        }

        let focused: Vec<EntityId> = pipeline.focused().iter().map(|f| f.entity).collect();
        if last_focus.as_ref() != Some(&focused) {
            summary.focus_changes += 1;
            let names: Vec<&str> = focused
                .iter()
                .map(|id| labels.get(id).copied().unwrap_or("?"))
                .collect();
            if json {
                let event = FocusEvent {
                    tick,
                    elapsed_ms: (now - started).as_millis(),
                    connection_state: report.connection_state,
                    focused: names,
                    candidates: pipeline.total_candidates(),
                };
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("Failed to serialize focus event: {}", e),
                }
            } else if names.is_empty() {
                println!("{:>6}  focus {}", tick, "(nothing)".dimmed());
            } else {
                println!(
                    "{:>6}  focus {}  ({} candidates)",
                    tick,
                    names.join(" > ").as_str().bold().cyan(),
                    pipeline.total_candidates()
                );
            }
            last_focus = Some(focused);
        }

        if let Some(remaining) = frame.checked_sub(now.elapsed()) {
            thread::sleep(remaining);
        }
    }

    stop_transport.store(true, Ordering::SeqCst);
    if transport.join().is_err() {
        warn!("Transport thread panicked");
    }
    summary.reconnect_attempts = driver.reconnect_attempts();
    pipeline.destroy();
    info!(
        ticks = summary.ticks,
        focus_changes = summary.focus_changes,
        "simulation finished"
    );
    Ok(summary)
}
