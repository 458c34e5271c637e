//! Configuration vault – reads/writes `~/.gazecast/config.toml`.

use gazecast_runtime::PipelineConfig;
use gazecast_types::LayerMask;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings of the headless simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Frame rate of the simulated host loop.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Frames to run before exiting.
    #[serde(default = "default_ticks")]
    pub ticks: u64,

    /// Peak head yaw of the sweep, in degrees either side of centre.
    #[serde(default = "default_sweep_degrees")]
    pub sweep_degrees: f32,

    /// Rate of the simulated eye tracker.
    #[serde(default = "default_sample_hz")]
    pub sample_hz: u32,
}

fn default_tick_hz() -> u32 {
    90
}
fn default_ticks() -> u64 {
    270
}
fn default_sweep_degrees() -> f32 {
    35.0
}
fn default_sample_hz() -> u32 {
    120
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            ticks: default_ticks(),
            sweep_degrees: default_sweep_degrees(),
            sample_hz: default_sample_hz(),
        }
    }
}

/// Persisted configuration stored in `~/.gazecast/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Return the path to `~/.gazecast/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gazecast").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `GAZECAST_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GAZECAST_RETENTION_SECONDS` | `pipeline.retention_seconds` |
/// | `GAZECAST_LAYER_MASK` | `pipeline.layer_mask` (decimal or `0x` hex) |
/// | `GAZECAST_INTEGRATION_TYPE` | `pipeline.integration_type` |
/// | `GAZECAST_EXPECTED_CANDIDATES` | `pipeline.expected_candidates` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GAZECAST_RETENTION_SECONDS")
        && let Ok(seconds) = v.trim().parse::<f32>()
    {
        cfg.pipeline.retention_seconds = seconds;
    }
    if let Ok(v) = std::env::var("GAZECAST_LAYER_MASK")
        && let Some(mask) = parse_layer_mask(&v)
    {
        cfg.pipeline.layer_mask = mask;
    }
    if let Ok(v) = std::env::var("GAZECAST_INTEGRATION_TYPE")
        && !v.trim().is_empty()
    {
        cfg.pipeline.integration_type = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("GAZECAST_EXPECTED_CANDIDATES")
        && let Ok(n) = v.trim().parse::<usize>()
    {
        cfg.pipeline.expected_candidates = n;
    }
}

fn parse_layer_mask(raw: &str) -> Option<LayerMask> {
    let raw = raw.trim();
    let bits = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => raw.parse::<u32>().ok()?,
    };
    Some(LayerMask(bits))
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // License tokens live in this file; owner-only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_to_gazecast_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".gazecast"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.pipeline.max_rays, 15);
        assert_eq!(loaded.simulation.ticks, 270);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[pipeline]\nretention_seconds = 2.0\nlicenses = [\"abc\"]\n\n[simulation]\nticks = 30\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!((cfg.pipeline.retention_seconds - 2.0).abs() < 1e-5);
        assert_eq!(cfg.pipeline.licenses, vec!["abc".to_string()]);
        assert_eq!(cfg.pipeline.min_rays, 3);
        assert_eq!(cfg.simulation.ticks, 30);
        assert_eq!(cfg.simulation.tick_hz, 90);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipeline\nretention_seconds = ").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn debug_output_redacts_licenses() {
        let mut cfg = Config::default();
        cfg.pipeline.licenses = vec!["very-secret-license".to_string()];
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("very-secret-license"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn layer_mask_accepts_hex_and_decimal() {
        assert_eq!(parse_layer_mask("0x10"), Some(LayerMask(16)));
        assert_eq!(parse_layer_mask(" 5 "), Some(LayerMask(5)));
        assert_eq!(parse_layer_mask("layers"), None);
    }

    // Each override test uses its own variable so parallel tests do not
    // race on the same key.

    #[test]
    fn apply_env_overrides_changes_retention() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("GAZECAST_RETENTION_SECONDS", "0.25") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.pipeline.retention_seconds - 0.25).abs() < 1e-5);
        unsafe { std::env::remove_var("GAZECAST_RETENTION_SECONDS") };
    }

    #[test]
    fn apply_env_overrides_changes_integration_type() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("GAZECAST_INTEGRATION_TYPE", "remote") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.integration_type, "remote");
        unsafe { std::env::remove_var("GAZECAST_INTEGRATION_TYPE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_candidate_count() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("GAZECAST_EXPECTED_CANDIDATES", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.expected_candidates, 10);
        unsafe { std::env::remove_var("GAZECAST_EXPECTED_CANDIDATES") };
    }

    #[test]
    fn apply_env_overrides_changes_layer_mask() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("GAZECAST_LAYER_MASK", "0x3") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.layer_mask, LayerMask(3));
        unsafe { std::env::remove_var("GAZECAST_LAYER_MASK") };
    }
}
