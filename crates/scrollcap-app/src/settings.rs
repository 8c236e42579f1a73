//! Settings resolution for one run.
//!
//! Precedence, lowest first: defaults, config file, `SCROLLCAP_*`
//! environment, command-line flags. The result is always normalised.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use scrollcap_core::{CaptureMode, CaptureSettings, ScrollMethod};
use tracing::{info, warn};

use crate::cli::RunArgs;

const CONFIG_FILE: &str = "config.json";

/// `<config dir>/scrollcap/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "scrollcap").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// An explicit `--config` must exist; the default location is optional.
fn load_file(explicit: Option<&Path>) -> Result<CaptureSettings> {
    if let Some(path) = explicit {
        let settings = CaptureSettings::load(path).with_context(|| format!("loading {}", path.display()))?;
        info!("[Config] Loaded {}", path.display());
        return Ok(settings);
    }
    let Some(path) = default_config_path() else {
        warn!("[Config] No config directory on this platform, using defaults");
        return Ok(CaptureSettings::default());
    };
    if !path.exists() {
        info!("[Config] No config file at {}, using defaults", path.display());
        return Ok(CaptureSettings::default());
    }
    match CaptureSettings::load(&path) {
        Ok(settings) => {
            info!("[Config] Loaded {}", path.display());
            Ok(settings)
        }
        Err(e) => {
            warn!("[Config] Ignoring {}: {}", path.display(), e);
            Ok(CaptureSettings::default())
        }
    }
}

fn parse_env<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[Config] Ignoring {}={:?}", key, raw);
            None
        }
    }
}

/// Apply `SCROLLCAP_*` overrides read through `lookup`.
pub fn apply_env(mut settings: CaptureSettings, lookup: impl Fn(&str) -> Option<String>) -> CaptureSettings {
    if let Some(v) = parse_env(&lookup, "SCROLLCAP_FRAME_INTERVAL") {
        settings.frame_interval = v;
    }
    if let Some(v) = parse_env(&lookup, "SCROLLCAP_INITIAL_DELAY_MS") {
        settings.initial_delay_ms = v;
    }
    if let Some(v) = parse_env(&lookup, "SCROLLCAP_MAX_SCROLLS") {
        settings.max_scrolls = v;
    }
    if let Some(v) = parse_env(&lookup, "SCROLLCAP_TOP_MARGIN") {
        settings.top_margin = v;
    }
    if let Some(v) = parse_env(&lookup, "SCROLLCAP_BOTTOM_MARGIN") {
        settings.bottom_margin = v;
    }
    if let Some(method) = lookup("SCROLLCAP_SCROLL_METHOD") {
        settings.scroll_method = ScrollMethod::from_key(&method);
    }
    if let Some(command) = lookup("SCROLLCAP_SHELL_COMMAND") {
        settings.shell_command = Some(command);
    }
    settings
}

/// Apply command-line flags on top of everything else.
pub fn apply_args(mut settings: CaptureSettings, mode: CaptureMode, args: &RunArgs) -> CaptureSettings {
    settings.mode = mode;
    if let Some(method) = &args.method {
        settings.scroll_method = ScrollMethod::from_key(method);
    }
    if let Some(v) = args.frame_interval {
        settings.frame_interval = v;
    }
    if let Some(v) = args.initial_delay_ms {
        settings.initial_delay_ms = v;
    }
    settings.normalized()
}

pub fn resolve(mode: CaptureMode, args: &RunArgs) -> Result<CaptureSettings> {
    let settings = load_file(args.config.as_deref())?;
    let settings = apply_env(settings, |key| std::env::var(key).ok());
    Ok(apply_args(settings, mode, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_config_values() {
        let settings = apply_env(
            CaptureSettings::default(),
            env(&[
                ("SCROLLCAP_FRAME_INTERVAL", "120"),
                ("SCROLLCAP_SCROLL_METHOD", "shell"),
                ("SCROLLCAP_TOP_MARGIN", " 80 "),
            ]),
        );
        assert_eq!(settings.frame_interval, 120);
        assert_eq!(settings.scroll_method, ScrollMethod::Shell);
        assert_eq!(settings.top_margin, 80);
    }

    #[test]
    fn malformed_env_values_are_ignored() {
        let defaults = CaptureSettings::default();
        let settings = apply_env(defaults.clone(), env(&[("SCROLLCAP_MAX_SCROLLS", "lots")]));
        assert_eq!(settings.max_scrolls, defaults.max_scrolls);
    }

    #[test]
    fn flags_win_and_are_normalised() {
        let base = apply_env(CaptureSettings::default(), env(&[("SCROLLCAP_INITIAL_DELAY_MS", "4000")]));
        let args = RunArgs {
            method: Some("gesture".into()),
            frame_interval: Some(100),
            initial_delay_ms: Some(9_999),
            ..Default::default()
        };
        let settings = apply_args(base, CaptureMode::Manual, &args);
        assert_eq!(settings.mode, CaptureMode::Manual);
        assert_eq!(settings.scroll_method, ScrollMethod::Gesture);
        assert_eq!(settings.frame_interval, 90);
        assert_eq!(settings.initial_delay_ms, 5_000);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = std::env::temp_dir().join("scrollcap-definitely-missing.json");
        assert!(load_file(Some(&path)).is_err());
    }

    #[test]
    fn explicit_config_is_loaded() {
        let path = std::env::temp_dir().join(format!("scrollcap-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"frameInterval": 150, "maxScrolls": 12}"#).unwrap();
        let settings = load_file(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(settings.frame_interval, 150);
        assert_eq!(settings.max_scrolls, 12);
    }
}
