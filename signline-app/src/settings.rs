//! Persistent application settings (JSON file in the app data directory).
//!
//! Unset optional fields fall back to the preset of the selected policy.
//! Environment variables override the file; CLI flags override both.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use signline_core::{DecisionPolicy, EngineConfig, StabilizerConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// `windowed` or `per-frame`.
    pub policy: String,
    pub window_size: usize,
    /// `None` uses the policy preset (0.45 windowed, 0.60 per-frame).
    pub confidence_threshold: Option<f32>,
    pub majority_ratio: f32,
    pub cooldown_secs: f64,
    /// `None` uses the preset; `Some(0)` disables the limit.
    pub display_limit: Option<usize>,
    /// `None` uses the preset; `Some(0)` keeps every word.
    pub sentence_capacity: Option<usize>,
    pub frame_interval_ms: u64,
    pub feature_len: usize,
    pub model_path: Option<PathBuf>,
    pub session_idle_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            policy: "windowed".into(),
            window_size: 20,
            confidence_threshold: None,
            majority_ratio: 0.50,
            cooldown_secs: 2.0,
            display_limit: None,
            sentence_capacity: None,
            frame_interval_ms: 5,
            feature_len: signline_core::classifier::FEATURES_PER_HAND,
            model_path: None,
            session_idle_secs: 900,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.policy = normalize_policy(&self.policy).as_str().into();
        self.window_size = self.window_size.clamp(1, 600);
        self.confidence_threshold = self
            .confidence_threshold
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(0.0, 1.0));
        self.majority_ratio = if self.majority_ratio.is_finite() {
            self.majority_ratio.clamp(0.0, 1.0)
        } else {
            0.50
        };
        self.cooldown_secs = if self.cooldown_secs.is_finite() {
            self.cooldown_secs.clamp(0.0, 60.0)
        } else {
            2.0
        };
        self.frame_interval_ms = self.frame_interval_ms.min(1_000);
        self.feature_len = self.feature_len.max(1);
        self.session_idle_secs = self.session_idle_secs.clamp(1, 86_400);
        self.model_path = self
            .model_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }

    /// Apply `SIGNLINE_*` environment overrides, then re-normalize.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(policy) = std::env::var("SIGNLINE_POLICY") {
            self.policy = policy;
        }
        if let Some(t) = env_parse::<f32>("SIGNLINE_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = Some(t);
        }
        if let Some(c) = env_parse::<f64>("SIGNLINE_COOLDOWN_SECS") {
            self.cooldown_secs = c;
        }
        if let Some(n) = env_parse::<usize>("SIGNLINE_WINDOW_SIZE") {
            self.window_size = n;
        }
        if let Ok(path) = std::env::var("SIGNLINE_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(path));
        }
        self.normalize();
    }

    pub fn decision_policy(&self) -> DecisionPolicy {
        normalize_policy(&self.policy)
    }

    pub fn stabilizer_config(&self) -> StabilizerConfig {
        let preset = StabilizerConfig::for_policy(self.decision_policy());
        StabilizerConfig {
            window_size: self.window_size,
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(preset.confidence_threshold),
            majority_ratio: self.majority_ratio,
            cooldown: Duration::from_secs_f64(self.cooldown_secs),
            display_limit: resolve_limit(self.display_limit, preset.display_limit),
            sentence_capacity: resolve_limit(self.sentence_capacity, preset.sentence_capacity),
            ..preset
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            stabilizer: self.stabilizer_config(),
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            feature_len: self.feature_len,
        }
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

pub fn normalize_policy(raw: &str) -> DecisionPolicy {
    DecisionPolicy::parse(raw).unwrap_or(DecisionPolicy::Windowed)
}

fn resolve_limit(raw: Option<usize>, preset: Option<usize>) -> Option<usize> {
    match raw {
        None => preset,
        Some(0) => None,
        Some(n) => Some(n),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Signline")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("signline")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
