//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChalkError, Result};

/// Top-level Chalk configuration, read from a JSON5 file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vad: Option<VadConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Size of the shared whiteboard and the margin kept free around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: f64,
    #[serde(default = "default_canvas_height")]
    pub height: f64,
    #[serde(default = "default_canvas_margin")]
    pub margin: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
            margin: default_canvas_margin(),
        }
    }
}

fn default_canvas_width() -> f64 {
    1000.0
}

fn default_canvas_height() -> f64 {
    700.0
}

fn default_canvas_margin() -> f64 {
    40.0
}

/// Remote speech service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_realtime_base_url")]
    pub base_url: String,

    #[serde(default = "default_realtime_model")]
    pub model: String,

    #[serde(default = "default_realtime_voice")]
    pub voice: String,

    /// System instructions sent with `session.update`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Endpoint that issues short-lived client secrets. Defaults to
    /// `{base_url}/v1/realtime/sessions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_endpoint: Option<String>,

    /// Window after a local interrupt during which remote events are ignored.
    #[serde(default = "default_interrupt_grace_ms")]
    pub interrupt_grace_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_realtime_base_url(),
            model: default_realtime_model(),
            voice: default_realtime_voice(),
            instructions: None,
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".into()),
            session_endpoint: None,
            interrupt_grace_ms: default_interrupt_grace_ms(),
        }
    }
}

impl RealtimeConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    pub fn session_endpoint(&self) -> String {
        self.session_endpoint.clone().unwrap_or_else(|| {
            format!("{}/v1/realtime/sessions", self.base_url.trim_end_matches('/'))
        })
    }

    /// WebSocket URL of the realtime endpoint for the configured model.
    pub fn websocket_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/v1/realtime?model={}", self.model)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }
}

fn default_realtime_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_realtime_model() -> String {
    "gpt-4o-realtime-preview".into()
}

fn default_realtime_voice() -> String {
    "alloy".into()
}

fn default_interrupt_grace_ms() -> u64 {
    300
}

/// Local voice activity detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    /// RMS threshold above which a frame counts as speech.
    #[serde(default = "default_vad_threshold")]
    pub threshold: f64,
    /// Consecutive silent 20ms frames before speech is considered over.
    #[serde(default = "default_vad_silent_frames")]
    pub min_silent_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: default_vad_threshold(),
            min_silent_frames: default_vad_silent_frames(),
        }
    }
}

fn default_vad_threshold() -> f64 {
    300.0
}

fn default_vad_silent_frames() -> usize {
    15
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "chalk_realtime=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_VAR_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(var = var_name, "Config references unset environment variable");
                String::new()
            })
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config =
            json5::from_str(&substituted).map_err(|e| ChalkError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn canvas(&self) -> CanvasConfig {
        self.canvas.unwrap_or_default()
    }

    pub fn realtime(&self) -> RealtimeConfig {
        self.realtime.clone().unwrap_or_default()
    }

    pub fn vad(&self) -> VadConfig {
        self.vad.unwrap_or_default()
    }

    /// Get a config value by dotted path (e.g. "canvas.width", "realtime.model").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let canvas = self.canvas();
        if canvas.width <= 0.0 || canvas.height <= 0.0 {
            errors.push(format!(
                "Canvas size must be positive, got {}x{}",
                canvas.width, canvas.height
            ));
        }
        if canvas.margin < 0.0 {
            errors.push("Canvas margin cannot be negative".to_string());
        } else if canvas.margin * 2.0 >= canvas.width.min(canvas.height) {
            warnings.push(format!(
                "Canvas margin {} leaves no drawable area; it will be shrunk",
                canvas.margin
            ));
        }

        let realtime = self.realtime();
        if realtime.resolve_api_key().is_none() {
            warnings.push("Realtime service has no API key configured".to_string());
        }
        if realtime.interrupt_grace_ms > 5_000 {
            warnings.push(format!(
                "interrupt_grace_ms of {} will swallow most of the next turn",
                realtime.interrupt_grace_ms
            ));
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Chalk data: `~/.chalk/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chalk")
}
