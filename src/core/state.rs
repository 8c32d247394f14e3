use crate::error::CoachError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

pub const COACH_DIR: &str = ".dislike-coach";
pub const CONFIG_FILE: &str = "config.toml";

/// What the retry policy does once both attempts produced unparseable output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TerminalBehavior {
    /// Answer with the fixed degraded result.
    #[default]
    Degraded,
    /// Surface the extraction failure to the caller.
    Fatal,
}

/// Per-deployment product policy. One value of each per deployment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CoachPolicy {
    pub terminal: TerminalBehavior,
    /// Single-best-prompt mode: alternatives are always returned empty.
    pub force_empty_alternatives: bool,
    pub default_confidence: f64,
    pub summary_fallback: String,
}

impl Default for CoachPolicy {
    fn default() -> Self {
        Self {
            terminal: TerminalBehavior::Degraded,
            force_empty_alternatives: false,
            default_confidence: 0.5,
            summary_fallback: "Unknown user goal.".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CoachConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Number of trailing messages kept as model context.
    pub window_size: usize,
    pub timeout_secs: u64,
    pub policy: CoachPolicy,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.4,
            max_output_tokens: 1024,
            window_size: 4,
            timeout_secs: 30,
            policy: CoachPolicy::default(),
        }
    }
}

impl CoachConfig {
    /// Load from a TOML file; a missing file yields defaults. `GEMINI_MODEL`
    /// overrides the configured model.
    pub fn load(path: &Path) -> Result<Self, CoachError> {
        let config = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| {
                CoachError::Configuration(format!("cannot read {}: {}", path.display(), e))
            })?;
            Self::from_toml_str(&raw)?
        } else {
            Self::default()
        };

        config
            .with_model_override(env::var("GEMINI_MODEL").ok())
            .validated()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CoachError> {
        toml::from_str(raw).map_err(|e| CoachError::Configuration(format!("invalid config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String, CoachError> {
        toml::to_string_pretty(self)
            .map_err(|e| CoachError::Configuration(format!("cannot serialize config: {}", e)))
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        self
    }

    /// Reject values the pipeline cannot run with; temperature is clamped.
    pub fn validated(mut self) -> Result<Self, CoachError> {
        if self.model.trim().is_empty() {
            return Err(CoachError::Configuration("model must not be empty".into()));
        }
        if self.window_size == 0 {
            return Err(CoachError::Configuration("window_size must be positive".into()));
        }
        if self.max_output_tokens == 0 {
            return Err(CoachError::Configuration("max_output_tokens must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(CoachError::Configuration("timeout_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.policy.default_confidence) {
            return Err(CoachError::Configuration(
                "policy.default_confidence must lie in [0, 1]".into(),
            ));
        }
        self.temperature = if self.temperature.is_nan() {
            CoachConfig::default().temperature
        } else {
            self.temperature.clamp(0.0, 1.0)
        };
        Ok(self)
    }
}
