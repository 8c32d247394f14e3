//! Error taxonomy for the coach pipeline.
//!
//! Field-level anomalies in model output are never represented here; the
//! normalizer repairs them in place.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoachError {
    /// Required credential or configuration value is absent or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Raw model text held no parseable JSON object after fence-stripping and brace-scanning.
    #[error("model output was not a JSON object (got: {preview:?})")]
    Extraction { preview: String },

    /// The generation capability failed, timed out, or was unreachable.
    #[error("generation failed: {0}")]
    Transport(String),
}

impl CoachError {
    pub fn extraction(raw: &str) -> Self {
        let preview: String = raw.chars().take(120).collect();
        CoachError::Extraction { preview }
    }

    pub fn is_extraction(&self) -> bool {
        matches!(self, CoachError::Extraction { .. })
    }
}

impl From<reqwest::Error> for CoachError {
    fn from(e: reqwest::Error) -> Self {
        CoachError::Transport(e.to_string())
    }
}
