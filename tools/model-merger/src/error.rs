//! Merge error kinds
//!
//! Only [`MergeError::UnsupportedFormat`] is recoverable: the loader logs it
//! and skips the file. Every other variant aborts the run before anything is
//! written.

use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Unsupported file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input in {model}: {reason}")]
    MalformedInput { model: String, reason: String },

    #[error("Failed to obtain root model: {0}")]
    UnresolvableRoot(String),

    #[error("Merge stalled, no remaining model can be attached: {}", models.join(", "))]
    StalledMergeLoop { models: Vec<String> },
}

impl MergeError {
    pub fn malformed(model: &str, reason: impl Display) -> Self {
        Self::MalformedInput {
            model: model.to_owned(),
            reason: reason.to_string(),
        }
    }
}
