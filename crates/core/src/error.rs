// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors a collector can hit internally.
///
/// None of these ever leave a collector: each public entry point absorbs them
/// and reports plain absence to the renderer.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("{program} exceeded its {budget_ms}ms budget")]
    SubprocessTimeout { program: String, budget_ms: u64 },

    #[error("Failed to run {program}: {source}")]
    Subprocess {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote unreachable at {url}: {message}")]
    RemoteUnreachable { url: String, message: String },

    #[error("Corrupt cache entry: {path}")]
    CacheCorrupt { path: PathBuf },

    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollectorError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn remote(url: impl Into<String>, message: impl ToString) -> Self {
        Self::RemoteUnreachable {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::InvalidData => Self::CacheCorrupt { path },
            _ => Self::Io { path, source },
        }
    }

    /// Expected degradations are logged quietly; everything else is a warning.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::SubprocessTimeout { .. } | Self::NotFound { .. }
        )
    }
}

/// Outcome of decoding one transcript line.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Malformed JSON in transcript line: {message}")]
    MalformedJson { message: String },
}

impl From<serde_json::Error> for TranscriptError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedJson {
            message: err.to_string(),
        }
    }
}

pub type CollectorResult<T> = Result<T, CollectorError>;
