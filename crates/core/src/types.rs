// crates/core/src/types.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Request
// ============================================================================

/// One status-line request, decoded once from stdin and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub working_dir: PathBuf,
    pub model_name: Option<String>,
    pub session_id: Option<String>,
    pub transcript_path: Option<PathBuf>,
}

/// Wire shape of the JSON document piped on stdin.
///
/// Every field is optional; the host may omit any of them.
#[derive(Debug, Default, Deserialize)]
struct RawRequest {
    workspace: Option<RawWorkspace>,
    cwd: Option<String>,
    model: Option<RawModel>,
    session_id: Option<String>,
    transcript_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkspace {
    current_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModel {
    display_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl StatusRequest {
    /// Decode the stdin document.
    ///
    /// Invalid or empty input yields a request for `fallback_dir` with
    /// everything else absent.
    pub fn decode(input: &str, fallback_dir: PathBuf) -> Self {
        let raw: RawRequest = match serde_json::from_str(input) {
            Ok(raw) => raw,
            Err(e) => {
                if !input.trim().is_empty() {
                    tracing::debug!(error = %e, "status request is not valid JSON");
                }
                RawRequest::default()
            }
        };

        let working_dir = non_empty(raw.workspace.and_then(|w| w.current_dir))
            .or_else(|| non_empty(raw.cwd))
            .map(PathBuf::from)
            .unwrap_or(fallback_dir);

        Self {
            working_dir,
            model_name: non_empty(raw.model.and_then(|m| m.display_name)),
            session_id: non_empty(raw.session_id),
            transcript_path: non_empty(raw.transcript_path).map(PathBuf::from),
        }
    }
}

// ============================================================================
// Git
// ============================================================================

/// Working-tree state, derived fresh on every invocation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSnapshot {
    pub branch: String,
    /// Full head commit id, absent on an unborn branch.
    pub head_oid: Option<String>,
    pub added: u32,
    pub modified: u32,
    pub deleted: u32,
    pub untracked: u32,
    pub ahead: u32,
    pub behind: u32,
    /// `insertions - deletions`, only when requested and the tree is dirty.
    pub line_delta: Option<i64>,
}

impl GitSnapshot {
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.modified == 0 && self.deleted == 0 && self.untracked == 0
    }
}

/// Where a repository lives and which forge repo it tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    /// Shared by all worktrees of the repository.
    pub common_dir: PathBuf,
    pub remote: Option<ForgeRepo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeRepo {
    pub owner: String,
    pub name: String,
}

// ============================================================================
// Transcript
// ============================================================================

/// Cheap proxy for "file contents unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub mtime_ms: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDigest {
    /// Share of the context window in use, clamped to `0..=100`.
    pub context_percent: f64,
    pub duration_label: Option<String>,
    pub first_user_message: Option<String>,
}

impl TranscriptDigest {
    /// One decimal place at or above 90%, nearest integer below.
    pub fn context_label(&self) -> String {
        format_context_percent(self.context_percent)
    }
}

pub fn format_context_percent(percent: f64) -> String {
    if percent >= 90.0 {
        format!("{:.1}", percent)
    } else {
        format!("{}", percent.round() as i64)
    }
}

/// `"<1m"` under a minute, otherwise `"{h}h {m}m"` with a zero hour omitted.
pub fn format_duration(seconds: i64) -> Option<String> {
    if seconds < 0 {
        return None;
    }
    if seconds < 60 {
        return Some("<1m".to_string());
    }
    let minutes = seconds / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours == 0 {
        Some(format!("{}m", minutes))
    } else {
        Some(format!("{}h {}m", hours, minutes))
    }
}

// ============================================================================
// CI / PR
// ============================================================================

/// Check names grouped by outcome, already abbreviated for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckGroups {
    #[serde(default)]
    pub pass: Vec<String>,
    #[serde(default)]
    pub fail: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
}

impl CheckGroups {
    pub fn is_empty(&self) -> bool {
        self.pass.is_empty() && self.fail.is_empty() && self.pending.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrStatus {
    pub url: Option<String>,
    pub checks: CheckGroups,
}

impl PrStatus {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.checks.is_empty()
    }
}
