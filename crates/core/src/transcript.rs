// crates/core/src/transcript.rs
//! Transcript scanner: context usage, session duration and the opening
//! prompt, pulled from the two ends of an append-only JSONL session log.
//!
//! A digest is persisted next to the other caches keyed by the file's
//! fingerprint (mtime, size). While the fingerprint holds, the transcript's
//! content is never opened.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::cache::CacheStore;
use crate::error::{CollectorError, CollectorResult, TranscriptError};
use crate::tail::{read_windows, HEAD_BYTES, TAIL_BYTES};
use crate::types::{format_duration, Fingerprint, TranscriptDigest};

/// User prompts this short are greetings or confirmations, not topics.
const MIN_USER_MESSAGE_CHARS: usize = 10;
/// Longest first message kept in the digest.
const MAX_USER_MESSAGE_CHARS: usize = 500;

/// Content injected into user turns by the host rather than typed by the user.
const BOILERPLATE_PREFIXES: &[&str] = &[
    "<local-command-caveat>",
    "<local-command-stdout>",
    "<local-command-stderr>",
    "<command-name>",
    "<command-message>",
    "<system-reminder>",
    "<task-notification>",
    "<user-prompt-submit-hook>",
    "Caveat:",
    "This session is being continued",
    "[Request interrupted",
];

// ============================================================================
// Records
// ============================================================================

/// Token counters from an assistant turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

impl Usage {
    /// Counters come from untrusted JSON; the sum saturates.
    pub fn total(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_creation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    /// A prompt the user typed.
    UserMessage(String),
    /// An assistant turn that carries usage counters.
    AssistantUsage(Usage),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: RecordKind,
}

/// ISO-8601 strings and numeric epochs (seconds or milliseconds).
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if raw >= 1e12 {
                DateTime::from_timestamp_millis(raw as i64)
            } else {
                DateTime::from_timestamp(raw as i64, 0)
            }
        }
        _ => None,
    }
}

fn counter(usage: &Value, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn extract_usage(value: &Value) -> Option<Usage> {
    let usage = value.get("usage")?;
    if !usage.is_object() {
        return None;
    }
    Some(Usage {
        input: counter(usage, "input_tokens"),
        output: counter(usage, "output_tokens"),
        cache_read: counter(usage, "cache_read_input_tokens"),
        cache_creation: counter(usage, "cache_creation_input_tokens"),
    })
}

/// Text of a user turn. Tool results are continuations, not prompts.
fn user_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let mut parts = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_result") => return None,
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            parts.push(text);
                        }
                    }
                    _ => {}
                }
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Decode one JSONL line into a tagged record.
pub fn parse_record(line: &str) -> Result<TranscriptRecord, TranscriptError> {
    let value: Value = serde_json::from_str(line)?;
    let timestamp = value.get("timestamp").and_then(parse_timestamp);
    let message = value.get("message");

    let kind = match value.get("type").and_then(Value::as_str) {
        Some("user") => {
            let is_meta = value.get("isMeta").and_then(Value::as_bool).unwrap_or(false);
            match message.and_then(user_text) {
                Some(text) if !is_meta => RecordKind::UserMessage(text),
                _ => RecordKind::Unknown,
            }
        }
        Some("assistant") => {
            match message.and_then(extract_usage).or_else(|| extract_usage(&value)) {
                Some(usage) => RecordKind::AssistantUsage(usage),
                None => RecordKind::Unknown,
            }
        }
        _ => RecordKind::Unknown,
    };

    Ok(TranscriptRecord { timestamp, kind })
}

/// Long enough, not a slash command, and not host boilerplate.
pub fn is_meaningful_prompt(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() > MIN_USER_MESSAGE_CHARS
        && !text.starts_with('/')
        && !BOILERPLATE_PREFIXES.iter().any(|p| text.starts_with(p))
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// Digest computation
// ============================================================================

#[derive(Debug, Default)]
struct HeadFindings {
    first_timestamp: Option<DateTime<Utc>>,
    first_user_message: Option<String>,
}

#[derive(Debug, Default)]
struct TailFindings {
    last_timestamp: Option<DateTime<Utc>>,
    usage: Option<Usage>,
}

fn scan_head<'a>(lines: impl Iterator<Item = &'a str>) -> HeadFindings {
    let mut found = HeadFindings::default();
    for line in lines {
        let Ok(record) = parse_record(line) else {
            continue;
        };
        if found.first_timestamp.is_none() {
            found.first_timestamp = record.timestamp;
        }
        if found.first_user_message.is_none() {
            if let RecordKind::UserMessage(text) = &record.kind {
                if is_meaningful_prompt(text) {
                    found.first_user_message =
                        Some(truncate_chars(text.trim(), MAX_USER_MESSAGE_CHARS));
                }
            }
        }
        if found.first_timestamp.is_some() && found.first_user_message.is_some() {
            break;
        }
    }
    found
}

/// `lines` must be newest first.
fn scan_tail<'a>(lines: impl Iterator<Item = &'a str>) -> TailFindings {
    let mut found = TailFindings::default();
    for line in lines {
        let Ok(record) = parse_record(line) else {
            continue;
        };
        if found.last_timestamp.is_none() {
            found.last_timestamp = record.timestamp;
        }
        if found.usage.is_none() {
            if let RecordKind::AssistantUsage(usage) = record.kind {
                found.usage = Some(usage);
            }
        }
        if found.last_timestamp.is_some() && found.usage.is_some() {
            break;
        }
    }
    found
}

pub fn context_percent(usage: Option<Usage>, context_max: u64) -> f64 {
    match usage {
        Some(usage) if context_max > 0 => {
            (100.0 * usage.total() as f64 / context_max as f64).min(100.0)
        }
        _ => 0.0,
    }
}

fn session_duration(first: Option<DateTime<Utc>>, last: Option<DateTime<Utc>>) -> Option<String> {
    let (first, last) = (first?, last?);
    if last < first {
        return None;
    }
    format_duration((last - first).num_seconds())
}

// ============================================================================
// Scanner
// ============================================================================

/// Persisted digest, valid while `fingerprint` matches the file and the
/// percentage was computed against the same context window.
#[derive(Debug, Serialize, Deserialize)]
struct DigestCacheEntry {
    path: String,
    fingerprint: Fingerprint,
    context_max: u64,
    digest: TranscriptDigest,
}

pub fn digest_cache_key(transcript: &Path) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(transcript.to_string_lossy().as_bytes());
    format!("tcache-{encoded}.json")
}

pub struct TranscriptScanner<'a> {
    cache: Option<&'a CacheStore>,
    context_max: u64,
}

impl<'a> TranscriptScanner<'a> {
    pub fn new(cache: Option<&'a CacheStore>, context_max: u64) -> Self {
        Self { cache, context_max }
    }

    /// Digest for `path`. Absent or empty files yield the default digest.
    pub async fn scan(&self, path: &Path) -> TranscriptDigest {
        match self.try_scan(path).await {
            Ok(digest) => digest,
            Err(e) => {
                if e.is_expected() {
                    tracing::debug!(path = %path.display(), error = %e, "transcript unavailable");
                } else {
                    tracing::warn!(path = %path.display(), error = %e, "transcript scan failed");
                }
                TranscriptDigest::default()
            }
        }
    }

    async fn try_scan(&self, path: &Path) -> CollectorResult<TranscriptDigest> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CollectorError::io(path, e))?;
        let size = metadata.len();
        if size == 0 {
            return Ok(TranscriptDigest::default());
        }
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let fingerprint = Fingerprint { mtime_ms, size };
        let key = digest_cache_key(path);
        let path_str = path.to_string_lossy().to_string();

        if let Some(cache) = self.cache {
            if let Some(entry) = cache.read_json::<DigestCacheEntry>(&key).await {
                if entry.path == path_str
                    && entry.fingerprint == fingerprint
                    && entry.context_max == self.context_max
                {
                    tracing::debug!(path = %path.display(), "transcript digest cache hit");
                    return Ok(entry.digest);
                }
            }
        }

        let windows = read_windows(path, size, HEAD_BYTES, TAIL_BYTES)
            .await
            .map_err(|e| CollectorError::io(path, e))?;
        let head = scan_head(windows.head_lines().into_iter());
        let tail = scan_tail(windows.tail_lines().into_iter().rev());

        let digest = TranscriptDigest {
            context_percent: context_percent(tail.usage, self.context_max),
            duration_label: session_duration(head.first_timestamp, tail.last_timestamp),
            first_user_message: head.first_user_message,
        };

        if let Some(cache) = self.cache {
            let entry = DigestCacheEntry {
                path: path_str,
                fingerprint,
                context_max: self.context_max,
                digest: digest.clone(),
            };
            if let Err(e) = cache.write_json(&key, &entry).await {
                tracing::warn!(error = %e, "failed to persist transcript digest");
            }
        }

        Ok(digest)
    }
}
