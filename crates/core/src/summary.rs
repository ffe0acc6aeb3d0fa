// crates/core/src/summary.rs
//! Session summary generator.
//!
//! The summary is produced by a small `claude -p` run in the background,
//! its stdout redirected straight into the cache file. The launching
//! invocation never waits: the background process is meant to outlive it,
//! and callers see "not ready" until the write lands.

use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime};

use crate::cache::CacheStore;
use crate::error::{CollectorError, CollectorResult};

/// An empty placeholder older than this belongs to a generator that died.
const STALE_CLAIM: Duration = Duration::from_secs(120);
/// Longest prompt excerpt handed to the model.
const PROMPT_EXCERPT_CHARS: usize = 300;

/// Env vars that would make the child think it runs inside a live session.
const NESTED_SESSION_VARS: [&str; 3] = ["CLAUDECODE", "CLAUDE_CODE_SSE_PORT", "CLAUDE_CODE_ENTRYPOINT"];

pub fn summary_key(session_id: &str) -> String {
    let safe: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("session-{safe}-summary")
}

pub fn build_prompt(first_message: &str) -> String {
    let excerpt: String = first_message.chars().take(PROMPT_EXCERPT_CHARS).collect();
    format!(
        "Summarize the task in this request in at most five words. \
         Reply with the summary only, no punctuation or quotes.\n\nRequest: {excerpt}"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Ready(String),
    /// A placeholder exists and is recent enough that a generator may still be running.
    Claimed,
    Free,
}

pub struct SummaryGenerator<'a> {
    cache: &'a CacheStore,
    program: String,
    model: String,
}

impl<'a> SummaryGenerator<'a> {
    pub fn new(cache: &'a CacheStore, program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            cache,
            program: program.into(),
            model: model.into(),
        }
    }

    /// The finished summary, if any. May launch a background generator and
    /// return `None` for this invocation.
    pub async fn get(&self, session_id: &str, first_message: Option<&str>) -> Option<String> {
        let key = summary_key(session_id);
        match self.slot(&key).await {
            Slot::Ready(text) => return Some(text),
            Slot::Claimed => return None,
            Slot::Free => {}
        }

        let first_message = first_message?;
        if let Err(e) = self.launch(&key, first_message).await {
            tracing::debug!(session_id, error = %e, "summary generation not started");
        }
        None
    }

    async fn slot(&self, key: &str) -> Slot {
        let path = self.cache.path(key);
        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            return Slot::Free;
        };
        if let Some(text) = self.cache.read_raw(key).await {
            let text = text.trim();
            if !text.is_empty() {
                return Slot::Ready(first_line(text));
            }
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or_default();
        if age < STALE_CLAIM {
            Slot::Claimed
        } else {
            Slot::Free
        }
    }

    /// Claim the slot with an empty placeholder, then spawn the generator
    /// with stdout pointed at the same file. The child handle is released.
    async fn launch(&self, key: &str, first_message: &str) -> CollectorResult<()> {
        let path = self.cache.write_raw(key, "").await?;
        let stdout = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| CollectorError::io(&path, e))?;

        let prompt = build_prompt(first_message);
        let mut cmd = Command::new(&self.program);
        cmd.args(["-p", "--model", self.model.as_str(), prompt.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null());
        for var in NESTED_SESSION_VARS {
            cmd.env_remove(var);
        }
        detach(&mut cmd);

        let child = cmd.spawn().map_err(|source| CollectorError::Subprocess {
            program: self.program.clone(),
            source,
        })?;
        tracing::debug!(pid = child.id(), path = %path.display(), "summary generator launched");
        // Dropping `Child` neither waits for nor kills the process.
        drop(child);
        Ok(())
    }
}

/// Put the child in its own process group so the prompt's job control
/// signals do not reach it.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
