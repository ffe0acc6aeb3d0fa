// crates/core/src/render.rs
//! Pure composition of resolved fragments into one status line.
//!
//! Absent fragments are simply left out; there are no placeholders.

use colored::{Color, Colorize};
use std::path::Path;

use crate::paths::abbreviate_home;
use crate::types::{CheckGroups, GitSnapshot, PrStatus, TranscriptDigest};

const SEPARATOR: &str = " | ";
const MAX_FAILED_NAMES: usize = 3;
const MAX_SUMMARY_CHARS: usize = 40;
const SESSION_ID_CHARS: usize = 8;

/// Whatever the collectors managed to resolve.
#[derive(Debug, Clone, Default)]
pub struct Fragments {
    pub directory: Option<String>,
    pub model: Option<String>,
    pub git: Option<GitSnapshot>,
    pub pr: Option<PrStatus>,
    pub digest: Option<TranscriptDigest>,
    pub summary: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Painter {
    color: bool,
}

impl Painter {
    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Directory to show, or `None` when `--short` hides the projects root.
pub fn display_directory(
    dir: &Path,
    home: Option<&Path>,
    projects_dir: Option<&Path>,
    short: bool,
) -> Option<String> {
    if short && projects_dir.is_some_and(|p| p == dir) {
        return None;
    }
    Some(abbreviate_home(dir, home))
}

/// `[branch ↑a ↓b +A ~M -D ?U Δ±n]`, zero counts omitted.
pub fn git_segment(git: &GitSnapshot) -> String {
    let mut parts = vec![git.branch.clone()];
    let counters = [
        ('↑', git.ahead),
        ('↓', git.behind),
        ('+', git.added),
        ('~', git.modified),
        ('-', git.deleted),
        ('?', git.untracked),
    ];
    for (marker, count) in counters {
        if count > 0 {
            parts.push(format!("{marker}{count}"));
        }
    }
    if let Some(delta) = git.line_delta.filter(|d| *d != 0) {
        parts.push(format!("Δ{delta:+}"));
    }
    format!("[{}]", parts.join(" "))
}

/// `PR #<n>` from a pull request URL, the raw URL if no number is found.
pub fn pr_label(url: &str) -> String {
    match url.trim_end_matches('/').rsplit('/').next() {
        Some(n) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => format!("PR #{n}"),
        _ => url.to_string(),
    }
}

/// Failures first (at most three names), then pending, then a pass count.
fn checks_segment(checks: &CheckGroups, painter: Painter) -> Option<String> {
    let mut parts = Vec::new();
    if !checks.fail.is_empty() {
        let mut names = checks
            .fail
            .iter()
            .take(MAX_FAILED_NAMES)
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        if checks.fail.len() > MAX_FAILED_NAMES {
            names.push('…');
        }
        parts.push(painter.paint(&format!("✗ {names}"), Color::Red));
    }
    if !checks.pending.is_empty() {
        parts.push(painter.paint(&format!("◷{}", checks.pending.len()), Color::Yellow));
    }
    if !checks.pass.is_empty() {
        parts.push(painter.paint(&format!("✓{}", checks.pass.len()), Color::Green));
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn context_color(percent: f64) -> Color {
    if percent >= 80.0 {
        Color::Red
    } else if percent >= 50.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

/// Compose the line. Never fails; missing pieces render as nothing.
pub fn render(fragments: &Fragments, color: bool) -> String {
    let painter = Painter { color };
    let mut sections: Vec<String> = Vec::new();

    let mut location = Vec::new();
    if let Some(dir) = &fragments.directory {
        location.push(painter.paint(dir, Color::Blue));
    }
    if let Some(git) = &fragments.git {
        let color = if git.is_clean() { Color::Green } else { Color::Yellow };
        location.push(painter.paint(&git_segment(git), color));
    }
    if let Some(pr) = &fragments.pr {
        if let Some(url) = &pr.url {
            location.push(painter.paint(&pr_label(url), Color::Magenta));
        }
        if let Some(checks) = checks_segment(&pr.checks, painter) {
            location.push(checks);
        }
    }
    if !location.is_empty() {
        sections.push(location.join(" "));
    }

    if let Some(model) = &fragments.model {
        sections.push(painter.paint(model, Color::Cyan));
    }

    if let Some(digest) = &fragments.digest {
        let mut usage = vec![painter.paint(
            &format!("ctx {}%", digest.context_label()),
            context_color(digest.context_percent),
        )];
        if let Some(duration) = &digest.duration_label {
            usage.push(painter.dim(duration));
        }
        sections.push(usage.join(" "));
    }

    if let Some(summary) = fragments.summary.as_deref().filter(|s| !s.is_empty()) {
        sections.push(painter.paint(&truncate(summary, MAX_SUMMARY_CHARS), Color::White));
    }

    if let Some(id) = &fragments.session_id {
        let short: String = id.chars().take(SESSION_ID_CHARS).collect();
        sections.push(painter.dim(&short));
    }

    sections.join(SEPARATOR)
}
