// crates/core/src/statusline.rs
//! One invocation: fan out to every collector, wait for all of them to
//! settle, render whatever resolved.

use std::path::PathBuf;

use tokio::sync::OnceCell;

use crate::cache::CacheStore;
use crate::config::{Flags, Settings};
use crate::git::GitCollector;
use crate::paths;
use crate::remote::RemoteCollector;
use crate::render::{display_directory, render, Fragments};
use crate::summary::SummaryGenerator;
use crate::transcript::TranscriptScanner;
use crate::types::{
    ForgeRepo, GitSnapshot, PrStatus, RepoContext, StatusRequest, TranscriptDigest,
};

/// Resolve every fragment for `request`. Collectors absorb their own
/// failures, so this always completes.
///
/// Two branches run side by side: git status, then the line delta and the
/// CI/PR lookups; and the transcript scan, then the summary. Both need the
/// repository probe, which runs once and is shared.
pub async fn collect(request: &StatusRequest, settings: &Settings, flags: Flags) -> Fragments {
    collect_with(&GitCollector::new(settings.git_timeout), request, settings, flags).await
}

/// [`collect`] with a caller-supplied git collector.
pub async fn collect_with(
    git: &GitCollector,
    request: &StatusRequest,
    settings: &Settings,
    flags: Flags,
) -> Fragments {
    let dir = request.working_dir.as_path();
    let repo_cell = &OnceCell::new();
    let repo_context = move || repo_cell.get_or_init(move || git.repo_context(dir));

    let repo_side = async {
        let (snapshot, repo) = tokio::join!(git.snapshot(dir), repo_context());
        collect_repo_side(git, request, settings, flags, repo.as_ref(), snapshot).await
    };
    let session_side = async {
        let repo = repo_context().await;
        collect_session_side(request, settings, flags, repo.as_ref()).await
    };
    let ((git_snapshot, pr), (digest, summary)) = tokio::join!(repo_side, session_side);

    let home = dirs::home_dir();
    Fragments {
        directory: display_directory(
            dir,
            home.as_deref(),
            settings.projects_dir.as_deref(),
            flags.short,
        ),
        model: request.model_name.clone(),
        git: git_snapshot,
        pr: pr.filter(|p| !p.is_empty()),
        digest,
        summary,
        session_id: request.session_id.clone(),
    }
}

/// Cache for a repository with a recognized forge remote. Worktrees share
/// it through the common dir.
fn forge_cache(repo: Option<&RepoContext>) -> Option<(&ForgeRepo, CacheStore)> {
    let repo = repo?;
    let forge = repo.remote.as_ref()?;
    Some((forge, CacheStore::new(paths::repo_cache_dir(&repo.common_dir))))
}

/// Line delta and CI/PR status, both keyed off the status snapshot.
async fn collect_repo_side(
    git: &GitCollector,
    request: &StatusRequest,
    settings: &Settings,
    flags: Flags,
    repo: Option<&RepoContext>,
    snapshot: Option<GitSnapshot>,
) -> (Option<GitSnapshot>, Option<PrStatus>) {
    let Some(mut snapshot) = snapshot else {
        return (None, None);
    };
    let dir = request.working_dir.as_path();

    let delta = async {
        if flags.no_diff || snapshot.is_clean() {
            None
        } else {
            git.line_delta(dir).await
        }
    };

    let pr = async {
        if flags.no_pr {
            return None;
        }
        let (forge, cache) = forge_cache(repo)?;
        match RemoteCollector::new(&cache, forge, settings) {
            Ok(collector) => Some(
                collector
                    .collect(&snapshot.branch, snapshot.head_oid.as_deref())
                    .await,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "forge client unavailable");
                None
            }
        }
    };

    let (line_delta, pr) = tokio::join!(delta, pr);
    snapshot.line_delta = line_delta;
    (Some(snapshot), pr)
}

/// Transcript digest, then the summary that feeds on its first message.
async fn collect_session_side(
    request: &StatusRequest,
    settings: &Settings,
    flags: Flags,
    repo: Option<&RepoContext>,
) -> (Option<TranscriptDigest>, Option<String>) {
    // Outside a repository the digest still caches, under the user cache dir.
    let digest_cache = repo
        .map(|r| CacheStore::new(paths::repo_cache_dir(&r.common_dir)))
        .or_else(|| paths::app_cache_dir().map(CacheStore::new));

    let digest = match (&request.transcript_path, flags.no_transcript) {
        (Some(path), false) => Some(
            TranscriptScanner::new(digest_cache.as_ref(), settings.context_max)
                .scan(path)
                .await,
        ),
        _ => None,
    };

    // Summaries belong to repositories with a recognized remote only.
    let summary = match (&request.session_id, forge_cache(repo)) {
        (Some(session_id), Some((_, cache))) if settings.summary_enabled => {
            let first_message = digest
                .as_ref()
                .and_then(|d| d.first_user_message.as_deref());
            SummaryGenerator::new(&cache, &settings.summary_program, &settings.summary_model)
                .get(session_id, first_message)
                .await
        }
        _ => None,
    };

    (digest, summary)
}

/// Decode, collect and render one status line.
pub async fn build_status_line(input: &str, settings: &Settings, flags: Flags) -> String {
    let fallback = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let request = StatusRequest::decode(input, fallback);
    tracing::debug!(dir = %request.working_dir.display(), "rendering status line");
    let fragments = collect(&request, settings, flags).await;
    render(&fragments, !flags.no_color)
}
