// crates/core/src/git.rs
//! Git state collector.
//!
//! Runs a handful of short `git` subprocesses under a tight budget. A timed
//! out child is killed when its future is dropped. Outside a working tree
//! every entry point returns `None`.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::error::{CollectorError, CollectorResult};
use crate::types::{ForgeRepo, GitSnapshot, RepoContext};

const FORGE_HOST: &str = "github.com";

/// Run `cmd` to completion within `budget`. A child still running at the
/// deadline is killed when its future is dropped.
async fn run_bounded(mut cmd: Command, label: &str, budget: Duration) -> CollectorResult<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tokio::time::timeout(budget, cmd.output())
        .await
        .map_err(|_| CollectorError::SubprocessTimeout {
            program: label.to_string(),
            budget_ms: budget.as_millis() as u64,
        })?
        .map_err(|source| CollectorError::Subprocess {
            program: label.to_string(),
            source,
        })
}

fn log_absorbed(what: &str, dir: &Path, err: &CollectorError) {
    if err.is_expected() {
        tracing::debug!(dir = %dir.display(), error = %err, "{what} unavailable");
    } else {
        tracing::warn!(dir = %dir.display(), error = %err, "{what} failed");
    }
}

// ============================================================================
// Porcelain parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Modified,
    Deleted,
}

/// Classify a two-character XY status code.
fn classify(xy: &str) -> Change {
    if xy.contains('A') {
        Change::Added
    } else if xy.contains('M') {
        Change::Modified
    } else if xy.contains('D') {
        Change::Deleted
    } else {
        // Renames, copies, type changes and conflicts.
        Change::Modified
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusParse {
    /// `None` when detached or the header is missing.
    pub branch: Option<String>,
    pub oid: Option<String>,
    pub added: u32,
    pub modified: u32,
    pub deleted: u32,
    pub untracked: u32,
    pub ahead: u32,
    pub behind: u32,
}

/// Parse `git status --porcelain=v2 --branch` output.
pub fn parse_porcelain_v2(output: &str) -> StatusParse {
    let mut parsed = StatusParse::default();
    for line in output.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            let (key, value) = header.split_once(' ').unwrap_or((header, ""));
            match key {
                "branch.head" if value != "(detached)" && !value.is_empty() => {
                    parsed.branch = Some(value.to_string());
                }
                "branch.oid" if value != "(initial)" && !value.is_empty() => {
                    parsed.oid = Some(value.to_string());
                }
                "branch.ab" => {
                    for part in value.split_whitespace() {
                        if let Some(n) = part.strip_prefix('+') {
                            parsed.ahead = n.parse().unwrap_or(0);
                        } else if let Some(n) = part.strip_prefix('-') {
                            parsed.behind = n.parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        let mut fields = line.splitn(3, ' ');
        match (fields.next(), fields.next()) {
            (Some("?"), _) => parsed.untracked += 1,
            (Some("1" | "2" | "u"), Some(xy)) => match classify(xy) {
                Change::Added => parsed.added += 1,
                Change::Modified => parsed.modified += 1,
                Change::Deleted => parsed.deleted += 1,
            },
            _ => {}
        }
    }
    parsed
}

/// `insertions - deletions` from `git diff --shortstat`.
pub fn parse_shortstat(output: &str) -> i64 {
    let mut delta = 0i64;
    for part in output.split(',') {
        let mut words = part.split_whitespace();
        let (Some(count), Some(label)) = (words.next(), words.next()) else {
            continue;
        };
        let Ok(count) = count.parse::<i64>() else {
            continue;
        };
        if label.starts_with("insertion") {
            delta += count;
        } else if label.starts_with("deletion") {
            delta -= count;
        }
    }
    delta
}

/// `(owner, repo)` for a github.com remote in scp, ssh or https form.
pub fn parse_remote_url(url: &str) -> Option<ForgeRepo> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        (host == FORGE_HOST).then_some(path)?
    } else {
        let rest = url.split_once("://")?.1;
        let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
        let (host, path) = rest.split_once('/')?;
        let host = host.split(':').next().unwrap_or(host);
        (host == FORGE_HOST).then_some(path)?
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, name) = path.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(ForgeRepo {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

// ============================================================================
// Collector
// ============================================================================

#[derive(Debug, Clone)]
pub struct GitCollector {
    program: String,
    budget: Duration,
}

impl GitCollector {
    pub fn new(budget: Duration) -> Self {
        Self {
            program: "git".to_string(),
            budget,
        }
    }

    /// Same collector driving a different `git` executable.
    pub fn with_program(program: impl Into<String>, budget: Duration) -> Self {
        Self {
            program: program.into(),
            budget,
        }
    }

    /// Run `git <args>` in `dir`, returning stdout.
    async fn run_git(&self, dir: &Path, args: &[&str]) -> CollectorResult<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(dir)
            // Status on every prompt must never contend for the index lock.
            .env("GIT_OPTIONAL_LOCKS", "0");
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        let output = run_bounded(cmd, &label, self.budget).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectorError::unavailable(format!(
                "git {} exited with {:?}: {}",
                args.join(" "),
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Common dir and forge remote, or `None` outside a working tree.
    pub async fn repo_context(&self, dir: &Path) -> Option<RepoContext> {
        let (common, remote) = tokio::join!(
            self.run_git(dir, &["rev-parse", "--git-common-dir"]),
            self.run_git(dir, &["remote", "get-url", "origin"]),
        );
        let common_dir = match common {
            Ok(out) => resolve_common_dir(dir, out.trim()),
            Err(e) => {
                log_absorbed("repository", dir, &e);
                return None;
            }
        };
        let remote = match remote {
            Ok(url) => parse_remote_url(&url),
            Err(e) => {
                log_absorbed("remote", dir, &e);
                None
            }
        };
        Some(RepoContext { common_dir, remote })
    }

    /// Working-tree snapshot from one status call. The line delta is left
    /// unset; see [`GitCollector::line_delta`].
    pub async fn snapshot(&self, dir: &Path) -> Option<GitSnapshot> {
        match self.try_snapshot(dir).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log_absorbed("git status", dir, &e);
                None
            }
        }
    }

    async fn try_snapshot(&self, dir: &Path) -> CollectorResult<GitSnapshot> {
        let output = self
            .run_git(
                dir,
                &["status", "--porcelain=v2", "--branch", "--untracked-files=normal"],
            )
            .await?;
        let parsed = parse_porcelain_v2(&output);

        let branch = match parsed.branch.clone() {
            Some(branch) => branch,
            None => self.fallback_branch(dir, parsed.oid.as_deref()).await,
        };

        Ok(GitSnapshot {
            branch,
            head_oid: parsed.oid,
            added: parsed.added,
            modified: parsed.modified,
            deleted: parsed.deleted,
            untracked: parsed.untracked,
            ahead: parsed.ahead,
            behind: parsed.behind,
            line_delta: None,
        })
    }

    /// Checked-out branch name, else a short commit hash.
    async fn fallback_branch(&self, dir: &Path, oid: Option<&str>) -> String {
        if let Ok(out) = self.run_git(dir, &["branch", "--show-current"]).await {
            let name = out.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        if let Some(oid) = oid {
            return oid.chars().take(7).collect();
        }
        self.run_git(dir, &["rev-parse", "--short", "HEAD"])
            .await
            .map(|out| out.trim().to_string())
            .unwrap_or_default()
    }

    /// Net inserted minus deleted lines against HEAD; `None` when zero.
    pub async fn line_delta(&self, dir: &Path) -> Option<i64> {
        match self.run_git(dir, &["diff", "--shortstat", "HEAD"]).await {
            Ok(out) => Some(parse_shortstat(&out)).filter(|d| *d != 0),
            Err(e) => {
                log_absorbed("diff stat", dir, &e);
                None
            }
        }
    }
}

fn resolve_common_dir(dir: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATUS: &str = "\
# branch.oid 4f2a9c1d8e7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f
# branch.head feature/x
# branch.upstream origin/feature/x
# branch.ab +2 -1
1 .M N... 100644 100644 100644 abc abc src/lib.rs
1 M. N... 100644 100644 100644 abc abc src/main.rs
1 A. N... 000000 100644 100644 000 abc src/new.rs
1 .D N... 100644 100644 000000 abc abc old.rs
2 R. N... 100644 100644 100644 abc abc R100 renamed.rs\told.rs
u UU N... 100644 100644 100644 100644 abc abc abc conflict.rs
? notes.txt
! target/
";

    #[test]
    fn porcelain_counts_and_header() {
        let parsed = parse_porcelain_v2(STATUS);
        assert_eq!(
            parsed,
            StatusParse {
                branch: Some("feature/x".into()),
                oid: Some("4f2a9c1d8e7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f".into()),
                added: 1,
                modified: 4,
                deleted: 1,
                untracked: 1,
                ahead: 2,
                behind: 1,
            }
        );
    }

    #[test]
    fn porcelain_detached_and_unborn() {
        let detached = parse_porcelain_v2("# branch.oid abcdef1234567\n# branch.head (detached)\n");
        assert_eq!(detached.branch, None);
        assert_eq!(detached.oid.as_deref(), Some("abcdef1234567"));

        let unborn = parse_porcelain_v2("# branch.oid (initial)\n# branch.head main\n");
        assert_eq!(unborn.branch.as_deref(), Some("main"));
        assert_eq!(unborn.oid, None);
    }

    #[test]
    fn added_beats_modified() {
        assert_eq!(classify("AM"), Change::Added);
        assert_eq!(classify("RM"), Change::Modified);
        assert_eq!(classify("R."), Change::Modified);
        assert_eq!(classify("D."), Change::Deleted);
    }

    #[test]
    fn shortstat_delta() {
        assert_eq!(
            parse_shortstat(" 3 files changed, 10 insertions(+), 2 deletions(-)\n"),
            8
        );
        assert_eq!(parse_shortstat(" 1 file changed, 1 insertion(+)"), 1);
        assert_eq!(parse_shortstat(" 1 file changed, 4 deletions(-)"), -4);
        assert_eq!(parse_shortstat(""), 0);
    }

    #[test]
    fn remote_url_forms() {
        let expected = Some(ForgeRepo {
            owner: "octo".into(),
            name: "dots".into(),
        });
        assert_eq!(parse_remote_url("git@github.com:octo/dots.git\n"), expected);
        assert_eq!(parse_remote_url("https://github.com/octo/dots"), expected);
        assert_eq!(parse_remote_url("https://token@github.com/octo/dots.git"), expected);
        assert_eq!(parse_remote_url("ssh://git@github.com:22/octo/dots.git"), expected);
        assert_eq!(parse_remote_url("git@gitlab.com:octo/dots.git"), None);
        assert_eq!(parse_remote_url("/local/path/repo"), None);
    }

    #[test]
    fn relative_common_dir_resolved() {
        assert_eq!(
            resolve_common_dir(Path::new("/w/repo"), ".git"),
            PathBuf::from("/w/repo/.git")
        );
        assert_eq!(
            resolve_common_dir(Path::new("/w/wt"), "/w/repo/.git"),
            PathBuf::from("/w/repo/.git")
        );
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.email=dev@example.com", "-c", "user.name=dev"])
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    #[tokio::test]
    async fn snapshot_of_real_repo() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-q", "-b", "feature/x"]);
        std::fs::write(root.join("a.txt"), "one\n").unwrap();
        std::fs::write(root.join("b.txt"), "one\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "init"]);
        std::fs::write(root.join("a.txt"), "one\ntwo\nthree\n").unwrap();
        std::fs::write(root.join("b.txt"), "").unwrap();
        std::fs::write(root.join("c.txt"), "new\n").unwrap();

        let collector = GitCollector::new(Duration::from_secs(5));
        let snap = collector.snapshot(root).await.unwrap();
        assert_eq!(snap.branch, "feature/x");
        assert_eq!(snap.modified, 2);
        assert_eq!(snap.untracked, 1);
        assert_eq!(snap.line_delta, None);
        assert_eq!(collector.line_delta(root).await, Some(1));
        assert!(snap.head_oid.is_some());

        let ctx = collector.repo_context(root).await.unwrap();
        assert!(ctx.common_dir.ends_with(".git"));
        assert!(ctx.remote.is_none());
    }

    #[tokio::test]
    async fn detached_head_uses_short_hash() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);
        std::fs::write(root.join("a.txt"), "x\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "init"]);
        git(root, &["checkout", "-q", "--detach"]);

        let snap = GitCollector::new(Duration::from_secs(5))
            .snapshot(root)
            .await
            .unwrap();
        assert_eq!(snap.branch.len(), 7);
        assert!(snap.is_clean());
        assert_eq!(snap.line_delta, None);
    }

    #[tokio::test]
    async fn not_a_repo_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let collector = GitCollector::new(Duration::from_secs(5));
        assert!(collector.snapshot(dir.path()).await.is_none());
        assert!(collector.repo_context(dir.path()).await.is_none());
        assert_eq!(collector.line_delta(dir.path()).await, None);
    }

    #[tokio::test]
    async fn over_budget_status_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);

        let started = std::time::Instant::now();
        assert!(GitCollector::new(Duration::ZERO).snapshot(root).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_child_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("sleep 1; touch '{}'", marker.display()));

        let started = std::time::Instant::now();
        let err = run_bounded(cmd, "sh", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::SubprocessTimeout { budget_ms: 100, .. }));
        assert!(started.elapsed() < Duration::from_millis(900));

        // Had the shell survived the timeout it would have created the marker.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
