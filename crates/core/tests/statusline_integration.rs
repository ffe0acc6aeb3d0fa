//! End-to-end runs against a real git repository and a mock forge API.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use claude_statusbar_core::paths::repo_cache_dir;
use claude_statusbar_core::render::render;
use claude_statusbar_core::transcript::digest_cache_key;
use claude_statusbar_core::{build_status_line, collect, Flags, Settings, StatusRequest};
use mockito::Matcher;
use pretty_assertions::assert_eq;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.email=dev@example.com", "-c", "user.name=dev"])
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Repo on `feature/x` with a GitHub origin, one modified and one untracked file.
fn dirty_repo(root: &Path) {
    git(root, &["init", "-q", "-b", "feature/x"]);
    std::fs::write(root.join("a.txt"), "one\n").unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-q", "-m", "init"]);
    git(root, &["remote", "add", "origin", "git@github.com:octo/dots.git"]);
    std::fs::write(root.join("a.txt"), "one\ntwo\nthree\n").unwrap();
    std::fs::write(root.join("notes.txt"), "scratch\n").unwrap();
}

fn transcript(path: &Path) {
    let lines = [
        serde_json::json!({
            "type": "user",
            "timestamp": "2025-03-01T12:00:00Z",
            "message": {"role": "user", "content": "Fix the flaky upload test in CI"}
        }),
        serde_json::json!({
            "type": "assistant",
            "timestamp": "2025-03-01T12:45:00Z",
            "message": {
                "role": "assistant",
                "content": [{"type": "text", "text": "done"}],
                "usage": {
                    "input_tokens": 100,
                    "output_tokens": 900,
                    "cache_read_input_tokens": 15000,
                    "cache_creation_input_tokens": 0
                }
            }
        }),
    ];
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    std::fs::write(path, body).unwrap();
}

fn settings_for(server: &mockito::Server) -> Settings {
    Settings {
        api_base: server.url(),
        network_timeout: Duration::from_secs(5),
        git_timeout: Duration::from_secs(5),
        summary_enabled: false,
        projects_dir: None,
        github_token: None,
        ..Settings::default()
    }
}

fn no_color() -> Flags {
    Flags {
        no_color: true,
        ..Flags::default()
    }
}

#[tokio::test]
async fn full_line_from_repo_forge_and_transcript() {
    let repo = tempfile::tempdir().unwrap();
    dirty_repo(repo.path());
    let session = tempfile::tempdir().unwrap();
    let transcript_path = session.path().join("s1.jsonl");
    transcript(&transcript_path);

    let mut server = mockito::Server::new_async().await;
    let pulls = server
        .mock("GET", "/repos/octo/dots/pulls")
        .match_query(Matcher::UrlEncoded("head".into(), "octo:feature/x".into()))
        .with_status(200)
        .with_body(r#"[{"html_url":"https://github.com/octo/dots/pull/7"}]"#)
        .expect(1)
        .create_async()
        .await;
    let runs = server
        .mock("GET", Matcher::Regex(r"^/repos/octo/dots/commits/[0-9a-f]+/check-runs".into()))
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"check_runs":[
                {"name":"build","status":"completed","conclusion":"failure"},
                {"name":"lint","status":"completed","conclusion":"success"}
            ]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let settings = settings_for(&server);
    let input = serde_json::json!({
        "model": {"display_name": "Opus"},
        "workspace": {"current_dir": repo.path()},
        "session_id": "0123456789abcdef",
        "transcript_path": transcript_path,
    })
    .to_string();

    let first = build_status_line(&input, &settings, no_color()).await;
    assert!(first.contains("[feature/x ~1 ?1 Δ+2]"), "{first}");
    assert!(first.contains("PR #7 ✗ build ✓1"), "{first}");
    assert!(first.contains(" | Opus | ctx 10% 45m | 01234567"), "{first}");

    // Nothing changed, so the second run is served from cache and identical.
    let second = build_status_line(&input, &settings, no_color()).await;
    assert_eq!(first, second);
    pulls.assert_async().await;
    runs.assert_async().await;

    let common_dir = repo.path().join(".git");
    let cache_dir = repo_cache_dir(&common_dir);
    assert!(cache_dir.join(digest_cache_key(&transcript_path)).exists());
    assert!(cache_dir.join("pr-feature%2Fx").exists());
}

#[tokio::test]
async fn forge_failure_drops_pr_segment_only() {
    let repo = tempfile::tempdir().unwrap();
    dirty_repo(repo.path());

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Any)
        .with_status(502)
        .create_async()
        .await;

    let request = StatusRequest {
        working_dir: repo.path().to_path_buf(),
        model_name: Some("Opus".into()),
        session_id: None,
        transcript_path: None,
    };
    let fragments = collect(&request, &settings_for(&server), no_color()).await;
    assert!(fragments.git.is_some());
    assert!(fragments.pr.is_none());

    let line = render(&fragments, false);
    assert!(line.contains("[feature/x"));
    assert!(!line.contains("PR #"));
}

#[tokio::test]
async fn flags_switch_off_collectors() {
    let repo = tempfile::tempdir().unwrap();
    dirty_repo(repo.path());

    let mut server = mockito::Server::new_async().await;
    let never = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let request = StatusRequest {
        working_dir: repo.path().to_path_buf(),
        model_name: None,
        session_id: None,
        transcript_path: None,
    };
    let flags = Flags {
        no_pr: true,
        no_diff: true,
        ..no_color()
    };
    let fragments = collect(&request, &settings_for(&server), flags).await;
    let git = fragments.git.unwrap();
    assert_eq!(git.line_delta, None);
    assert_eq!((git.modified, git.untracked), (1, 1));
    assert!(fragments.pr.is_none());
    never.assert_async().await;
}

#[tokio::test]
async fn outside_a_repository() {
    let dir = tempfile::tempdir().unwrap();
    let server = mockito::Server::new_async().await;
    let input = serde_json::json!({
        "cwd": dir.path(),
        "model": {"display_name": "Haiku"},
    })
    .to_string();

    let line = build_status_line(&input, &settings_for(&server), no_color()).await;
    assert!(!line.contains('['));
    assert!(!line.contains("PR #"));
    assert!(line.ends_with(" | Haiku"), "{line}");
}
