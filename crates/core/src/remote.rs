// crates/core/src/remote.rs
//! Remote CI/PR collector.
//!
//! Two independent lookups against the forge API, each cached per branch
//! with its own TTL: the open pull request for the branch, and the check
//! results for the head commit. Failures are cached as empty results so a
//! flaky network is not hammered on every prompt.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::config::Settings;
use crate::error::{CollectorError, CollectorResult};
use crate::types::{CheckGroups, ForgeRepo, PrStatus};

const USER_AGENT: &str = concat!("claude-statusbar/", env!("CARGO_PKG_VERSION"));
const SLUG_MAX_CHARS: usize = 12;

/// Long check names shortened for the status line, keyed by slug.
const BUILTIN_ABBREVIATIONS: &[(&str, &str)] = &[
    ("tests", "test"),
    ("unit-tests", "unit"),
    ("integration-tests", "integ"),
    ("e2e-tests", "e2e"),
    ("typecheck", "tc"),
    ("type-check", "tc"),
    ("formatting", "fmt"),
    ("format", "fmt"),
    ("rustfmt", "fmt"),
    ("coverage", "cov"),
    ("codeql", "cql"),
    ("analyze", "cql"),
    ("dependency-review", "deps"),
    ("security", "sec"),
    ("pre-commit", "pre"),
    ("preview", "prev"),
];

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail,
    Pending,
}

/// Check-run verdict. Anything unrecognized counts as still running.
pub fn classify_check_run(status: &str, conclusion: Option<&str>) -> CheckOutcome {
    if status != "completed" {
        return CheckOutcome::Pending;
    }
    match conclusion {
        Some("success") => CheckOutcome::Pass,
        Some("failure" | "timed_out" | "cancelled" | "action_required" | "stale") => {
            CheckOutcome::Fail
        }
        _ => CheckOutcome::Pending,
    }
}

/// Legacy combined-status verdict.
pub fn classify_status_state(state: &str) -> CheckOutcome {
    match state {
        "success" => CheckOutcome::Pass,
        "failure" | "error" => CheckOutcome::Fail,
        _ => CheckOutcome::Pending,
    }
}

/// Lowercase, non-alphanumerics collapsed to single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

pub struct Abbreviations {
    table: HashMap<String, String>,
}

impl Abbreviations {
    /// Built-in table with user overrides layered on top.
    pub fn new(overrides: &HashMap<String, String>) -> Self {
        let mut table: HashMap<String, String> = BUILTIN_ABBREVIATIONS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (name, short) in overrides {
            table.insert(slugify(name), short.clone());
        }
        Self { table }
    }

    pub fn abbreviate(&self, name: &str) -> String {
        let slug = slugify(name);
        if let Some(short) = self.table.get(&slug) {
            return short.clone();
        }
        let truncated: String = slug.chars().take(SLUG_MAX_CHARS).collect();
        truncated.trim_end_matches('-').to_string()
    }
}

impl Default for Abbreviations {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

fn group<I>(checks: I, abbreviations: &Abbreviations) -> CheckGroups
where
    I: IntoIterator<Item = (String, CheckOutcome)>,
{
    let mut groups = CheckGroups::default();
    for (name, outcome) in checks {
        let short = abbreviations.abbreviate(&name);
        match outcome {
            CheckOutcome::Pass => groups.pass.push(short),
            CheckOutcome::Fail => groups.fail.push(short),
            CheckOutcome::Pending => groups.pending.push(short),
        }
    }
    groups
}

// ============================================================================
// Forge API
// ============================================================================

#[derive(Debug, Deserialize)]
struct PullRequest {
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunList {
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Deserialize)]
struct CheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CombinedStatus {
    #[serde(default)]
    statuses: Vec<CommitStatus>,
}

#[derive(Debug, Deserialize)]
struct CommitStatus {
    context: String,
    state: String,
}

pub struct ForgeClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl ForgeClient {
    pub fn new(api_base: &str, token: Option<String>, timeout: Duration) -> CollectorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| CollectorError::remote(api_base, e))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// GET `path` and decode JSON. Any non-2xx status is an error.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> CollectorResult<T> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectorError::remote(&url, e))?;
        if !response.status().is_success() {
            return Err(CollectorError::remote(
                &url,
                format!("status {}", response.status()),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CollectorError::remote(&url, e))
    }

    pub async fn open_pr_url(&self, repo: &ForgeRepo, branch: &str) -> CollectorResult<Option<String>> {
        let path = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let head = format!("{}:{}", repo.owner, branch);
        let pulls: Vec<PullRequest> = self
            .get_json(&path, &[("state", "open"), ("head", &head), ("per_page", "1")])
            .await?;
        Ok(pulls.into_iter().next().map(|pr| pr.html_url))
    }

    /// Check-runs for `sha`, falling back to the legacy combined status.
    pub async fn checks(
        &self,
        repo: &ForgeRepo,
        sha: &str,
    ) -> CollectorResult<Vec<(String, CheckOutcome)>> {
        let base = format!("/repos/{}/{}/commits/{}", repo.owner, repo.name, sha);
        let runs: CheckRunList = self
            .get_json(&format!("{base}/check-runs"), &[("per_page", "100")])
            .await?;
        if !runs.check_runs.is_empty() {
            return Ok(runs
                .check_runs
                .into_iter()
                .map(|run| {
                    let outcome = classify_check_run(&run.status, run.conclusion.as_deref());
                    (run.name, outcome)
                })
                .collect());
        }

        let combined: CombinedStatus = self.get_json(&format!("{base}/status"), &[]).await?;
        Ok(combined
            .statuses
            .into_iter()
            .map(|s| {
                let outcome = classify_status_state(&s.state);
                (s.context, outcome)
            })
            .collect())
    }
}

// ============================================================================
// Collector
// ============================================================================

pub fn pr_url_key(branch: &str) -> String {
    format!("pr-{}", urlencoding::encode(branch))
}

pub fn pr_status_key(branch: &str) -> String {
    format!("pr-status-{}", urlencoding::encode(branch))
}

pub struct RemoteCollector<'a> {
    cache: &'a CacheStore,
    client: ForgeClient,
    repo: &'a ForgeRepo,
    abbreviations: Abbreviations,
    pr_url_ttl_secs: u64,
    pr_status_ttl_secs: u64,
}

impl<'a> RemoteCollector<'a> {
    pub fn new(
        cache: &'a CacheStore,
        repo: &'a ForgeRepo,
        settings: &Settings,
    ) -> CollectorResult<Self> {
        let client = ForgeClient::new(
            &settings.api_base,
            settings.github_token.clone(),
            settings.network_timeout,
        )?;
        Ok(Self {
            cache,
            client,
            repo,
            abbreviations: Abbreviations::new(&settings.check_abbreviations),
            pr_url_ttl_secs: settings.pr_url_ttl_secs,
            pr_status_ttl_secs: settings.pr_status_ttl_secs,
        })
    }

    /// PR URL and check groups for `branch`, resolved concurrently.
    pub async fn collect(&self, branch: &str, head_oid: Option<&str>) -> PrStatus {
        let (url, checks) = tokio::join!(self.pr_url(branch), self.check_groups(branch, head_oid));
        PrStatus { url, checks }
    }

    async fn pr_url(&self, branch: &str) -> Option<String> {
        let key = pr_url_key(branch);
        if let Some(cached) = self.cache.read(&key, self.pr_url_ttl_secs).await {
            return Some(cached).filter(|url| !url.is_empty());
        }

        let url = match self.client.open_pr_url(self.repo, branch).await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(branch, error = %e, "PR lookup failed");
                None
            }
        };
        if let Err(e) = self.cache.write(&key, url.as_deref().unwrap_or("")).await {
            tracing::warn!(error = %e, "failed to cache PR URL");
        }
        url
    }

    async fn check_groups(&self, branch: &str, head_oid: Option<&str>) -> CheckGroups {
        let key = pr_status_key(branch);
        if let Some(cached) = self.cache.read(&key, self.pr_status_ttl_secs).await {
            match serde_json::from_str::<CheckGroups>(&cached) {
                Ok(groups) => return groups,
                Err(e) => tracing::debug!(key, error = %e, "corrupt check cache"),
            }
        }

        let groups = match head_oid {
            Some(sha) => match self.client.checks(self.repo, sha).await {
                Ok(checks) => group(checks, &self.abbreviations),
                Err(e) => {
                    tracing::debug!(branch, error = %e, "check lookup failed");
                    CheckGroups::default()
                }
            },
            None => CheckGroups::default(),
        };
        match serde_json::to_string(&groups) {
            Ok(body) => {
                if let Err(e) = self.cache.write(&key, &body).await {
                    tracing::warn!(error = %e, "failed to cache check status");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode check status"),
        }
        groups
    }
}
