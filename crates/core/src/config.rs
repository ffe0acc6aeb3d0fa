// crates/core/src/config.rs
//! Settings resolution: built-in defaults, then the optional TOML file, then
//! environment variables. Command-line flags are layered on by the binary.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONTEXT_MAX: u64 = 160_000;
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Token env vars, checked in order. First non-empty value wins.
pub const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];
pub const CONTEXT_MAX_ENV_VAR: &str = "STATUSBAR_CONTEXT_MAX";
pub const API_BASE_ENV_VAR: &str = "STATUSBAR_GITHUB_API";

/// Mutually independent feature switches from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub short: bool,
    pub no_pr: bool,
    pub no_diff: bool,
    pub no_transcript: bool,
    pub no_color: bool,
}

/// Resolved settings. The TOML file deserializes straight into this; every
/// key is optional and falls back to [`Settings::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub context_max: u64,
    pub projects_dir: Option<PathBuf>,
    pub pr_url_ttl_secs: u64,
    pub pr_status_ttl_secs: u64,
    #[serde(rename = "git_timeout_ms", deserialize_with = "millis")]
    pub git_timeout: Duration,
    #[serde(rename = "network_timeout_ms", deserialize_with = "millis")]
    pub network_timeout: Duration,
    #[serde(rename = "summary")]
    pub summary_enabled: bool,
    pub summary_model: String,
    pub summary_program: String,
    pub api_base: String,
    /// Environment only; never read from the file.
    #[serde(skip)]
    pub github_token: Option<String>,
    /// User overrides, merged over the built-in abbreviation table.
    pub check_abbreviations: HashMap<String, String>,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context_max: DEFAULT_CONTEXT_MAX,
            projects_dir: crate::paths::default_projects_dir(),
            pr_url_ttl_secs: 60,
            pr_status_ttl_secs: 30,
            git_timeout: Duration::from_millis(500),
            network_timeout: Duration::from_millis(3000),
            summary_enabled: true,
            summary_model: "haiku".to_string(),
            summary_program: "claude".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            github_token: None,
            check_abbreviations: HashMap::new(),
        }
    }
}

impl Settings {
    /// Resolve from the config file and the real process environment.
    pub fn load(config_path: Option<&Path>) -> Self {
        Self::from_file(config_path).with_env(|key| std::env::var(key).ok())
    }

    /// Missing or unparsable files silently yield defaults.
    pub fn from_file(path: Option<&Path>) -> Self {
        let Some(contents) = path.and_then(|p| std::fs::read_to_string(p).ok()) else {
            return Self::default();
        };
        let mut settings = toml::from_str::<Self>(&contents).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unparsable config");
            Self::default()
        });
        if settings.context_max == 0 {
            settings.context_max = DEFAULT_CONTEXT_MAX;
        }
        settings
    }

    /// Layer environment overrides on top of `self`.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_value = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        self.github_token = TOKEN_ENV_VARS.iter().find_map(|key| env_value(*key));
        if let Some(max) = env_value(CONTEXT_MAX_ENV_VAR)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|m| *m > 0)
        {
            self.context_max = max;
        }
        if let Some(base) = env_value(API_BASE_ENV_VAR) {
            self.api_base = base;
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        self
    }
}
