//! Centralized path functions for all statusbar storage locations.

use std::path::{Path, PathBuf};

/// Name of the cache subdirectory inside a repository's git common dir.
pub const REPO_CACHE_SUBDIR: &str = "statusbar";

/// App cache root: `~/Library/Caches/claude-statusbar/` (macOS) or `~/.cache/claude-statusbar/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("claude-statusbar"))
}

/// Log directory: `<app_cache_dir>/logs/`.
pub fn log_dir() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("logs"))
}

/// Default config file: `<config_dir>/claude-statusbar/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("claude-statusbar").join("config.toml"))
}

/// Per-repository cache dir. Rooted at the common dir so worktrees share it.
pub fn repo_cache_dir(git_common_dir: &Path) -> PathBuf {
    git_common_dir.join(REPO_CACHE_SUBDIR)
}

/// `$HOME/projects`, the conventional place repositories are checked out.
pub fn default_projects_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join("projects"))
}

/// Replace a leading home directory with `~`.
pub fn abbreviate_home(path: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home {
        if path == home {
            return "~".to_string();
        }
        if let Ok(rest) = path.strip_prefix(home) {
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}
