use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the pkgsync home directory (`$PKGSYNC_HOME`, else `~/.pkgsync`),
/// or `None` if the user's home cannot be resolved.
pub fn pkgsync_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("PKGSYNC_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".pkgsync"))
}

/// Files under one pkgsync home.
#[derive(Debug, Clone)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Layout rooted at [`pkgsync_home`].
    pub fn resolve() -> Option<Self> {
        pkgsync_home().map(Self::new)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `SQLite` catalog: ~/.pkgsync/state.db
    pub fn db_path(&self) -> PathBuf {
        self.home.join("state.db")
    }

    /// Configuration file: ~/.pkgsync/config.toml
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Download scratch space: ~/.pkgsync/cache (same volume as the catalog)
    pub fn cache_path(&self) -> PathBuf {
        self.home.join("cache")
    }
}
