//! Per-invocation state: home layout, configuration and the open catalog.

use std::path::Path;

use anyhow::{Context as _, Result};
use pkgsync_core::Layout;

use crate::config::Config;
use crate::store::CatalogDb;

#[derive(Debug)]
pub struct Context {
    pub layout: Layout,
    pub config: Config,
    pub db: CatalogDb,
}

impl Context {
    /// Open the home at `home`, falling back to `$PKGSYNC_HOME` or
    /// `~/.pkgsync`. Repos listed in the configuration that the catalog
    /// does not know yet are added.
    pub fn open(home: Option<&Path>) -> Result<Self> {
        let layout = match home {
            Some(home) => Layout::new(home),
            None => Layout::resolve()
                .context("Cannot determine home directory; set PKGSYNC_HOME or pass --home")?,
        };
        std::fs::create_dir_all(layout.home())
            .with_context(|| format!("Failed to create {}", layout.home().display()))?;

        let config = Config::load(&layout.config_path())?;
        let db = CatalogDb::open(&layout.db_path()).context("Failed to open catalog database")?;

        for repo in &config.repos {
            if db.find_repo(&repo.address)?.is_none() {
                let added = db.add_repo(&repo.address, repo.fingerprint.as_ref(), repo.format)?;
                tracing::info!(id = %added.id, address = %added.address, "added repository from configuration");
            }
        }

        Ok(Self { layout, config, db })
    }
}
