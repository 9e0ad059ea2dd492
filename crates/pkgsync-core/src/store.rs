//! Persistence seam.
//!
//! The updater never writes anywhere itself. It hands one [`RepoCommit`] per
//! successful update to a [`CatalogStore`], which must apply it as a single
//! transaction: readers see either the old repo row with the old apps, or the
//! new row with the new apps, never a mix.

use pkgsync_schema::{IndexedApp, RepoChanges, RepoId};

use crate::error::StoreError;

/// Everything one successful update writes.
#[derive(Debug, Clone, Default)]
pub struct RepoCommit {
    pub repo_id: RepoId,
    /// Repo columns that changed; unchanged fields are `None`.
    pub changes: RepoChanges,
    /// Full replacement for the repo's apps and their releases.
    pub apps: Vec<IndexedApp>,
}

impl RepoCommit {
    pub fn apk_count(&self) -> usize {
        self.apps.iter().map(|a| a.apks.len()).sum()
    }
}

pub trait CatalogStore: Send {
    /// Replace the repo's catalog and update its row, atomically.
    ///
    /// `progress` receives `(apps written, total apps)`.
    fn commit(
        &mut self,
        commit: RepoCommit,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(), StoreError>;
}
