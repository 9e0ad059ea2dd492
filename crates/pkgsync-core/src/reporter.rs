//! Reporter trait for dependency injection
//!
//! Lets the updater report progress without being coupled to a terminal,
//! a GUI or a log file. Calls are fire-and-forget: implementations must not
//! block, and callers treat the cadence as advisory.

use pkgsync_schema::Repo;

use crate::error::RepoUpdateError;
use crate::updater::UpdateStatus;

pub trait UpdateReporter: Send + Sync {
    /// An update of `repo` is starting.
    fn started(&self, repo: &Repo);

    /// Bytes of the index archive received so far.
    fn downloading(&self, repo: &Repo, current: u64, total: Option<u64>);

    /// Bytes of the index payload parsed so far.
    fn processing(&self, repo: &Repo, current: u64, total: Option<u64>);

    /// Apps written to the store so far.
    fn committing(&self, repo: &Repo, current: u64, total: u64);

    /// Terminal result for `repo`.
    fn finished(&self, repo: &Repo, result: &Result<UpdateStatus, RepoUpdateError>);
}

impl<T: UpdateReporter + ?Sized> UpdateReporter for std::sync::Arc<T> {
    fn started(&self, repo: &Repo) {
        (**self).started(repo);
    }
    fn downloading(&self, repo: &Repo, current: u64, total: Option<u64>) {
        (**self).downloading(repo, current, total);
    }
    fn processing(&self, repo: &Repo, current: u64, total: Option<u64>) {
        (**self).processing(repo, current, total);
    }
    fn committing(&self, repo: &Repo, current: u64, total: u64) {
        (**self).committing(repo, current, total);
    }
    fn finished(&self, repo: &Repo, result: &Result<UpdateStatus, RepoUpdateError>) {
        (**self).finished(repo, result);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl UpdateReporter for NullReporter {
    fn started(&self, _: &Repo) {}
    fn downloading(&self, _: &Repo, _: u64, _: Option<u64>) {}
    fn processing(&self, _: &Repo, _: u64, _: Option<u64>) {}
    fn committing(&self, _: &Repo, _: u64, _: u64) {}
    fn finished(&self, _: &Repo, _: &Result<UpdateStatus, RepoUpdateError>) {}
}
