//! Shared doubles for the updater integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use pkgsync_core::io::download::ProgressFn;
use pkgsync_core::{
    CatalogStore, DownloadError, DownloadOutcome, DownloadRequest, Downloader, RepoCommit,
    RepoUpdateError, StoreError, UpdateReporter, UpdateStatus,
};
use pkgsync_schema::{IndexedApp, Repo};

pub const ADDRESS: &str = "https://repo.example.org/fdroid/repo";
pub const FINGERPRINT_A: &str = "79A79C692BB55298B1BAAB01CD9A418A4BBF0D310AEA11693BB766D75D94B7C0";
pub const FINGERPRINT_B: &str = "1788824B11C0ED8DCFC7E7FD3AF0BEA2FA96681CC4A2F578FB6C55B3E454A188";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn fixture_bytes(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).expect("fixture missing")
}

/// Serves fixture archives by URL, ignoring the query string.
#[derive(Default)]
pub struct FixtureDownloader {
    routes: Mutex<HashMap<String, (PathBuf, String)>>,
    requested: Mutex<Vec<String>>,
}

impl FixtureDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `fixture` as `{address}/{jar}` with cache tag `tag`.
    pub fn serve(&self, address: &str, jar: &str, fixture_name: &str, tag: &str) {
        self.routes.lock().unwrap().insert(
            format!("{address}/{jar}"),
            (fixture(fixture_name), tag.to_string()),
        );
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for FixtureDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: ProgressFn<'_>,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.requested.lock().unwrap().push(request.url.clone());
        let key = request
            .url
            .split_once('?')
            .map_or(request.url.as_str(), |(path, _)| path);
        let route = self.routes.lock().unwrap().get(key).cloned();
        let Some((source, tag)) = route else {
            return Err(DownloadError::NotFound(request.url.clone()));
        };

        if request.cache_tag.as_deref() == Some(tag.as_str()) {
            return Ok(DownloadOutcome::NotModified);
        }
        let size = std::fs::copy(&source, &request.dest)?;
        progress(size, Some(size));
        Ok(DownloadOutcome::Downloaded {
            cache_tag: Some(tag),
            size,
        })
    }
}

/// Never finishes; only cancellation gets an update past it.
pub struct StalledDownloader;

#[async_trait]
impl Downloader for StalledDownloader {
    async fn download(
        &self,
        _: &DownloadRequest,
        _: ProgressFn<'_>,
    ) -> Result<DownloadOutcome, DownloadError> {
        std::future::pending().await
    }
}

/// In-memory catalog keeping every commit it accepted.
#[derive(Default)]
pub struct MemoryCatalog {
    pub commits: Vec<RepoCommit>,
    pub apps: Vec<IndexedApp>,
    pub fail: bool,
}

impl MemoryCatalog {
    pub fn apk_count(&self) -> usize {
        self.apps.iter().map(|a| a.apks.len()).sum()
    }

    pub fn app(&self, package: &str) -> &IndexedApp {
        self.apps
            .iter()
            .find(|a| a.app.package_name == package)
            .expect("app not committed")
    }
}

impl CatalogStore for MemoryCatalog {
    fn commit(
        &mut self,
        commit: RepoCommit,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::new("disk full"));
        }
        let total = commit.apps.len() as u64;
        for done in 1..=total {
            progress(done, total);
        }
        self.apps.clone_from(&commit.apps);
        self.commits.push(commit);
        Ok(())
    }
}

/// Records the reporter calls it receives, by name.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        let mut events = self.events.lock().unwrap().clone();
        events.dedup();
        events
    }

    fn push(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

impl UpdateReporter for RecordingReporter {
    fn started(&self, _: &Repo) {
        self.push("started");
    }
    fn downloading(&self, _: &Repo, _: u64, _: Option<u64>) {
        self.push("downloading");
    }
    fn processing(&self, _: &Repo, _: u64, _: Option<u64>) {
        self.push("processing");
    }
    fn committing(&self, _: &Repo, _: u64, _: u64) {
        self.push("committing");
    }
    fn finished(&self, _: &Repo, result: &Result<UpdateStatus, RepoUpdateError>) {
        self.push(if result.is_ok() { "finished:ok" } else { "finished:err" });
    }
}
