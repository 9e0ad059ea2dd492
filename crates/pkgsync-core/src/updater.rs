//! Repo update pipeline.
//!
//! ```text
//! download -> open signed archive -> trust check -> parse payload
//!          -> payload digest -> anti-rollback -> commit
//! ```
//!
//! Nothing reaches the [`CatalogStore`] until every check has passed, and
//! the in-memory [`Repo`] is only advanced after the store accepted the
//! commit. The downloaded archive lives in a temporary file that is removed
//! on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pkgsync_schema::{CertificateHex, IndexFormat, IndexedApp, Repo, RepoChanges, RepoId};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, RepoUpdateError, UpdateError};
use crate::index::{self, IndexCollector, RepoHeader};
use crate::io::download::{DownloadOutcome, DownloadRequest, Downloader};
use crate::io::progress::ProgressReader;
use crate::jar::SignedIndexJar;
use crate::reporter::{NullReporter, UpdateReporter};
use crate::store::{CatalogStore, RepoCommit};
use crate::trust::{self, TrustAnchors};

/// Terminal state of a successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The server copy matched the cache tag. Nothing was read or written.
    Unchanged,
    /// A new index was verified and committed.
    Processed {
        apps: usize,
        apks: usize,
        timestamp: i64,
    },
}

/// Per-repo results of [`RepoUpdater::update_all`], in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<(RepoId, Result<UpdateStatus, RepoUpdateError>)>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &RepoUpdateError> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().err())
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// URL of the index archive for `format` under `address`.
pub fn index_url(address: &str, format: IndexFormat) -> String {
    format!(
        "{}/{}?client_version={}",
        address.trim_end_matches('/'),
        format.jar_name(),
        crate::CLIENT_VERSION
    )
}

/// Output of the blocking verify-and-parse stage.
struct VerifiedIndex {
    header: RepoHeader,
    apps: Vec<IndexedApp>,
    /// Set when the repo had no certificate yet and this one was accepted.
    new_certificate: Option<CertificateHex>,
}

struct Fetched {
    file: NamedTempFile,
    cache_tag: Option<String>,
    format: IndexFormat,
}

pub struct RepoUpdater {
    downloader: Arc<dyn Downloader>,
    reporter: Arc<dyn UpdateReporter>,
    anchors: TrustAnchors,
    temp_dir: PathBuf,
    cancel: CancellationToken,
}

impl RepoUpdater {
    /// Downloads land in `temp_dir`, which should be on the same volume as
    /// the catalog.
    pub fn new(downloader: Arc<dyn Downloader>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            reporter: Arc::new(NullReporter),
            anchors: TrustAnchors::builtin(),
            temp_dir: temp_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn UpdateReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the built-in trust anchors.
    pub fn with_anchors(mut self, anchors: TrustAnchors) -> Self {
        self.anchors = anchors;
        self
    }

    /// Token that aborts in-flight downloads when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Update one repo. On success `repo` reflects the committed row; on
    /// failure both `repo` and the store are untouched.
    pub async fn update(
        &self,
        repo: &mut Repo,
        store: &mut dyn CatalogStore,
    ) -> Result<UpdateStatus, RepoUpdateError> {
        self.reporter.started(repo);
        let result = self
            .run(repo, store)
            .await
            .map_err(|cause| RepoUpdateError::new(repo, cause));
        self.reporter.finished(repo, &result);
        result
    }

    /// Update every repo in turn. A failure is recorded and the batch moves
    /// on to the next repo.
    pub async fn update_all(
        &self,
        repos: &mut [Repo],
        store: &mut dyn CatalogStore,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for repo in repos.iter_mut() {
            let result = self.update(repo, store).await;
            if let Err(e) = &result {
                tracing::warn!(repo = %repo.address, kind = %e.kind(), error = %e.message, "update failed");
            }
            report.results.push((repo.id, result));
        }
        report
    }

    async fn run(
        &self,
        repo: &mut Repo,
        store: &mut dyn CatalogStore,
    ) -> Result<UpdateStatus, UpdateError> {
        if self.cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let fetched = match self.fetch(repo, repo.format).await {
            Err(UpdateError::Network(DownloadError::NotFound(url)))
                if repo.format == IndexFormat::V1Json =>
            {
                tracing::warn!(repo = %repo.address, %url, "no v1 index, trying legacy index");
                self.fetch(repo, IndexFormat::LegacyXml).await
            }
            other => other,
        }?;
        let Some(Fetched {
            file,
            cache_tag,
            format,
        }) = fetched
        else {
            tracing::debug!(repo = %repo.address, "index not modified");
            return Ok(UpdateStatus::Unchanged);
        };

        let path = file.path().to_path_buf();
        let snapshot = repo.clone();
        let anchors = self.anchors.clone();
        let reporter = Arc::clone(&self.reporter);
        let verified = tokio::task::spawn_blocking(move || {
            verify_and_parse(&path, format, &snapshot, &anchors, reporter.as_ref())
        })
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))??;
        drop(file);

        let VerifiedIndex {
            header,
            apps,
            new_certificate,
        } = verified;

        let mut updated = repo.clone();
        if !header.name.is_empty() {
            updated.name = header.name;
        }
        if !header.description.is_empty() {
            updated.description = header.description;
        }
        if !header.icon.is_empty() {
            updated.icon = header.icon;
        }
        updated.mirrors = header.mirrors;
        updated.timestamp = header.timestamp;
        updated.max_age = header.max_age;
        updated.version = header.version;
        updated.format = format;
        updated.last_etag = cache_tag;
        updated.last_updated = Some(chrono::Utc::now().timestamp_millis());
        if let Some(certificate) = new_certificate {
            updated.signing_certificate = Some(certificate);
        }

        let commit = RepoCommit {
            repo_id: repo.id,
            changes: RepoChanges::between(repo, &updated),
            apps,
        };
        let app_count = commit.apps.len();
        let apk_count = commit.apk_count();

        {
            let reporter = &self.reporter;
            let current_repo: &Repo = repo;
            store.commit(commit, &mut |current, total| {
                reporter.committing(current_repo, current, total);
            })?;
        }
        *repo = updated;

        tracing::info!(
            repo = %repo.address,
            apps = app_count,
            apks = apk_count,
            timestamp = repo.timestamp,
            "index committed"
        );
        Ok(UpdateStatus::Processed {
            apps: app_count,
            apks: apk_count,
            timestamp: repo.timestamp,
        })
    }

    /// Download `format`'s archive for `repo`. `None` means not modified.
    async fn fetch(&self, repo: &Repo, format: IndexFormat) -> Result<Option<Fetched>, UpdateError> {
        let file = tempfile::Builder::new()
            .prefix("index-")
            .suffix(".jar")
            .tempfile_in(&self.temp_dir)?;
        let request = DownloadRequest::new(index_url(&repo.address, format), file.path())
            .with_cache_tag(repo.last_etag.clone());

        let reporter = &self.reporter;
        let progress = |current: u64, total: Option<u64>| reporter.downloading(repo, current, total);

        tracing::debug!(url = %request.url, "downloading index");
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => return Err(UpdateError::Cancelled),
            outcome = self.downloader.download(&request, &progress) => outcome?,
        };

        Ok(match outcome {
            DownloadOutcome::NotModified => None,
            DownloadOutcome::Downloaded { cache_tag, size } => {
                tracing::debug!(url = %request.url, size, "index downloaded");
                Some(Fetched {
                    file,
                    cache_tag,
                    format,
                })
            }
        })
    }
}

/// Everything between the downloaded file and a commit-ready index. Blocking.
fn verify_and_parse(
    path: &Path,
    format: IndexFormat,
    repo: &Repo,
    anchors: &TrustAnchors,
    reporter: &dyn UpdateReporter,
) -> Result<VerifiedIndex, UpdateError> {
    let mut jar = SignedIndexJar::open(path, format.payload_entry())?;
    let new_certificate = trust::verify_certificate(repo, anchors, jar.certificate_der())?;

    let parser = index::parser_for(format, repo.id);
    let (header, apps) = jar.read_payload(|reader, size| {
        let mut reader =
            ProgressReader::new(reader, |read| reporter.processing(repo, read, Some(size)));
        let mut collector = IndexCollector::new();
        parser.parse(&mut reader, &mut collector)?;
        tracing::debug!(apps = collector.app_count(), bytes = reader.bytes_read(), "payload parsed");
        Ok(collector.finish()?)
    })?;

    if header.timestamp < repo.timestamp {
        return Err(UpdateError::Replay {
            current: repo.timestamp,
            found: header.timestamp,
        });
    }
    if format == IndexFormat::LegacyXml {
        trust::verify_header_certificate(header.pubkey.as_deref(), jar.certificate_der())?;
    }

    Ok(VerifiedIndex {
        header,
        apps,
        new_certificate,
    })
}
