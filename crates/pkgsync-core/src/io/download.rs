//! Index archive downloads.
//!
//! The updater only sees the [`Downloader`] trait: fetch a URL into a file,
//! honouring the previous cache tag. HTTP(S) goes through reqwest; `file://`
//! addresses (USB sticks, local mirrors) are copied from disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),
}

/// Progress callback: bytes received so far and the expected total, if known.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// One download: where from, where to, and the tag of the copy we already have.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub cache_tag: Option<String>,
    pub dest: PathBuf,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            cache_tag: None,
            dest: dest.into(),
        }
    }

    pub fn with_cache_tag(mut self, tag: Option<String>) -> Self {
        self.cache_tag = tag;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The server copy matches `cache_tag`; `dest` was not written.
    NotModified,
    /// `dest` holds a fresh copy.
    Downloaded {
        cache_tag: Option<String>,
        size: u64,
    },
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: ProgressFn<'_>,
    ) -> Result<DownloadOutcome, DownloadError>;
}

/// Streams HTTP(S) responses to disk.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: ProgressFn<'_>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let mut builder = self.client.get(&request.url);
        if let Some(tag) = &request.cache_tag {
            builder = builder.header(IF_NONE_MATCH, tag.as_str());
        }
        let response = builder.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(url = %request.url, "server reports not modified");
            return Ok(DownloadOutcome::NotModified);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound(request.url.clone()));
        }
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Some servers ignore If-None-Match but still send the same ETag.
        if let (Some(etag), Some(previous)) = (&etag, &request.cache_tag) {
            if etag == previous {
                tracing::debug!(url = %request.url, "etag unchanged");
                return Ok(DownloadOutcome::NotModified);
            }
        }

        let total = response.content_length();
        progress(0, total);

        let mut file = File::create(&request.dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded, total);
        }
        file.flush().await?;

        Ok(DownloadOutcome::Downloaded {
            cache_tag: etag,
            size: downloaded,
        })
    }
}

/// Copies `file://` URLs. The cache tag is derived from size and mtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDownloader;

impl LocalDownloader {
    fn source_path(url: &str) -> Result<PathBuf, DownloadError> {
        Url::parse(url)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| DownloadError::UnsupportedUrl(url.to_string()))
    }

    async fn cache_tag(path: &Path) -> Result<String, DownloadError> {
        let meta = tokio::fs::metadata(path).await?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok(format!("{:x}-{mtime:x}", meta.len()))
    }
}

#[async_trait]
impl Downloader for LocalDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: ProgressFn<'_>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let source = Self::source_path(&request.url)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(DownloadError::NotFound(request.url.clone()));
        }

        let tag = Self::cache_tag(&source).await?;
        if request.cache_tag.as_deref() == Some(tag.as_str()) {
            return Ok(DownloadOutcome::NotModified);
        }

        let size = tokio::fs::copy(&source, &request.dest).await?;
        progress(size, Some(size));
        Ok(DownloadOutcome::Downloaded {
            cache_tag: Some(tag),
            size,
        })
    }
}

/// Routes each request by URL scheme.
#[derive(Debug, Clone)]
pub struct SchemeDownloader {
    http: HttpDownloader,
    local: LocalDownloader,
}

impl SchemeDownloader {
    pub fn new(http: HttpDownloader) -> Self {
        Self {
            http,
            local: LocalDownloader,
        }
    }
}

#[async_trait]
impl Downloader for SchemeDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: ProgressFn<'_>,
    ) -> Result<DownloadOutcome, DownloadError> {
        if request.url.starts_with("file:") {
            self.local.download(request, progress).await
        } else if request.url.starts_with("http://") || request.url.starts_with("https://") {
            self.http.download(request, progress).await
        } else {
            Err(DownloadError::UnsupportedUrl(request.url.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::sync::Mutex;

    fn no_progress(_: u64, _: Option<u64>) {}

    #[tokio::test]
    async fn http_download_writes_file_and_returns_etag() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repo/index-v1.jar")
            .with_status(200)
            .with_header("etag", "\"abc\"")
            .with_body("jar bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index.jar");
        let request = DownloadRequest::new(format!("{}/repo/index-v1.jar", server.url()), &dest);

        let seen = Mutex::new(Vec::new());
        let record = |current: u64, _: Option<u64>| seen.lock().unwrap().push(current);

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let outcome = downloader.download(&request, &record).await.unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Downloaded {
                cache_tag: Some("\"abc\"".to_string()),
                size: 9
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"jar bytes");
        assert_eq!(seen.lock().unwrap().last(), Some(&9));
    }

    #[tokio::test]
    async fn http_download_sends_cache_tag_and_honours_304() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/index-v1.jar")
            .match_header("if-none-match", "\"abc\"")
            .with_status(304)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index.jar");
        let request = DownloadRequest::new(format!("{}/index-v1.jar", server.url()), &dest)
            .with_cache_tag(Some("\"abc\"".to_string()));

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let outcome = downloader.download(&request, &no_progress).await.unwrap();

        assert_eq!(outcome, DownloadOutcome::NotModified);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn http_download_treats_identical_etag_as_not_modified() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/index-v1.jar")
            .with_status(200)
            .with_header("etag", "\"same\"")
            .with_body("ignored")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let request =
            DownloadRequest::new(format!("{}/index-v1.jar", server.url()), dir.path().join("x"))
                .with_cache_tag(Some("\"same\"".to_string()));

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let outcome = downloader.download(&request, &no_progress).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::NotModified);
    }

    #[tokio::test]
    async fn http_download_maps_404_to_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/index-v1.jar")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let request =
            DownloadRequest::new(format!("{}/index-v1.jar", server.url()), dir.path().join("x"));

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let err = downloader.download(&request, &no_progress).await.unwrap_err();
        assert!(matches!(err, DownloadError::NotFound(_)));
    }

    #[tokio::test]
    async fn http_download_reports_server_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/index-v1.jar")
            .with_status(503)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let request =
            DownloadRequest::new(format!("{}/index-v1.jar", server.url()), dir.path().join("x"));

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let err = downloader.download(&request, &no_progress).await.unwrap_err();
        assert!(matches!(err, DownloadError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn local_download_copies_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("index-v1.jar");
        std::fs::write(&source, b"local jar").unwrap();
        let url = Url::from_file_path(&source).unwrap().to_string();

        let dest = dir.path().join("copy.jar");
        let first = LocalDownloader
            .download(&DownloadRequest::new(&url, &dest), &no_progress)
            .await
            .unwrap();
        let DownloadOutcome::Downloaded { cache_tag, size } = first else {
            panic!("expected a download, got {first:?}");
        };
        assert_eq!(size, 9);
        assert_eq!(std::fs::read(&dest).unwrap(), b"local jar");

        let again = LocalDownloader
            .download(
                &DownloadRequest::new(&url, &dest).with_cache_tag(cache_tag),
                &no_progress,
            )
            .await
            .unwrap();
        assert_eq!(again, DownloadOutcome::NotModified);
    }

    #[tokio::test]
    async fn scheme_downloader_rejects_unknown_schemes() {
        let downloader = SchemeDownloader::new(HttpDownloader::new(Duration::from_secs(5)).unwrap());
        let err = downloader
            .download(&DownloadRequest::new("ftp://example.org/x", "/tmp/x"), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedUrl(_)));
    }
}
