//! Repository index updater.
//!
//! Downloads a repo's signed index archive, checks who signed it against the
//! stored trust state, streams the payload through the matching parser and
//! hands the result to a [`CatalogStore`] in one commit.
//!
//! The pipeline lives in [`updater`]; everything else is a stage it drives.

pub mod error;
pub mod index;
pub mod io;
pub mod jar;
pub mod paths;
pub mod reporter;
pub mod store;
pub mod trust;
pub mod updater;

pub use error::{
    ErrorKind, FormatError, RepoUpdateError, SigningError, StoreError, UpdateError,
};
pub use io::download::{DownloadError, Downloader, DownloadOutcome, DownloadRequest};
pub use paths::{Layout, pkgsync_home};
pub use reporter::{NullReporter, UpdateReporter};
pub use store::{CatalogStore, RepoCommit};
pub use trust::{TrustAnchor, TrustAnchors};
pub use updater::{BatchReport, RepoUpdater, UpdateStatus};

/// User Agent string for index downloads
pub const USER_AGENT: &str = concat!("pkgsync/", env!("CARGO_PKG_VERSION"));

/// Sent as `client_version` on index requests so servers can tell clients apart.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
