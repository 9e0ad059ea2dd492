//! pkgsync - signed repository index client
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Keeps a local SQLite catalog of installable packages in sync with remote
//! repositories that publish signed indexes.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.pkgsync/
//! ├── config.toml  # Network settings, trust anchors, seeded repos
//! ├── cache/       # Index archives while they are being verified
//! └── state.db     # SQLite catalog
//! ```

pub mod cmd;
pub mod config;
pub mod context;
pub mod store;
pub mod ui;

pub use crate::store::db;
pub use pkgsync_core::paths::*;

use clap::{Parser, Subcommand};
use pkgsync_schema::IndexFormat;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pkgsync")]
#[command(author, version, about = "pkgsync - keep a package catalog in sync with signed repositories")]
pub struct Cli {
    /// Home directory holding the catalog and configuration
    #[arg(long, global = true, env = "PKGSYNC_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Download, verify and import repository indexes
    Update {
        /// Only update this repository
        #[arg(long)]
        repo: Option<i64>,
    },
    /// List catalog entries
    Apps {
        /// Only list apps from this repository
        #[arg(long)]
        repo: Option<i64>,
        /// Filter by package name or display name
        query: Option<String>,
    },
    /// Print the SHA-256 fingerprint of a certificate or of a signed index's signer
    Fingerprint {
        /// DER certificate, or a signed index archive (.jar)
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository address, e.g. https://f-droid.org/repo
        address: String,
        /// Expected signing certificate fingerprint (SHA-256, any separators)
        #[arg(long)]
        fingerprint: Option<String>,
        /// Index format to fetch
        #[arg(long, default_value_t = IndexFormat::V1Json)]
        format: IndexFormat,
    },
    /// List repositories
    List,
    /// Remove a repository and its catalog entries
    Remove {
        /// Repository id as shown by `repo list`
        id: i64,
    },
}
