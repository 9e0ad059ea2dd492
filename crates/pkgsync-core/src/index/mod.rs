//! Index parsers.
//!
//! Two wire formats, one interface: a parser reads a byte stream and pushes
//! records into an [`IndexReceiver`]. Parsers hold no state between calls;
//! everything they accumulate lives on the stack of one `parse` call.

pub mod json;
pub mod xml;

use std::collections::HashMap;
use std::io::Read;

use pkgsync_schema::{Apk, App, IndexFormat, IndexedApp, PackageName, RepoId};

use crate::error::FormatError;

/// Repo metadata carried at the top of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoHeader {
    pub timestamp: i64,
    pub version: i32,
    pub max_age: i32,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub address: Option<String>,
    pub mirrors: Vec<String>,
    /// Hex certificate echoed by legacy XML indexes.
    pub pubkey: Option<String>,
}

/// Sink for parser output.
pub trait IndexReceiver {
    /// Called exactly once per successful parse.
    fn receive_repo(&mut self, header: RepoHeader) -> Result<(), FormatError>;

    fn receive_app(&mut self, app: App) -> Result<(), FormatError>;

    /// Releases of one package. The app itself may arrive before or after.
    fn receive_apks(&mut self, package: PackageName, apks: Vec<Apk>) -> Result<(), FormatError>;
}

pub trait IndexParser: Send + Sync {
    fn parse(
        &self,
        reader: &mut dyn Read,
        receiver: &mut dyn IndexReceiver,
    ) -> Result<(), FormatError>;
}

/// Parser for `format`, stamping records with `repo_id`.
pub fn parser_for(format: IndexFormat, repo_id: RepoId) -> Box<dyn IndexParser> {
    match format {
        IndexFormat::LegacyXml => Box::new(xml::XmlIndexParser::new(repo_id)),
        IndexFormat::V1Json => Box::new(json::JsonIndexParser::new(repo_id)),
    }
}

/// Receiver that gathers a whole index for one atomic commit.
///
/// Packages without a matching app are dropped. An app without an explicit
/// preferred signer gets the signer of its first release.
#[derive(Debug, Default)]
pub struct IndexCollector {
    header: Option<RepoHeader>,
    apps: Vec<App>,
    apks: HashMap<PackageName, Vec<Apk>>,
}

impl IndexCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    pub fn finish(self) -> Result<(RepoHeader, Vec<IndexedApp>), FormatError> {
        let header = self.header.ok_or(FormatError::MissingHeader)?;
        let mut apks = self.apks;

        let apps: Vec<IndexedApp> = self
            .apps
            .into_iter()
            .map(|mut app| {
                let releases = apks.remove(&app.package_name).unwrap_or_default();
                if app.preferred_signer.is_none() {
                    app.preferred_signer = releases.first().and_then(|apk| {
                        apk.signer
                            .clone()
                            .or_else(|| (!apk.sig.is_empty()).then(|| apk.sig.clone()))
                    });
                }
                IndexedApp {
                    app,
                    apks: releases,
                }
            })
            .collect();

        if !apks.is_empty() {
            tracing::debug!(count = apks.len(), "dropping packages without an app entry");
        }
        Ok((header, apps))
    }
}

impl IndexReceiver for IndexCollector {
    fn receive_repo(&mut self, header: RepoHeader) -> Result<(), FormatError> {
        if self.header.is_some() {
            return Err(FormatError::InvalidField {
                field: "repo",
                value: "duplicate header".to_string(),
            });
        }
        self.header = Some(header);
        Ok(())
    }

    fn receive_app(&mut self, app: App) -> Result<(), FormatError> {
        self.apps.push(app);
        Ok(())
    }

    fn receive_apks(&mut self, package: PackageName, apks: Vec<Apk>) -> Result<(), FormatError> {
        self.apks.entry(package).or_default().extend(apks);
        Ok(())
    }
}

/// Splits a comma-separated list, dropping empty items.
pub(crate) fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
