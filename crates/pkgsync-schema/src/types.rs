//! Catalog records: repos, apps and their releases.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cert::{CertificateHex, Fingerprint};
use crate::hash::HashType;

/// Local identifier of a configured repository.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RepoId(pub i64);

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire format of a repository index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexFormat {
    /// `index.jar` carrying `index.xml`.
    #[serde(rename = "xml")]
    LegacyXml,
    /// `index-v1.jar` carrying `index-v1.json`.
    #[default]
    #[serde(rename = "v1")]
    V1Json,
}

impl IndexFormat {
    /// File name of the signed archive, relative to the repo address.
    pub fn jar_name(self) -> &'static str {
        match self {
            Self::LegacyXml => "index.jar",
            Self::V1Json => "index-v1.jar",
        }
    }

    /// Name of the single payload entry inside the archive.
    pub fn payload_entry(self) -> &'static str {
        match self {
            Self::LegacyXml => "index.xml",
            Self::V1Json => "index-v1.json",
        }
    }

    /// Short name used in configuration and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LegacyXml => "xml",
            Self::V1Json => "v1",
        }
    }
}

impl fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" | "legacy" => Ok(Self::LegacyXml),
            "v1" | "json" => Ok(Self::V1Json),
            other => Err(format!("Unknown index format '{other}' (expected 'v1' or 'xml')")),
        }
    }
}

/// Trust and freshness record for one remote repository.
///
/// `timestamp` never decreases across successful updates, and
/// `signing_certificate` is never replaced once set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    /// Local identifier.
    pub id: RepoId,
    /// Base URL; index files are fetched relative to it.
    pub address: String,
    /// Display name from the index header.
    pub name: String,
    /// Display description from the index header.
    pub description: String,
    /// Icon file name from the index header.
    pub icon: String,
    /// Alternative addresses published by the repo.
    pub mirrors: Vec<String>,
    /// Fingerprint supplied out of band by the user, if any.
    pub fingerprint: Option<Fingerprint>,
    /// Certificate that signed the last accepted index. `None` until first contact.
    pub signing_certificate: Option<CertificateHex>,
    /// Cache tag of the last accepted download.
    pub last_etag: Option<String>,
    /// Header timestamp of the last accepted index.
    pub timestamp: i64,
    /// Days after which the index should be considered stale.
    pub max_age: i32,
    /// Index format version announced by the server.
    pub version: i32,
    /// Which index the repo is fetched as.
    pub format: IndexFormat,
    /// Local wall clock of the last accepted update, epoch millis.
    pub last_updated: Option<i64>,
}

impl Repo {
    /// A repo that has never been contacted.
    pub fn new(id: RepoId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into().trim_end_matches('/').to_string(),
            name: String::new(),
            description: String::new(),
            icon: String::new(),
            mirrors: Vec::new(),
            fingerprint: None,
            signing_certificate: None,
            last_etag: None,
            timestamp: 0,
            max_age: 0,
            version: 0,
            format: IndexFormat::default(),
            last_updated: None,
        }
    }

    /// Apply a committed diff to the in-memory record.
    pub fn apply(&mut self, changes: &RepoChanges) {
        if let Some(name) = &changes.name {
            self.name.clone_from(name);
        }
        if let Some(description) = &changes.description {
            self.description.clone_from(description);
        }
        if let Some(icon) = &changes.icon {
            self.icon.clone_from(icon);
        }
        if let Some(mirrors) = &changes.mirrors {
            self.mirrors.clone_from(mirrors);
        }
        if let Some(cert) = &changes.signing_certificate {
            self.signing_certificate = Some(cert.clone());
        }
        if let Some(etag) = &changes.last_etag {
            self.last_etag.clone_from(etag);
        }
        if let Some(timestamp) = changes.timestamp {
            self.timestamp = timestamp;
        }
        if let Some(max_age) = changes.max_age {
            self.max_age = max_age;
        }
        if let Some(version) = changes.version {
            self.version = version;
        }
        if let Some(format) = changes.format {
            self.format = format;
        }
        if let Some(last_updated) = changes.last_updated {
            self.last_updated = Some(last_updated);
        }
    }
}

/// Repo metadata diff handed to the store: only fields that changed are `Some`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoChanges {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New icon.
    pub icon: Option<String>,
    /// New mirror list.
    pub mirrors: Option<Vec<String>>,
    /// Certificate pinned on first contact.
    pub signing_certificate: Option<CertificateHex>,
    /// New cache tag. `Some(None)` clears a tag the server stopped sending.
    pub last_etag: Option<Option<String>>,
    /// New header timestamp.
    pub timestamp: Option<i64>,
    /// New max age.
    pub max_age: Option<i32>,
    /// New format version.
    pub version: Option<i32>,
    /// Index format switched (legacy fallback).
    pub format: Option<IndexFormat>,
    /// Time of this update.
    pub last_updated: Option<i64>,
}

impl RepoChanges {
    /// Field-by-field diff from `old` to `new`.
    pub fn between(old: &Repo, new: &Repo) -> Self {
        fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
            (old != new).then(|| new.clone())
        }
        Self {
            name: changed(&old.name, &new.name),
            description: changed(&old.description, &new.description),
            icon: changed(&old.icon, &new.icon),
            mirrors: changed(&old.mirrors, &new.mirrors),
            signing_certificate: changed(&old.signing_certificate, &new.signing_certificate)
                .flatten(),
            last_etag: changed(&old.last_etag, &new.last_etag),
            timestamp: changed(&old.timestamp, &new.timestamp),
            max_age: changed(&old.max_age, &new.max_age),
            version: changed(&old.version, &new.version),
            format: changed(&old.format, &new.format),
            last_updated: changed(&old.last_updated, &new.last_updated).flatten(),
        }
    }

    /// True if nothing changed.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An Android package name. Case-sensitive, as on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Wrap a package name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Per-locale display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized {
    /// Localized name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Localized one-line summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Localized long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Localized release notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whats_new: Option<String>,
}

/// A catalog entry: one application offered by one repo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct App {
    /// Key within the repo.
    pub package_name: PackageName,
    /// Owning repo.
    pub repo_id: RepoId,
    /// Display name.
    pub name: String,
    /// One-line summary.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Icon file name.
    pub icon: String,
    /// License identifier.
    pub license: String,
    /// Project web site.
    pub web_site: String,
    /// Source code URL.
    pub source_code: String,
    /// Issue tracker URL.
    pub issue_tracker: String,
    /// Changelog URL.
    pub changelog: String,
    /// Donation URL.
    pub donate: String,
    /// Categories, in index order.
    pub categories: Vec<String>,
    /// Anti-features flagged by the repo maintainers.
    pub anti_features: Vec<String>,
    /// Device requirements (e.g. `root`).
    pub requirements: Vec<String>,
    /// Version code the repo recommends.
    pub suggested_version_code: Option<i64>,
    /// Epoch millis the app was added to the repo.
    pub added: Option<i64>,
    /// Epoch millis of the last change to the app.
    pub last_updated: Option<i64>,
    /// Hash of the app-signing certificate of the first release. Unrelated to
    /// the repo's own signing certificate.
    pub preferred_signer: Option<String>,
    /// Display strings keyed by locale tag.
    pub localized: BTreeMap<String, Localized>,
}

/// One `uses-permission` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Fully qualified permission name.
    pub name: String,
    /// Only requested up to this SDK level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sdk: Option<i32>,
    /// Only requested from this SDK level (`uses-permission-sdk-23`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sdk: Option<i32>,
}

impl Permission {
    /// A permission requested on every SDK level.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_sdk: None,
            min_sdk: None,
        }
    }
}

/// One downloadable release of an app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Apk {
    /// Package this release belongs to.
    pub package_name: PackageName,
    /// Owning repo.
    pub repo_id: RepoId,
    /// Monotonic version code.
    pub version_code: i64,
    /// Display version.
    pub version_name: String,
    /// File name relative to the repo address.
    pub apk_name: String,
    /// Source tarball file name, if published.
    pub src_name: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Content hash, lowercase hex.
    pub hash: String,
    /// Algorithm of `hash`.
    pub hash_type: HashType,
    /// MD5 of the app-signing certificate, as published by older servers.
    pub sig: String,
    /// SHA-256 of the app-signing certificate.
    pub signer: Option<String>,
    /// Minimum SDK level.
    pub min_sdk: Option<i32>,
    /// Target SDK level.
    pub target_sdk: Option<i32>,
    /// Maximum SDK level.
    pub max_sdk: Option<i32>,
    /// Requested permissions.
    pub permissions: Vec<Permission>,
    /// Required hardware/software features.
    pub features: Vec<String>,
    /// Native ABIs.
    pub native_code: Vec<String>,
    /// Release-specific anti-features.
    pub anti_features: Vec<String>,
    /// Epoch millis the release was added.
    pub added: Option<i64>,
}

/// An app together with its releases, as emitted by an index parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedApp {
    /// Catalog entry.
    pub app: App,
    /// Releases, in index order.
    pub apks: Vec<Apk>,
}
