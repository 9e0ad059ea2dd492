//! Streaming parser for `index-v1.json`.
//!
//! The document is walked with serde visitors instead of being loaded into a
//! `serde_json::Value`: each app and each package list is handed to the
//! receiver as soon as it has been read, so memory stays bounded by the
//! largest single entry. Unknown keys at any level are skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufReader, Read};
use std::str::FromStr;

use pkgsync_schema::{Apk, App, HashType, Localized, PackageName, Permission, RepoId};
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use super::{IndexParser, IndexReceiver, RepoHeader};
use crate::error::FormatError;

#[derive(Debug, Clone, Copy)]
pub struct JsonIndexParser {
    repo_id: RepoId,
}

impl JsonIndexParser {
    pub fn new(repo_id: RepoId) -> Self {
        Self { repo_id }
    }
}

impl IndexParser for JsonIndexParser {
    fn parse(
        &self,
        reader: &mut dyn Read,
        receiver: &mut dyn IndexReceiver,
    ) -> Result<(), FormatError> {
        let mut sink = Sink {
            repo_id: self.repo_id,
            receiver,
            failure: None,
        };
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(reader));
        let walked = Document { sink: &mut sink }
            .deserialize(&mut de)
            .and_then(|()| de.end());

        // A receiver error surfaces as a serde error; prefer the original.
        if let Some(failure) = sink.failure {
            return Err(failure);
        }
        walked.map_err(FormatError::from)
    }
}

struct Sink<'r> {
    repo_id: RepoId,
    receiver: &'r mut dyn IndexReceiver,
    failure: Option<FormatError>,
}

impl Sink<'_> {
    fn fail<E: de::Error>(&mut self, error: FormatError) -> E {
        let message = error.to_string();
        self.failure = Some(error);
        E::custom(message)
    }
}

struct Document<'s, 'r> {
    sink: &'s mut Sink<'r>,
}

impl<'de> DeserializeSeed<'de> for Document<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for Document<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an index object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "repo" => {
                    let header = map.next_value::<WireRepo>()?.into_header();
                    self.sink
                        .receiver
                        .receive_repo(header)
                        .map_err(|e| self.sink.fail(e))?;
                }
                "apps" => map.next_value_seed(Apps {
                    sink: &mut *self.sink,
                })?,
                "packages" => map.next_value_seed(Packages {
                    sink: &mut *self.sink,
                })?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

struct Apps<'s, 'r> {
    sink: &'s mut Sink<'r>,
}

impl<'de> DeserializeSeed<'de> for Apps<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Apps<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of apps")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(app) = seq.next_element::<WireApp>()? {
            let app = app.into_app(self.sink.repo_id);
            self.sink
                .receiver
                .receive_app(app)
                .map_err(|e| self.sink.fail(e))?;
        }
        Ok(())
    }
}

struct Packages<'s, 'r> {
    sink: &'s mut Sink<'r>,
}

impl<'de> DeserializeSeed<'de> for Packages<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for Packages<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of package name to releases")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(name) = map.next_key::<String>()? {
            let package = PackageName::new(name);
            let releases = map.next_value::<Vec<WirePackage>>()?;
            let repo_id = self.sink.repo_id;
            let apks = releases
                .into_iter()
                .map(|release| release.into_apk(&package, repo_id))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| self.sink.fail(e))?;
            self.sink
                .receiver
                .receive_apks(package, apks)
                .map_err(|e| self.sink.fail(e))?;
        }
        Ok(())
    }
}

/// Integers that some index generators emit as strings.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Number(T),
        Text(String),
    }

    match Option::<Lenient<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Lenient::Number(value)) => Ok(Some(value)),
        Some(Lenient::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Lenient::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Str(&text), &"an integer")
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRepo {
    timestamp: i64,
    version: i32,
    #[serde(rename = "maxage")]
    max_age: i32,
    name: Option<String>,
    description: Option<String>,
    icon: Option<String>,
    address: Option<String>,
    mirrors: Vec<String>,
}

impl WireRepo {
    fn into_header(self) -> RepoHeader {
        RepoHeader {
            timestamp: self.timestamp,
            version: self.version,
            max_age: self.max_age,
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            icon: self.icon.unwrap_or_default(),
            address: self.address,
            mirrors: self.mirrors,
            pubkey: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireLocalized {
    name: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    whats_new: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireApp {
    package_name: String,
    name: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    icon: Option<String>,
    license: Option<String>,
    web_site: Option<String>,
    source_code: Option<String>,
    issue_tracker: Option<String>,
    changelog: Option<String>,
    donate: Option<String>,
    categories: Vec<String>,
    anti_features: Vec<String>,
    requirements: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    suggested_version_code: Option<i64>,
    added: Option<i64>,
    last_updated: Option<i64>,
    preferred_signer: Option<String>,
    localized: BTreeMap<String, WireLocalized>,
}

/// First non-empty value in `en-US`, then `en`, then any locale.
fn from_locales(
    localized: &BTreeMap<String, Localized>,
    field: impl Fn(&Localized) -> Option<&String>,
) -> Option<String> {
    ["en-US", "en"]
        .iter()
        .filter_map(|tag| localized.get(*tag))
        .chain(localized.values())
        .filter_map(&field)
        .find(|value| !value.trim().is_empty())
        .cloned()
}

fn or_localized(
    value: Option<String>,
    localized: &BTreeMap<String, Localized>,
    field: impl Fn(&Localized) -> Option<&String>,
) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| from_locales(localized, field))
        .unwrap_or_default()
}

impl WireApp {
    fn into_app(self, repo_id: RepoId) -> App {
        let localized: BTreeMap<String, Localized> = self
            .localized
            .into_iter()
            .map(|(tag, l)| {
                let entry = Localized {
                    name: l.name,
                    summary: l.summary,
                    description: l.description,
                    whats_new: l.whats_new,
                };
                (tag, entry)
            })
            .collect();

        App {
            package_name: PackageName::new(self.package_name),
            repo_id,
            name: or_localized(self.name, &localized, |l| l.name.as_ref()),
            summary: or_localized(self.summary, &localized, |l| l.summary.as_ref()),
            description: or_localized(self.description, &localized, |l| l.description.as_ref()),
            icon: self.icon.unwrap_or_default(),
            license: self.license.unwrap_or_default(),
            web_site: self.web_site.unwrap_or_default(),
            source_code: self.source_code.unwrap_or_default(),
            issue_tracker: self.issue_tracker.unwrap_or_default(),
            changelog: self.changelog.unwrap_or_default(),
            donate: self.donate.unwrap_or_default(),
            categories: self.categories,
            anti_features: self.anti_features,
            requirements: self.requirements,
            suggested_version_code: self.suggested_version_code,
            added: self.added,
            last_updated: self.last_updated,
            preferred_signer: self.preferred_signer.filter(|s| !s.is_empty()),
            localized,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WirePackage {
    version_code: i64,
    version_name: Option<String>,
    apk_name: Option<String>,
    #[serde(rename = "srcname")]
    src_name: Option<String>,
    size: u64,
    hash: String,
    hash_type: Option<String>,
    sig: Option<String>,
    signer: Option<String>,
    #[serde(deserialize_with = "lenient")]
    min_sdk_version: Option<i32>,
    #[serde(deserialize_with = "lenient")]
    target_sdk_version: Option<i32>,
    #[serde(deserialize_with = "lenient")]
    max_sdk_version: Option<i32>,
    #[serde(rename = "uses-permission")]
    uses_permission: Vec<(String, Option<i32>)>,
    #[serde(rename = "uses-permission-sdk-23")]
    uses_permission_sdk_23: Vec<(String, Option<i32>)>,
    features: Vec<String>,
    #[serde(rename = "nativecode")]
    native_code: Vec<String>,
    anti_features: Vec<String>,
    added: Option<i64>,
}

impl WirePackage {
    fn into_apk(self, package: &PackageName, repo_id: RepoId) -> Result<Apk, FormatError> {
        let hash_type = match self.hash_type.as_deref() {
            None | Some("") => HashType::default(),
            Some(name) => name.parse().map_err(|_| FormatError::InvalidField {
                field: "hashType",
                value: name.to_string(),
            })?,
        };

        let sdk_23 = self
            .uses_permission_sdk_23
            .into_iter()
            .map(|(name, max_sdk)| Permission {
                name,
                max_sdk,
                min_sdk: Some(23),
            });
        let permissions = self
            .uses_permission
            .into_iter()
            .map(|(name, max_sdk)| Permission {
                name,
                max_sdk,
                min_sdk: None,
            })
            .chain(sdk_23)
            .collect();

        Ok(Apk {
            package_name: package.clone(),
            repo_id,
            version_code: self.version_code,
            version_name: self.version_name.unwrap_or_default(),
            apk_name: self.apk_name.unwrap_or_default(),
            src_name: self.src_name,
            size: self.size,
            hash: self.hash.to_ascii_lowercase(),
            hash_type,
            sig: self.sig.unwrap_or_default(),
            signer: self.signer.filter(|s| !s.is_empty()),
            min_sdk: self.min_sdk_version,
            target_sdk: self.target_sdk_version,
            max_sdk: self.max_sdk_version,
            permissions,
            features: self.features,
            native_code: self.native_code,
            anti_features: self.anti_features,
            added: self.added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexCollector;
    use pkgsync_schema::IndexedApp;

    fn parse(doc: &str) -> Result<(RepoHeader, Vec<IndexedApp>), FormatError> {
        let mut collector = IndexCollector::new();
        JsonIndexParser::new(RepoId(7)).parse(&mut doc.as_bytes(), &mut collector)?;
        collector.finish()
    }

    #[test]
    fn parses_minimal_index() {
        let doc = r#"{
            "repo": {"timestamp": 1000000, "version": 21, "maxage": 14, "name": "Example",
                     "mirrors": ["https://mirror.example.org/repo"]},
            "requests": {"install": [], "uninstall": []},
            "apps": [{"packageName": "org.example.app", "name": "Example",
                      "suggestedVersionCode": "1", "webSite": "https://example.org"}],
            "packages": {"org.example.app": [{
                "versionCode": 1, "versionName": "1.0", "hash": "ABCD", "hashType": "sha256",
                "signer": "2f4e", "size": 10, "minSdkVersion": "21",
                "uses-permission": [["android.permission.INTERNET", null]]
            }]}
        }"#;
        let (header, apps) = parse(doc).unwrap();

        assert_eq!(header.timestamp, 1_000_000);
        assert_eq!(header.max_age, 14);
        assert_eq!(header.mirrors.len(), 1);
        assert_eq!(header.pubkey, None);

        let app = &apps[0].app;
        assert_eq!(app.repo_id, RepoId(7));
        assert_eq!(app.suggested_version_code, Some(1));
        assert_eq!(app.web_site, "https://example.org");
        assert_eq!(app.preferred_signer.as_deref(), Some("2f4e"));

        let apk = &apps[0].apks[0];
        assert_eq!(apk.package_name, "org.example.app");
        assert_eq!(apk.hash, "abcd");
        assert_eq!(apk.min_sdk, Some(21));
        assert_eq!(
            apk.permissions,
            vec![Permission::new("android.permission.INTERNET")]
        );
    }

    #[test]
    fn unknown_keys_are_skipped_at_every_level() {
        let doc = r#"{
            "extra": [{"deep": {"deeper": null}}],
            "repo": {"timestamp": 1, "smuggled": {"x": [1, 2]}},
            "apps": [{"packageName": "a", "repoId": 999, "compatible": true}],
            "packages": {"a": [{"versionCode": 3, "hash": "00", "repoId": 999, "whatever": {}}]}
        }"#;
        let (_, apps) = parse(doc).unwrap();
        assert_eq!(apps[0].app.repo_id, RepoId(7));
        assert_eq!(apps[0].apks[0].repo_id, RepoId(7));
        assert_eq!(apps[0].apks[0].version_code, 3);
    }

    #[test]
    fn blank_fields_come_from_locales() {
        let doc = r#"{
            "repo": {"timestamp": 1},
            "apps": [{"packageName": "a", "localized": {
                "de": {"name": "Anderes", "summary": "Zusammenfassung"},
                "en-US": {"name": "Other", "whatsNew": "Fixes"}
            }}]
        }"#;
        let (_, apps) = parse(doc).unwrap();
        let app = &apps[0].app;
        assert_eq!(app.name, "Other");
        assert_eq!(app.summary, "Zusammenfassung");
        assert_eq!(app.description, "");
        assert_eq!(
            app.localized["en-US"].whats_new.as_deref(),
            Some("Fixes")
        );
    }

    #[test]
    fn sdk_23_permissions_carry_min_sdk() {
        let doc = r#"{
            "repo": {"timestamp": 1},
            "apps": [{"packageName": "a"}],
            "packages": {"a": [{"versionCode": 1,
                "uses-permission": [["android.permission.WRITE_EXTERNAL_STORAGE", 18]],
                "uses-permission-sdk-23": [["android.permission.CAMERA", null]]}]}
        }"#;
        let (_, apps) = parse(doc).unwrap();
        let permissions = &apps[0].apks[0].permissions;
        assert_eq!(permissions[0].max_sdk, Some(18));
        assert_eq!(permissions[1].name, "android.permission.CAMERA");
        assert_eq!(permissions[1].min_sdk, Some(23));
    }

    #[test]
    fn unknown_hash_type_is_rejected() {
        let doc = r#"{"repo": {"timestamp": 1}, "apps": [],
            "packages": {"a": [{"versionCode": 1, "hashType": "md4"}]}}"#;
        assert!(matches!(
            parse(doc),
            Err(FormatError::InvalidField { field: "hashType", .. })
        ));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(parse("[]"), Err(FormatError::Json(_))));
        assert!(matches!(parse(r#"{"repo": {"timestamp": 1}"#), Err(FormatError::Json(_))));
        assert!(matches!(parse(r#"{"repo": {"timestamp": 1}} trailing"#), Err(FormatError::Json(_))));
        assert!(matches!(
            parse(r#"{"repo": {"timestamp": "soon"}}"#),
            Err(FormatError::Json(_))
        ));
        assert!(matches!(parse(r#"{"apps": []}"#), Err(FormatError::MissingHeader)));
    }

    #[test]
    fn receiver_errors_are_returned_unchanged() {
        let doc = r#"{"repo": {"timestamp": 1}, "repo": {"timestamp": 2}}"#;
        assert!(matches!(
            parse(doc),
            Err(FormatError::InvalidField { field: "repo", .. })
        ));
    }
}
