//! Legacy `index.xml` parser.
//!
//! ```xml
//! <fdroid>
//!   <repo timestamp=".." version=".." maxage=".." name=".." pubkey="..">
//!     <description>..</description>
//!     <mirror>..</mirror>
//!   </repo>
//!   <application id="..">
//!     <name>..</name> ...
//!     <package><versioncode>..</versioncode> ...</package>
//!   </application>
//! </fdroid>
//! ```
//!
//! Older servers use `<repo>` as the document root with the applications
//! nested inside it; both layouts are accepted. The header is emitted when the
//! root element closes, after every application.

use std::io::Read;
use std::mem;

use chrono::NaiveDate;
use pkgsync_schema::{Apk, App, HashType, PackageName, Permission, RepoId};
use xml::attribute::OwnedAttribute;
use xml::reader::{EventReader, XmlEvent};

use super::{IndexParser, IndexReceiver, RepoHeader, split_list};
use crate::error::FormatError;

#[derive(Debug, Clone, Copy)]
pub struct XmlIndexParser {
    repo_id: RepoId,
}

impl XmlIndexParser {
    pub fn new(repo_id: RepoId) -> Self {
        Self { repo_id }
    }
}

impl IndexParser for XmlIndexParser {
    fn parse(
        &self,
        reader: &mut dyn Read,
        receiver: &mut dyn IndexReceiver,
    ) -> Result<(), FormatError> {
        let mut run = Run {
            repo_id: self.repo_id,
            state: State::OutsideApp,
            text: String::new(),
            depth: 0,
            header: None,
            receiver,
        };
        for event in EventReader::new(reader) {
            match event? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    run.depth += 1;
                    run.start(&name.local_name, &attributes)?;
                }
                XmlEvent::EndElement { name } => {
                    run.depth -= 1;
                    run.end(&name.local_name)?;
                }
                XmlEvent::Characters(text) | XmlEvent::CData(text) => run.text.push_str(&text),
                _ => {}
            }
        }
        Ok(())
    }
}

enum State {
    OutsideApp,
    InApp(App, Vec<Apk>),
    InPackage(App, Vec<Apk>, Apk),
}

/// Accumulators for one document.
struct Run<'r> {
    repo_id: RepoId,
    state: State,
    text: String,
    depth: usize,
    header: Option<RepoHeader>,
    receiver: &'r mut dyn IndexReceiver,
}

fn attr<'a>(attributes: &'a [OwnedAttribute], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.local_name == key)
        .map(|a| a.value.as_str())
}

fn int<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, FormatError> {
    value.trim().parse().map_err(|_| FormatError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn opt_int<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<Option<T>, FormatError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    int(field, value).map(Some)
}

/// `YYYY-MM-DD` as epoch millis at midnight UTC.
fn date_millis(value: &str) -> Option<i64> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Bare names such as `INTERNET` are shorthand for `android.permission.INTERNET`.
fn permission_name(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("android.permission.{name}")
    }
}

impl Run<'_> {
    fn start(&mut self, element: &str, attributes: &[OwnedAttribute]) -> Result<(), FormatError> {
        self.text.clear();
        let state = mem::replace(&mut self.state, State::OutsideApp);
        self.state = match (state, element) {
            (State::OutsideApp, "repo") => {
                if self.header.is_some() {
                    return Err(FormatError::InvalidField {
                        field: "repo",
                        value: "duplicate header".to_string(),
                    });
                }
                self.header = Some(self.repo_header(attributes)?);
                State::OutsideApp
            }
            (State::OutsideApp, "application") => {
                let app = App {
                    package_name: PackageName::new(attr(attributes, "id").unwrap_or_default()),
                    repo_id: self.repo_id,
                    ..App::default()
                };
                State::InApp(app, Vec::new())
            }
            (State::InApp(app, apks), "package") => {
                let apk = Apk {
                    package_name: app.package_name.clone(),
                    repo_id: self.repo_id,
                    ..Apk::default()
                };
                State::InPackage(app, apks, apk)
            }
            (State::InPackage(app, apks, mut apk), "hash") => {
                if let Some(kind) = attr(attributes, "type") {
                    apk.hash_type = kind.parse::<HashType>().map_err(|_| {
                        FormatError::InvalidField {
                            field: "hash type",
                            value: kind.to_string(),
                        }
                    })?;
                }
                State::InPackage(app, apks, apk)
            }
            (State::InPackage(app, apks, mut apk), "uses-permission" | "uses-permission-sdk-23") => {
                if let Some(name) = attr(attributes, "name") {
                    apk.permissions.push(Permission {
                        name: permission_name(name),
                        max_sdk: attr(attributes, "maxSdkVersion")
                            .map(|v| int("maxSdkVersion", v))
                            .transpose()?,
                        min_sdk: (element == "uses-permission-sdk-23").then_some(23),
                    });
                }
                State::InPackage(app, apks, apk)
            }
            (state, _) => state,
        };
        Ok(())
    }

    fn repo_header(&self, attributes: &[OwnedAttribute]) -> Result<RepoHeader, FormatError> {
        let get = |key: &str| attr(attributes, key).unwrap_or_default();
        Ok(RepoHeader {
            timestamp: opt_int("timestamp", get("timestamp"))?.unwrap_or_default(),
            version: opt_int("version", get("version"))?.unwrap_or_default(),
            max_age: opt_int("maxage", get("maxage"))?.unwrap_or_default(),
            name: get("name").to_string(),
            description: get("description").to_string(),
            icon: get("icon").to_string(),
            address: attr(attributes, "url").map(str::to_string),
            mirrors: Vec::new(),
            pubkey: attr(attributes, "pubkey").map(str::to_string),
        })
    }

    fn end(&mut self, element: &str) -> Result<(), FormatError> {
        let text = mem::take(&mut self.text);
        let state = mem::replace(&mut self.state, State::OutsideApp);
        self.state = match state {
            State::OutsideApp => {
                if let Some(header) = self.header.as_mut() {
                    match element {
                        "description" => header.description = text.trim().to_string(),
                        "mirror" => header.mirrors.push(text.trim().to_string()),
                        _ => {}
                    }
                }
                if self.depth == 0 {
                    let header = self.header.take().ok_or(FormatError::MissingHeader)?;
                    self.receiver.receive_repo(header)?;
                }
                State::OutsideApp
            }
            State::InApp(app, apks) if element == "application" => {
                let package = app.package_name.clone();
                self.receiver.receive_app(app)?;
                self.receiver.receive_apks(package, apks)?;
                State::OutsideApp
            }
            State::InApp(mut app, apks) => {
                app_field(&mut app, element, text)?;
                State::InApp(app, apks)
            }
            State::InPackage(app, mut apks, apk) if element == "package" => {
                apks.push(apk);
                State::InApp(app, apks)
            }
            State::InPackage(app, apks, mut apk) => {
                apk_field(&mut apk, element, &text)?;
                State::InPackage(app, apks, apk)
            }
        };
        Ok(())
    }
}

fn app_field(app: &mut App, element: &str, text: String) -> Result<(), FormatError> {
    match element {
        "id" if !text.trim().is_empty() => app.package_name = PackageName::new(text.trim()),
        "name" => app.name = text,
        "summary" => app.summary = text,
        "icon" => app.icon = text,
        "desc" => app.description = text,
        "license" => app.license = text,
        "web" => app.web_site = text,
        "source" => app.source_code = text,
        "tracker" => app.issue_tracker = text,
        "changelog" => app.changelog = text,
        "donate" => app.donate = text,
        "categories" => {
            for category in split_list(&text) {
                if !app.categories.contains(&category) {
                    app.categories.push(category);
                }
            }
        }
        "category" => {
            let category = text.trim().to_string();
            if !category.is_empty() && !app.categories.contains(&category) {
                app.categories.push(category);
            }
        }
        "antifeatures" => app.anti_features = split_list(&text),
        "requirements" => app.requirements = split_list(&text),
        "marketvercode" => app.suggested_version_code = opt_int("marketvercode", &text)?,
        "added" => app.added = date_millis(&text),
        "lastupdated" => app.last_updated = date_millis(&text),
        _ => {}
    }
    Ok(())
}

fn apk_field(apk: &mut Apk, element: &str, text: &str) -> Result<(), FormatError> {
    match element {
        "version" => apk.version_name = text.to_string(),
        "versioncode" => apk.version_code = int("versioncode", text)?,
        "apkname" => apk.apk_name = text.trim().to_string(),
        "srcname" => apk.src_name = Some(text.trim().to_string()),
        "hash" => apk.hash = text.trim().to_ascii_lowercase(),
        "size" => apk.size = int("size", text)?,
        "sdkver" => apk.min_sdk = opt_int("sdkver", text)?,
        "targetSdkVersion" => apk.target_sdk = opt_int("targetSdkVersion", text)?,
        "maxsdkver" => apk.max_sdk = opt_int("maxsdkver", text)?,
        "added" => apk.added = date_millis(text),
        "sig" => apk.sig = text.trim().to_string(),
        "permissions" => apk.permissions.extend(
            split_list(text)
                .iter()
                .map(|name| Permission::new(permission_name(name))),
        ),
        "features" => apk.features = split_list(text),
        "nativecode" => apk.native_code = split_list(text),
        "antifeatures" => apk.anti_features = split_list(text),
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexCollector;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<fdroid>
  <repo icon="icon.png" maxage="14" name="Example Repo" pubkey="3082abcd" timestamp="1000000" url="https://repo.example.org/fdroid/repo" version="21">
    <description>A test repo.</description>
    <mirror>https://mirror.example.org/fdroid/repo</mirror>
  </repo>
  <application id="org.example.app">
    <id>org.example.app</id>
    <added>2017-07-14</added>
    <name>Example</name>
    <desc>&lt;p&gt;Does things.&lt;/p&gt;</desc>
    <categories>System,Development</categories>
    <category>System</category>
    <antifeatures>Ads,Tracking</antifeatures>
    <marketvercode>1</marketvercode>
    <package>
      <version>1.0</version>
      <versioncode>1</versioncode>
      <hash type="sha256">ABCDEF</hash>
      <size>12345</size>
      <sdkver>21</sdkver>
      <maxsdkver>28</maxsdkver>
      <sig>0123</sig>
      <permissions>INTERNET,com.example.CUSTOM</permissions>
      <nativecode>arm64-v8a,armeabi-v7a</nativecode>
    </package>
  </application>
</fdroid>"#;

    fn parse(doc: &str) -> Result<(RepoHeader, Vec<pkgsync_schema::IndexedApp>), FormatError> {
        let mut collector = IndexCollector::new();
        XmlIndexParser::new(RepoId(3)).parse(&mut doc.as_bytes(), &mut collector)?;
        collector.finish()
    }

    #[test]
    fn parses_header_apps_and_packages() {
        let (header, apps) = parse(DOC).unwrap();

        assert_eq!(header.timestamp, 1_000_000);
        assert_eq!(header.version, 21);
        assert_eq!(header.max_age, 14);
        assert_eq!(header.description, "A test repo.");
        assert_eq!(header.mirrors, vec!["https://mirror.example.org/fdroid/repo"]);
        assert_eq!(header.pubkey.as_deref(), Some("3082abcd"));

        assert_eq!(apps.len(), 1);
        let app = &apps[0].app;
        assert_eq!(app.package_name, "org.example.app");
        assert_eq!(app.repo_id, RepoId(3));
        assert_eq!(app.description, "<p>Does things.</p>");
        assert_eq!(app.categories, vec!["System", "Development"]);
        assert_eq!(app.anti_features, vec!["Ads", "Tracking"]);
        assert_eq!(app.suggested_version_code, Some(1));
        assert_eq!(app.added, Some(1_499_990_400_000));
        assert_eq!(app.preferred_signer.as_deref(), Some("0123"));

        let apk = &apps[0].apks[0];
        assert_eq!(apk.version_code, 1);
        assert_eq!(apk.hash, "abcdef");
        assert_eq!(apk.hash_type, HashType::Sha256);
        assert_eq!(apk.min_sdk, Some(21));
        assert_eq!(apk.max_sdk, Some(28));
        assert_eq!(
            apk.permissions,
            vec![
                Permission::new("android.permission.INTERNET"),
                Permission::new("com.example.CUSTOM"),
            ]
        );
        assert_eq!(apk.native_code, vec!["arm64-v8a", "armeabi-v7a"]);
    }

    #[test]
    fn accepts_repo_as_document_root() {
        let doc = r#"<repo timestamp="5" version="12" name="Old" description="attr desc">
            <application id="a"><name>A</name></application>
        </repo>"#;
        let (header, apps) = parse(doc).unwrap();
        assert_eq!(header.timestamp, 5);
        assert_eq!(header.description, "attr desc");
        assert_eq!(apps.len(), 1);
        assert!(apps[0].apks.is_empty());
    }

    #[test]
    fn missing_repo_element_is_an_error() {
        let doc = "<fdroid><application id=\"a\"/></fdroid>";
        assert!(matches!(parse(doc), Err(FormatError::MissingHeader)));
    }

    #[test]
    fn bad_version_code_is_an_error() {
        let doc = r#"<fdroid><repo timestamp="1"/><application id="a">
            <package><versioncode>one</versioncode></package></application></fdroid>"#;
        assert!(matches!(
            parse(doc),
            Err(FormatError::InvalidField { field: "versioncode", .. })
        ));
    }

    #[test]
    fn second_repo_element_is_rejected() {
        let doc = r#"<fdroid><repo timestamp="1"/><repo timestamp="2"/></fdroid>"#;
        assert!(matches!(
            parse(doc),
            Err(FormatError::InvalidField { field: "repo", .. })
        ));
    }

    #[test]
    fn truncated_document_is_an_error() {
        assert!(matches!(
            parse("<fdroid><repo timestamp=\"1\">"),
            Err(FormatError::Xml(_))
        ));
    }

    #[test]
    fn state_does_not_leak_between_parses() {
        let parser = XmlIndexParser::new(RepoId(1));
        let mut first = IndexCollector::new();
        assert!(
            parser
                .parse(&mut "<fdroid><application id=\"half\">".as_bytes(), &mut first)
                .is_err()
        );

        let mut second = IndexCollector::new();
        parser.parse(&mut DOC.as_bytes(), &mut second).unwrap();
        let (_, apps) = second.finish().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].app.package_name, "org.example.app");
    }
}
