//! `MANIFEST.MF` and `.SF` parsing.
//!
//! Both files share one format: sections of `Name: value` lines separated by
//! blank lines, with lines longer than 72 bytes continued on the next line
//! after a single leading space. Digests in a signature file cover the raw
//! bytes of a manifest section, blank terminator included, so each section
//! keeps a slice of the original input.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pkgsync_schema::HashType;

use crate::error::SigningError;

/// Strongest first; the first algorithm a section carries wins.
const DIGEST_PREFERENCE: [HashType; 4] = [
    HashType::Sha512,
    HashType::Sha384,
    HashType::Sha256,
    HashType::Sha1,
];

#[derive(Debug)]
pub struct Section<'a> {
    raw: &'a [u8],
    attributes: Vec<(String, String)>,
}

impl<'a> Section<'a> {
    /// Bytes of the section as they appear in the file.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Attribute lookup; names are case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }

    /// The strongest `<ALG><suffix>` digest in this section, e.g. suffix
    /// `-Digest` finds `SHA-256-Digest`.
    pub fn digest(&self, suffix: &str) -> Result<Option<(HashType, Vec<u8>)>, SigningError> {
        for algorithm in DIGEST_PREFERENCE {
            let key = format!("{}{suffix}", algorithm.jar_name());
            if let Some(value) = self.get(&key) {
                let bytes = STANDARD
                    .decode(value.trim())
                    .map_err(|e| SigningError::Malformed(format!("{key}: {e}")))?;
                return Ok(Some((algorithm, bytes)));
            }
        }
        Ok(None)
    }
}

#[derive(Debug)]
pub struct Manifest<'a> {
    sections: Vec<Section<'a>>,
}

impl<'a> Manifest<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SigningError> {
        let sections = split_sections(bytes)
            .into_iter()
            .map(|raw| {
                Ok(Section {
                    raw,
                    attributes: parse_attributes(raw)?,
                })
            })
            .collect::<Result<_, SigningError>>()?;
        Ok(Self { sections })
    }

    /// The leading section without a `Name` attribute, if any.
    pub fn main(&self) -> Option<&Section<'a>> {
        self.sections.first().filter(|s| s.name().is_none())
    }

    /// Per-entry section for `name`.
    pub fn entry(&self, name: &str) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.name() == Some(name))
    }
}

/// Returns (content end, next line start) for the line starting at `start`.
fn line_bounds(bytes: &[u8], start: usize) -> (usize, usize) {
    let mut end = start;
    while end < bytes.len() && bytes[end] != b'\n' && bytes[end] != b'\r' {
        end += 1;
    }
    let next = match bytes.get(end) {
        Some(b'\r') if bytes.get(end + 1) == Some(&b'\n') => end + 2,
        Some(_) => end + 1,
        None => end,
    };
    (end, next)
}

fn split_sections(bytes: &[u8]) -> Vec<&[u8]> {
    let mut sections = Vec::new();
    let mut section_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let (content_end, next) = line_bounds(bytes, pos);
        if content_end == pos {
            if pos > section_start {
                sections.push(&bytes[section_start..next]);
            }
            section_start = next;
        }
        pos = next;
    }
    if section_start < bytes.len() {
        sections.push(&bytes[section_start..]);
    }
    sections
}

fn parse_attributes(raw: &[u8]) -> Result<Vec<(String, String)>, SigningError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| SigningError::Malformed("manifest is not UTF-8".to_string()))?;

    let mut attributes: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            let Some((_, value)) = attributes.last_mut() else {
                return Err(SigningError::Malformed(
                    "continuation line without an attribute".to_string(),
                ));
            };
            value.push_str(continuation);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(SigningError::Malformed(format!("bad manifest line: {line}")));
        };
        attributes.push((key.trim().to_string(), value.trim_start().to_string()));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\nCreated-By: 17 (Fixtures)\r\n\r\n\
Name: index-v1.json\r\nSHA-256-Digest: 3q2+7w==\r\n\r\n";

    #[test]
    fn sections_keep_raw_bytes_with_terminator() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let main = manifest.main().unwrap();
        assert_eq!(main.get("manifest-version"), Some("1.0"));
        assert!(main.raw().ends_with(b"\r\n\r\n"));

        let entry = manifest.entry("index-v1.json").unwrap();
        assert_eq!(
            entry.raw(),
            b"Name: index-v1.json\r\nSHA-256-Digest: 3q2+7w==\r\n\r\n"
        );
        let (algorithm, digest) = entry.digest("-Digest").unwrap().unwrap();
        assert_eq!(algorithm, HashType::Sha256);
        assert_eq!(digest, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn continuation_lines_are_joined() {
        let sf = b"Signature-Version: 1.0\n\
SHA-256-Digest-Manifest-Main-Attributes: 3q2+\n 7w==\n\n";
        let parsed = Manifest::parse(sf).unwrap();
        let (_, digest) = parsed
            .main()
            .unwrap()
            .digest("-Digest-Manifest-Main-Attributes")
            .unwrap()
            .unwrap();
        assert_eq!(digest, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn strongest_digest_wins() {
        let text = b"Name: a\nSHA1-Digest: AAAA\nSHA-512-Digest: 3q2+7w==\n\n";
        let parsed = Manifest::parse(text).unwrap();
        let (algorithm, _) = parsed.entry("a").unwrap().digest("-Digest").unwrap().unwrap();
        assert_eq!(algorithm, HashType::Sha512);
        assert!(parsed.main().is_none());
    }

    #[test]
    fn unterminated_last_section_is_kept() {
        let parsed = Manifest::parse(b"Name: tail\nSHA-256-Digest: 3q2+7w==").unwrap();
        assert!(parsed.entry("tail").is_some());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(Manifest::parse(b"no colon here\n\n").is_err());
        assert!(Manifest::parse(b" leading continuation\n\n").is_err());
    }
}
