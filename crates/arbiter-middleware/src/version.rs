//! API versions and the version discovery document.

use serde::Serialize;

/// Release status of an API version, as shown in discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    /// The newest version.
    Current,
    /// Still served, not the newest.
    Supported,
}

/// A version of the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl ApiVersion {
    /// v1.0.
    pub const V1_0: Self = Self { major: 1, minor: 0 };
    /// v1.1, the current version.
    pub const V1_1: Self = Self { major: 1, minor: 1 };

    /// Every served version, newest first.
    pub const ALL: [Self; 2] = [Self::V1_1, Self::V1_0];

    /// Parses a version identifier (`v1`, `v1.0`, `v1.1`).
    ///
    /// A bare major version selects the newest minor of that major.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let (major, minor) = parse_numbers(id)?;
        Self::ALL
            .into_iter()
            .find(|v| v.major == major && minor.map_or(true, |m| v.minor == m))
    }

    /// Returns the discovery status of this version.
    #[must_use]
    pub fn status(self) -> VersionStatus {
        if self == Self::ALL[0] {
            VersionStatus::Current
        } else {
            VersionStatus::Supported
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Returns true for strings shaped like a version: `v<digits>[.<digits>]`.
#[must_use]
pub fn looks_like_version(segment: &str) -> bool {
    parse_numbers(segment).is_some()
}

fn parse_numbers(id: &str) -> Option<(u16, Option<u16>)> {
    let rest = id.strip_prefix('v')?;
    let (major, minor) = match rest.split_once('.') {
        Some((major, minor)) => (major, Some(minor)),
        None => (rest, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(major) || !minor.map_or(true, digits) {
        return None;
    }
    // Shaped like a version but too large to be one of ours: still a version.
    let major = major.parse().unwrap_or(u16::MAX);
    let minor = minor.map(|m| m.parse().unwrap_or(u16::MAX));
    Some((major, minor))
}

/// A link in a version document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Link relation.
    pub rel: &'static str,
    /// Target URL.
    pub href: String,
}

/// One entry of the discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDocument {
    /// Version id (`v1.1`).
    pub id: String,
    /// Release status.
    pub status: VersionStatus,
    /// Links to the version root.
    pub links: Vec<Link>,
}

impl VersionDocument {
    fn new(version: ApiVersion, base_url: &str) -> Self {
        Self {
            id: version.to_string(),
            status: version.status(),
            links: vec![Link {
                rel: "self",
                href: format!("{}/v{}/", base_url.trim_end_matches('/'), version.major),
            }],
        }
    }
}

/// The version discovery document.
///
/// ```json
/// {"versions": [{"id": "v1.1", "status": "CURRENT", "links": [{"rel": "self", "href": "http://pdp/v1/"}]}]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChoices {
    /// Served versions, newest first.
    pub versions: Vec<VersionDocument>,
}

impl VersionChoices {
    /// Builds the document for the enabled versions.
    #[must_use]
    pub fn new(versions: &[ApiVersion], base_url: &str) -> Self {
        Self {
            versions: versions
                .iter()
                .map(|v| VersionDocument::new(*v, base_url))
                .collect(),
        }
    }
}

/// The document served at a version root (`/v1/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDetail {
    /// The version.
    pub version: VersionDocument,
}

impl VersionDetail {
    /// Builds the document for one version.
    #[must_use]
    pub fn new(version: ApiVersion, base_url: &str) -> Self {
        Self {
            version: VersionDocument::new(version, base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_recognized() {
        assert_eq!(ApiVersion::parse("v1"), Some(ApiVersion::V1_1));
        assert_eq!(ApiVersion::parse("v1.1"), Some(ApiVersion::V1_1));
        assert_eq!(ApiVersion::parse("v1.0"), Some(ApiVersion::V1_0));
    }

    #[test]
    fn test_parse_unrecognized() {
        assert_eq!(ApiVersion::parse("v2"), None);
        assert_eq!(ApiVersion::parse("v1.7"), None);
        assert_eq!(ApiVersion::parse("pdp"), None);
        assert_eq!(ApiVersion::parse("v"), None);
    }

    #[test]
    fn test_looks_like_version() {
        for s in ["v1", "v2", "v1.0", "v10.42", "v99999999"] {
            assert!(looks_like_version(s), "{s}");
        }
        for s in ["", "v", "v1.", "v.1", "version", "versions", "pdp", "v1.0.0", "V1"] {
            assert!(!looks_like_version(s), "{s}");
        }
    }

    #[test]
    fn test_status() {
        assert_eq!(ApiVersion::V1_1.status(), VersionStatus::Current);
        assert_eq!(ApiVersion::V1_0.status(), VersionStatus::Supported);
        assert_eq!(ApiVersion::V1_0.to_string(), "v1.0");
    }

    #[test]
    fn test_discovery_document() {
        let doc = VersionChoices::new(&ApiVersion::ALL, "http://pdp.example.com:9292/");
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"versions": [
                {"id": "v1.1", "status": "CURRENT", "links": [{"rel": "self", "href": "http://pdp.example.com:9292/v1/"}]},
                {"id": "v1.0", "status": "SUPPORTED", "links": [{"rel": "self", "href": "http://pdp.example.com:9292/v1/"}]}
            ]})
        );
    }

    #[test]
    fn test_version_detail() {
        let doc = VersionDetail::new(ApiVersion::V1_1, "");
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["version"]["id"], "v1.1");
        assert_eq!(value["version"]["links"][0]["href"], "/v1/");
    }
}
