use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Literal accepted wherever a version may be requested as "whatever is newest".
pub const LATEST: &str = "latest";

/// A version as requested by a caller or declared by a dependency.
///
/// `Latest` only exists at request time; the resolver replaces it with the
/// concrete version of the newest release before touching anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRequest {
    Pinned(String),
    Latest,
}

impl VersionRequest {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(LATEST) {
            VersionRequest::Latest
        } else {
            VersionRequest::Pinned(trimmed.to_string())
        }
    }

    pub fn pinned(version: impl Into<String>) -> Self {
        VersionRequest::Pinned(version.into())
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, VersionRequest::Latest)
    }

    /// Pick the concrete version this request refers to among `available`.
    pub fn select<'a, I>(&self, available: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            VersionRequest::Pinned(wanted) => available.into_iter().find(|v| *v == wanted),
            VersionRequest::Latest => max_version(available),
        }
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Pinned(v) => write!(f, "{}", v),
            VersionRequest::Latest => write!(f, "{}", LATEST),
        }
    }
}

impl From<&str> for VersionRequest {
    fn from(raw: &str) -> Self {
        VersionRequest::parse(raw)
    }
}

impl Serialize for VersionRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(VersionRequest::parse(&raw))
    }
}

/// Whether `raw` reads as a version, allowing the short "1.8" form.
pub fn is_semver(raw: &str) -> bool {
    relaxed_semver(raw).is_some()
}

/// Parse a version leniently: "1.8" is read as "1.8.0" and "2" as "2.0.0".
fn relaxed_semver(raw: &str) -> Option<semver::Version> {
    if let Ok(v) = semver::Version::parse(raw) {
        return Some(v);
    }
    let split_at = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split_at);
    let mut numbers: Vec<&str> = core.split('.').collect();
    if numbers.is_empty() || numbers.len() > 3 || numbers.iter().any(|n| n.is_empty()) {
        return None;
    }
    while numbers.len() < 3 {
        numbers.push("0");
    }
    semver::Version::parse(&format!("{}{}", numbers.join("."), suffix)).ok()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Part {
    Numeric(u64),
    Text(String),
}

/// Fallback tokenizer for versions semver cannot read ("r2", "2020.01a").
fn split_parts(s: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut numeric = false;

    let mut flush = |current: &mut String, numeric: bool| {
        if current.is_empty() {
            return;
        }
        if numeric {
            parts.push(Part::Numeric(current.parse().unwrap_or(0)));
        } else {
            parts.push(Part::Text(std::mem::take(current)));
        }
        current.clear();
    };

    for c in s.chars() {
        if c == '.' || c == '-' || c == '+' {
            flush(&mut current, numeric);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != numeric {
            flush(&mut current, numeric);
        }
        numeric = is_digit;
        current.push(c);
    }
    flush(&mut current, numeric);
    parts
}

/// Total order over version strings.
///
/// Anything semver can read (leniently) is ordered by semver rules and ranks
/// above strings it cannot read; those are compared part by part.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (relaxed_semver(a), relaxed_semver(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => split_parts(a).cmp(&split_parts(b)),
    }
}

pub fn max_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_sorting() {
        assert_eq!(compare_versions("1.0.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0.1", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);

        assert_eq!(compare_versions("1.0.0-beta.1", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-beta.1", "1.0.0-beta.2"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0-alpha.1", "1.0.0-beta.1"), Ordering::Less);

        // numeric, not lexicographic
        assert_eq!(compare_versions("1.8.10", "1.8.9"), Ordering::Greater);
        assert_eq!(compare_versions("7.3.0-atmel3.6.1-arduino7", "5.4.0-atmel3.6.1-arduino2"), Ordering::Greater);
    }

    #[test]
    fn relaxed_versions_are_padded() {
        assert_eq!(compare_versions("1.8", "1.8.0"), Ordering::Less);
        assert_eq!(compare_versions("1.9", "1.8.3"), Ordering::Greater);
        assert_eq!(compare_versions("2", "1.99.99"), Ordering::Greater);
    }

    #[test]
    fn semver_check_accepts_short_forms() {
        assert!(is_semver("1.2.3"));
        assert!(is_semver("1.8"));
        assert!(is_semver("7.3.0-atmel3.6.1-arduino7"));
        assert!(!is_semver("cores"));
        assert!(!is_semver(""));
    }

    #[test]
    fn non_semver_ranks_below_semver() {
        assert_eq!(compare_versions("nightly", "0.0.1"), Ordering::Less);
        assert_eq!(compare_versions("r10", "r9"), Ordering::Greater);
    }

    #[test]
    fn latest_selects_maximum() {
        let available = ["1.6.21", "1.8.3", "1.8.10", "1.8.2"];
        let picked = VersionRequest::Latest.select(available.iter().copied());
        assert_eq!(picked, Some("1.8.10"));

        let pinned = VersionRequest::pinned("1.8.2").select(available.iter().copied());
        assert_eq!(pinned, Some("1.8.2"));

        let missing = VersionRequest::pinned("9.9.9").select(available.iter().copied());
        assert_eq!(missing, None);
    }

    #[test]
    fn parse_latest_literal() {
        assert_eq!(VersionRequest::parse("latest"), VersionRequest::Latest);
        assert_eq!(VersionRequest::parse(""), VersionRequest::Latest);
        assert_eq!(VersionRequest::parse("1.8.3").to_string(), "1.8.3");
        assert_eq!(VersionRequest::Latest.to_string(), "latest");
    }
}
