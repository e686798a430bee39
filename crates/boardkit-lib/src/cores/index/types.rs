use serde::{Deserialize, Deserializer};

/// Top-level package index document (`package_index.json`).
#[derive(Debug, Deserialize)]
pub struct IndexDocument {
    pub packages: Vec<IndexPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPackage {
    pub name: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default, rename = "websiteURL")]
    pub website_url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub platforms: Vec<IndexPlatformRelease>,
    #[serde(default)]
    pub tools: Vec<IndexToolRelease>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPlatformRelease {
    #[serde(default)]
    pub name: String,
    pub architecture: String,
    pub version: String,
    #[serde(default)]
    pub category: String,
    pub url: String,
    pub archive_file_name: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default, deserialize_with = "size_from_string_or_number")]
    pub size: u64,
    #[serde(default)]
    pub boards: Vec<IndexBoard>,
    #[serde(default)]
    pub tools_dependencies: Vec<IndexToolDependency>,
}

#[derive(Debug, Deserialize)]
pub struct IndexBoard {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexToolDependency {
    #[serde(default)]
    pub packager: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexToolRelease {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub systems: Vec<IndexFlavour>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFlavour {
    pub host: String,
    pub url: String,
    pub archive_file_name: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default, deserialize_with = "size_from_string_or_number")]
    pub size: u64,
}

/// Indexes in the wild publish `size` both as `"12345"` and `12345`.
fn size_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) if s.trim().is_empty() => Ok(0),
        Size::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
