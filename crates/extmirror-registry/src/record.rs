//! Catalog record structures.
//!
//! [`CatalogRecord`] mirrors one object of the remote search results. Fields
//! that the mirror does not interpret are kept in `extra` maps so that a
//! record written back to the snapshot carries the full remote object.

use std::{collections::BTreeSet, fmt, slice};

use extmirror_utils::hash::ContentHash;
use indexmap::IndexMap;
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{Map, Value};

/// Locales tried, in order, when choosing a display name.
pub const LANGUAGE_PRIORITY: [&str; 9] = ["en-US", "en-GB", "uk", "de", "fr", "pl", "es", "it", "nl"];

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptU64Visitor;

    impl<'de> Visitor<'de> for OptU64Visitor {
        type Value = Option<u64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative number or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok((v >= 0).then_some(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok((v.is_finite() && v >= 0.0).then_some(v as u64))
        }
    }

    deserializer.deserialize_any(OptU64Visitor)
}

/// A display name, either per locale or a single string.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LocalizedName {
    Plain(String),
    Locales(IndexMap<String, Option<String>>),
}

impl LocalizedName {
    /// Picks the name by [`LANGUAGE_PRIORITY`], falling back to the first
    /// locale with a value. `null` entries are passed over.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            LocalizedName::Plain(name) => Some(name),
            LocalizedName::Locales(locales) => {
                LANGUAGE_PRIORITY
                    .iter()
                    .find_map(|lang| locales.get(*lang).and_then(Option::as_deref))
                    .or_else(|| locales.values().find_map(Option::as_deref))
            }
        }
    }
}

/// One downloadable file of a catalog record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    /// Algorithm-tagged digest, e.g. `sha256:<hex>`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub hash: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_webextension: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub permissions: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileEntry {
    /// The parsed content hash, or `None` if the tag is malformed.
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.hash.parse().ok()
    }

    /// The digest part of the hash, whatever the algorithm.
    pub fn digest(&self) -> Option<&str> {
        self.hash
            .split_once(':')
            .map(|(_, hex)| hex)
            .filter(|hex| !hex.is_empty())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CurrentVersion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<FileEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A catalog entry as returned by the remote search endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: u64,

    #[serde(default)]
    pub name: Option<LocalizedName>,

    #[serde(default)]
    pub current_version: Option<CurrentVersion>,

    #[serde(default, deserialize_with = "optional_number")]
    pub average_daily_users: Option<u64>,

    #[serde(default, deserialize_with = "optional_number")]
    pub weekly_downloads: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Host and API permissions requested across all files of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub host: Option<BTreeSet<String>>,
    pub api: Option<BTreeSet<String>>,
}

/// Iterator over the files of a record.
pub struct RecordFiles<'a> {
    inner: slice::Iter<'a, FileEntry>,
}

impl<'a> Iterator for RecordFiles<'a> {
    type Item = &'a FileEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl CatalogRecord {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name shown to users; empty if the record carries no name.
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .and_then(LocalizedName::resolve)
            .unwrap_or_default()
    }

    /// All files of the current version.
    pub fn files(&self) -> RecordFiles<'_> {
        let files = self
            .current_version
            .as_ref()
            .map(|v| v.files.as_slice())
            .unwrap_or_default();
        RecordFiles {
            inner: files.iter(),
        }
    }

    /// Files flagged as web extensions.
    pub fn webext_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files().filter(|f| f.is_webextension)
    }

    /// A record is a web extension if at least one of its files is.
    pub fn is_webextension(&self) -> bool {
        self.webext_files().next().is_some()
    }

    /// SHA-256 digests of the web extension files, in file order.
    pub fn file_hashes(&self) -> Vec<String> {
        self.webext_files()
            .filter_map(FileEntry::content_hash)
            .filter(ContentHash::is_sha256)
            .map(|hash| hash.hex().to_string())
            .collect()
    }

    /// Splits file permissions into host patterns and API names.
    ///
    /// A permission containing `/`, `:` or `<` is a host permission.
    pub fn permissions(&self) -> Permissions {
        let mut host = BTreeSet::new();
        let mut api = BTreeSet::new();

        for permission in self.files().flat_map(|f| f.permissions.iter()) {
            if permission.contains(['/', ':', '<']) {
                host.insert(permission.clone());
            } else {
                api.insert(permission.clone());
            }
        }

        Permissions {
            host: (!host.is_empty()).then_some(host),
            api: (!api.is_empty()).then_some(api),
        }
    }
}
