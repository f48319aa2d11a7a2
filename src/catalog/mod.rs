pub mod fetcher;
pub mod version;

pub use fetcher::CatalogFetcher;
pub use version::VersionComparator;

use crate::error::{PreshError, Result};
use crate::utils::PathValidator;
use jiff::Timestamp;
use quick_xml::Reader;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use serde::Deserialize;
use std::collections::BTreeMap;

/// One module published in the remote catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub remote_id: String,
    pub version: String,
}

/// Parsed catalog, keyed by module name. Replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    entries: BTreeMap<String, CatalogEntry>,
    pub fetched_at: Timestamp,
}

impl CatalogSnapshot {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>, fetched_at: Timestamp) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            if map.contains_key(&entry.name) {
                tracing::debug!(module = %entry.name, "duplicate catalog entry ignored");
                continue;
            }
            map.insert(entry.name.clone(), entry);
        }

        Self {
            entries: map,
            fetched_at,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Timestamp::now())
    }

    /// Parse the raw `<modules><module>…</module></modules>` listing.
    ///
    /// Entries without an id, name or version, or whose name is not a valid
    /// module directory name, are skipped.
    pub fn parse(raw: &str, fetched_at: Timestamp) -> Result<Self> {
        match root_element(raw).as_deref() {
            Some(CATALOG_ROOT) => {}
            other => {
                return Err(PreshError::CatalogUnavailable(format!(
                    "expected <{CATALOG_ROOT}> document, found {}",
                    other.map_or_else(|| "no element".to_string(), |name| format!("<{name}>"))
                )));
            }
        }

        let document: CatalogDocument = from_str(raw).map_err(|e| {
            PreshError::CatalogUnavailable(format!("Failed to parse module catalog: {}", e))
        })?;

        let entries = document.modules.into_iter().filter_map(|module| {
            let name = module.name?.trim().to_string();
            let remote_id = module.id?.trim().to_string();
            let version = module.version?.trim().to_string();

            if remote_id.is_empty() || version.is_empty() {
                return None;
            }
            if !PathValidator::is_valid_module_name(&name) {
                tracing::debug!(module = %name, "skipping catalog entry with invalid name");
                return None;
            }

            Some(CatalogEntry {
                name,
                remote_id,
                version,
            })
        });

        Ok(Self::new(entries, fetched_at))
    }

    /// Like [`CatalogSnapshot::parse`], but a malformed listing is an empty catalog.
    pub fn parse_or_empty(raw: &str, fetched_at: Timestamp) -> Self {
        match Self::parse(raw, fetched_at) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "treating module catalog as empty");
                Self::new(Vec::new(), fetched_at)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const CATALOG_ROOT: &str = "modules";

/// Name of the first element, skipping the declaration, comments and doctype.
fn root_element(raw: &str) -> Option<String> {
    let mut reader = Reader::from_str(raw);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(rename = "module", default)]
    modules: Vec<CatalogModule>,
}

#[derive(Debug, Deserialize)]
struct CatalogModule {
    id: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<modules>
  <module>
    <id>42</id>
    <name><![CDATA[blockbanner]]></name>
    <displayName><![CDATA[Banner block]]></displayName>
    <version><![CDATA[1.1.0]]></version>
    <author>PrestaShop</author>
  </module>
  <module>
    <id>7</id>
    <name>statsdata</name>
    <version>2.0.3</version>
  </module>
  <module>
    <id>8</id>
    <name>../escape</name>
    <version>1.0.0</version>
  </module>
  <module>
    <id>9</id>
    <name>noversion</name>
  </module>
</modules>"#;

    #[test]
    fn parses_catalog_listing() {
        let snapshot = CatalogSnapshot::parse(LISTING, Timestamp::now()).unwrap();
        assert_eq!(snapshot.len(), 2);

        let banner = snapshot.get("blockbanner").unwrap();
        assert_eq!(banner.remote_id, "42");
        assert_eq!(banner.version, "1.1.0");
        assert_eq!(snapshot.get("statsdata").unwrap().version, "2.0.3");
    }

    #[test]
    fn skips_invalid_and_incomplete_entries() {
        let snapshot = CatalogSnapshot::parse(LISTING, Timestamp::now()).unwrap();
        assert!(snapshot.get("../escape").is_none());
        assert!(snapshot.get("noversion").is_none());
    }

    #[test]
    fn first_duplicate_wins() {
        let entry = |id: &str| CatalogEntry {
            name: "blockbanner".to_string(),
            remote_id: id.to_string(),
            version: "1.0.0".to_string(),
        };
        let snapshot = CatalogSnapshot::new(vec![entry("1"), entry("2")], Timestamp::now());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("blockbanner").unwrap().remote_id, "1");
    }

    #[test]
    fn malformed_listing_is_empty_catalog() {
        let snapshot = CatalogSnapshot::parse_or_empty("<modules><module>", Timestamp::now());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn html_page_is_not_a_catalog() {
        let err = CatalogSnapshot::parse(
            "<!DOCTYPE html><html><body>maintenance</body></html>",
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PreshError::CatalogUnavailable(_)));
        assert!(CatalogSnapshot::parse("", Timestamp::now()).is_err());
    }

    #[test]
    fn empty_listing_has_no_entries() {
        let snapshot = CatalogSnapshot::parse("<modules></modules>", Timestamp::now()).unwrap();
        assert!(snapshot.is_empty());
    }
}
