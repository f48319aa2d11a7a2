use crate::catalog::CatalogSnapshot;
use crate::error::{PreshError, Result};
use crate::store::{StoreApi, StoreLocale};
use jiff::Timestamp;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Fetches the module catalog, serving it from a local cache file while that
/// file is younger than `max_age`.
pub struct CatalogFetcher<'a> {
    store: &'a dyn StoreApi,
    cache_path: PathBuf,
    max_age: Duration,
}

struct CachedCatalog {
    raw: String,
    age: Duration,
    fetched_at: Timestamp,
}

impl<'a> CatalogFetcher<'a> {
    pub fn new(store: &'a dyn StoreApi, cache_path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            store,
            cache_path: cache_path.into(),
            max_age,
        }
    }

    /// Return the catalog for `locale`.
    ///
    /// A malformed or unreachable catalog is not an error: the caller gets the
    /// stale cache when there is one, else an empty snapshot. Only a catalog
    /// that parses is written to the cache; failing to write it is a
    /// configuration error.
    pub fn fetch(&self, locale: &StoreLocale) -> Result<CatalogSnapshot> {
        let cached = self.read_cache();

        if let Some(cache) = &cached {
            if cache.age < self.max_age {
                tracing::debug!(
                    path = %self.cache_path.display(),
                    age_secs = cache.age.as_secs(),
                    "using cached module catalog"
                );
                return Ok(CatalogSnapshot::parse_or_empty(&cache.raw, cache.fetched_at));
            }
        }

        tracing::debug!(
            language = %locale.language,
            country = %locale.country,
            "refreshing module catalog"
        );

        match self.store.fetch_catalog(locale) {
            Ok(raw) => match CatalogSnapshot::parse(&raw, Timestamp::now()) {
                Ok(snapshot) => {
                    self.persist(&raw)?;
                    return Ok(snapshot);
                }
                // not cached, so the next run asks again
                Err(err) => tracing::warn!(error = %err, "discarding malformed module catalog"),
            },
            Err(err) => tracing::warn!(error = %err, "module catalog unavailable"),
        }

        match cached {
            Some(cache) => {
                tracing::warn!(
                    age_secs = cache.age.as_secs(),
                    "falling back to stale catalog cache"
                );
                Ok(CatalogSnapshot::parse_or_empty(&cache.raw, cache.fetched_at))
            }
            None => Ok(CatalogSnapshot::empty()),
        }
    }

    fn read_cache(&self) -> Option<CachedCatalog> {
        let metadata = fs::metadata(&self.cache_path).ok()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return None;
        }

        let modified = metadata.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        let raw = match fs::read_to_string(&self.cache_path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "catalog cache unreadable");
                return None;
            }
        };

        Some(CachedCatalog {
            raw,
            age,
            fetched_at: Timestamp::try_from(modified).unwrap_or_else(|_| Timestamp::now()),
        })
    }

    fn persist(&self, raw: &str) -> Result<()> {
        let unwritable = |e: std::io::Error| {
            PreshError::Configuration(format!(
                "Cannot write catalog cache '{}': {e}",
                self.cache_path.display()
            ))
        };

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).map_err(unwritable)?;
        }
        fs::write(&self.cache_path, raw).map_err(unwritable)
    }
}
