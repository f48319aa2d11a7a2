use crate::error::Result;

pub mod addons;
pub use addons::AddonsClient;

/// Language and country sent with every add-ons API request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocale {
    pub language: String,
    pub country: String,
}

impl StoreLocale {
    pub fn new(language: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            language: language.into().trim().to_lowercase(),
            country: country.into().trim().to_lowercase(),
        }
    }
}

/// Remote store the catalog and module archives are fetched from
pub trait StoreApi {
    /// Raw catalog listing of the modules available for this locale.
    fn fetch_catalog(&self, locale: &StoreLocale) -> Result<String>;

    /// Archive bytes of a single module, identified by its catalog id.
    fn download_module(&self, remote_id: &str, locale: &StoreLocale) -> Result<Vec<u8>>;
}
