use crate::error::{PreshError, Result};
use crate::store::StoreLocale;
use crate::utils::PathValidator;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "presh.toml";
pub const DEFAULT_API_URL: &str = "https://api.addons.prestashop.com";
pub const DEFAULT_CACHE_PATH: &str = "config/xml/modules_native_addons.xml";
pub const DEFAULT_REGISTRY_PATH: &str = "config/presh_modules.json";
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 86_400;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MODULES_DIR: &str = "modules";

/// Contents of an optional `presh.toml`
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub modules: ModulesSection,
    #[serde(default)]
    pub hooks: ModuleHooks,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct StoreSection {
    pub api_url: Option<String>,
    pub locale: Option<String>,
    pub country: Option<String>,
    pub platform_version: Option<String>,
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct CatalogSection {
    pub cache_path: Option<PathBuf>,
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ModulesSection {
    pub registry_path: Option<PathBuf>,
}

/// Command templates run in the install directory. `{module}` is replaced by
/// the module name.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ModuleHooks {
    pub install: Option<String>,
    pub upgrade: Option<String>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub locale: Option<String>,
    pub country: Option<String>,
    pub cache_max_age_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub api_url: String,
    pub user_agent: String,
    pub platform_version: Option<String>,
    pub timeout: Duration,
}

/// Fully resolved configuration handed to each component.
#[derive(Debug, Clone)]
pub struct PreshConfig {
    pub install_dir: PathBuf,
    pub modules_dir: PathBuf,
    pub cache_path: PathBuf,
    pub cache_max_age: Duration,
    pub registry_path: PathBuf,
    pub language: Option<String>,
    pub country: Option<String>,
    pub store: StoreSettings,
    pub hooks: ModuleHooks,
}

impl PreshConfig {
    /// Resolve: CLI flags > environment > config file > defaults.
    pub fn resolve(install_dir: impl AsRef<Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with_env(install_dir.as_ref(), overrides, env_value)
    }

    fn resolve_with_env(
        install_dir: &Path,
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let install_dir = PathValidator::validate_install_dir(install_dir)?;

        let file = match &overrides.config_path {
            Some(path) if !path.exists() => {
                return Err(PreshError::Configuration(format!(
                    "Config file '{}' not found",
                    path.display()
                )));
            }
            Some(path) => load_config(path)?,
            None => load_config(&install_dir.join(DEFAULT_CONFIG_FILE))?,
        };

        let timeout_secs = overrides
            .timeout_secs
            .or(file.store.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(PreshError::Configuration(
                "Timeout must be greater than zero".to_string(),
            ));
        }

        let cache_max_age = Duration::from_secs(
            overrides
                .cache_max_age_secs
                .or(file.catalog.max_age_secs)
                .unwrap_or(DEFAULT_CACHE_MAX_AGE_SECS),
        );

        let resolve_path = |configured: Option<PathBuf>, default: &str| {
            let path = configured.unwrap_or_else(|| PathBuf::from(default));
            if path.is_absolute() {
                path
            } else {
                install_dir.join(path)
            }
        };
        let cache_path = resolve_path(file.catalog.cache_path.clone(), DEFAULT_CACHE_PATH);
        let registry_path = resolve_path(file.modules.registry_path.clone(), DEFAULT_REGISTRY_PATH);

        let store = StoreSettings {
            api_url: env("PRESH_API_URL")
                .or(file.store.api_url.clone())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            user_agent: file
                .store
                .user_agent
                .clone()
                .unwrap_or_else(|| format!("presh/{}", env!("CARGO_PKG_VERSION"))),
            platform_version: file.store.platform_version.clone(),
            timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            modules_dir: install_dir.join(MODULES_DIR),
            install_dir,
            cache_path,
            cache_max_age,
            registry_path,
            language: overrides
                .locale
                .clone()
                .or_else(|| env("PRESH_LOCALE"))
                .or(file.store.locale),
            country: overrides
                .country
                .clone()
                .or_else(|| env("PRESH_COUNTRY"))
                .or(file.store.country),
            store,
            hooks: file.hooks,
        })
    }

    /// Locale for add-ons API requests; both parts are required.
    pub fn require_locale(&self) -> Result<StoreLocale> {
        match (&self.language, &self.country) {
            (Some(language), Some(country)) => Ok(StoreLocale::new(language, country)),
            (None, _) => Err(PreshError::Configuration(
                "Store language is not set (use --locale or [store] locale)".to_string(),
            )),
            (_, None) => Err(PreshError::Configuration(
                "Store country is not set (use --country or [store] country)".to_string(),
            )),
        }
    }
}

/// Load and parse a config file. Returns the default config if it doesn't exist.
pub fn load_config(config_path: &Path) -> Result<FileConfig> {
    if !config_path.exists() {
        return Ok(FileConfig::default());
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        PreshError::Configuration(format!("Failed to read {}: {e}", config_path.display()))
    })?;
    let parsed: FileConfig = toml::from_str(&content)?;
    Ok(parsed)
}

fn env_value(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
