use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreshError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Module catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Upgrade failed: {0}")]
    Upgrade(String),

    #[error("Module hook failed: {0}")]
    Hook(String),

    #[error("Module '{0}' not found in the modules directory")]
    ModuleNotFound(String),

    #[error("Invalid module name '{0}'")]
    InvalidModuleName(String),

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PreshError>;
