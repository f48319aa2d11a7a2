use crate::error::Result;
use std::path::PathBuf;

pub mod local;
pub use local::LocalModuleManager;

/// A module found in the install, as reported by the module manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    pub name: String,
    pub version: String,
    pub installed: bool,
}

impl InstalledModule {
    pub fn new(name: impl Into<String>, version: impl Into<String>, installed: bool) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            installed,
        }
    }
}

/// Live view of one module directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    pub name: String,
    pub path: PathBuf,
    pub disk_version: String,
    pub registered_version: Option<String>,
}

/// Collaborator owning the modules of an install
pub trait ModuleManager {
    fn list_installed(&self) -> Result<Vec<InstalledModule>>;

    fn get_instance(&self, name: &str) -> Result<Option<ModuleHandle>>;

    /// Whether the files on disk are newer than what the shop has registered.
    fn needs_upgrade(&self, handle: &ModuleHandle) -> Result<bool>;

    fn run_upgrade(&self, handle: &ModuleHandle) -> Result<()>;
}
