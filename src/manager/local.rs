use crate::catalog::VersionComparator;
use crate::config::{ModuleHooks, PreshConfig};
use crate::error::{PreshError, Result};
use crate::manager::{InstalledModule, ModuleHandle, ModuleManager};
use crate::utils::PathValidator;
use jiff::Timestamp;
use quick_xml::de::from_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

const MODULE_CONFIG_FILE: &str = "config.xml";

static CLASS_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\$this->version\s*=\s*['"]([^'"]+)['"]"#).expect("valid version pattern")
});

/// Module manager working directly on an install's `modules/` directory.
///
/// Which modules count as installed, and at which version, is kept in a JSON
/// registry. Install and upgrade routines are delegated to optional hook
/// commands (for example the shop's own console).
pub struct LocalModuleManager {
    install_dir: PathBuf,
    modules_dir: PathBuf,
    registry_path: PathBuf,
    hooks: ModuleHooks,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModuleRegistry {
    #[serde(default)]
    modules: BTreeMap<String, RegisteredModule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegisteredModule {
    version: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModuleConfigXml {
    version: Option<String>,
}

impl LocalModuleManager {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        modules_dir: impl Into<PathBuf>,
        registry_path: impl Into<PathBuf>,
        hooks: ModuleHooks,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            modules_dir: modules_dir.into(),
            registry_path: registry_path.into(),
            hooks,
        }
    }

    pub fn from_config(config: &PreshConfig) -> Self {
        Self::new(
            &config.install_dir,
            &config.modules_dir,
            &config.registry_path,
            config.hooks.clone(),
        )
    }

    /// Register a module already present in the modules directory.
    ///
    /// Returns `false` when the module was registered before.
    pub fn install(&self, name: &str) -> Result<bool> {
        PathValidator::validate_module_name(name)?;

        let module_dir = self.modules_dir.join(name);
        let version = Self::read_disk_version(&module_dir, name)
            .ok_or_else(|| PreshError::ModuleNotFound(name.to_string()))?;

        let mut registry = self.load_registry()?;
        if registry.modules.contains_key(name) {
            return Ok(false);
        }

        if let Some(template) = &self.hooks.install {
            self.run_hook(template, name)?;
        }

        registry.record(name, &version);
        self.save_registry(&registry)?;
        tracing::info!(module = %name, %version, "module installed");
        Ok(true)
    }

    fn load_registry(&self) -> Result<ModuleRegistry> {
        if !self.registry_path.exists() {
            return Ok(ModuleRegistry::default());
        }
        let content = fs::read_to_string(&self.registry_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_registry(&self, registry: &ModuleRegistry) -> Result<()> {
        if let Some(parent) = self.registry_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.registry_path, serde_json::to_string_pretty(registry)?)?;
        Ok(())
    }

    /// Version from `config.xml`, or from the main module class when a module
    /// ships without one.
    fn read_disk_version(module_dir: &Path, name: &str) -> Option<String> {
        if !module_dir.is_dir() {
            return None;
        }

        let config_path = module_dir.join(MODULE_CONFIG_FILE);
        if let Ok(content) = fs::read_to_string(&config_path) {
            match from_str::<ModuleConfigXml>(&content) {
                Ok(ModuleConfigXml {
                    version: Some(version),
                }) if !version.trim().is_empty() => return Some(version.trim().to_string()),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        path = %config_path.display(),
                        error = %err,
                        "unreadable module config"
                    );
                }
            }
        }

        let class_file = module_dir.join(format!("{name}.php"));
        let source = fs::read_to_string(class_file).ok()?;
        CLASS_VERSION
            .captures(&source)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    fn run_hook(&self, template: &str, module: &str) -> Result<()> {
        let args: Vec<String> = template
            .split_whitespace()
            .map(|token| token.replace("{module}", module))
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| PreshError::Hook("hook command is empty".to_string()))?;

        tracing::debug!(command = %args.join(" "), "running module hook");

        let output = Command::new(program)
            .current_dir(&self.install_dir)
            .args(rest)
            .output()
            .map_err(|e| PreshError::Hook(format!("failed to execute '{}': {e}", program)))?;

        if output.status.success() {
            return Ok(());
        }

        Err(PreshError::Hook(format!(
            "'{}' failed ({}): {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

impl ModuleRegistry {
    fn record(&mut self, name: &str, version: &str) {
        self.modules.insert(
            name.to_string(),
            RegisteredModule {
                version: version.to_string(),
                updated_at: Some(Timestamp::now().to_string()),
            },
        );
    }
}

impl ModuleManager for LocalModuleManager {
    fn list_installed(&self) -> Result<Vec<InstalledModule>> {
        if !self.modules_dir.is_dir() {
            return Ok(Vec::new());
        }

        let registry = self.load_registry()?;
        let mut modules = Vec::new();

        for entry in fs::read_dir(&self.modules_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !PathValidator::is_valid_module_name(&name) {
                continue;
            }

            match Self::read_disk_version(&entry.path(), &name) {
                Some(version) => {
                    let installed = registry.modules.contains_key(&name);
                    modules.push(InstalledModule::new(name, version, installed));
                }
                None => tracing::debug!(module = %name, "no readable version, skipped"),
            }
        }

        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }

    fn get_instance(&self, name: &str) -> Result<Option<ModuleHandle>> {
        PathValidator::validate_module_name(name)?;

        let path = self.modules_dir.join(name);
        let Some(disk_version) = Self::read_disk_version(&path, name) else {
            return Ok(None);
        };

        let registered_version = self
            .load_registry()?
            .modules
            .get(name)
            .map(|m| m.version.clone());

        Ok(Some(ModuleHandle {
            name: name.to_string(),
            path,
            disk_version,
            registered_version,
        }))
    }

    fn needs_upgrade(&self, handle: &ModuleHandle) -> Result<bool> {
        Ok(match &handle.registered_version {
            Some(registered) => VersionComparator::is_newer(&handle.disk_version, registered),
            None => false,
        })
    }

    fn run_upgrade(&self, handle: &ModuleHandle) -> Result<()> {
        if let Some(template) = &self.hooks.upgrade {
            self.run_hook(template, &handle.name)?;
        }

        let mut registry = self.load_registry()?;
        registry.record(&handle.name, &handle.disk_version);
        self.save_registry(&registry)?;
        tracing::info!(
            module = %handle.name,
            from = handle.registered_version.as_deref().unwrap_or("-"),
            to = %handle.disk_version,
            "module upgraded"
        );
        Ok(())
    }
}
