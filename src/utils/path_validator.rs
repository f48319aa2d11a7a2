use crate::error::{PreshError, Result};
use std::path::{Path, PathBuf};

/// Provides safe path validation helpers to avoid traversal and host intrusion.
pub struct PathValidator;

impl PathValidator {
    /// Validates and canonicalises the shop install directory.
    pub fn validate_install_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let canonical = path.canonicalize().map_err(|e| {
            PreshError::Configuration(format!(
                "Invalid install directory '{}': {e}",
                path.display()
            ))
        })?;

        if !canonical.is_dir() {
            return Err(PreshError::Configuration(format!(
                "Install path '{}' is not a directory",
                canonical.display()
            )));
        }

        const FORBIDDEN: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

        for forbidden in FORBIDDEN {
            let forbidden_path = Path::new(forbidden);

            if path.starts_with(forbidden_path) || canonical.starts_with(forbidden_path) {
                return Err(PreshError::Configuration(format!(
                    "Access to system directory '{}' is not allowed",
                    forbidden
                )));
            }

            if let Ok(canonical_forbidden) = forbidden_path.canonicalize() {
                if canonical.starts_with(&canonical_forbidden) {
                    return Err(PreshError::Configuration(format!(
                        "Access to system directory '{}' is not allowed",
                        forbidden
                    )));
                }
            }
        }

        Ok(canonical)
    }

    /// Module names double as directory names under `modules/`.
    pub fn is_valid_module_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
    }

    pub fn validate_module_name(name: &str) -> Result<()> {
        if Self::is_valid_module_name(name) {
            Ok(())
        } else {
            Err(PreshError::InvalidModuleName(name.to_string()))
        }
    }
}
