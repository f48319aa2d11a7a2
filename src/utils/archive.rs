use crate::error::{PreshError, Result};
use crate::utils::PathValidator;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use zip::ZipArchive;

/// Directory some macOS archivers add next to the real content.
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// What a downloaded payload turned out to be, judged by its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Zip,
    Gzip,
    Xml,
    Html,
    Json,
    Empty,
    Unknown,
}

impl ContentKind {
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return ContentKind::Empty;
        }

        if bytes.starts_with(b"PK\x03\x04")
            || bytes.starts_with(b"PK\x05\x06")
            || bytes.starts_with(b"PK\x07\x08")
        {
            return ContentKind::Zip;
        }

        if bytes.starts_with(&[0x1f, 0x8b]) {
            return ContentKind::Gzip;
        }

        let head = &bytes[..bytes.len().min(512)];
        let text = String::from_utf8_lossy(head);
        let text = text.trim_start_matches('\u{feff}').trim_start().to_lowercase();

        if text.starts_with("<!doctype html") || text.starts_with("<html") {
            ContentKind::Html
        } else if text.starts_with('<') {
            ContentKind::Xml
        } else if text.starts_with('{') || text.starts_with('[') {
            ContentKind::Json
        } else {
            ContentKind::Unknown
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Zip => "application/zip",
            ContentKind::Gzip => "application/gzip",
            ContentKind::Xml => "application/xml",
            ContentKind::Html => "text/html",
            ContentKind::Json => "application/json",
            ContentKind::Empty => "application/x-empty",
            ContentKind::Unknown => "application/octet-stream",
        }
    }

    /// Only zip archives can be extracted into the modules directory.
    pub fn is_module_archive(&self) -> bool {
        matches!(self, ContentKind::Zip)
    }
}

/// Write a downloaded archive to a temporary file, removed when dropped.
pub fn write_temp_archive(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("presh-")
        .suffix(".zip")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

pub trait ArchiveExtractor {
    /// Extract a module archive into `dest` and return the module directory
    /// name found at its root. When `expected_module` is given the archive
    /// root must match it; this is checked before anything is written.
    fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        expected_module: Option<&str>,
    ) -> Result<String>;
}

#[derive(Debug, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }

    fn root_component(path: &Path) -> Option<String> {
        match path.components().next() {
            Some(Component::Normal(first)) => Some(first.to_string_lossy().into_owned()),
            _ => None,
        }
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        expected_module: Option<&str>,
    ) -> Result<String> {
        let file = File::open(archive).map_err(|e| {
            PreshError::Extract(format!("cannot open '{}': {e}", archive.display()))
        })?;
        let mut zip = ZipArchive::new(file)
            .map_err(|e| PreshError::Extract(format!("invalid zip archive: {e}")))?;

        let mut entries: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(zip.len());
        let mut root: Option<String> = None;

        for index in 0..zip.len() {
            let entry = zip
                .by_index(index)
                .map_err(|e| PreshError::Extract(format!("unreadable entry #{index}: {e}")))?;

            let path = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
                PreshError::Extract(format!("unsafe path '{}' in archive", entry.name()))
            })?;
            let first = Self::root_component(&path).ok_or_else(|| {
                PreshError::Extract(format!("unsafe path '{}' in archive", entry.name()))
            })?;

            if first == MACOS_METADATA_DIR {
                continue;
            }
            if path.components().count() == 1 && !entry.is_dir() {
                return Err(PreshError::Extract(format!(
                    "file '{}' is outside a module directory",
                    entry.name()
                )));
            }

            match &root {
                None => root = Some(first),
                Some(existing) if *existing != first => {
                    return Err(PreshError::Extract(format!(
                        "archive contains several top-level directories ('{}', '{}')",
                        existing, first
                    )));
                }
                Some(_) => {}
            }

            entries.push((index, path, entry.is_dir()));
        }

        let root = root.ok_or_else(|| PreshError::Extract("archive is empty".to_string()))?;
        if !PathValidator::is_valid_module_name(&root) {
            return Err(PreshError::Extract(format!(
                "archive root '{}' is not a valid module name",
                root
            )));
        }
        if let Some(expected) = expected_module {
            if root != expected {
                return Err(PreshError::Extract(format!(
                    "archive contains module '{}', expected '{}'",
                    root, expected
                )));
            }
        }

        for (index, relative, is_dir) in entries {
            let out_path = dest.join(&relative);
            let write_error =
                |e: io::Error| PreshError::Extract(format!("{}: {e}", out_path.display()));

            if is_dir {
                fs::create_dir_all(&out_path).map_err(write_error)?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }

            let mut entry = zip
                .by_index(index)
                .map_err(|e| PreshError::Extract(format!("unreadable entry #{index}: {e}")))?;
            let mut out_file = File::create(&out_path).map_err(write_error)?;
            io::copy(&mut entry, &mut out_file).map_err(write_error)?;
        }

        tracing::debug!(module = %root, dest = %dest.display(), "archive extracted");
        Ok(root)
    }
}
