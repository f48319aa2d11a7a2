use crate::agents::version_differ::UpdatePlanItem;
use crate::config::MODULES_DIR;
use crate::error::{PreshError, Result};
use crate::manager::ModuleManager;
use crate::store::{StoreApi, StoreLocale};
use crate::utils::{ArchiveExtractor, ContentKind, write_temp_archive};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    DownloadFailed,
    ExtractFailed,
    UpgradeFailed,
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateOutcome::Success => "updated",
            UpdateOutcome::DownloadFailed => "download failed",
            UpdateOutcome::ExtractFailed => "extraction failed",
            UpdateOutcome::UpgradeFailed => "upgrade failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub name: String,
    pub target_version: String,
    pub outcome: UpdateOutcome,
    pub detail: Option<String>,
}

impl UpdateResult {
    pub fn is_success(&self) -> bool {
        self.outcome == UpdateOutcome::Success
    }
}

/// Per-module outcomes of one apply run, in plan order
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub results: Vec<UpdateResult>,
    /// Set when the run stopped before the end of the plan.
    pub cancelled: bool,
}

impl UpdateReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UpdateResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }
}

/// Shared stop signal, checked between plan items.
///
/// A stop request is only honoured while an apply run holds the flag armed.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
    armed: Arc<AtomicBool>,
}

struct ArmedGuard<'a>(&'a CancellationFlag);

impl Drop for ArmedGuard<'_> {
    fn drop(&mut self) {
        self.0.armed.store(false, Ordering::SeqCst);
    }
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ask a running apply to stop after the current module.
    ///
    /// Returns `false` when nothing will pick the request up: no apply is
    /// running, or a stop was already requested. The caller should then
    /// terminate on its own.
    pub fn request_stop(&self) -> bool {
        self.armed.load(Ordering::SeqCst) && !self.cancelled.swap(true, Ordering::SeqCst)
    }

    fn arm(&self) -> ArmedGuard<'_> {
        self.armed.store(true, Ordering::SeqCst);
        ArmedGuard(self)
    }
}

/// Downloads, extracts and upgrades the modules of an update plan, one at a
/// time. A failing module never stops the others.
pub struct UpdateApplier<'a> {
    store: &'a dyn StoreApi,
    extractor: &'a dyn ArchiveExtractor,
    manager: &'a dyn ModuleManager,
    locale: StoreLocale,
    cancel: CancellationFlag,
    show_progress: bool,
}

type ItemFailure = (UpdateOutcome, PreshError);

impl<'a> UpdateApplier<'a> {
    pub fn new(
        store: &'a dyn StoreApi,
        extractor: &'a dyn ArchiveExtractor,
        manager: &'a dyn ModuleManager,
        locale: StoreLocale,
    ) -> Self {
        Self {
            store,
            extractor,
            manager,
            locale,
            cancel: CancellationFlag::new(),
            show_progress: false,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Apply `plan` to the install at `install_dir`.
    ///
    /// Only problems with the install itself are returned as errors; every
    /// per-module failure ends up in the report.
    pub fn apply(&self, plan: &[UpdatePlanItem], install_dir: &Path) -> Result<UpdateReport> {
        if !install_dir.is_dir() {
            return Err(PreshError::Configuration(format!(
                "Install directory '{}' does not exist",
                install_dir.display()
            )));
        }

        let modules_dir = install_dir.join(MODULES_DIR);
        fs::create_dir_all(&modules_dir).map_err(|e| {
            PreshError::Configuration(format!(
                "Cannot use modules directory '{}': {e}",
                modules_dir.display()
            ))
        })?;

        let _armed = self.cancel.arm();
        let pb = self.progress_bar(plan.len());
        let mut report = UpdateReport::default();

        for item in plan {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    processed = report.results.len(),
                    remaining = plan.len() - report.results.len(),
                    "update cancelled"
                );
                report.cancelled = true;
                break;
            }

            pb.set_message(format!("Updating {}", item.name));
            let result = match self.apply_item(item, &modules_dir) {
                Ok(detail) => UpdateResult {
                    name: item.name.clone(),
                    target_version: item.target_version.clone(),
                    outcome: UpdateOutcome::Success,
                    detail,
                },
                Err((outcome, err)) => {
                    tracing::warn!(
                        module = %item.name,
                        %outcome,
                        error = %err,
                        "module update failed"
                    );
                    UpdateResult {
                        name: item.name.clone(),
                        target_version: item.target_version.clone(),
                        outcome,
                        detail: Some(err.to_string()),
                    }
                }
            };
            report.results.push(result);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(report)
    }

    fn apply_item(
        &self,
        item: &UpdatePlanItem,
        modules_dir: &Path,
    ) -> std::result::Result<Option<String>, ItemFailure> {
        use UpdateOutcome::{DownloadFailed, ExtractFailed, UpgradeFailed};

        let bytes = self
            .store
            .download_module(&item.remote_id, &self.locale)
            .map_err(|e| (DownloadFailed, e))?;

        let kind = ContentKind::classify(&bytes);
        if !kind.is_module_archive() {
            return Err((
                DownloadFailed,
                PreshError::Download(format!("unexpected content type {}", kind.mime())),
            ));
        }

        // removed on drop, whatever happens below
        let archive = write_temp_archive(&bytes).map_err(|e| (DownloadFailed, e))?;
        self.extractor
            .extract(archive.path(), modules_dir, Some(&item.name))
            .map_err(|e| (ExtractFailed, e))?;
        drop(archive);

        let handle = self
            .manager
            .get_instance(&item.name)
            .map_err(|e| (UpgradeFailed, e))?
            .ok_or_else(|| {
                (
                    UpgradeFailed,
                    PreshError::Upgrade(format!(
                        "module '{}' is unreadable after extraction",
                        item.name
                    )),
                )
            })?;

        if !self
            .manager
            .needs_upgrade(&handle)
            .map_err(|e| (UpgradeFailed, e))?
        {
            return Ok(None);
        }

        self.manager
            .run_upgrade(&handle)
            .map_err(|e| (UpgradeFailed, e))?;

        Ok(Some(format!(
            "upgraded from {}",
            handle.registered_version.as_deref().unwrap_or("unknown")
        )))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("  [{bar:40}] {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleHooks;
    use crate::manager::LocalModuleManager;
    use crate::utils::ZipExtractor;
    use crate::utils::archive::test_support::zip_bytes;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use tempfile::{TempDir, tempdir};

    struct FakeStore {
        archives: HashMap<String, Vec<u8>>,
        requested: RefCell<Vec<String>>,
        cancel_after_download: Option<CancellationFlag>,
    }

    impl FakeStore {
        fn new(archives: Vec<(&str, Vec<u8>)>) -> Self {
            Self {
                archives: archives
                    .into_iter()
                    .map(|(id, bytes)| (id.to_string(), bytes))
                    .collect(),
                requested: RefCell::new(Vec::new()),
                cancel_after_download: None,
            }
        }
    }

    impl StoreApi for FakeStore {
        fn fetch_catalog(&self, _locale: &StoreLocale) -> Result<String> {
            unreachable!("applier never fetches the catalog")
        }

        fn download_module(&self, remote_id: &str, _locale: &StoreLocale) -> Result<Vec<u8>> {
            self.requested.borrow_mut().push(remote_id.to_string());
            if let Some(flag) = &self.cancel_after_download {
                assert!(flag.request_stop());
            }
            self.archives
                .get(remote_id)
                .cloned()
                .ok_or_else(|| PreshError::Download(format!("timed out after 30s ({remote_id})")))
        }
    }

    struct CountingExtractor {
        calls: Cell<usize>,
    }

    impl ArchiveExtractor for CountingExtractor {
        fn extract(
            &self,
            archive: &Path,
            dest: &Path,
            expected_module: Option<&str>,
        ) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            ZipExtractor::new().extract(archive, dest, expected_module)
        }
    }

    fn module_zip(name: &str, version: &str) -> Vec<u8> {
        let config = format!("{name}/config.xml");
        let body = format!("<module><name>{name}</name><version>{version}</version></module>");
        zip_bytes(&[(config.as_str(), body.as_str())])
    }

    fn plan_item(name: &str, remote_id: &str, target: &str) -> UpdatePlanItem {
        UpdatePlanItem {
            name: name.to_string(),
            remote_id: remote_id.to_string(),
            installed_version: "1.0.0".to_string(),
            target_version: target.to_string(),
        }
    }

    fn manager(root: &TempDir, hooks: ModuleHooks) -> LocalModuleManager {
        LocalModuleManager::new(
            root.path(),
            root.path().join("modules"),
            root.path().join("config/presh_modules.json"),
            hooks,
        )
    }

    fn locale() -> StoreLocale {
        StoreLocale::new("en", "us")
    }

    #[test]
    fn failing_item_does_not_block_the_next() {
        let root = tempdir().unwrap();
        let store = FakeStore::new(vec![("2", module_zip("statsdata", "2.0.0"))]);
        let manager = manager(&root, ModuleHooks::default());
        let extractor = ZipExtractor::new();

        let plan = vec![
            plan_item("blockbanner", "1", "1.1.0"),
            plan_item("statsdata", "2", "2.0.0"),
        ];
        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(&plan, root.path())
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].name, "blockbanner");
        assert_eq!(report.results[0].outcome, UpdateOutcome::DownloadFailed);
        assert_eq!(report.results[1].name, "statsdata");
        assert_eq!(report.results[1].outcome, UpdateOutcome::Success);
        assert!(root.path().join("modules/statsdata/config.xml").exists());
        assert_eq!(report.succeeded(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn non_archive_content_is_download_failure_without_extraction() {
        let root = tempdir().unwrap();
        let store = FakeStore::new(vec![(
            "42",
            b"<?xml version=\"1.0\"?><error>Module not found</error>".to_vec(),
        )]);
        let manager = manager(&root, ModuleHooks::default());
        let extractor = CountingExtractor {
            calls: Cell::new(0),
        };

        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(&[plan_item("blockbanner", "42", "1.1.0")], root.path())
            .unwrap();

        assert_eq!(report.results[0].outcome, UpdateOutcome::DownloadFailed);
        assert!(
            report.results[0]
                .detail
                .as_deref()
                .unwrap()
                .contains("application/xml")
        );
        assert_eq!(extractor.calls.get(), 0);
    }

    #[test]
    fn wrong_archive_is_extract_failure_and_isolated() {
        let root = tempdir().unwrap();
        let store = FakeStore::new(vec![
            ("1", module_zip("somethingelse", "1.1.0")),
            ("2", module_zip("statsdata", "2.0.0")),
        ]);
        let manager = manager(&root, ModuleHooks::default());
        let extractor = ZipExtractor::new();

        let plan = vec![
            plan_item("blockbanner", "1", "1.1.0"),
            plan_item("statsdata", "2", "2.0.0"),
        ];
        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(&plan, root.path())
            .unwrap();

        assert_eq!(report.results[0].outcome, UpdateOutcome::ExtractFailed);
        assert_eq!(report.results[1].outcome, UpdateOutcome::Success);
        assert!(!root.path().join("modules/somethingelse").exists());
    }

    #[test]
    fn registered_module_is_upgraded_after_extraction() {
        let root = tempdir().unwrap();
        let module_dir = root.path().join("modules/blockbanner");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(
            module_dir.join("config.xml"),
            "<module><name>blockbanner</name><version>1.0.0</version></module>",
        )
        .unwrap();
        let manager = manager(&root, ModuleHooks::default());
        manager.install("blockbanner").unwrap();

        let store = FakeStore::new(vec![("42", module_zip("blockbanner", "1.1.0"))]);
        let extractor = ZipExtractor::new();
        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(&[plan_item("blockbanner", "42", "1.1.0")], root.path())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.results[0].detail.as_deref(),
            Some("upgraded from 1.0.0")
        );
        let handle = manager.get_instance("blockbanner").unwrap().unwrap();
        assert_eq!(handle.registered_version.as_deref(), Some("1.1.0"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_upgrade_routine_is_upgrade_failure() {
        let root = tempdir().unwrap();
        let module_dir = root.path().join("modules/blockbanner");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(
            module_dir.join("config.xml"),
            "<module><version>1.0.0</version></module>",
        )
        .unwrap();
        let hooks = ModuleHooks {
            install: None,
            upgrade: Some("false {module}".to_string()),
        };
        let manager = manager(&root, hooks);
        manager.install("blockbanner").unwrap();

        let store = FakeStore::new(vec![("42", module_zip("blockbanner", "1.1.0"))]);
        let extractor = ZipExtractor::new();
        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(&[plan_item("blockbanner", "42", "1.1.0")], root.path())
            .unwrap();

        assert_eq!(report.results[0].outcome, UpdateOutcome::UpgradeFailed);
    }

    #[test]
    fn cancellation_stops_between_items() {
        let root = tempdir().unwrap();
        let cancel = CancellationFlag::new();
        let mut store = FakeStore::new(vec![
            ("1", module_zip("blockbanner", "1.1.0")),
            ("2", module_zip("statsdata", "2.0.0")),
        ]);
        store.cancel_after_download = Some(cancel.clone());
        let manager = manager(&root, ModuleHooks::default());
        let extractor = ZipExtractor::new();

        let plan = vec![
            plan_item("blockbanner", "1", "1.1.0"),
            plan_item("statsdata", "2", "2.0.0"),
        ];
        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .with_cancellation(cancel)
            .apply(&plan, root.path())
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].outcome, UpdateOutcome::Success);
        assert_eq!(*store.requested.borrow(), vec!["1".to_string()]);
        assert!(!report.is_success());
    }

    #[test]
    fn stop_request_only_taken_while_applying() {
        let cancel = CancellationFlag::new();
        assert!(!cancel.request_stop());
        assert!(!cancel.is_cancelled());

        {
            let _armed = cancel.arm();
            assert!(cancel.request_stop());
            assert!(cancel.is_cancelled());
            // a second request is not absorbed
            assert!(!cancel.request_stop());
        }
        assert!(!cancel.request_stop());
    }

    #[test]
    fn flag_is_disarmed_after_apply() {
        let root = tempdir().unwrap();
        let cancel = CancellationFlag::new();
        let store = FakeStore::new(vec![("1", module_zip("blockbanner", "1.1.0"))]);
        let manager = manager(&root, ModuleHooks::default());
        let extractor = ZipExtractor::new();

        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .with_cancellation(cancel.clone())
            .apply(&[plan_item("blockbanner", "1", "1.1.0")], root.path())
            .unwrap();

        assert!(report.is_success());
        assert!(!cancel.request_stop());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn missing_install_dir_is_fatal() {
        let root = tempdir().unwrap();
        let store = FakeStore::new(Vec::new());
        let manager = manager(&root, ModuleHooks::default());
        let extractor = ZipExtractor::new();

        let err = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(
                &[plan_item("blockbanner", "1", "1.1.0")],
                &root.path().join("missing"),
            )
            .unwrap_err();

        assert!(matches!(err, PreshError::Configuration(_)));
        assert!(store.requested.borrow().is_empty());
    }

    #[test]
    fn empty_plan_is_success() {
        let root = tempdir().unwrap();
        let store = FakeStore::new(Vec::new());
        let manager = manager(&root, ModuleHooks::default());
        let extractor = ZipExtractor::new();

        let report = UpdateApplier::new(&store, &extractor, &manager, locale())
            .apply(&[], root.path())
            .unwrap();

        assert!(report.is_empty());
        assert!(report.is_success());
    }
}
