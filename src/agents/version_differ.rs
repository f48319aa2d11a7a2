use crate::catalog::{CatalogSnapshot, VersionComparator};
use crate::manager::InstalledModule;
use crate::utils::PatternMatcher;
use std::collections::HashSet;

/// One module that has a newer version in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlanItem {
    pub name: String,
    pub remote_id: String,
    pub installed_version: String,
    pub target_version: String,
}

/// Computes the update plan from the installed modules and the catalog.
#[derive(Debug, Default)]
pub struct VersionDiffer {
    filter: Option<PatternMatcher>,
}

impl VersionDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only plan modules whose name matches `filter`.
    pub fn with_filter(mut self, filter: PatternMatcher) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Plan items come out in the order of `installed`. The `installed` flag is
    /// not consulted: modules present on disk but not registered are still
    /// updated.
    pub fn diff(
        &self,
        installed: &[InstalledModule],
        catalog: &CatalogSnapshot,
    ) -> Vec<UpdatePlanItem> {
        let mut seen = HashSet::new();
        let mut plan = Vec::new();

        for module in installed {
            if !seen.insert(module.name.as_str()) {
                continue;
            }
            if let Some(filter) = &self.filter {
                if !filter.matches(&module.name) {
                    continue;
                }
            }

            let Some(entry) = catalog.get(&module.name) else {
                continue;
            };

            if VersionComparator::is_newer(&entry.version, &module.version) {
                plan.push(UpdatePlanItem {
                    name: module.name.clone(),
                    remote_id: entry.remote_id.clone(),
                    installed_version: module.version.clone(),
                    target_version: entry.version.clone(),
                });
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use jiff::Timestamp;

    fn catalog(entries: &[(&str, &str, &str)]) -> CatalogSnapshot {
        CatalogSnapshot::new(
            entries.iter().map(|(name, id, version)| CatalogEntry {
                name: name.to_string(),
                remote_id: id.to_string(),
                version: version.to_string(),
            }),
            Timestamp::now(),
        )
    }

    #[test]
    fn includes_only_strictly_newer_versions() {
        let installed = vec![
            InstalledModule::new("blockbanner", "1.2.0", true),
            InstalledModule::new("statsdata", "1.3.0", true),
            InstalledModule::new("blockcart", "2.0", true),
        ];
        let catalog = catalog(&[
            ("blockbanner", "1", "1.2.1"),
            ("statsdata", "2", "1.2.9"),
            ("blockcart", "3", "2.0.0"),
        ]);

        let plan = VersionDiffer::new().diff(&installed, &catalog);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "blockbanner");
        assert_eq!(plan[0].installed_version, "1.2.0");
        assert_eq!(plan[0].target_version, "1.2.1");
    }

    #[test]
    fn modules_missing_from_catalog_are_skipped() {
        let installed = vec![InstalledModule::new("custommodule", "0.1.0", true)];
        let plan = VersionDiffer::new().diff(&installed, &catalog(&[]));
        assert!(plan.is_empty());
    }

    #[test]
    fn uninstalled_modules_are_still_planned() {
        let installed = vec![InstalledModule::new("blockbanner", "1.0.0", false)];
        let catalog = catalog(&[("blockbanner", "42", "1.1.0")]);

        let plan = VersionDiffer::new().diff(&installed, &catalog);

        assert_eq!(
            plan,
            vec![UpdatePlanItem {
                name: "blockbanner".to_string(),
                remote_id: "42".to_string(),
                installed_version: "1.0.0".to_string(),
                target_version: "1.1.0".to_string(),
            }]
        );
    }

    #[test]
    fn output_is_deterministic_and_follows_input_order() {
        let installed = vec![
            InstalledModule::new("zeta", "1.0.0", true),
            InstalledModule::new("alpha", "1.0.0", true),
            InstalledModule::new("mid", "1.0.0", true),
            InstalledModule::new("alpha", "1.0.0", true),
        ];
        let catalog = catalog(&[
            ("alpha", "1", "1.0.1"),
            ("mid", "2", "1.0.1"),
            ("zeta", "3", "1.0.1"),
        ]);

        let differ = VersionDiffer::new();
        let first = differ.diff(&installed, &catalog);
        let second = differ.diff(&installed, &catalog);

        let names: Vec<_> = first.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn filter_restricts_plan() {
        let installed = vec![
            InstalledModule::new("blockbanner", "1.0.0", true),
            InstalledModule::new("statsdata", "1.0.0", true),
        ];
        let catalog = catalog(&[("blockbanner", "1", "1.1.0"), ("statsdata", "2", "1.1.0")]);

        let plan = VersionDiffer::new()
            .with_filter(PatternMatcher::new("stats*").unwrap())
            .diff(&installed, &catalog);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "statsdata");
    }
}
