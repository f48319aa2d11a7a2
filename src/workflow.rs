use crate::agents::{
    CancellationFlag, UpdateApplier, UpdateInteraction, UpdatePlanItem, UpdateReport,
    VersionDiffer,
};
use crate::catalog::CatalogFetcher;
use crate::cli::{CatalogArgs, InstallArgs};
use crate::config::{ConfigOverrides, PreshConfig};
use crate::error::{PreshError, Result};
use crate::manager::{LocalModuleManager, ModuleManager};
use crate::store::{AddonsClient, StoreApi, StoreLocale};
use crate::utils::{
    ArchiveExtractor, ContentKind, PatternMatcher, ZipExtractor, write_temp_archive,
};
use colored::Colorize;
use std::path::{Path, PathBuf};

fn catalog_overrides(config_path: Option<PathBuf>, args: &CatalogArgs) -> ConfigOverrides {
    ConfigOverrides {
        config_path,
        locale: args.locale.clone(),
        country: args.country.clone(),
        cache_max_age_secs: args.cache_max_age,
        timeout_secs: args.timeout,
    }
}

fn resolve_config(install_dir: &Path, overrides: &ConfigOverrides) -> Result<PreshConfig> {
    let config = PreshConfig::resolve(install_dir, overrides)?;
    println!(
        "{}",
        format!("✓ Install found at {}", config.install_dir.display()).green()
    );
    Ok(config)
}

/// Execute the update workflow. Returns whether every module update succeeded.
pub fn execute_update(
    config_path: Option<PathBuf>,
    args: &CatalogArgs,
    interactive: bool,
    cancel: CancellationFlag,
) -> Result<bool> {
    println!("{}", "Starting module update process...".cyan().bold());

    println!("\n{}", "1. Loading configuration...".yellow());
    let config = resolve_config(
        &args.install.install_dir,
        &catalog_overrides(config_path, args),
    )?;
    let locale = config.require_locale()?;

    let store = AddonsClient::new(&config.store)?;
    let manager = LocalModuleManager::from_config(&config);

    let report = run_update(
        &config,
        &store,
        &manager,
        &locale,
        args.filter.as_deref(),
        interactive,
        cancel,
    )?;

    print_update_report(&report);

    if report.cancelled {
        println!("\n{}", "Update cancelled.".yellow());
    } else if report.is_empty() {
        println!("\n{}", "No updates were applied".yellow());
    } else if report.is_success() {
        println!(
            "\n{}",
            format!("✨ {} module(s) updated successfully!", report.succeeded())
                .green()
                .bold()
        );
    } else {
        println!(
            "\n{}",
            format!(
                "⚠ {} of {} module update(s) failed",
                report.failures().count(),
                report.results.len()
            )
            .red()
            .bold()
        );
    }

    Ok(report.is_success())
}

fn run_update(
    config: &PreshConfig,
    store: &dyn StoreApi,
    manager: &dyn ModuleManager,
    locale: &StoreLocale,
    filter: Option<&str>,
    interactive: bool,
    cancel: CancellationFlag,
) -> Result<UpdateReport> {
    let plan = build_plan(config, store, manager, locale, filter)?;
    print_plan(&plan);

    let plan = if interactive {
        match confirm_plan(plan) {
            Ok(plan) => plan,
            Err(PreshError::UserCancelled) => {
                return Ok(UpdateReport {
                    results: Vec::new(),
                    cancelled: true,
                });
            }
            Err(e) => return Err(e),
        }
    } else {
        plan
    };

    println!("\n{}", "4. Applying updates...".yellow());
    let extractor = ZipExtractor::new();
    let report = UpdateApplier::new(store, &extractor, manager, locale.clone())
        .with_cancellation(cancel)
        .with_progress(!interactive)
        .apply(&plan, &config.install_dir)?;
    println!("{}", "✓ Update completed".green());

    Ok(report)
}

/// Fetch the catalog and diff it against the install (steps 2 and 3).
fn build_plan(
    config: &PreshConfig,
    store: &dyn StoreApi,
    manager: &dyn ModuleManager,
    locale: &StoreLocale,
    filter: Option<&str>,
) -> Result<Vec<UpdatePlanItem>> {
    println!("\n{}", "2. Fetching module catalog...".yellow());
    let fetcher = CatalogFetcher::new(store, &config.cache_path, config.cache_max_age);
    let catalog = fetcher.fetch(locale)?;
    if catalog.is_empty() {
        println!("{}", "⚠ Module catalog is empty or unavailable".red());
    } else {
        println!(
            "{}",
            format!(
                "✓ {} module(s) in catalog (fetched {})",
                catalog.len(),
                catalog.fetched_at.strftime("%Y-%m-%d %H:%M:%S")
            )
            .green()
        );
    }

    println!("\n{}", "3. Comparing installed modules...".yellow());
    let installed = manager.list_installed()?;
    println!("   Found {} module(s) in the install", installed.len());

    let mut differ = VersionDiffer::new();
    if let Some(pattern) = filter {
        differ = differ.with_filter(PatternMatcher::new(pattern)?);
    }
    Ok(differ.diff(&installed, &catalog))
}

fn confirm_plan(plan: Vec<UpdatePlanItem>) -> Result<Vec<UpdatePlanItem>> {
    let mut interaction = UpdateInteraction::new();
    let mut accepted = Vec::with_capacity(plan.len());
    for item in plan {
        if interaction.confirm(&item.name, &item.installed_version, &item.target_version)? {
            accepted.push(item);
        }
    }
    Ok(accepted)
}

fn print_plan(plan: &[UpdatePlanItem]) {
    if plan.is_empty() {
        println!("{}", "✓ All modules are up to date".green());
        return;
    }

    println!("{}", format!("Found {} update(s)", plan.len()).yellow());
    for item in plan {
        println!(
            "  • {} {} → {}",
            item.name.white().bold(),
            item.installed_version.red(),
            item.target_version.green().bold()
        );
    }
}

fn print_update_report(report: &UpdateReport) {
    if report.is_empty() {
        return;
    }

    println!("\n{}", "📦 Module updates:".cyan().bold());
    for result in &report.results {
        if result.is_success() {
            let detail = result
                .detail
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default();
            println!(
                "  {} {} {}{}",
                "✓".green(),
                result.name.white().bold(),
                result.target_version.green(),
                detail.dimmed()
            );
        } else {
            println!(
                "  {} {} {}: {}",
                "✗".red(),
                result.name.white().bold(),
                result.outcome.to_string().red(),
                result.detail.as_deref().unwrap_or("-").dimmed()
            );
        }
    }
}

/// Execute the check workflow (dry-run)
pub fn execute_check(config_path: Option<PathBuf>, args: &CatalogArgs) -> Result<()> {
    println!("{}", "Checking for available module updates...".cyan().bold());

    println!("\n{}", "1. Loading configuration...".yellow());
    let config = resolve_config(
        &args.install.install_dir,
        &catalog_overrides(config_path, args),
    )?;
    let locale = config.require_locale()?;

    let store = AddonsClient::new(&config.store)?;
    let manager = LocalModuleManager::from_config(&config);
    let plan = build_plan(&config, &store, &manager, &locale, args.filter.as_deref())?;
    println!("{}", "✓ Check completed".green());

    if plan.is_empty() {
        println!("\n{}", "✨ All modules are up to date!".green().bold());
        return Ok(());
    }

    println!("\n{}", "📦 Available Updates:".cyan().bold());
    print_plan(&plan);
    println!("\n{}", "To apply these updates, run:".dimmed());
    println!("  {}", "presh update-modules".cyan());
    Ok(())
}

/// Execute the list workflow - display the modules of the install
pub fn execute_list(config_path: Option<PathBuf>, args: &InstallArgs) -> Result<()> {
    println!("{}", "Listing installed modules...".cyan().bold());

    println!("\n{}", "1. Loading configuration...".yellow());
    let overrides = ConfigOverrides {
        config_path,
        ..ConfigOverrides::default()
    };
    let config = resolve_config(&args.install_dir, &overrides)?;

    println!("\n{}", "2. Scanning modules directory...".yellow());
    let modules = LocalModuleManager::from_config(&config).list_installed()?;

    if modules.is_empty() {
        println!(
            "{}",
            format!("No modules found in {}", config.modules_dir.display()).yellow()
        );
        return Ok(());
    }

    println!("\n{}", "📦 Modules:".cyan().bold());
    for module in &modules {
        let state = if module.installed {
            "installed".green()
        } else {
            "not installed".dimmed()
        };
        println!(
            "  • {} {} ({})",
            module.name.white().bold(),
            module.version.bright_cyan(),
            state
        );
    }
    println!("\n{}", format!("Total: {} module(s)", modules.len()).dimmed());
    Ok(())
}

/// Register a module already copied into the modules directory
pub fn execute_install(
    config_path: Option<PathBuf>,
    args: &InstallArgs,
    name: &str,
) -> Result<()> {
    println!("{}", format!("Installing module '{}'...", name).cyan().bold());

    println!("\n{}", "1. Loading configuration...".yellow());
    let overrides = ConfigOverrides {
        config_path,
        ..ConfigOverrides::default()
    };
    let config = resolve_config(&args.install_dir, &overrides)?;

    println!("\n{}", "2. Registering module...".yellow());
    if LocalModuleManager::from_config(&config).install(name)? {
        println!("{}", format!("✓ Module '{}' installed", name).green());
    } else {
        println!("{}", format!("Module '{}' is already installed", name).yellow());
    }
    Ok(())
}

/// Download a module archive from an arbitrary URL and extract it
pub fn execute_download(
    config_path: Option<PathBuf>,
    args: &InstallArgs,
    timeout: Option<u64>,
    url: &str,
) -> Result<()> {
    println!("{}", "Downloading module archive...".cyan().bold());

    println!("\n{}", "1. Loading configuration...".yellow());
    let overrides = ConfigOverrides {
        config_path,
        timeout_secs: timeout,
        ..ConfigOverrides::default()
    };
    let config = resolve_config(&args.install_dir, &overrides)?;

    println!("\n{}", "2. Downloading...".yellow());
    let client = AddonsClient::new(&config.store)?;
    let bytes = client.download_url(url)?;
    println!("   Received {} bytes", bytes.len());

    println!("\n{}", "3. Extracting...".yellow());
    let module = extract_download(&bytes, &config.modules_dir, &ZipExtractor::new())?;
    println!(
        "{}",
        format!("✓ Module '{}' extracted to {}", module, config.modules_dir.display()).green()
    );
    println!("\n{}", "To register it, run:".dimmed());
    println!("  {}", format!("presh install-module {module}").cyan());
    Ok(())
}

fn extract_download(
    bytes: &[u8],
    modules_dir: &Path,
    extractor: &dyn ArchiveExtractor,
) -> Result<String> {
    let kind = ContentKind::classify(bytes);
    if !kind.is_module_archive() {
        return Err(PreshError::Download(format!(
            "unexpected content type {}",
            kind.mime()
        )));
    }

    std::fs::create_dir_all(modules_dir)?;
    let archive = write_temp_archive(bytes)?;
    extractor.extract(archive.path(), modules_dir, None)
}
