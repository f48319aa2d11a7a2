mod agents;
mod catalog;
mod cli;
mod config;
mod error;
mod manager;
mod observability;
mod store;
mod utils;
mod workflow;

use agents::CancellationFlag;
use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use std::process;

const EXIT_FAILURES: i32 = 1;
const EXIT_FATAL: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

/// While modules are being applied the first Ctrl-C lets the current module
/// finish; any other Ctrl-C ends the process.
fn install_interrupt_handler(cancel: &CancellationFlag) -> anyhow::Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        if cancel.request_stop() {
            eprintln!(
                "\n{}",
                "Interrupted, stopping after the current module (Ctrl-C again to abort)..."
                    .yellow()
            );
        } else {
            eprintln!("\n{}", "Interrupted".yellow());
            process::exit(EXIT_INTERRUPTED);
        }
    })
    .context("failed to install Ctrl-C handler")
}

fn main() {
    let cli = Cli::parse();
    observability::init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::UpdateModules {
            catalog,
            interactive,
        } => {
            let cancel = CancellationFlag::new();
            if let Err(e) = install_interrupt_handler(&cancel) {
                tracing::warn!(error = %e, "running without interrupt handling");
            }
            workflow::execute_update(cli.config, &catalog, interactive, cancel)
        }
        Commands::CheckModules { catalog } => {
            workflow::execute_check(cli.config, &catalog).map(|_| true)
        }
        Commands::ListModules { install } => {
            workflow::execute_list(cli.config, &install).map(|_| true)
        }
        Commands::InstallModule { install, name } => {
            workflow::execute_install(cli.config, &install, &name).map(|_| true)
        }
        Commands::DownloadModule {
            install,
            timeout,
            url,
        } => workflow::execute_download(cli.config, &install, timeout, &url).map(|_| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_FAILURES),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(EXIT_FATAL);
        }
    }
}
