use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "presh",
    about = "PrestaShop helper - keep an install's modules in sync with the add-ons catalog",
    version,
    author
)]
pub struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to <install-dir>/presh.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Path to the shop install (defaults to current directory)
    #[arg(short = 'd', long, default_value = ".")]
    pub install_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[command(flatten)]
    pub install: InstallArgs,

    /// Language ISO code sent to the add-ons API (e.g. "en")
    #[arg(long)]
    pub locale: Option<String>,

    /// Country ISO code sent to the add-ons API (e.g. "us")
    #[arg(long)]
    pub country: Option<String>,

    /// Maximum age of the cached catalog before it is refreshed
    #[arg(long, value_name = "SECONDS")]
    pub cache_max_age: Option<u64>,

    /// Network timeout for each request
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Filter modules by name using glob syntax (e.g. "block*")
    #[arg(long, value_name = "GLOB")]
    pub filter: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and apply module updates from the add-ons catalog
    UpdateModules {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Review each update before applying it
        #[arg(short, long)]
        interactive: bool,
    },

    /// Show available module updates without applying them
    CheckModules {
        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// List the modules present in the install
    ListModules {
        #[command(flatten)]
        install: InstallArgs,
    },

    /// Register a module already present in the modules directory
    InstallModule {
        #[command(flatten)]
        install: InstallArgs,

        /// Module directory name
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Download a module archive from a URL and extract it into the install
    DownloadModule {
        #[command(flatten)]
        install: InstallArgs,

        /// Network timeout for the download
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Archive URL (http or https)
        #[arg(value_name = "URL")]
        url: String,
    },
}
