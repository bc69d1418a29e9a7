use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rootmod::backend::BackendKind;
use rootmod::config::SettingsManager;
use rootmod::models::{InstallOutcome, ModuleRecord, OperationResult};
use rootmod::modules::{InstallCallback, ModuleManager};
use rootmod::LogCollector;

/// rootmod - manage Magisk / KernelSU modules from a root shell
#[derive(Parser)]
#[command(name = "rootmod")]
#[command(about = "Manage Magisk / KernelSU modules")]
#[command(version)]
struct Cli {
    /// Path to settings file (defaults to ~/.config/rootmod/settings.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Module root override
    #[arg(long)]
    module_root: Option<PathBuf>,

    /// Backend override: auto, magisk or kernelsu
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Log verbosity (-v for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed modules
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one module
    Info {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Enable a module
    Enable { id: String },
    /// Disable a module
    Disable { id: String },
    /// Mark a module for removal on next boot
    Remove { id: String },
    /// Install a module archive
    Install { archive: PathBuf },
    /// Show backend and version
    Version,
}

struct ConsoleInstall;

impl InstallCallback for ConsoleInstall {
    fn on_stdout(&self, line: &str) {
        println!("{}", line);
    }

    fn on_stderr(&self, line: &str) {
        eprintln!("{}", line);
    }

    fn on_success(&self, id: &str) {
        println!("Installed {}", id);
    }

    fn on_failure(&self) {
        eprintln!("Install failed");
    }
}

fn print_module(module: &ModuleRecord) {
    let updated = chrono::DateTime::from_timestamp_millis(module.last_updated)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<28} {:<8} {:<16} {:>8}  {}",
        module.id, module.state, module.version, module.version_code, updated
    );
}

fn report(result: OperationResult) -> Result<()> {
    match result {
        OperationResult::Success { id } => {
            println!("{}: ok", id);
            Ok(())
        }
        OperationResult::Failure { id, message } => match message {
            Some(message) => bail!("{}: {}", id, message),
            None => bail!("{}: module not found", id),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => SettingsManager::load(path),
        None => SettingsManager::load_global(),
    };
    if let Some(root) = cli.module_root {
        settings.module_root = root;
    }
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }
    if cli.verbose > 0 {
        settings.debug_logging = true;
    }

    match LogCollector::new(&settings.log_dir, settings.log_level(), None) {
        Ok(collector) => {
            if let Err(e) = collector.init_global_logger() {
                eprintln!("[Main] WARNING: Failed to register logger: {}", e);
            }
        }
        Err(e) => eprintln!("[Main] WARNING: Logging disabled: {}", e),
    }

    let manager = ModuleManager::from_settings(&settings);

    let outcome = match cli.command {
        Commands::List { json } => {
            let modules = manager.get_modules();
            if json {
                println!("{}", serde_json::to_string_pretty(&modules)?);
            } else if modules.is_empty() {
                println!("No modules under {}", manager.module_root().display());
            } else {
                modules.iter().for_each(print_module);
            }
            Ok(())
        }
        Commands::Info { id, json } => match manager.get_module_by_id(&id) {
            Some(module) if json => {
                println!("{}", serde_json::to_string_pretty(&module)?);
                Ok(())
            }
            Some(module) => {
                println!("{}", module.display_name());
                print_module(&module);
                if !module.description.is_empty() {
                    println!("  {}", module.description);
                }
                Ok(())
            }
            None => Err(anyhow::anyhow!("{}: module not found", id)),
        },
        Commands::Enable { id } => report(manager.enable(&id).await),
        Commands::Disable { id } => report(manager.disable(&id).await),
        Commands::Remove { id } => report(manager.remove(&id).await),
        Commands::Install { archive } => {
            match manager.install(&archive).drive(&ConsoleInstall).await {
                InstallOutcome::Success { .. } => Ok(()),
                InstallOutcome::Failure => {
                    Err(anyhow::anyhow!("install of {} failed", archive.display()))
                }
            }
        }
        Commands::Version => {
            println!(
                "{} {} ({})",
                manager.backend().name(),
                manager.backend_version().await,
                manager.backend_version_code().await
            );
            Ok(())
        }
    };

    log::logger().flush();
    outcome
}
