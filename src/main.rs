use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use subwatch::config::CONFIG_DIR;
use subwatch::{ChannelHandler, Notification, Registry, Settings, Subscription};

#[derive(Parser)]
#[command(name = "subwatch")]
#[command(about = "Watch files and directories, including ones that do not exist yet")]
struct Cli {
    /// Settings file (defaults to the nearest .subwatch/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Config,

    /// Print a line for every change to the given paths
    Watch {
        /// Directories or files to watch; they do not need to exist yet
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Missing-path retry interval in milliseconds (overrides config)
        #[arg(long)]
        rescan_ms: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load configuration")?;

    subwatch::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");
            if config_path.exists() && !force {
                bail!(
                    "configuration file already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            Settings::default()
                .save(&config_path)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Created configuration file at: {}", config_path.display());
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Watch { paths, rescan_ms } => {
            if let Some(ms) = rescan_ms {
                settings.watcher.rescan_interval_ms = ms;
            }
            watch(&settings, &paths)?;
        }
    }

    Ok(())
}

fn watch(settings: &Settings, paths: &[PathBuf]) -> anyhow::Result<()> {
    let registry: Registry<String> = Registry::builder().config(&settings.watcher).build();

    let (tx, rx) = crossbeam_channel::unbounded();
    if !registry.startup(Arc::new(ChannelHandler::new(tx))) {
        bail!("could not initialize the kernel watcher");
    }

    for path in paths {
        registry.add(Arc::new(subscription_for(path)))?;
    }

    let stats = registry.stats();
    eprintln!(
        "watching {} path(s), {} not available yet",
        stats.active, stats.missing
    );

    for (notification, label) in rx.iter() {
        match notification {
            Notification::Event { path, mask } => {
                println!("{:<24} {path}  ({label})", mask.describe())
            }
            Notification::Found { path } => println!("{:<24} {path}  ({label})", "FOUND"),
        }
    }

    Ok(())
}

/// Existing directories are watched as a whole; anything else is treated
/// as a file inside its parent directory.
fn subscription_for(path: &Path) -> Subscription<String> {
    let label = path.display().to_string();

    if path.is_dir() {
        return Subscription::directory(trim_dir(path), label);
    }

    let dirname = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => trim_dir(parent),
        _ => ".".to_string(),
    };
    match path.file_name() {
        Some(name) => Subscription::file(dirname, name.to_string_lossy(), label),
        None => Subscription::directory(dirname, label),
    }
}

fn trim_dir(path: &Path) -> String {
    let text = path.to_string_lossy();
    let trimmed = text.trim_end_matches('/');
    if trimmed.is_empty() && text.starts_with('/') {
        // Root: "<dirname>/<name>" must still come out as "/<name>".
        String::new()
    } else {
        trimmed.to_string()
    }
}
