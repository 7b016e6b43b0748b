//! # casefs CLI
//!
//! Mounts a directory so that lookups whose letter case does not match the
//! on-disk names still succeed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use casefs_config::Config;

mod config;
mod mount;
mod report;
mod resolve;

/// casefs - case-insensitive view of a case-sensitive directory
#[derive(Parser)]
#[command(name = "casefs")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(flatten)]
    mount: mount::MountArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a match report written by a previous mount
    Report {
        /// Report file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Resolve one path against a directory without mounting
    Resolve(resolve::ResolveArgs),

    /// Show configuration
    Config {
        /// Read this file instead of the global and project config
        #[arg(long, global = true, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: config::ConfigCommand,
    },
}

/// Load configuration, from `explicit` alone when given.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Config::load().context("Failed to load config"),
    }
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = load_config(cli.mount.config.as_deref())?;
            mount::run(cli.mount, config)
        }
        Some(Commands::Report { file }) => {
            let config = load_config(None)?;
            casefs_config::init_logging(config.log_level(), None)?;
            report::run(&file)
        }
        Some(Commands::Resolve(args)) => {
            let config = load_config(None)?;
            casefs_config::init_logging(config.log_level(), None)?;
            resolve::run(args)
        }
        Some(Commands::Config { config, command }) => {
            let loaded = load_config(config.as_deref())?;
            config::run(command, &loaded)
        }
    }
}
