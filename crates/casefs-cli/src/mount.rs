use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use anyhow::{Context, Result};
use casefs_config::path::{ensure_disjoint, resolve_dir, resolve_output};
use casefs_config::{
    init_logging, log_cli_debug, log_cli_error, log_cli_info, log_cli_warn, Config,
};
use casefs_core::{CaseFs, MatchReport, Passthrough};
use casefs_fuse::MountOptions;
use clap::Args;
use nix::sys::signal::{SigSet, Signal};

#[derive(Args, Debug, Default)]
pub struct MountArgs {
    /// Where the case-insensitive view appears
    #[arg(value_name = "MOUNTPOINT", required = true)]
    pub mountpoint: Option<PathBuf>,

    /// Case-sensitive directory being served
    #[arg(value_name = "ORIGDIR", required = true)]
    pub origdir: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Write the match report (JSON) here on shutdown
    #[arg(long, value_name = "PATH")]
    pub report_file: Option<PathBuf>,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Read this config file instead of the global and project config
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl MountArgs {
    /// Command-line flags win over every config layer.
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.log_file {
            config.log.file = Some(path.clone());
        }
        if let Some(path) = &self.report_file {
            config.report.path = Some(path.clone());
        }
        if self.allow_other {
            config.mount.allow_other = true;
        }
    }
}

fn mount_options(config: &Config) -> MountOptions {
    MountOptions {
        fsname: config.mount.fsname.clone(),
        allow_other: config.mount.allow_other,
        auto_unmount: config.mount.auto_unmount,
    }
}

/// Block SIGINT/SIGTERM in this thread, and in every thread spawned after it,
/// then wait for them on a dedicated thread.
fn forward_shutdown_signals(tx: Sender<()>) -> Result<()> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals
        .thread_block()
        .context("Failed to block shutdown signals")?;

    std::thread::Builder::new()
        .name("casefs-signals".to_string())
        .spawn(move || {
            match signals.wait() {
                Ok(signal) => log_cli_info!("received signal", signal = signal.as_str()),
                Err(e) => log_cli_warn!("waiting for signals failed", error = e),
            }
            let _ = tx.send(());
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

/// Execute the mount command. Blocks until a shutdown signal or an external
/// unmount.
pub fn run(args: MountArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);

    let log_file = config.log.file.as_deref().map(resolve_output).transpose()?;
    init_logging(config.log_level(), log_file.as_deref())
        .context("Failed to initialize logging")?;
    log_cli_debug!(
        "effective mount config",
        fsname = &config.mount.fsname,
        allow_other = config.mount.allow_other,
        auto_unmount = config.mount.auto_unmount
    );

    let (Some(mountpoint), Some(origdir)) = (args.mountpoint, args.origdir) else {
        anyhow::bail!("Both MOUNTPOINT and ORIGDIR are required");
    };
    let mountpoint = resolve_dir(&mountpoint)?;
    let backing = resolve_dir(&origdir)?;
    ensure_disjoint(&mountpoint, &backing)?;

    let report = config
        .report
        .path
        .as_deref()
        .map(resolve_output)
        .transpose()?
        .map(|path| Arc::new(MatchReport::new(path, config.report.pretty)));

    log_cli_info!(
        "mounting",
        mountpoint = mountpoint.display(),
        backing = backing.display(),
        report = report
            .as_ref()
            .map(|r| r.output().display().to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );

    let fs = Arc::new(CaseFs::new(Passthrough::new(&backing), report));

    let (tx, rx) = mpsc::channel();
    forward_shutdown_signals(tx.clone())?;
    let session = casefs_fuse::spawn(Arc::clone(&fs), &mountpoint, &mount_options(&config), tx)?;

    // Either the signal thread or the filesystem's destroy callback fires.
    let _ = rx.recv();
    log_cli_info!("unmounting", mountpoint = mountpoint.display());
    session.join();

    match fs.flush_report() {
        Ok(true) => {
            if let Some(report) = fs.report() {
                log_cli_info!(
                    "match report written",
                    path = report.output().display(),
                    entries = report.len()
                );
            }
        }
        Ok(false) => {}
        Err(e) => log_cli_error!("failed to write match report", error = e),
    }
    Ok(())
}
