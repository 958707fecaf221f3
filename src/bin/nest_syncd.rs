//! nest_syncd - Nest camera clip sync daemon
//!
//! Loads settings from a config file and the environment, discovers the Nest
//! cameras on the account, then mirrors new event clips into `BASE_PATH`
//! every refresh interval until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use nest_clip_sync::{config::CONFIG_PATH_ENV, Scheduler, SyncConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Mirror Nest camera event clips to local storage")]
struct Args {
    /// Config file (TOML, or JSON when the extension is .json).
    /// Environment variables override values read from it.
    #[arg(long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Run a single sync cycle and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = match SyncConfig::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    cfg.display();

    let mut scheduler = Scheduler::from_config(&cfg);
    let shutdown = scheduler.shutdown_handle();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, finishing current device...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    if args.once {
        let report = scheduler.run_once()?;
        let totals = report.totals();
        println!(
            "downloaded {} skipped {} failed {} ({} devices failed)",
            totals.downloaded,
            totals.skipped,
            totals.failed,
            report.failed_devices()
        );
        return Ok(());
    }

    scheduler.run();
    Ok(())
}
