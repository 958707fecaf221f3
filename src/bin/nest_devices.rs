//! nest_devices - List the Nest cameras the sync daemon would mirror.
//!
//! Prints one `id<TAB>name` line per camera, in home graph order.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use nest_clip_sync::auth::GpsOAuthExchange;
use nest_clip_sync::config::CONFIG_PATH_ENV;
use nest_clip_sync::device::FoyerHomeGraph;
use nest_clip_sync::{DeviceCatalog, SyncConfig, TokenCache};

#[derive(Parser, Debug)]
#[command(author, version, about = "List Nest cameras visible to the configured account")]
struct Args {
    #[arg(long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let cfg = SyncConfig::load(args.config.as_deref())?;
    let mut tokens = TokenCache::new(
        cfg.google_username.clone(),
        cfg.master_token.clone(),
        Box::new(GpsOAuthExchange::new(cfg.request_timeout)),
    );
    let mut catalog = match &cfg.devices {
        Some(devices) => DeviceCatalog::fixed(devices.clone()),
        None => DeviceCatalog::from_home_graph(Box::new(FoyerHomeGraph::new(cfg.request_timeout))),
    };

    for device in catalog.list_camera_devices(&mut tokens)? {
        println!("{}\t{}", device.id, device.name);
    }
    Ok(())
}
