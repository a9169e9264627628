//! lotmond - parking occupancy monitor daemon
//!
//! This daemon:
//! 1. Loads the monitor config (file from `LOTMON_CONFIG`, then `LOTMON_*` env)
//! 2. Starts one detection loop per configured source
//! 3. Serves counts, history and MJPEG streams over HTTP until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use lot_monitor::{ApiServer, MonitorConfig, Supervisor};

#[derive(Parser, Debug)]
#[command(author, version, about = "Parking occupancy monitor")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "LOTMON_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the HTTP API.
    #[arg(long, env = "LOTMON_API_ADDR")]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = MonitorConfig::load_with(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        cfg.api_addr = addr;
    }

    let api_config = cfg.api_config();
    let supervisor = Supervisor::new(cfg)?.start()?;
    if supervisor.ready == 0 {
        log::warn!("no source started; the API will serve placeholders only");
    }

    let api_handle = ApiServer::new(api_config, supervisor.registry.clone()).spawn()?;
    log::info!("lot monitor api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("lotmond waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
