use anyhow::Context;
use clap::Parser;
use config::SimulatorConfig;
use instrument::Instrument;
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

mod config;
mod generator;
mod instrument;
mod server;

#[derive(Parser)]
#[command(author, version, about = "Emulated ApRES radar served over HTTP")]
struct Args {
    /// Load the simulator config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// API key the instrument accepts
    #[arg(long)]
    key: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    /// Behave as if the storage card were missing
    #[arg(long, default_value_t = false)]
    no_sd_card: bool,
    /// Report no GPS fix
    #[arg(long, default_value_t = false)]
    no_gps: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(key) = args.key {
        config.api_key = key;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.sd_card_present &= !args.no_sd_card;
    config.gps_fix &= !args.no_gps;

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating simulator runtime")?;
    runtime.block_on(async move {
        let bind = config.bind;
        let state = Arc::new(Mutex::new(Instrument::new(config)));
        let (addr, server) = warp::serve(server::routes(state))
            .try_bind_with_graceful_shutdown(bind, async {
                let _ = signal::ctrl_c().await;
            })
            .with_context(|| format!("binding simulator to {bind}"))?;
        info!("simulated instrument listening on http://{addr}");
        println!("Simulated ApRES at http://{addr} (Ctrl+C to stop)");
        server.await;
        info!("simulator stopped");
        Ok::<(), anyhow::Error>(())
    })
}
