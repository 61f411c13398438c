use anyhow::Context;
use aprescore::control::BlockingSession;
use aprescore::transport::HttpConnector;
use clap::Parser;
use commands::ConsoleCommand;
use settings::ConsoleConfig;
use std::path::PathBuf;

mod commands;
mod monitor;
mod report;
mod settings;

#[derive(Parser)]
#[command(author, version, about = "Operator console for ApRES radar surveys")]
struct Args {
    /// Load console settings from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Instrument base address, e.g. http://192.168.1.1
    #[arg(long)]
    address: Option<String>,
    /// Instrument API key
    #[arg(long)]
    key: Option<String>,
    /// Directory burst files are downloaded into
    #[arg(long)]
    survey_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: ConsoleCommand,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = ConsoleConfig::load_or_default(args.config.as_deref())?;
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(key) = args.key {
        config.key = key;
    }
    if let Some(directory) = args.survey_dir {
        config.controller.survey_directory = Some(directory);
    }

    let connector = HttpConnector::new(
        config.controller.request_timeout(),
        config.controller.result_poll_interval(),
    );
    let mut session = BlockingSession::new(connector, config.controller.clone())
        .context("starting controller runtime")?;

    if let ConsoleCommand::Monitor = args.command {
        let (runtime, controller) = session.into_parts();
        return runtime.block_on(monitor::run(controller, config.address, config.key));
    }
    commands::run(&mut session, &config, args.command)
}
