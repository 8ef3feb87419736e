use anyhow::Result;
use callvault::{
    app,
    cli::{handle_history_command, handle_status_command, handle_upload_command, Cli, CliCommand},
    config::Config,
};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command.unwrap_or(CliCommand::Run) {
        CliCommand::Version => {
            println!("callvault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Status => handle_status_command(),
        CliCommand::History(args) => handle_history_command(args),
        CliCommand::Upload(args) => {
            let config = load_config(cli.config.as_deref())?;
            handle_upload_command(&config, args).await
        }
        CliCommand::Run => app::run_service(load_config(cli.config.as_deref())?).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
