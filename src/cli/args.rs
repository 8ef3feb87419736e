use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "callvault")]
#[command(about = "Record phone calls and upload them reliably", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Read call-state signals from stdin and record calls (default)
    Run,
    /// Print version information
    Version,
    /// Show the recording left in progress by a previous run, if any
    Status,
    /// List uploaded recordings
    History(HistoryCliArgs),
    /// Upload a finished recording through the retrying pipeline
    Upload(UploadCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct HistoryCliArgs {
    /// Maximum number of results to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

#[derive(ClapArgs, Debug)]
pub struct UploadCliArgs {
    /// Recording file to upload
    pub file: PathBuf,
}
