//! Automate CLI: build packages into a local registry and run them.

use automate::core::settings::{Settings, ROOT_ENV};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "automate",
    version,
    about = "Declarative package build-and-run tool: providers, recipes, and a local registry"
)]
struct Cli {
    /// Tool root holding the cache and registry (default: ~/.automate)
    #[arg(long, global = true, env = ROOT_ENV)]
    root: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `automate=trace`
    #[arg(long, global = true, env = "AUTOMATE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: automate::cli::Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    automate::logging::init(cli.log_level.as_deref());

    let result = match Settings::resolve(cli.root) {
        Ok(settings) => automate::cli::dispatch(cli.command, &settings).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
