use clap::Parser;
use tokio_util::sync::CancellationToken;

mod cli;
mod commands;
mod exit_codes;
mod output;
mod run_params;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing completed units...");
            watcher.cancel();
        }
    });

    let quiet = cli.quiet;
    let exit_code = match cli.command {
        cli::Command::Methods(args) => commands::methods::execute(args),
        cli::Command::Params(args) => commands::params::execute(args),
        cli::Command::Detect(args) => commands::detect::execute(args, quiet, token).await,
        cli::Command::Batch(args) => commands::batch::execute(args, quiet, token).await,
        cli::Command::Validate(args) => commands::validate::execute(args),
        cli::Command::Agree(args) => commands::agree::execute(args),
        cli::Command::Consensus(args) => commands::consensus::execute(args),
    };

    std::process::exit(exit_code);
}
