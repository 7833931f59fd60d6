pub mod args;
pub mod commands;
pub mod config;
pub mod error;
pub mod group;
pub mod manifest;
pub mod metadata;
pub mod plan;
pub mod platform;
pub mod rt;
pub mod scan;
pub mod upload;

use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Upload(args) => commands::upload(args),
        Commands::Login(args) => commands::login(args),
        Commands::Logout(args) => commands::logout(args),
    };

    if let Err(err) = result {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let default_level = match &cli.command {
        Commands::Upload(args) => args.log_level.as_str(),
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
