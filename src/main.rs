mod cli;
mod config;
mod data;
mod error;
mod remote;

use clap::Parser;

use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp_secs()
        .init();

    cli::run(cli)
}
