use anyhow::Result;
use clap::Parser;
use ralfinho::config::{Cli, Command, Config};
use ralfinho::session;
use std::process::ExitCode;

/// Configuration and setup errors, before any iteration ran.
const SETUP_FAILURE: u8 = 1;

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Command::View(args)) => {
            session::run_view(args).await?;
            Ok(0)
        }
        None => {
            let config = Config::load(cli.run)?;
            let summary = session::run_live(config).await?;
            eprint!("{}", summary.render());
            Ok(summary.exit_code())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("ralfinho: {err:#}");
            ExitCode::from(SETUP_FAILURE)
        }
    }
}
