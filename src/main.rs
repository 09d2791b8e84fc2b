use clap::Parser;
use std::process::ExitCode;
use svcforge::{CliArgs, LoggingConfig, init_logging, run};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _guard = init_logging(LoggingConfig::from_env())?;

    let cli = CliArgs::parse();
    run(cli).await
}
