//! `up` binary

use clap::Parser;
use cli::Args;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = up_core::logging::init(args.log_level) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match cli::execute(args).await {
        Ok(()) => {
            info!("up completed its mission!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(code = err.code(), err = %err, "up failed");
            ExitCode::FAILURE
        }
    }
}
