use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

mod args;
mod auth;
mod cfg;
mod job;
mod notion;
mod properties;
mod sheets;
mod store;

use args::Args;
use cfg::Cfg;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Starting notion_sheet_sync");

    let result = match Cfg::load(args) {
        Ok(cfg) => job::run_job(cfg).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => {
            info!("notion_sheet_sync completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("notion_sheet_sync failed: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(level: &str) {
    let filter = match level {
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(filter).init();
}
