//! # pvectl
//!
//! Command-line front-end for the hypervisor management API. Submits
//! operations and follows the server-side tasks they start.
//!
//! ## Usage
//! ```bash
//! pvectl submit nodes/pve1/qemu/100/status/start
//! pvectl log --follow 'UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:'
//! pvectl --dev submit nodes/pve1/qemu/100/status/start
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod cli;
mod commands;
mod config;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    if args.log_json {
        pvectl_common::init_logging_json(&args.log_level)?;
    } else {
        pvectl_common::init_logging(&args.log_level)?;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting pvectl");

    let config = config::load(&args)?;

    let client = if args.dev {
        info!("Development mode: using in-memory API");
        commands::dev_client(&config, args.command.upid())
            .context("Failed to create development client")?
    } else {
        pvectl_api::Client::new(&config).context("Failed to create API client")?
    };

    commands::run(&client, args.command).await
}
