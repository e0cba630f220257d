//! # Main — CLI entry point
//!
//! Parses the `controller`/`worker` subcommand and runs the corresponding
//! server on a fresh Tokio runtime, the same `tokio::runtime::Runtime::new()?
//! .block_on(...)` shape the ancestor binary used to drive its own async
//! dashboard subcommand from a synchronous `main`.

use anyhow::Result;
use clap::Parser;

use kvcluster::config::{Cli, Commands};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    kvcluster::config::init_tracing();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Controller(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(kvcluster::controller::run(args.address, args))
        }
        Commands::Worker(args) => {
            let bind = args.bind_addr()?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(kvcluster::worker::run(bind, args))
        }
    }
}
