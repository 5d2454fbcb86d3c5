//! merco-studio entry point.
//!
//! ```bash
//! cargo run -p merco-studio                 # against the configured server
//! cargo run -p merco-studio -- --memory     # offline, in-process store
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use merco_studio::Cli;

fn main() -> Result<()> {
    // Logs go to stderr so they don't interleave with REPL output on stdout.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    merco_studio::run(Cli::parse())
}
