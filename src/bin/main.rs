use std::process;

use clap::Parser;
use logger::Logger;

#[macro_use]
extern crate log;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Parse command line arguments, initialize the logger and dispatch.
fn main() {
    // ----------------------------- Run CLI Parser
    let cli = parser::Cli::parse();

    // ----------------------------- Init logger.
    Logger::init(cli.verbose + u8::from(!cli.quiet));
    if cli.quiet {
        Logger::silence_warnings();
    }

    // ----------------------------- Serialize command line arguments
    if let Err(e) = cli.serialize() {
        warn!("Failed to serialize command line arguments: {e}");
    }

    // ----------------------------- Run
    if let Err(e) = cairn_rs::run(cli) {
        error!("{e:?}");
        process::exit(1);
    }
}
