//! repack - development server for multi-platform React Native bundles.

mod actor;
mod cli;
mod compiler;
mod config;
mod core;
mod engine;
mod logger;
mod reload;
mod symbolicate;
mod utils;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::ProjectConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Arc::new(ProjectConfig::load(&cli)?);

    match &cli.command {
        Commands::Start { .. } => cli::serve::serve(config, cli.verbose),
        Commands::Worker { platform } => cli::worker::run_worker(config, platform),
    }
}
