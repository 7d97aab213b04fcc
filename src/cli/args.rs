//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Re.Pack development server
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: repack.toml)
    #[arg(short = 'C', long, global = true, default_value = "repack.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the development server
    #[command(visible_alias = "s")]
    Start {
        #[command(flatten)]
        args: StartArgs,
    },

    /// Build a single platform and stream results on stdout (internal)
    #[command(hide = true)]
    Worker {
        /// Platform to build
        #[arg(long)]
        platform: String,
    },
}

/// Arguments of the `start` command. Every option overrides `repack.toml`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// HTTP port number
    #[arg(short, long)]
    pub port: Option<u16>,

    /// HMR WebSocket port number
    #[arg(long)]
    pub hmr_port: Option<u16>,

    /// Platforms to build (comma separated, e.g. `ios,android`)
    #[arg(long, value_delimiter = ',')]
    pub platform: Vec<String>,

    /// TLS certificate (PEM), enables HTTPS together with --key
    #[arg(long, requires = "key", value_hint = clap::ValueHint::FilePath)]
    pub cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, requires = "cert", value_hint = clap::ValueHint::FilePath)]
    pub key: Option<PathBuf>,

    /// Build every platform in its own worker process
    #[arg(short, long)]
    pub workers: bool,
}

impl Cli {
    pub fn start_args(&self) -> Option<&StartArgs> {
        match &self.command {
            Commands::Start { args } => Some(args),
            Commands::Worker { .. } => None,
        }
    }
}
