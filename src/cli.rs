//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Media download service.
///
/// Serves the REST API for submitting media URLs, following job progress and
/// collecting the resulting files.
#[derive(Parser, Debug)]
#[command(name = "media-dl")]
#[command(author, version, about)]
pub struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Address to bind the API server to
    #[arg(short = 'b', long)]
    pub bind: Option<SocketAddr>,

    /// Directory for permanent downloads
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Directory for temp artifacts and working files
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Default log filter when `RUST_LOG` is unset
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
