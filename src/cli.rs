//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Link GEO datasets to their publications and fetch open-access PDFs.
///
/// Resolved links and downloaded PDFs are kept in a working directory so
/// later runs answer from the local registry.
#[derive(Parser, Debug)]
#[command(name = "nspider")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Working directory holding `database/` and `publication/` [default: .]
    #[arg(short = 'w', long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/nspider/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Delay between download directory listings in milliseconds (max 60000)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub poll_interval_ms: Option<u64>,

    /// Directory listings per download attempt (1-100)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub poll_limit: Option<u32>,

    /// Hosting domain whose links are each attempted individually
    #[arg(long, global = true)]
    pub primary_domain: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Link datasets to publications, downloading open-access PDFs
    Resolve {
        /// Numeric GEO DataSets uids
        #[arg(required = true)]
        dataset_ids: Vec<String>,

        /// Print PubMed ids instead of DOIs
        #[arg(long)]
        external_ids: bool,
    },

    /// Make sure a publication's PDF is stored locally
    Fetch {
        /// DOI (`/` may be written `_slash`) or numeric PubMed id
        identifier: String,

        /// Print the extracted full text instead of the path
        #[arg(long)]
        text: bool,
    },

    /// Show what the registry knows about a dataset or publication
    Lookup {
        /// Dataset uid, DOI or PubMed id
        identifier: String,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}
