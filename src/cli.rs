//! CLI argument definitions using clap derive macros.
//!
//! Every tunable is an `Option` so that an explicit flag can be told apart
//! from an unset one when merging with the config file.

use std::path::PathBuf;

use archive_fetcher::RunMode;
use clap::Parser;

/// Fetch archived captures listed in a JSON entry file.
///
/// Each entry is a `[id, timestamp, url, content_type]` row. Sequential mode
/// saves one snapshot per entry under `downloaded_data/`; concurrent mode
/// crawls embedded resources through a SOCKS proxy into `downloads/`.
#[derive(Parser, Debug)]
#[command(name = "archive-fetcher")]
#[command(author, version, about)]
pub struct Args {
    /// JSON entry list to process
    #[arg(default_value = "metadata.json")]
    pub input: PathBuf,

    /// Processing mode: sequential or concurrent [default: concurrent]
    #[arg(short, long)]
    pub mode: Option<RunMode>,

    /// Worker count in concurrent mode (1-100) [default: 5]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Rate-limit backoff cycles per page before giving up (1-100) [default: 5]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_retries: Option<u32>,

    /// Root directory for saved files [default: .]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Archive service base URL [default: https://web.archive.org]
    #[arg(long)]
    pub archive_base: Option<String>,

    /// Proxy URL for all requests, e.g. socks5h://127.0.0.1:9050
    #[arg(long, conflicts_with = "direct")]
    pub proxy: Option<String>,

    /// Never use a proxy, even in concurrent mode
    #[arg(long)]
    pub direct: bool,

    /// Tor control port address [default: 127.0.0.1:9051]
    #[arg(long)]
    pub control_addr: Option<String>,

    /// Tor control port password
    #[arg(long, env = "ARCHIVE_FETCHER_CONTROL_PASSWORD", hide_env_values = true)]
    pub control_password: Option<String>,

    /// Tor control auth cookie file [default: the one the control port advertises]
    #[arg(long, conflicts_with = "control_password")]
    pub control_cookie: Option<PathBuf>,

    /// Rotate identity after every N saved pages (0 disables) [default: 1]
    #[arg(long)]
    pub rotate_every: Option<u32>,

    /// Seconds to pause after an identity rotation (0-600) [default: 10]
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=600))]
    pub settle_secs: Option<u64>,

    /// Config file [default: $XDG_CONFIG_HOME/archive-fetcher/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
