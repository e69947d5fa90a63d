use clap::Parser;
use std::time::Duration;

use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS, FetchConfig};

#[derive(Parser, Debug)]
#[command(name = "fwpluck")]
#[command(version)]
#[command(about = "Extract single files from remote firmware archives using HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  fwpluck -l https://example.com/fw.ipsw                       list files in a remote archive\n  \
  fwpluck https://example.com/fw.ipsw BuildManifest.plist      extract one file\n  \
  fwpluck -o - https://example.com/fw.ipsw Restore.plist | less   send a file to stdout\n  \
  fwpluck --kbag https://example.com/fw.ipsw Firmware/dfu/iBSS.img3   print the key bag")]
pub struct Cli {
    /// Archive URL or local path
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Entry to extract
    #[arg(value_name = "ENTRY", required_unless_present = "list")]
    pub entry: Option<String>,

    /// List entries and exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Output path ("-" for stdout; default: entry base name)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<String>,

    /// Extract into this directory
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Scan the extracted entry for a key bag and print IV+key as hex
    #[arg(long)]
    pub kbag: bool,

    /// Total attempts at opening the archive
    #[arg(long, env = "FWPLUCK_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,

    /// Per-request timeout in seconds
    #[arg(long, env = "FWPLUCK_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Bytes fetched per range request while extracting
    #[arg(long, env = "FWPLUCK_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// User-Agent header sent with every request
    #[arg(long, env = "FWPLUCK_USER_AGENT")]
    pub user_agent: Option<String>,

    /// More log output (-vv for trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    pub fn is_pipe(&self) -> bool {
        self.output.as_deref() == Some("-")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.is_pipe()
    }

    /// Default log filter directive for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match (self.verbose, self.quiet) {
            (0, 0) if self.is_pipe() => "warn",
            (0, 0) => "info",
            (1, _) => "debug",
            (v, _) if v > 1 => "trace",
            (_, 1) => "warn",
            _ => "error",
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let mut config = FetchConfig {
            timeout: Duration::from_secs(self.timeout),
            max_attempts: self.attempts,
            chunk_size: self.chunk_size,
            ..FetchConfig::default()
        };
        if let Some(ua) = &self.user_agent {
            config.user_agent = ua.clone();
        }
        config
    }
}
