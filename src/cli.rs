//! Command-line interface definitions for newstrace.
//!
//! Limits given here override the `--config` file; anything left unset falls
//! back to the file and then to built-in defaults (see [`crate::config`]).

use crate::jobs::SubmitPolicy;
use clap::Parser;
use std::path::PathBuf;
use url::Url;

/// Crawl news outlets and collect author/headline pairs.
///
/// # Examples
///
/// ```sh
/// # Crawl one outlet with default limits into the current directory
/// newstrace https://www.example-news.com
///
/// # Two outlets, shallower crawl, output elsewhere
/// newstrace -d 2 -p 50 -o ./data bbc.co.uk https://www.theguardian.com
///
/// # With a settings file and a keyword model
/// newstrace -c crawl.yaml -k keywords.yaml https://www.example-news.com
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Outlet homepages to crawl (a bare domain implies https://)
    #[arg(required = true, value_name = "SEED_URL", value_parser = parse_seed)]
    pub seeds: Vec<Url>,

    /// Maximum link distance from the seed [default: 4]
    #[arg(short = 'd', long, env = "NEWSTRACE_MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Maximum pages fetched per outlet [default: 100]
    #[arg(short = 'p', long, env = "NEWSTRACE_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Maximum concurrent fetches per outlet [default: 12]
    #[arg(short = 't', long, env = "NEWSTRACE_MAX_THREADS")]
    pub max_threads: Option<usize>,

    /// Per-request timeout in seconds [default: 10]
    #[arg(long, env = "NEWSTRACE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Directory for the output tables and crawl reports
    #[arg(short, long, env = "NEWSTRACE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "NEWSTRACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Optional YAML keyword model; frequency keywords are used without it
    #[arg(short, long, env = "NEWSTRACE_KEYWORD_MODEL")]
    pub keyword_model: Option<PathBuf>,

    /// Display name stored in the `outlet` column (single seed only)
    #[arg(long)]
    pub outlet_name: Option<String>,

    /// What to do when an outlet is submitted twice
    #[arg(long, value_enum)]
    pub policy: Option<SubmitPolicy>,
}

fn parse_seed(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|e| format!("invalid seed URL {raw:?}: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(format!("seed must be an http(s) URL with a host: {raw:?}")),
    }
}
