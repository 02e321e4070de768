//! Data models shared by the crawler, the extractor and the output table.
//!
//! - [`Outlet`]: the news organisation being crawled, identified by domain
//! - [`CrawlLimits`] / [`CrawlJob`]: an immutable description of one crawl
//! - [`FetchedPage`] / [`PageResult`]: what the fetcher hands to the extractor
//! - [`ArticleRecord`]: one author/headline pair destined for the output table
//! - [`CrawlSummary`]: the per-job report written after the crawl ends

use crate::errors::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Author value used when no byline heuristic matched.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Suffix of the per-outlet output table.
pub const TABLE_SUFFIX: &str = "_data.csv";

/// Suffix of the per-outlet crawl report.
pub const REPORT_SUFFIX: &str = "_crawl.json";

/// A news outlet, identified by the host of its homepage.
///
/// The domain is lower-cased and stripped of a leading `www.` so that
/// `https://www.example.com/` and `https://example.com/` name the same outlet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Outlet {
    domain: String,
    name: String,
}

impl Outlet {
    /// Build an outlet from a seed URL. Returns `None` for URLs without a host.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let domain = bare_host(host);
        if domain.is_empty() {
            return None;
        }
        Some(Self {
            name: domain.clone(),
            domain,
        })
    }

    /// Override the display name (defaults to the domain).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.name = name.trim().to_string();
        }
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `host` belongs to this outlet's authority.
    pub fn owns_host(&self, host: &str) -> bool {
        bare_host(host) == self.domain
    }

    /// File name of the outlet's output table, e.g. `bbc_co_uk_data.csv`.
    pub fn table_file_name(&self) -> String {
        format!("{}{}", sanitize_domain(&self.domain), TABLE_SUFFIX)
    }
}

/// Lower-case a host and drop a leading `www.`.
pub fn bare_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Lower-case and replace every non-alphanumeric character with `_`.
pub fn sanitize_domain(domain: &str) -> String {
    domain
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Bounds on a single crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlLimits {
    /// Maximum link distance from the seed that may be fetched.
    pub max_depth: usize,
    /// Maximum number of pages fetched over the whole job.
    pub max_pages: usize,
    /// Maximum number of fetch+extract tasks in flight.
    pub max_threads: usize,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_pages: 100,
            max_threads: 12,
        }
    }
}

/// One crawl of one outlet. Immutable once started.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub seed: Url,
    pub outlet: Outlet,
    pub limits: CrawlLimits,
}

impl CrawlJob {
    /// Create a job for `seed`. Returns `None` if the seed has no host.
    pub fn new(seed: Url, limits: CrawlLimits) -> Option<Self> {
        let outlet = Outlet::from_url(&seed)?;
        Some(Self {
            seed,
            outlet,
            limits,
        })
    }

    pub fn with_outlet_name(mut self, name: impl Into<String>) -> Self {
        self.outlet = self.outlet.with_name(name);
        self
    }
}

/// A page body as returned by a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after following redirects.
    pub final_url: Url,
    pub html: String,
}

/// Outcome of fetching one frontier entry.
#[derive(Debug)]
pub struct PageResult {
    pub url: Url,
    pub depth: usize,
    pub page: Result<FetchedPage, FetchError>,
}

/// One author/headline pair extracted from an article page.
///
/// `author`, `headline` and `source_url` are stored verbatim in the output
/// table; `keywords` and `topics` are best-effort tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub author: String,
    pub headline: String,
    pub source_url: String,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub outlet: String,
    pub scraped_at: String,
}

/// Lifecycle of a running crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    /// Frontier has entries to dispatch.
    Running,
    /// Frontier is empty (or closed) but tasks are still in flight.
    Draining,
    Done,
}

/// Report of a finished crawl, written as JSON next to the output table.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub seed: String,
    pub outlet: String,
    pub domain: String,
    pub limits: CrawlLimits,
    pub pages_fetched: usize,
    pub articles_found: usize,
    pub records_written: usize,
    pub duplicates_skipped: usize,
    pub links_rejected: usize,
    pub failures: BTreeMap<String, usize>,
    pub cancelled: bool,
    pub elapsed_ms: u128,
    pub table_path: String,
}
