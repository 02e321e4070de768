//! JSON crawl reports.
//!
//! After each job a pretty-printed [`CrawlSummary`] is written next to the
//! outlet's output table:
//!
//! ```text
//! output_dir/
//! ├── bbc_co_uk_data.csv     # rows, appended during the crawl
//! └── bbc_co_uk_crawl.json   # this report, replaced after every run
//! ```
//!
//! The report is written to a temporary file and renamed into place, so a
//! reader never sees a half-written report.

use crate::models::{CrawlSummary, sanitize_domain, REPORT_SUFFIX};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the report for `domain` inside `output_dir`.
pub fn report_path(output_dir: &Path, domain: &str) -> PathBuf {
    output_dir.join(format!("{}{}", sanitize_domain(domain), REPORT_SUFFIX))
}

/// Write `summary` as `<sanitised-domain>_crawl.json` inside `output_dir`.
///
/// # Returns
///
/// The path written, or an error if serialisation or the write fails.
#[instrument(level = "info", skip_all, fields(outlet = %summary.domain))]
pub async fn write_report(
    summary: &CrawlSummary,
    output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(summary)?;
    let path = report_path(output_dir, &summary.domain);
    let tmp = path.with_extension("json.tmp");

    if let Err(e) = fs::write(&tmp, json).await {
        error!(path = %tmp.display(), error = %e, "Failed to write crawl report");
        return Err(e.into());
    }
    fs::rename(&tmp, &path).await?;
    info!(path = %path.display(), "Wrote crawl report");

    Ok(path)
}
