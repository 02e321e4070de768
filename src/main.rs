//! # newstrace
//!
//! Crawls news outlets' websites and collects who wrote what: every article
//! page found within the crawl limits becomes one author/headline row in a
//! per-outlet CSV table that a dashboard can read while the crawl runs.
//!
//! ## Features
//!
//! - Bounded breadth-first crawl per outlet (depth, page and concurrency limits)
//! - Same-domain link normalisation with tracking-parameter removal
//! - Heuristic article detection with an ordered byline cascade
//! - Keyword tags from a YAML keyword model, or word frequency without one
//! - Incremental, deduplicated, crash-tolerant CSV output
//! - One background job per outlet; duplicate submissions coalesce
//!
//! ## Usage
//!
//! ```sh
//! newstrace -o ./data https://www.example-news.com bbc.co.uk
//! ```
//!
//! ## Architecture
//!
//! 1. **Settings**: CLI flags over an optional YAML file over defaults
//! 2. **Submission**: each seed becomes a [`models::CrawlJob`] in the [`jobs::JobRegistry`]
//! 3. **Crawl**: [`crawler::Crawler`] fetches, extracts and appends rows as it goes
//! 4. **Output**: `<outlet>_data.csv` during the crawl, `<outlet>_crawl.json` after it

use clap::Parser;
use futures::future::join_all;
use itertools::Itertools;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod crawler;
mod errors;
mod extract;
mod fetcher;
mod jobs;
mod models;
mod outputs;
mod sink;
mod urls;
mod utils;

use cli::Cli;
use config::CrawlSettings;
use crawler::Crawler;
use errors::CrawlError;
use extract::ArticleExtractor;
use extract::keywords::select_keyword_extractor;
use fetcher::HttpFetcher;
use jobs::{JobRegistry, JobStatus, Submission};
use models::{CrawlJob, bare_host};
use outputs::json;
use utils::ensure_writable_dir;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newstrace starting up");

    let args = Cli::parse();
    debug!(seeds = %args.seeds.iter().join(", "), output_dir = %args.output_dir.display(), "Parsed CLI arguments");

    let settings = match CrawlSettings::resolve(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid settings");
            return Err(e.into());
        }
    };
    info!(
        max_depth = settings.max_depth,
        max_pages = settings.max_pages,
        max_threads = settings.max_threads,
        timeout_secs = settings.timeout_secs,
        policy = ?settings.submit_policy,
        "Resolved settings"
    );

    // Early check: the output tables must be writable before anything is crawled
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let keywords = select_keyword_extractor(settings.keyword_model.as_deref());
    let extractor = ArticleExtractor::new(keywords, settings.max_links_per_page);
    let fetcher = HttpFetcher::new(settings.timeout(), settings.user_agents.clone())
        .map_err(|e| CrawlError::Client(e.to_string()))?;
    let crawler = Crawler::new(fetcher, extractor, args.output_dir.clone())
        .with_politeness(settings.politeness());
    let registry = Arc::new(JobRegistry::new(crawler, settings.submit_policy));

    if args.outlet_name.is_some() && args.seeds.len() > 1 {
        warn!("--outlet-name ignored: more than one seed given");
    }

    // ---- Submit one job per outlet ----
    let mut followed = Vec::new();
    for seed in &args.seeds {
        let Some(mut job) = CrawlJob::new(seed.clone(), settings.limits()) else {
            warn!(%seed, "Seed has no host; skipping");
            continue;
        };
        if let (Some(name), 1) = (&args.outlet_name, args.seeds.len()) {
            job = job.with_outlet_name(name.clone());
        }
        match registry.submit(job) {
            Submission::Coalesced(id) => debug!(%seed, %id, "Seed joined an existing job"),
            submission => followed.push(submission.id()),
        }
    }

    let domains: Vec<String> = args
        .seeds
        .iter()
        .filter_map(|seed| seed.host_str().map(bare_host))
        .unique()
        .collect();

    // Ctrl-C stops dispatching; rows already written stay in the tables
    {
        let registry = Arc::clone(&registry);
        let domains = domains.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling crawls");
                for domain in &domains {
                    registry.cancel(domain);
                }
            }
        });
    }

    // Periodic progress while jobs run
    {
        let registry = Arc::clone(&registry);
        let domains = domains.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut running = 0usize;
                for domain in &domains {
                    if let Some(JobStatus::Running { progress }) = registry.status(domain) {
                        running += 1;
                        info!(
                            outlet = %domain,
                            pages = progress.pages_fetched,
                            records = progress.records_written,
                            failures = progress.fetch_failures,
                            state = ?progress.state,
                            "Crawl progress"
                        );
                    }
                }
                if running == 0 {
                    break;
                }
            }
        });
    }

    // ---- Wait, then write reports ----
    let mut failed = 0usize;
    let mut total_records = 0usize;
    let statuses = join_all(followed.iter().map(|id| registry.wait(*id))).await;
    for (id, status) in followed.into_iter().zip(statuses) {
        let Some(status) = status else {
            continue;
        };
        debug_assert!(status.is_finished());
        if let JobStatus::Failed { message } = &status {
            error!(%id, %message, "Crawl failed");
            failed += 1;
            continue;
        }
        if let Some(summary) = status.summary() {
            total_records += summary.records_written;
            info!(
                outlet = %summary.domain,
                pages = summary.pages_fetched,
                records = summary.records_written,
                table = %summary.table_path,
                "Outlet done"
            );
            if let Err(e) = json::write_report(summary, &args.output_dir).await {
                warn!(outlet = %summary.domain, error = %e, "Could not write crawl report");
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        total_records,
        failed_jobs = failed,
        elapsed_secs = elapsed.as_secs_f64(),
        "newstrace finished"
    );

    if failed > 0 {
        return Err(format!("{failed} crawl job(s) failed").into());
    }
    Ok(())
}
