//! Bounded breadth-first crawl of one outlet.
//!
//! The driving loop owns the frontier (a FIFO of `(url, depth)` pairs) and a
//! [`JoinSet`] of fetch+extract tasks. It tops the set up to `max_threads`,
//! reaps one finished task at a time and feeds the links that task found back
//! into the frontier. Tasks write article records to the shared
//! [`RecordSink`] themselves, so rows appear in the table as soon as each page
//! is processed.
//!
//! ```text
//!  frontier ──pop──▶ gate (depth, max_pages) ──spawn──▶ visit(url)
//!     ▲                                                   │ fetch
//!     │                                                   │ extract
//!     └──── links at depth+1, first sighting only ◀───────┘ append record
//! ```
//!
//! # Limits
//!
//! | Limit         | Effect                                                     |
//! |---------------|------------------------------------------------------------|
//! | `max_depth`   | entries deeper than this are never fetched                 |
//! | `max_pages`   | total fetches; once reached the frontier is discarded      |
//! | `max_threads` | tasks in flight at once                                    |
//!
//! # Failure handling
//!
//! A failed fetch yields no links and no record and is only counted. A task
//! that panics is counted the same way. The one fatal condition is the output
//! table: if an append fails, in-flight tasks are aborted and the error is
//! returned to the caller.
//!
//! # Cancellation
//!
//! When the [`CancellationToken`] fires the frontier is cleared and nothing
//! new is dispatched; tasks already in flight run to completion and their
//! records are kept.

use crate::errors::{CrawlError, FetchError, SinkError};
use crate::extract::ArticleExtractor;
use crate::fetcher::PageFetcher;
use crate::models::{CrawlJob, CrawlState, CrawlSummary, Outlet, PageResult};
use crate::sink::{Appended, RecordSink};
use crate::urls::dedup_key;
use crate::utils::truncate_for_log;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// URLs already enqueued or fetched during one job, keyed by [`dedup_key`].
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: Mutex<HashSet<String>>,
}

impl VisitedSet {
    /// Mark `url` as seen. Returns `false` if it was already marked.
    ///
    /// Check and mark happen under one lock, so two pages discovering the
    /// same link can never both enqueue it.
    pub fn insert(&self, url: &Url) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dedup_key(url))
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Random pause taken by each task before it fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolitenessDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PolitenessDelay {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min.min(max)),
            max: Duration::from_millis(max.max(min)),
        }
    }

    fn sample(&self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Live counters for a running crawl, shared with status queries.
#[derive(Debug)]
pub struct CrawlProgress {
    pages_fetched: AtomicUsize,
    records_written: AtomicUsize,
    fetch_failures: AtomicUsize,
    state: AtomicU8,
}

/// Point-in-time copy of [`CrawlProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub pages_fetched: usize,
    pub records_written: usize,
    pub fetch_failures: usize,
    pub state: CrawlState,
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self {
            pages_fetched: AtomicUsize::new(0),
            records_written: AtomicUsize::new(0),
            fetch_failures: AtomicUsize::new(0),
            state: AtomicU8::new(state_to_u8(CrawlState::Running)),
        }
    }
}

impl CrawlProgress {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            state: state_from_u8(self.state.load(Ordering::Acquire)),
        }
    }

    fn set_state(&self, state: CrawlState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }
}

fn state_to_u8(state: CrawlState) -> u8 {
    match state {
        CrawlState::Running => 0,
        CrawlState::Draining => 1,
        CrawlState::Done => 2,
    }
}

fn state_from_u8(raw: u8) -> CrawlState {
    match raw {
        0 => CrawlState::Running,
        1 => CrawlState::Draining,
        _ => CrawlState::Done,
    }
}

/// Everything a visit task needs, shared by all tasks of one job.
struct TaskContext<F> {
    fetcher: Arc<F>,
    extractor: Arc<ArticleExtractor>,
    sink: Arc<RecordSink>,
    outlet: Outlet,
    politeness: PolitenessDelay,
}

/// What one visit task reports back to the driving loop.
#[derive(Debug)]
struct Visit {
    depth: usize,
    outcome: Result<PageOutcome, FetchError>,
}

#[derive(Debug)]
struct PageOutcome {
    final_url: Url,
    links: Vec<Url>,
    rejected_links: usize,
    appended: Option<Appended>,
}

#[derive(Debug, Default)]
struct Tally {
    pages_fetched: usize,
    articles_found: usize,
    records_written: usize,
    duplicates_skipped: usize,
    links_rejected: usize,
    failures: BTreeMap<String, usize>,
    cancelled: bool,
}

/// Crawls outlets with a shared fetcher and extractor.
///
/// One `Crawler` can run many jobs (for different outlets) concurrently; every
/// call to [`Crawler::crawl`] gets its own frontier, visited set and output
/// table.
pub struct Crawler<F: PageFetcher> {
    fetcher: Arc<F>,
    extractor: Arc<ArticleExtractor>,
    output_dir: PathBuf,
    politeness: PolitenessDelay,
}

impl<F: PageFetcher> std::fmt::Debug for Crawler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("extractor", &self.extractor)
            .field("output_dir", &self.output_dir)
            .field("politeness", &self.politeness)
            .finish()
    }
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(fetcher: F, extractor: ArticleExtractor, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(extractor),
            output_dir: output_dir.into(),
            politeness: PolitenessDelay::none(),
        }
    }

    pub fn with_politeness(mut self, politeness: PolitenessDelay) -> Self {
        self.politeness = politeness;
        self
    }

    /// Run `job` to completion, cancellation or a fatal sink error.
    ///
    /// # Arguments
    ///
    /// * `job` - Seed, outlet and limits
    /// * `cancel` - Stops dispatch when triggered; in-flight pages still finish
    /// * `progress` - Updated as pages and records come in
    ///
    /// # Returns
    ///
    /// The crawl summary (with `cancelled` set if the token fired), or
    /// [`CrawlError`] if the output table could not be opened or written.
    #[instrument(skip_all, fields(outlet = %job.outlet.domain(), seed = %job.seed))]
    pub async fn crawl(
        &self,
        job: &CrawlJob,
        cancel: &CancellationToken,
        progress: &CrawlProgress,
    ) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();
        let limits = job.limits;
        let sink = match RecordSink::open(&self.output_dir, &job.outlet) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                progress.set_state(CrawlState::Done);
                error!(error = %e, "Could not open output table");
                return Err(e.into());
            }
        };
        let ctx = Arc::new(TaskContext {
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&sink),
            outlet: job.outlet.clone(),
            politeness: self.politeness,
        });

        info!(
            max_depth = limits.max_depth,
            max_pages = limits.max_pages,
            max_threads = limits.max_threads,
            table = %sink.path().display(),
            existing_rows = sink.row_count(),
            "Crawl started"
        );

        let visited = VisitedSet::default();
        let mut frontier: VecDeque<(Url, usize)> = VecDeque::new();
        visited.insert(&job.seed);
        frontier.push_back((job.seed.clone(), 0));

        let mut in_flight: JoinSet<Result<Visit, SinkError>> = JoinSet::new();
        let max_in_flight = limits.max_threads.max(1);
        let mut dispatched = 0usize;
        let mut tally = Tally::default();
        progress.set_state(CrawlState::Running);

        loop {
            if cancel.is_cancelled() && !tally.cancelled {
                info!(discarded = frontier.len(), in_flight = in_flight.len(), "Crawl cancelled");
                tally.cancelled = true;
                frontier.clear();
            }

            while in_flight.len() < max_in_flight {
                let Some((url, depth)) = frontier.pop_front() else {
                    break;
                };
                if depth > limits.max_depth {
                    continue;
                }
                if dispatched >= limits.max_pages {
                    frontier.clear();
                    break;
                }
                dispatched += 1;
                debug!(%url, depth, dispatched, "Dispatching");
                in_flight.spawn(visit(Arc::clone(&ctx), url, depth));
            }
            if dispatched >= limits.max_pages && !frontier.is_empty() {
                debug!(discarded = frontier.len(), "Page limit reached; discarding frontier");
                frontier.clear();
            }

            progress.set_state(if frontier.is_empty() {
                CrawlState::Draining
            } else {
                CrawlState::Running
            });

            let joined = tokio::select! {
                joined = in_flight.join_next() => joined,
                _ = cancel.cancelled(), if !tally.cancelled => continue,
            };
            let Some(joined) = joined else {
                break;
            };

            let visit = match joined {
                Ok(Ok(visit)) => visit,
                Ok(Err(e)) => {
                    error!(error = %e, "Output table write failed; aborting crawl");
                    in_flight.abort_all();
                    while in_flight.join_next().await.is_some() {}
                    progress.set_state(CrawlState::Done);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(error = %e, "Crawl task did not finish");
                    *tally.failures.entry("task".to_string()).or_default() += 1;
                    progress.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let page = match visit.outcome {
                Ok(page) => page,
                Err(e) => {
                    *tally.failures.entry(e.kind().to_string()).or_default() += 1;
                    progress.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            tally.pages_fetched += 1;
            progress.pages_fetched.fetch_add(1, Ordering::Relaxed);
            tally.links_rejected += page.rejected_links;
            match page.appended {
                Some(Appended::Written) => {
                    tally.articles_found += 1;
                    tally.records_written += 1;
                    progress.records_written.fetch_add(1, Ordering::Relaxed);
                }
                Some(Appended::Duplicate) => {
                    tally.articles_found += 1;
                    tally.duplicates_skipped += 1;
                }
                None => {}
            }

            if job.outlet.owns_host(page.final_url.host_str().unwrap_or_default()) {
                visited.insert(&page.final_url);
            }

            let next_depth = visit.depth + 1;
            if tally.cancelled || next_depth > limits.max_depth {
                continue;
            }
            for link in page.links {
                if dispatched >= limits.max_pages {
                    break;
                }
                if visited.insert(&link) {
                    frontier.push_back((link, next_depth));
                }
            }
        }

        progress.set_state(CrawlState::Done);
        let summary = CrawlSummary {
            seed: job.seed.to_string(),
            outlet: job.outlet.name().to_string(),
            domain: job.outlet.domain().to_string(),
            limits,
            pages_fetched: tally.pages_fetched,
            articles_found: tally.articles_found,
            records_written: tally.records_written,
            duplicates_skipped: tally.duplicates_skipped,
            links_rejected: tally.links_rejected,
            failures: tally.failures,
            cancelled: tally.cancelled,
            elapsed_ms: started.elapsed().as_millis(),
            table_path: sink.path().display().to_string(),
        };
        info!(
            pages = summary.pages_fetched,
            records = summary.records_written,
            duplicates = summary.duplicates_skipped,
            failures = summary.failures.values().sum::<usize>(),
            seen = visited.len(),
            elapsed_ms = summary.elapsed_ms as u64,
            cancelled = summary.cancelled,
            "Crawl finished"
        );
        Ok(summary)
    }
}

/// Fetch one page, extract it and append any article to the table.
async fn visit<F: PageFetcher>(
    ctx: Arc<TaskContext<F>>,
    url: Url,
    depth: usize,
) -> Result<Visit, SinkError> {
    let pause = ctx.politeness.sample();
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }

    let page = ctx.fetcher.fetch(&url).await;
    process_page(&ctx, PageResult { url, depth, page }).await
}

async fn process_page<F: PageFetcher>(
    ctx: &TaskContext<F>,
    result: PageResult,
) -> Result<Visit, SinkError> {
    let PageResult { url, depth, page } = result;
    let page = match page {
        Ok(page) => page,
        Err(e) => {
            match &e {
                FetchError::Http(_) | FetchError::Decode(_) => debug!(%url, error = %e, "Fetch failed"),
                FetchError::Timeout | FetchError::Connection(_) => warn!(%url, error = %e, "Fetch failed"),
            }
            return Ok(Visit {
                depth,
                outcome: Err(e),
            });
        }
    };

    let extraction = ctx
        .extractor
        .extract(&page.html, &url, &page.final_url, &ctx.outlet);

    let appended = match extraction.article {
        Some(record) => {
            let sink = Arc::clone(&ctx.sink);
            let (appended, record) = tokio::task::spawn_blocking(move || {
                let appended = sink.append(&record);
                (appended, record)
            })
            .await
            .map_err(|e| SinkError::Io(std::io::Error::other(e.to_string())))?;
            let appended = appended?;
            if appended == Appended::Written {
                info!(
                    author = %record.author,
                    headline = %truncate_for_log(&record.headline, 80),
                    url = %record.source_url,
                    "Record written"
                );
            }
            Some(appended)
        }
        None => None,
    };

    debug!(%url, depth, links = extraction.links.len(), "Page processed");
    Ok(Visit {
        depth,
        outcome: Ok(PageOutcome {
            final_url: page.final_url,
            links: extraction.links,
            rejected_links: extraction.rejected_links,
            appended,
        }),
    })
}
