//! Background crawl jobs, one per outlet at a time.
//!
//! [`JobRegistry::submit`] spawns a tokio task per crawl and hands back a
//! [`JobId`]. Callers poll [`JobRegistry::status`] or await
//! [`JobRegistry::wait`]; they never touch the crawl task directly.
//!
//! # Same-outlet submissions
//!
//! | Policy                    | A job for the outlet is still running       |
//! |---------------------------|---------------------------------------------|
//! | [`SubmitPolicy::Coalesce`]  | the running job's id is returned; nothing new starts |
//! | [`SubmitPolicy::Supersede`] | the running job is cancelled; the new job starts once it has drained |
//!
//! A superseding job waits for its predecessor so two crawls never append to
//! the same output table at once.

use crate::crawler::{CrawlProgress, Crawler, ProgressSnapshot};
use crate::errors::CrawlError;
use crate::fetcher::PageFetcher;
use crate::models::{CrawlJob, CrawlSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

/// What to do when a crawl is submitted for an outlet that is already being
/// crawled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPolicy {
    #[default]
    Coalesce,
    Supersede,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Observable state of a job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Running { progress: ProgressSnapshot },
    Completed { summary: CrawlSummary },
    Failed { message: String },
    Cancelled { summary: CrawlSummary },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Running { .. })
    }

    /// The crawl report, for jobs that ran to an end.
    pub fn summary(&self) -> Option<&CrawlSummary> {
        match self {
            JobStatus::Completed { summary } | JobStatus::Cancelled { summary } => Some(summary),
            JobStatus::Running { .. } | JobStatus::Failed { .. } => None,
        }
    }
}

/// Outcome of [`JobRegistry::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started(JobId),
    /// Joined the job already running for this outlet.
    Coalesced(JobId),
    Superseded { new: JobId, previous: JobId },
}

impl Submission {
    /// The job the caller should follow.
    pub fn id(&self) -> JobId {
        match *self {
            Submission::Started(id) | Submission::Coalesced(id) => id,
            Submission::Superseded { new, .. } => new,
        }
    }
}

struct JobEntry {
    domain: String,
    cancel: CancellationToken,
    progress: Arc<CrawlProgress>,
    done: watch::Receiver<Option<JobStatus>>,
}

impl JobEntry {
    fn status(&self) -> JobStatus {
        match self.done.borrow().as_ref() {
            Some(status) => status.clone(),
            None => JobStatus::Running {
                progress: self.progress.snapshot(),
            },
        }
    }

    fn is_running(&self) -> bool {
        self.done.borrow().is_none()
    }
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    jobs: HashMap<JobId, JobEntry>,
    latest: HashMap<String, JobId>,
}

impl RegistryState {
    /// Drop finished jobs that are no longer the latest for their outlet.
    fn prune_finished(&mut self) {
        let Self { jobs, latest, .. } = self;
        jobs.retain(|id, entry| entry.is_running() || latest.get(&entry.domain) == Some(id));
    }
}

/// Runs crawl jobs in the background and answers status queries.
pub struct JobRegistry<F: PageFetcher> {
    crawler: Arc<Crawler<F>>,
    policy: SubmitPolicy,
    state: Arc<Mutex<RegistryState>>,
}

impl<F: PageFetcher> JobRegistry<F> {
    pub fn new(crawler: Crawler<F>, policy: SubmitPolicy) -> Self {
        Self {
            crawler: Arc::new(crawler),
            policy,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Start (or join) a crawl for `job`'s outlet. Must be called inside a
    /// tokio runtime.
    ///
    /// # Returns
    ///
    /// * [`Submission::Started`] when no crawl for the outlet is running
    /// * [`Submission::Coalesced`] with the running job's id under [`SubmitPolicy::Coalesce`]
    /// * [`Submission::Superseded`] under [`SubmitPolicy::Supersede`]; the new
    ///   job starts once the cancelled one has drained
    pub fn submit(&self, job: CrawlJob) -> Submission {
        let mut state = lock(&self.state);
        let domain = job.outlet.domain().to_string();

        let running = state
            .latest
            .get(&domain)
            .copied()
            .filter(|id| state.jobs.get(id).is_some_and(JobEntry::is_running));

        let previous = match (running, self.policy) {
            (Some(id), SubmitPolicy::Coalesce) => {
                info!(%id, outlet = %domain, "Crawl already running; coalescing");
                return Submission::Coalesced(id);
            }
            (Some(id), SubmitPolicy::Supersede) => {
                info!(%id, outlet = %domain, "Superseding running crawl");
                state.jobs.get(&id).map(|entry| {
                    entry.cancel.cancel();
                    entry.done.clone()
                })
            }
            (None, _) => None,
        };

        state.next_id += 1;
        let id = JobId(state.next_id);
        let cancel = CancellationToken::new();
        let progress = Arc::new(CrawlProgress::default());
        let (tx, rx) = watch::channel(None);

        state.jobs.insert(
            id,
            JobEntry {
                domain: domain.clone(),
                cancel: cancel.clone(),
                progress: Arc::clone(&progress),
                done: rx,
            },
        );
        state.latest.insert(domain.clone(), id);
        state.prune_finished();
        drop(state);

        let crawler = Arc::clone(&self.crawler);
        let span = info_span!("job", %id, outlet = %domain);
        tokio::spawn(
            async move {
                if let Some(mut previous) = previous {
                    let _ = previous.wait_for(Option::is_some).await;
                }
                let status = run_job(crawler, job, cancel, progress).await;
                match &status {
                    JobStatus::Failed { message } => error!(%message, "Crawl job failed"),
                    JobStatus::Cancelled { .. } => warn!("Crawl job cancelled"),
                    _ => info!("Crawl job completed"),
                }
                let _ = tx.send(Some(status));
            }
            .instrument(span),
        );

        info!(%id, outlet = %domain, "Crawl job submitted");
        match running {
            Some(previous) => Submission::Superseded { new: id, previous },
            None => Submission::Started(id),
        }
    }

    /// Status of the most recent job for `domain`.
    pub fn status(&self, domain: &str) -> Option<JobStatus> {
        let state = lock(&self.state);
        let id = state.latest.get(domain)?;
        state.jobs.get(id).map(JobEntry::status)
    }

    /// Cancel the running job for `domain`. Returns `false` if none is running.
    pub fn cancel(&self, domain: &str) -> bool {
        let state = lock(&self.state);
        let Some(entry) = state.latest.get(domain).and_then(|id| state.jobs.get(id)) else {
            return false;
        };
        if !entry.is_running() {
            return false;
        }
        info!(outlet = %entry.domain, "Cancelling crawl job");
        entry.cancel.cancel();
        true
    }

    /// Wait for job `id` to finish.
    ///
    /// Returns `None` for unknown ids, including finished jobs that a later
    /// submission for the same outlet has replaced.
    pub async fn wait(&self, id: JobId) -> Option<JobStatus> {
        let mut done = lock(&self.state).jobs.get(&id)?.done.clone();
        match done.wait_for(Option::is_some).await {
            Ok(status) => status.clone(),
            Err(_) => Some(JobStatus::Failed {
                message: "job task dropped before reporting".to_string(),
            }),
        }
    }
}

async fn run_job<F: PageFetcher>(
    crawler: Arc<Crawler<F>>,
    job: CrawlJob,
    cancel: CancellationToken,
    progress: Arc<CrawlProgress>,
) -> JobStatus {
    // Run in its own task so a panic surfaces as a join error.
    let handle = tokio::spawn(
        async move { crawler.crawl(&job, &cancel, &progress).await }.in_current_span(),
    );
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(CrawlError::from(e)),
    };
    match result {
        Ok(summary) if summary.cancelled => JobStatus::Cancelled { summary },
        Ok(summary) => JobStatus::Completed { summary },
        Err(e) => JobStatus::Failed {
            message: e.to_string(),
        },
    }
}

fn lock(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
