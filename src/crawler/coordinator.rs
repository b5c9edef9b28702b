//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives the crawl: it seeds the frontier, runs a pool of
//! workers and pushes every dequeued URL through the pipeline
//!
//! robots check → fetch → parse → store → enqueue discovered links
//!
//! Every per-URL problem ends as a terminal frontier status plus a counter
//! increment; nothing a single page does can stop the crawl.

use crate::config::Config;
use crate::crawler::fetcher::{FetchResult, Fetcher, FetcherStats};
use crate::crawler::frontier::{Frontier, FrontierStats};
use crate::crawler::parser::{HtmlParser, ParserStats};
use crate::robots::{RobotsCache, RobotsStats};
use crate::state::UrlRecord;
use crate::storage::{PageStore, StorageStats};
use crate::{FailureReason, SumiError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Shortest idle sleep, so idle workers never spin
const MIN_IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Crawl-level counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStats {
    /// URLs handed to a worker (counted against the page budget)
    pub pages_attempted: u64,
    /// Pages fetched successfully
    pub pages_crawled: u64,
    pub pages_stored: u64,
    /// Links admitted to the frontier
    pub urls_discovered: u64,
    pub errors: u64,
    pub robots_denied: u64,
    pub filtered: u64,
    pub runtime: Duration,
}

impl CrawlStats {
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.runtime.as_secs_f64();
        if secs > 0.0 {
            self.pages_crawled as f64 / secs
        } else {
            0.0
        }
    }
}

/// Everything the components report, gathered at one point in time
#[derive(Debug, Clone)]
pub struct CrawlSnapshot {
    pub crawl: CrawlStats,
    pub frontier: FrontierStats,
    pub fetcher: FetcherStats,
    pub parser: ParserStats,
    pub robots: RobotsStats,
    /// Absent if the storage backend could not be queried
    pub storage: Option<StorageStats>,
}

/// How one URL ended
#[derive(Debug)]
enum PageOutcome {
    Stored,
    RobotsDenied,
    Filtered(FailureReason),
    Failed(FailureReason),
    /// The crawl was stopped before the fetch; the URL stays in progress
    Interrupted,
}

/// What a worker should do next
enum Dispatch {
    Url(UrlRecord),
    Idle,
    Done,
}

#[derive(Default)]
struct DispatchState {
    attempted: u64,
    in_flight: usize,
}

/// Accounts for one dispatched URL until its worker is done with it
///
/// Dropping releases the URL's domain in the frontier, so a worker that
/// panics mid-page neither blocks its domain nor keeps the others waiting.
struct InFlight<'a> {
    coordinator: &'a Coordinator,
    url: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.coordinator.frontier.release(&self.url);
        self.coordinator.dispatch_state().in_flight -= 1;
    }
}

#[derive(Default)]
struct Counters {
    pages_crawled: AtomicU64,
    pages_stored: AtomicU64,
    urls_discovered: AtomicU64,
    errors: AtomicU64,
    robots_denied: AtomicU64,
    filtered: AtomicU64,
}

#[derive(Default)]
struct Clock {
    started: Option<Instant>,
    finished: Option<Duration>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    frontier: Arc<Frontier>,
    robots: Arc<RobotsCache>,
    fetcher: Arc<Fetcher>,
    parser: Arc<HtmlParser>,
    store: Arc<PageStore>,
    slots: Semaphore,
    running: AtomicBool,
    dispatch: Mutex<DispatchState>,
    counters: Counters,
    clock: Mutex<Clock>,
}

impl Coordinator {
    /// Creates a coordinator with every component built from `config`
    ///
    /// Fails if storage cannot be opened or an HTTP client cannot be built.
    /// With `fresh` the persisted frontier is discarded; otherwise unfinished
    /// URLs from a previous run are resumed.
    pub fn new(config: Config, fresh: bool) -> Result<Arc<Self>, SumiError> {
        std::fs::create_dir_all(&config.output.storage_dir)?;

        let store = PageStore::open(&config.output.storage_dir, &config.output.database_path())?;
        let frontier = Frontier::open(&config, &config.output.frontier_path(), fresh)?;
        let robots = RobotsCache::new(&config)?;
        let fetcher = Fetcher::new(&config)?;
        let parser = HtmlParser::new(&config.filter);

        Ok(Self::with_components(
            config, frontier, robots, fetcher, parser, store,
        ))
    }

    /// Creates a coordinator around existing component instances
    pub fn with_components(
        config: Config,
        frontier: Frontier,
        robots: RobotsCache,
        fetcher: Fetcher,
        parser: HtmlParser,
        store: PageStore,
    ) -> Arc<Self> {
        let concurrency = config.crawler.max_concurrent_requests.max(1) as usize;
        Arc::new(Self {
            config: Arc::new(config),
            frontier: Arc::new(frontier),
            robots: Arc::new(robots),
            fetcher: Arc::new(fetcher),
            parser: Arc::new(parser),
            store: Arc::new(store),
            slots: Semaphore::new(concurrency),
            running: AtomicBool::new(false),
            dispatch: Mutex::new(DispatchState::default()),
            counters: Counters::default(),
            clock: Mutex::new(Clock::default()),
        })
    }

    /// Runs a crawl to completion
    ///
    /// Seeds are admitted at depth 0 with the highest priority, then
    /// `max_concurrent_requests` workers run until the page budget is spent,
    /// the frontier drains, or [`Coordinator::stop`] is called. Statistics
    /// are always returned, even if every page failed.
    pub async fn crawl(self: &Arc<Self>, seeds: &[String]) -> CrawlStats {
        self.running.store(true, Ordering::SeqCst);
        {
            let mut clock = self.clock();
            clock.started = Some(Instant::now());
            clock.finished = None;
        }

        let admitted = seeds
            .iter()
            .filter(|seed| self.frontier.add(UrlRecord::seed(seed.as_str(), "")))
            .count();
        let workers = self.config.crawler.max_concurrent_requests.max(1) as usize;
        tracing::info!(
            "Starting crawl: {} of {} seeds admitted, {} pending, {} workers",
            admitted,
            seeds.len(),
            self.frontier.len(),
            workers
        );

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let this = Arc::clone(self);
            tasks.spawn(async move { this.worker(id).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        self.running.store(false, Ordering::SeqCst);
        {
            let mut clock = self.clock();
            clock.finished = clock.started.map(|started| started.elapsed());
        }

        let stats = self.stats();
        tracing::info!(
            "Crawl finished: {} attempted, {} crawled, {} stored, {} errors, {} robots denied, {} filtered in {:.1}s",
            stats.pages_attempted,
            stats.pages_crawled,
            stats.pages_stored,
            stats.errors,
            stats.robots_denied,
            stats.filtered,
            stats.runtime.as_secs_f64()
        );
        stats
    }

    /// Asks the workers to stop and waits out the grace period
    ///
    /// In-flight fetches are not cancelled; workers exit at their next
    /// check between pipeline steps.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stopping crawl");
        }
        tokio::time::sleep(self.config.crawler.shutdown_grace_period()).await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn worker(self: Arc<Self>, id: usize) {
        tracing::debug!("Worker {} started", id);
        while self.is_running() {
            match self.dispatch_next() {
                Dispatch::Url(record) => {
                    let _in_flight = InFlight {
                        coordinator: &self,
                        url: record.url.clone(),
                    };
                    let _slot = self.slots.acquire().await.ok();
                    self.process(record).await;
                }
                Dispatch::Idle => {
                    let poll = self.config.crawler.poll_interval();
                    let wait = self
                        .frontier
                        .next_ready_in()
                        .map_or(poll, |ready| ready.min(poll))
                        .max(MIN_IDLE_SLEEP);
                    tokio::time::sleep(wait).await;
                }
                Dispatch::Done => break,
            }
        }
        tracing::debug!("Worker {} exiting", id);
    }

    /// Picks the next URL under the dispatch lock
    ///
    /// A worker is done when the budget is spent, or when nothing is pending
    /// and no other worker is still processing a page that could add links.
    fn dispatch_next(&self) -> Dispatch {
        let mut state = self.dispatch_state();
        if state.attempted >= self.config.crawler.max_pages {
            return Dispatch::Done;
        }
        if let Some(record) = self.frontier.next() {
            state.attempted += 1;
            state.in_flight += 1;
            return Dispatch::Url(record);
        }
        if state.in_flight == 0 && self.frontier.is_empty() {
            Dispatch::Done
        } else {
            Dispatch::Idle
        }
    }

    async fn process(&self, record: UrlRecord) {
        let url = record.url.clone();
        tracing::debug!("Processing {} (depth {})", url, record.depth);

        match self.run_pipeline(&record).await {
            PageOutcome::Stored => {
                self.frontier.mark_completed(&url, true);
            }
            PageOutcome::RobotsDenied => {
                self.counters.robots_denied.fetch_add(1, Ordering::Relaxed);
                self.frontier.mark_completed(&url, false);
            }
            PageOutcome::Filtered(reason) => {
                tracing::debug!("Filtered {}: {}", url, reason);
                self.counters.filtered.fetch_add(1, Ordering::Relaxed);
                self.frontier.mark_completed(&url, false);
            }
            PageOutcome::Failed(reason) => {
                if matches!(reason, FailureReason::RobotsOrAccessDenied(_)) {
                    self.counters.robots_denied.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!("Failed {}: {}", url, reason);
                self.frontier.mark_completed(&url, false);
            }
            PageOutcome::Interrupted => {
                tracing::debug!("Left {} unfinished on stop", url);
            }
        }
    }

    async fn run_pipeline(&self, record: &UrlRecord) -> PageOutcome {
        let url = record.url.as_str();

        // Reporting the delay releases the domain for its next URL
        let robots_delay = self.robots.robots_delay(url).await;
        self.frontier.set_crawl_delay(&record.domain, robots_delay);
        if !self.robots.can_fetch(url).await {
            return PageOutcome::RobotsDenied;
        }

        if !self.is_running() {
            return PageOutcome::Interrupted;
        }

        let document = match self
            .fetcher
            .fetch(url, record.depth, record.parent_url.as_deref())
            .await
        {
            FetchResult::Success(document) => document,
            FetchResult::Filtered(reason) => return PageOutcome::Filtered(reason),
            FetchResult::Failed(reason) => return PageOutcome::Failed(reason),
        };

        let crawled = self.counters.pages_crawled.fetch_add(1, Ordering::Relaxed) + 1;
        if crawled % 10 == 0 {
            tracing::info!(
                "Progress: {} pages crawled, {} in frontier",
                crawled,
                self.frontier.len()
            );
        }

        let parsed = self.parser.parse(document);
        let stored = match self.store.store_record(&parsed) {
            Ok(_) => {
                self.counters.pages_stored.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to store {}: {}", url, e);
                Some(FailureReason::StorageWriteFailed(e.to_string()))
            }
        };

        self.enqueue_links(record, &parsed.outbound_links);

        match stored {
            None => PageOutcome::Stored,
            Some(reason) => PageOutcome::Failed(reason),
        }
    }

    fn enqueue_links(&self, parent: &UrlRecord, links: &[String]) {
        let depth = parent.depth + 1;
        if depth > self.config.crawler.max_depth {
            return;
        }

        let added = links
            .iter()
            .filter(|link| {
                self.frontier.add(UrlRecord::discovered(
                    link.as_str(),
                    "",
                    depth,
                    parent.url.as_str(),
                ))
            })
            .count();

        if added > 0 {
            self.counters
                .urls_discovered
                .fetch_add(added as u64, Ordering::Relaxed);
            tracing::debug!("{} new URLs from {}", added, parent.url);
        }
    }

    fn dispatch_state(&self) -> MutexGuard<'_, DispatchState> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Crawl-level counters
    pub fn stats(&self) -> CrawlStats {
        let runtime = {
            let clock = self.clock();
            clock
                .finished
                .or_else(|| clock.started.map(|started| started.elapsed()))
                .unwrap_or_default()
        };

        CrawlStats {
            pages_attempted: self.dispatch_state().attempted,
            pages_crawled: self.counters.pages_crawled.load(Ordering::Relaxed),
            pages_stored: self.counters.pages_stored.load(Ordering::Relaxed),
            urls_discovered: self.counters.urls_discovered.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            robots_denied: self.counters.robots_denied.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            runtime,
        }
    }

    /// Statistics of the crawl and of every component
    pub fn snapshot(&self) -> CrawlSnapshot {
        let storage = match self.store.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!("Could not read storage statistics: {}", e);
                None
            }
        };

        CrawlSnapshot {
            crawl: self.stats(),
            frontier: self.frontier.stats(),
            fetcher: self.fetcher.stats(),
            parser: self.parser.stats(),
            robots: self.robots.stats(),
            storage,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }
}
