//! Frontier: the URL queue with per-domain politeness scheduling
//!
//! This module handles:
//! - Deduplication of admitted URLs via a global seen-set
//! - One priority queue per domain
//! - A ready-time heap over domains, so `next()` only hands out URLs whose
//!   domain politeness window has elapsed
//! - At most one outstanding URL per domain: after `next()` hands one out,
//!   the domain waits until its robots.txt delay is reported through
//!   `set_crawl_delay` (or the URL is released), and its politeness window
//!   restarts from that report
//! - Write-through persistence to a [`FrontierLog`] for resume
//!
//! Fairness across domains is FIFO by ready time: the domain that became
//! eligible first is served first, ties in admission order.

use crate::config::Config;
use crate::state::{DomainState, QueuedUrl, UrlRecord, UrlStatus};
use crate::storage::FrontierLog;
use crate::url::{domain_of, extract_domain, normalize_url};
use crate::SumiError;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// When a domain may next hand out a URL
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyEntry {
    at: Instant,
    seq: u64,
    domain: String,
}

/// Everything guarded by the schedule lock
#[derive(Default)]
struct Schedule {
    domains: HashMap<String, DomainState>,
    ready: BinaryHeap<Reverse<ReadyEntry>>,
    /// Domains that have an entry in `ready` or an outstanding URL
    scheduled: HashSet<String>,
    queued: usize,
    seq: u64,
}

impl Schedule {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn push_ready(&mut self, domain: String, at: Instant) {
        let seq = self.next_seq();
        self.ready.push(Reverse(ReadyEntry { at, seq, domain }));
    }

    fn enqueue(&mut self, record: UrlRecord, request_delay: Duration, now: Instant) {
        let domain = record.domain.clone();
        let seq = self.next_seq();
        let state = self.domains.entry(domain.clone()).or_default();
        state.push(QueuedUrl { record, seq });
        let at = state.next_eligible_at(request_delay).unwrap_or(now);
        self.queued += 1;

        if self.scheduled.insert(domain.clone()) {
            self.push_ready(domain, at);
        }
    }

    fn pop_ready(&mut self, request_delay: Duration, now: Instant) -> Option<UrlRecord> {
        loop {
            let Reverse(head) = self.ready.peek()?;
            if head.at > now {
                return None;
            }
            let Reverse(entry) = self.ready.pop()?;

            let Some(state) = self.domains.get_mut(&entry.domain) else {
                self.scheduled.remove(&entry.domain);
                continue;
            };
            // Rescheduled when the outstanding URL is released
            if state.outstanding.is_some() {
                continue;
            }

            // The crawl delay may have grown since this entry was pushed
            if let Some(eligible) = state.next_eligible_at(request_delay) {
                if eligible > now {
                    self.push_ready(entry.domain, eligible);
                    continue;
                }
            }

            let Some(queued) = state.pop() else {
                self.scheduled.remove(&entry.domain);
                continue;
            };
            // The domain stays out of the ready heap until released
            state.record_request(now);
            state.outstanding = Some(queued.record.url.clone());
            self.queued -= 1;
            return Some(queued.record);
        }
    }

    /// Lets a domain hand out URLs again
    ///
    /// With `url`, only releases the domain if that URL is the outstanding
    /// one. The politeness window restarts at `now`.
    fn release(
        &mut self,
        domain: &str,
        url: Option<&str>,
        request_delay: Duration,
        now: Instant,
    ) -> bool {
        let Some(state) = self.domains.get_mut(domain) else {
            return false;
        };
        match (state.outstanding.as_deref(), url) {
            (None, _) => return false,
            (Some(outstanding), Some(url)) if outstanding != url => return false,
            _ => {}
        }
        state.outstanding = None;
        state.record_request(now);

        if state.is_empty() {
            self.scheduled.remove(domain);
        } else {
            let at = now + state.effective_delay(request_delay);
            self.push_ready(domain.to_string(), at);
        }
        true
    }
}

/// Frontier statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierStats {
    /// Every URL ever admitted
    pub total_seen: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pending URLs per domain, for domains that still have any
    pub queued_by_domain: BTreeMap<String, usize>,
}

/// The crawl frontier
pub struct Frontier {
    request_delay: Duration,
    max_depth: u32,
    /// Seen-set; also tracks each admitted URL's current status
    seen: Mutex<HashMap<String, UrlStatus>>,
    schedule: Mutex<Schedule>,
    log: Option<Mutex<FrontierLog>>,
}

impl Frontier {
    /// Creates a frontier without persistence
    pub fn in_memory(config: &Config) -> Self {
        Self::with_log(config, None)
    }

    /// Opens a persistent frontier at `path`
    ///
    /// Unless `fresh` is set, previously admitted URLs are loaded back: all of
    /// them enter the seen-set, and those that never finished are queued again.
    pub fn open(config: &Config, path: &Path, fresh: bool) -> Result<Self, SumiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut log = FrontierLog::open(path)?;
        if fresh {
            log.clear()?;
        }
        let existing = log.load_all()?;

        let frontier = Self::with_log(config, Some(log));
        let resumed = frontier.restore(existing);
        if resumed > 0 {
            tracing::info!("Resumed {} unfinished URLs from {}", resumed, path.display());
        }
        Ok(frontier)
    }

    fn with_log(config: &Config, log: Option<FrontierLog>) -> Self {
        Self {
            request_delay: config.crawler.request_delay(),
            max_depth: config.crawler.max_depth,
            seen: Mutex::new(HashMap::new()),
            schedule: Mutex::new(Schedule::default()),
            log: log.map(Mutex::new),
        }
    }

    fn restore(&self, records: Vec<UrlRecord>) -> usize {
        let now = Instant::now();
        let mut resumed = 0;
        let mut seen = self.seen();
        let mut schedule = self.schedule();

        for mut record in records {
            if record.status.is_terminal() {
                seen.insert(record.url.clone(), record.status);
                continue;
            }
            if record.status == UrlStatus::InProgress {
                self.persist_status(&record.url, UrlStatus::Pending);
            }
            record.status = UrlStatus::Pending;
            seen.insert(record.url.clone(), UrlStatus::Pending);
            schedule.enqueue(record, self.request_delay, now);
            resumed += 1;
        }
        resumed
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<String, UrlStatus>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a URL
    ///
    /// The URL is normalized first. Returns `false` if it is malformed,
    /// deeper than the configured max depth, or already seen.
    pub fn add(&self, mut record: UrlRecord) -> bool {
        if record.depth > self.max_depth {
            tracing::trace!("Not admitting {} at depth {}", record.url, record.depth);
            return false;
        }
        let normalized = match normalize_url(&record.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Not admitting {}: {}", record.url, e);
                return false;
            }
        };
        let Some(domain) = extract_domain(&normalized) else {
            return false;
        };

        record.url = normalized.to_string();
        record.domain = domain;
        record.status = UrlStatus::Pending;

        {
            let mut seen = self.seen();
            if seen.contains_key(&record.url) {
                return false;
            }
            seen.insert(record.url.clone(), UrlStatus::Pending);
        }

        if let Some(log) = &self.log {
            let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = log.insert(&record) {
                tracing::warn!("Failed to persist frontier entry {}: {}", record.url, e);
            }
        }

        tracing::trace!("Admitted {} (depth {})", record.url, record.depth);
        self.schedule()
            .enqueue(record, self.request_delay, Instant::now());
        true
    }

    /// Hands out the next URL whose domain is eligible now
    ///
    /// Returns `None` when nothing is eligible, whether or not URLs are still
    /// pending. The returned URL is marked in progress.
    pub fn next(&self) -> Option<UrlRecord> {
        let mut record = self.schedule().pop_ready(self.request_delay, Instant::now())?;
        record.status = UrlStatus::InProgress;
        self.seen().insert(record.url.clone(), UrlStatus::InProgress);
        self.persist_status(&record.url, UrlStatus::InProgress);
        Some(record)
    }

    /// Records the outcome of a URL previously returned by [`Frontier::next`]
    ///
    /// Also releases the URL's domain if it was still waiting on this URL.
    pub fn mark_completed(&self, url: &str, success: bool) {
        self.release(url);
        let next = if success {
            UrlStatus::Success
        } else {
            UrlStatus::Failed
        };

        {
            let mut seen = self.seen();
            match seen.get_mut(url) {
                Some(status) if status.can_transition_to(next) => *status = next,
                Some(status) => {
                    tracing::warn!("Ignoring transition {} -> {} for {}", status, next, url);
                    return;
                }
                None => {
                    tracing::warn!("Completion reported for unknown URL {}", url);
                    return;
                }
            }
        }
        self.persist_status(url, next);
    }

    /// Sets the robots.txt crawl delay of a domain and releases it
    ///
    /// A delay shorter than the configured request delay has no effect. The
    /// domain's next URL becomes eligible one effective delay from now.
    pub fn set_crawl_delay(&self, domain: &str, delay: Option<Duration>) {
        let mut schedule = self.schedule();
        let state = schedule.domains.entry(domain.to_string()).or_default();
        if state.crawl_delay != delay {
            tracing::debug!("Crawl delay for {} set to {:?}", domain, delay);
            state.crawl_delay = delay;
        }
        schedule.release(domain, None, self.request_delay, Instant::now());
    }

    /// Releases the domain of `url` if `url` is its outstanding URL
    ///
    /// Returns `false` if the domain was not waiting on this URL.
    pub fn release(&self, url: &str) -> bool {
        let Some(domain) = domain_of(url) else {
            return false;
        };
        self.schedule()
            .release(&domain, Some(url), self.request_delay, Instant::now())
    }

    /// True if no URL is pending in any domain queue
    pub fn is_empty(&self) -> bool {
        self.schedule().queued == 0
    }

    /// Number of pending URLs
    pub fn len(&self) -> usize {
        self.schedule().queued
    }

    /// How long until some domain becomes eligible, if any URL is pending
    pub fn next_ready_in(&self) -> Option<Duration> {
        let schedule = self.schedule();
        let Reverse(head) = schedule.ready.peek()?;
        Some(head.at.saturating_duration_since(Instant::now()))
    }

    pub fn status_of(&self, url: &str) -> Option<UrlStatus> {
        self.seen().get(url).copied()
    }

    pub fn stats(&self) -> FrontierStats {
        let mut stats = FrontierStats::default();
        {
            let seen = self.seen();
            stats.total_seen = seen.len();
            for status in seen.values() {
                match status {
                    UrlStatus::Pending => stats.pending += 1,
                    UrlStatus::InProgress => stats.in_progress += 1,
                    UrlStatus::Success => stats.succeeded += 1,
                    UrlStatus::Failed => stats.failed += 1,
                }
            }
        }

        let schedule = self.schedule();
        stats.queued_by_domain = schedule
            .domains
            .iter()
            .filter(|(_, state)| !state.is_empty())
            .map(|(domain, state)| (domain.clone(), state.queue_len()))
            .collect();
        stats
    }

    fn persist_status(&self, url: &str, status: UrlStatus) {
        if let Some(log) = &self.log {
            let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = log.update_status(url, status) {
                tracing::warn!("Failed to persist status of {}: {}", url, e);
            }
        }
    }
}
