use crate::state::UrlRecord;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// A pending URL inside a domain queue
///
/// `seq` is the frontier-wide admission counter, so equal priorities are
/// served in discovery order.
#[derive(Debug, Clone)]
pub struct QueuedUrl {
    pub record: UrlRecord,
    pub seq: u64,
}

// BinaryHeap is a max-heap: higher priority first, then lower seq first
impl Ord for QueuedUrl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .priority
            .cmp(&other.record.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedUrl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedUrl {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedUrl {}

/// Tracks the queue and politeness window of one domain
///
/// The effective delay between two dequeues is the larger of the configured
/// request delay and the robots.txt crawl delay, once one is known.
#[derive(Debug, Default)]
pub struct DomainState {
    queue: BinaryHeap<QueuedUrl>,

    /// When the politeness window last restarted
    pub last_access: Option<Instant>,

    /// Crawl delay announced by robots.txt
    pub crawl_delay: Option<Duration>,

    /// URL handed out and not yet released; the domain is busy meanwhile
    pub outstanding: Option<String>,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `max(request_delay, crawl_delay)`
    pub fn effective_delay(&self, request_delay: Duration) -> Duration {
        match self.crawl_delay {
            Some(delay) => delay.max(request_delay),
            None => request_delay,
        }
    }

    /// Earliest instant at which the next dequeue is allowed
    ///
    /// `None` means the domain has never been accessed and is ready now.
    pub fn next_eligible_at(&self, request_delay: Duration) -> Option<Instant> {
        self.last_access
            .map(|last| last + self.effective_delay(request_delay))
    }

    /// Restarts the politeness window at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.last_access = Some(now);
    }

    pub fn push(&mut self, queued: QueuedUrl) {
        self.queue.push(queued);
    }

    /// Pops the highest-priority pending URL
    pub fn pop(&mut self) -> Option<QueuedUrl> {
        self.queue.pop()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
